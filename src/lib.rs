//! Poll a database for rows of interest and report them to WeCom.

pub mod compose;
pub mod config;
pub mod db;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod state;
