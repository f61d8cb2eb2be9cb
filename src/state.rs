//! Watermark persistence: the highest primary key already notified.
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Watermark {
    #[serde(default)]
    last_id: i64,
}

/// Read `last_id` from `path`. Missing, unreadable or malformed records yield 0.
pub fn load_watermark(path: &Path) -> i64 {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) => {
            debug!(path = %path.display(), %err, "no watermark, starting from 0");
            return 0;
        }
    };
    match serde_json::from_str::<Watermark>(&content) {
        Ok(w) => w.last_id,
        Err(err) => {
            debug!(path = %path.display(), %err, "malformed watermark, starting from 0");
            0
        }
    }
}

/// Write `last_id` to `path`, creating parent directories as needed.
pub fn save_watermark(path: &Path, last_id: i64) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let body = serde_json::to_vec(&Watermark { last_id })
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    // Write beside the target and rename so a torn write leaves the old value.
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)
}
