//! Delivery of composed messages to WeCom.
//!
//! Two transports exist: the app push API (token, then send) and the group
//! robot webhook. [`Channel::select`] picks one per run; [`DryRun`] stands in
//! for both when nothing should leave the machine.
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::Settings;
use crate::model::OutputFormat;

pub mod app;
pub mod robot;

pub use app::AppClient;
pub use robot::RobotClient;

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
    #[error("access token request failed: errcode={errcode} errmsg={errmsg}")]
    Auth { errcode: i64, errmsg: String },
    #[error("message delivery failed: errcode={errcode} errmsg={errmsg}")]
    Delivery { errcode: i64, errmsg: String },
}

/// Common envelope of every WeCom response.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiReply {
    errcode: Option<i64>,
    #[serde(default)]
    errmsg: String,
    #[serde(default)]
    access_token: Option<String>,
}

impl ApiReply {
    /// Error code, with a missing field counted as failure.
    fn code(&self) -> i64 {
        self.errcode.unwrap_or(-1)
    }

    pub(crate) fn into_delivery(self) -> Result<(), NotifyError> {
        match self.code() {
            0 => Ok(()),
            errcode => Err(NotifyError::Delivery {
                errcode,
                errmsg: self.errmsg,
            }),
        }
    }
}

pub(crate) fn http_client() -> Result<Client, NotifyError> {
    Ok(Client::builder()
        .user_agent(concat!("jobwatch/", env!("CARGO_PKG_VERSION")))
        .timeout(HTTP_TIMEOUT)
        .build()?)
}

/// Where this run's message goes. Decided once from settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Robot {
        webhook: String,
        mentioned: Vec<String>,
        format: OutputFormat,
    },
    App {
        corpid: String,
        corpsecret: String,
        agentid: i64,
        touser: String,
    },
}

impl Channel {
    /// Prefer the robot webhook when configured, else the app push API.
    pub fn select(settings: &Settings) -> Self {
        match settings.webhook() {
            Some(robot) => Channel::Robot {
                webhook: robot.webhook.clone(),
                mentioned: robot.mentioned(),
                format: robot.format,
            },
            None => Channel::App {
                corpid: settings.wecom.corpid.clone(),
                corpsecret: settings.wecom.corpsecret.clone(),
                agentid: settings.wecom.agentid,
                touser: settings.wecom.touser.clone(),
            },
        }
    }

    /// The app push API only takes plain text.
    pub fn format(&self) -> OutputFormat {
        match self {
            Channel::Robot { format, .. } => *format,
            Channel::App { .. } => OutputFormat::Text,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Channel::Robot { .. } => "robot",
            Channel::App { .. } => "app",
        }
    }
}

#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, content: &str) -> Result<(), NotifyError>;
}

/// Sends through the selected channel.
pub struct ChannelDelivery {
    channel: Channel,
    app: AppClient,
    robot: RobotClient,
}

impl ChannelDelivery {
    pub fn new(channel: Channel) -> Result<Self, NotifyError> {
        Ok(Self::with_clients(channel, AppClient::new()?, RobotClient::new()?))
    }

    pub fn with_clients(channel: Channel, app: AppClient, robot: RobotClient) -> Self {
        Self {
            channel,
            app,
            robot,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}

#[async_trait]
impl Delivery for ChannelDelivery {
    async fn deliver(&self, content: &str) -> Result<(), NotifyError> {
        match &self.channel {
            Channel::Robot {
                webhook,
                format: OutputFormat::Markdown,
                ..
            } => {
                // Markdown messages cannot mention members.
                self.robot.send_markdown(webhook, content).await?;
                info!("robot markdown message sent");
            }
            Channel::Robot {
                webhook,
                mentioned,
                format: OutputFormat::Text,
            } => {
                self.robot.send_text(webhook, content, mentioned).await?;
                info!("robot text message sent");
            }
            Channel::App {
                corpid,
                corpsecret,
                agentid,
                touser,
            } => {
                let token = self.app.get_access_token(corpid, corpsecret).await?;
                self.app.send_text(&token, *agentid, touser, content).await?;
                info!(touser = %touser, "app message sent");
            }
        }
        Ok(())
    }
}

/// Prints the message instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRun;

#[async_trait]
impl Delivery for DryRun {
    async fn deliver(&self, content: &str) -> Result<(), NotifyError> {
        info!("dry run, message not sent");
        println!("dry run: message that would be sent:\n{content}");
        Ok(())
    }
}
