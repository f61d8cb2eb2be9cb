//! WeCom group robot: one POST per message to the webhook URL.
use reqwest::Client;
use serde_json::{json, Value};
use tracing::instrument;

use super::{http_client, ApiReply, NotifyError};

#[derive(Debug, Clone)]
pub struct RobotClient {
    http: Client,
}

impl RobotClient {
    pub fn new() -> Result<Self, NotifyError> {
        Ok(Self {
            http: http_client()?,
        })
    }

    async fn post(&self, webhook: &str, body: &Value) -> Result<(), NotifyError> {
        let reply: ApiReply = self
            .http
            .post(webhook)
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        reply.into_delivery()
    }

    #[instrument(skip_all, fields(mentions = mentioned.len()))]
    pub async fn send_text(
        &self,
        webhook: &str,
        content: &str,
        mentioned: &[String],
    ) -> Result<(), NotifyError> {
        self.post(webhook, &build_text_message(content, mentioned))
            .await
    }

    #[instrument(skip_all)]
    pub async fn send_markdown(&self, webhook: &str, content: &str) -> Result<(), NotifyError> {
        self.post(webhook, &build_markdown_message(content)).await
    }
}

pub fn build_text_message(content: &str, mentioned: &[String]) -> Value {
    let mut text = json!({ "content": content });
    if !mentioned.is_empty() {
        text["mentioned_list"] = json!(mentioned);
    }
    json!({ "msgtype": "text", "text": text })
}

pub fn build_markdown_message(content: &str) -> Value {
    json!({ "msgtype": "markdown", "markdown": { "content": content } })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn text_message_includes_mentions_only_when_present() {
        let body = build_text_message("hi", &[]);
        assert_eq!(body["msgtype"], "text");
        assert!(body["text"].get("mentioned_list").is_none());

        let body = build_text_message("hi", &["@all".to_string()]);
        assert_eq!(body["text"]["mentioned_list"][0], "@all");
    }

    #[test]
    fn markdown_message_shape() {
        let body = build_markdown_message("## t");
        assert_eq!(body["msgtype"], "markdown");
        assert_eq!(body["markdown"]["content"], "## t");
    }

    #[tokio::test]
    async fn text_sends_mentions() {
        let server = MockServer::start_async().await;
        let hook = server
            .mock_async(|when, then| {
                when.method(POST).path("/hook").json_body(json!({
                    "msgtype": "text",
                    "text": {"content": "hi", "mentioned_list": ["zhangsan"]}
                }));
                then.status(200).json_body(json!({"errcode": 0, "errmsg": "ok"}));
            })
            .await;
        let robot = RobotClient::new().unwrap();
        robot
            .send_text(&server.url("/hook"), "hi", &["zhangsan".to_string()])
            .await
            .unwrap();
        hook.assert_async().await;
    }

    #[tokio::test]
    async fn error_code_is_delivery_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/hook");
                then.status(200)
                    .json_body(json!({"errcode": 93000, "errmsg": "invalid webhook url"}));
            })
            .await;
        let robot = RobotClient::new().unwrap();
        let err = robot
            .send_markdown(&server.url("/hook"), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Delivery { errcode: 93000, .. }));
    }
}
