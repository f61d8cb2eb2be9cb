//! WeCom application push: exchange corp credentials for an access token,
//! then send a text message to users.
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, instrument};

use super::{http_client, ApiReply, NotifyError};

const WECOM_API_BASE: &str = "https://qyapi.weixin.qq.com/";

#[derive(Clone)]
pub struct AppClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for AppClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl AppClient {
    pub fn new() -> Result<Self, NotifyError> {
        let base_url =
            Url::parse(WECOM_API_BASE).map_err(|e| NotifyError::Endpoint(e.to_string()))?;
        Self::with_base_url(base_url)
    }

    pub fn with_base_url(base_url: Url) -> Result<Self, NotifyError> {
        Ok(Self {
            http: http_client()?,
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, NotifyError> {
        self.base_url
            .join(path)
            .map_err(|e| NotifyError::Endpoint(e.to_string()))
    }

    /// Fails with [`NotifyError::Auth`] on a non-zero `errcode`.
    #[instrument(skip_all)]
    pub async fn get_access_token(
        &self,
        corpid: &str,
        corpsecret: &str,
    ) -> Result<String, NotifyError> {
        let url = self.endpoint("cgi-bin/gettoken")?;
        let reply: ApiReply = self
            .http
            .get(url)
            .query(&[("corpid", corpid), ("corpsecret", corpsecret)])
            .send()
            .await?
            .json()
            .await?;
        match (reply.code(), reply.access_token) {
            (0, Some(token)) => {
                debug!("access token acquired");
                Ok(token)
            }
            (errcode, _) => Err(NotifyError::Auth {
                errcode,
                errmsg: reply.errmsg,
            }),
        }
    }

    /// Fails with [`NotifyError::Delivery`] on a non-zero `errcode`.
    #[instrument(skip_all, fields(agentid = agentid))]
    pub async fn send_text(
        &self,
        access_token: &str,
        agentid: i64,
        touser: &str,
        content: &str,
    ) -> Result<(), NotifyError> {
        let url = self.endpoint("cgi-bin/message/send")?;
        let reply: ApiReply = self
            .http
            .post(url)
            .query(&[("access_token", access_token)])
            .json(&build_text_message(agentid, touser, content))
            .send()
            .await?
            .json()
            .await?;
        reply.into_delivery()
    }
}

pub fn build_text_message(agentid: i64, touser: &str, content: &str) -> Value {
    json!({
        "touser": touser,
        "agentid": agentid,
        "msgtype": "text",
        "text": { "content": content },
        "safe": 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client_for(server: &MockServer) -> AppClient {
        AppClient::with_base_url(Url::parse(&server.url("/")).unwrap()).unwrap()
    }

    #[test]
    fn text_message_shape() {
        let body = build_text_message(1000002, "a|b", "hello");
        assert_eq!(body["touser"], "a|b");
        assert_eq!(body["agentid"], 1000002);
        assert_eq!(body["msgtype"], "text");
        assert_eq!(body["text"]["content"], "hello");
        assert_eq!(body["safe"], 0);
    }

    #[tokio::test]
    async fn token_error_code_is_auth_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/cgi-bin/gettoken");
                then.status(200)
                    .json_body(json!({"errcode": 40013, "errmsg": "invalid corpid"}));
            })
            .await;
        let client = client_for(&server);
        let err = client.get_access_token("bad", "sec").await.unwrap_err();
        match err {
            NotifyError::Auth { errcode, errmsg } => {
                assert_eq!(errcode, 40013);
                assert_eq!(errmsg, "invalid corpid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn token_without_value_is_auth_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/cgi-bin/gettoken");
                then.status(200).json_body(json!({"errcode": 0, "errmsg": "ok"}));
            })
            .await;
        let client = client_for(&server);
        assert!(matches!(
            client.get_access_token("c", "s").await,
            Err(NotifyError::Auth { errcode: 0, .. })
        ));
    }

    #[tokio::test]
    async fn send_error_code_is_delivery_error() {
        let server = MockServer::start_async().await;
        let send = server
            .mock_async(|when, then| {
                when.method(POST).path("/cgi-bin/message/send");
                then.status(200)
                    .json_body(json!({"errcode": 81013, "errmsg": "user list invalid"}));
            })
            .await;
        let client = client_for(&server);
        let err = client.send_text("tok", 1, "nobody", "x").await.unwrap_err();
        assert!(matches!(err, NotifyError::Delivery { errcode: 81013, .. }));
        send.assert_async().await;
    }
}
