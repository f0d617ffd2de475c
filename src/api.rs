//! Bridge server HTTP collaborator
//!
//! | Call           | Route                         | Auth                            |
//! |----------------|-------------------------------|---------------------------------|
//! | `authenticate` | `POST {endpoint}authenticate` | none                            |
//! | `send_message` | `POST {endpoint}send-message` | `Bearer <token>` + `appId` header |

use crate::error::{ConnectError, ConnectResult};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

pub const CONNECTION_REQUEST: &str = "connection_request";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeAttributes {
    pub url: String,
    pub id: String,
}

/// Out-of-band "connection requested" notice sent before the connect link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionNotice {
    pub app_id: String,
    pub message: String,
    pub attributes: NoticeAttributes,
}

impl ConnectionNotice {
    pub fn connection_request(app_id: impl Into<String>, origin: impl Into<String>) -> Self {
        let app_id = app_id.into();
        Self {
            message: CONNECTION_REQUEST.to_string(),
            attributes: NoticeAttributes { url: origin.into(), id: app_id.clone() },
            app_id,
        }
    }
}

#[async_trait]
pub trait BridgeApi: Send + Sync {
    /// Exchange an app id for an access token.
    async fn authenticate(&self, app_id: &str) -> ConnectResult<String>;

    /// Post a notice; returns the server-assigned message id, if any.
    async fn send_message(&self, access_token: &str, notice: &ConnectionNotice) -> ConnectResult<Option<String>>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticateResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct SendMessageResponse {
    #[serde(rename = "MessageId")]
    message_id: Option<String>,
}

/// reqwest-backed [`BridgeApi`].
#[derive(Clone)]
pub struct HttpApi {
    http: HttpClient,
    endpoint: String,
}

impl HttpApi {
    pub fn new(endpoint: impl Into<String>) -> ConnectResult<Self> {
        let http = HttpClient::builder()
            .build()
            .map_err(|e| ConnectError::Http(format!("client: {e}")))?;
        Ok(Self::with_client(http, endpoint))
    }

    pub fn with_client(http: HttpClient, endpoint: impl Into<String>) -> Self {
        let mut endpoint = endpoint.into();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        Self { http, endpoint }
    }

    pub fn url(&self, route: &str) -> String {
        format!("{}{}", self.endpoint, route.trim_start_matches('/'))
    }

    async fn read<T: serde::de::DeserializeOwned>(response: reqwest::Response, route: &str) -> ConnectResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ConnectError::Http(format!("{route}: {e}")))?;
        if !status.is_success() {
            return Err(ConnectError::Http(format!("{route} returned {status}: {}", body.trim())));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl BridgeApi for HttpApi {
    async fn authenticate(&self, app_id: &str) -> ConnectResult<String> {
        let response = self
            .http
            .post(self.url("authenticate"))
            .json(&serde_json::json!({ "appId": app_id }))
            .send()
            .await
            .map_err(|e| ConnectError::Http(format!("authenticate: {e}")))?;
        let auth: AuthenticateResponse = Self::read(response, "authenticate").await?;
        tracing::debug!(app_id, "authenticated with bridge server");
        Ok(auth.access_token)
    }

    async fn send_message(&self, access_token: &str, notice: &ConnectionNotice) -> ConnectResult<Option<String>> {
        let response = self
            .http
            .post(self.url("send-message"))
            .bearer_auth(access_token)
            .header("appId", &notice.app_id)
            .json(notice)
            .send()
            .await
            .map_err(|e| ConnectError::Http(format!("send-message: {e}")))?;
        let sent: SendMessageResponse = Self::read(response, "send-message").await?;
        Ok(sent.message_id)
    }
}
