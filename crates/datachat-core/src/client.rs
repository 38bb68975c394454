use std::path::Path;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::credentials::AuthSession;
use crate::dataset::{FileType, UploadMode};
use crate::error::ClientError;

/// Body of a transformation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformRequest {
    pub command: String,
    #[serde(rename = "useUpdatedDataset")]
    pub use_updated_dataset: bool,
}

/// Successful transformation result
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransformResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub download_url: Option<String>,
    /// Follow-up yes/no question from the service
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Where transformation commands go. The session controller only talks to this.
#[async_trait]
pub trait TransformBackend: Send + Sync {
    async fn transform(&self, request: &TransformRequest) -> Result<TransformResponse, ClientError>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Serialize)]
struct SignupRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize, Default)]
struct MessageBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct DatasetStatusResponse {
    #[serde(rename = "datasetExists", default)]
    dataset_exists: bool,
}

/// Client for the dataset transformation service
#[derive(Clone)]
pub struct ServiceClient {
    client: Client,
    base_url: String,
    session: Option<AuthSession>,
}

impl ServiceClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            session: None,
        })
    }

    pub fn with_session(mut self, session: AuthSession) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> Option<&AuthSession> {
        self.session.as_ref()
    }

    pub fn clear_session(&mut self) {
        self.session = None;
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // Without a session the request goes out bare and the service decides
    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.session {
            Some(session) => builder.header(AUTHORIZATION, session.bearer()),
            None => builder,
        }
    }

    pub async fn signup(&self, name: &str, email: &str, password: &str) -> Result<String, ClientError> {
        let url = self.url("/signup");
        debug!(%url, email, "signing up");

        let response = self
            .client
            .post(&url)
            .json(&SignupRequest { name, email, password })
            .send()
            .await?;

        let body: MessageBody = check_status(response).await?.json().await?;
        Ok(body.message.unwrap_or_else(|| "User registered successfully".to_string()))
    }

    /// Exchange credentials for a bearer token
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, ClientError> {
        let url = self.url("/login");
        debug!(%url, email, "logging in");

        let response = self
            .client
            .post(&url)
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let body: LoginResponse = check_status(response).await?.json().await?;
        Ok(AuthSession::new(body.token, email))
    }

    pub async fn dataset_status(&self) -> Result<bool, ClientError> {
        let url = self.url("/dataset-status");
        let response = self.authorize(self.client.get(&url)).send().await?;

        let body: DatasetStatusResponse = check_status(response).await?.json().await?;
        debug!(dataset_exists = body.dataset_exists, "dataset status");
        Ok(body.dataset_exists)
    }

    pub async fn upload(&self, path: &Path, file_type: FileType, mode: UploadMode) -> Result<String, ClientError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("dataset.{}", file_type.as_str()));

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("file_type", file_type.as_str());

        let url = self.url(mode.endpoint());
        debug!(%url, ?mode, file_type = file_type.as_str(), "uploading dataset");

        let response = self
            .authorize(self.client.post(&url))
            .multipart(form)
            .send()
            .await?;

        let body: MessageBody = check_status(response).await?.json().await.unwrap_or_default();
        Ok(body.message.unwrap_or_else(|| "Dataset uploaded successfully!".to_string()))
    }

    pub async fn transform(&self, request: &TransformRequest) -> Result<TransformResponse, ClientError> {
        let url = self.url("/transform");
        debug!(%url, command = %request.command, use_updated = request.use_updated_dataset, "sending transformation");

        let response = self
            .authorize(self.client.post(&url))
            .json(request)
            .send()
            .await?;

        let body: TransformResponse = check_status(response).await?.json().await?;
        Ok(body)
    }
}

#[async_trait]
impl TransformBackend for ServiceClient {
    async fn transform(&self, request: &TransformRequest) -> Result<TransformResponse, ClientError> {
        ServiceClient::transform(self, request).await
    }
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = error_message_from_body(&text);
    warn!(status = status.as_u16(), message = message.as_deref().unwrap_or(""), "service returned an error");

    Err(ClientError::Server {
        status: status.as_u16(),
        message,
    })
}

/// Pull `message` out of an error body; anything unparseable counts as absent
pub fn error_message_from_body(body: &str) -> Option<String> {
    serde_json::from_str::<MessageBody>(body)
        .ok()
        .and_then(|b| b.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_request_wire_shape() {
        let request = TransformRequest {
            command: "remove column Age".to_string(),
            use_updated_dataset: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"command": "remove column Age", "useUpdatedDataset": true})
        );
    }

    #[test]
    fn test_transform_response_optional_fields() {
        let body = r#"{"message": "Transformation applied successfully", "preview": {"Age": {}}}"#;
        let response: TransformResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.message, "Transformation applied successfully");
        assert!(response.download_url.is_none());
        assert!(response.prompt.is_none());

        let body = r#"{"message": "done", "download_url": "https://files/x.csv", "prompt": "Use the updated dataset?"}"#;
        let response: TransformResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.download_url.as_deref(), Some("https://files/x.csv"));
        assert_eq!(response.prompt.as_deref(), Some("Use the updated dataset?"));
    }

    #[test]
    fn test_error_message_from_body() {
        assert_eq!(
            error_message_from_body(r#"{"message": "Token has expired"}"#).as_deref(),
            Some("Token has expired")
        );
        assert_eq!(error_message_from_body(r#"{"error": "nope"}"#), None);
        assert_eq!(error_message_from_body("<html>502 Bad Gateway</html>"), None);
        assert_eq!(error_message_from_body(""), None);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let mut config = Config::new();
        config.server_url = "http://localhost:5000/".to_string();
        let client = ServiceClient::new(&config).unwrap();
        assert_eq!(client.url("/transform"), "http://localhost:5000/transform");
        assert!(client.session().is_none());
    }

    #[test]
    fn test_session_injection() {
        let client = ServiceClient::new(&Config::new())
            .unwrap()
            .with_session(AuthSession::new("tok", "ana@example.com"));
        assert_eq!(client.session().map(|s| s.email.as_str()), Some("ana@example.com"));

        let mut client = client;
        client.clear_session();
        assert!(client.session().is_none());
    }

    #[test]
    fn test_authorization_header_follows_session() {
        let client = ServiceClient::new(&Config::new())
            .unwrap()
            .with_session(AuthSession::new("tok", "ana@example.com"));
        let request = client.authorize(client.client.get(client.url("/dataset-status"))).build().unwrap();
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer tok");

        let mut client = client;
        client.clear_session();
        let request = client.authorize(client.client.get(client.url("/dataset-status"))).build().unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }
}
