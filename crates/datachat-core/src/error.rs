use thiserror::Error;

/// Errors returned by the service client
#[derive(Debug, Error)]
pub enum ClientError {
    /// The service answered with a non-success status
    #[error("server returned {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Server { status: u16, message: Option<String> },

    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The task carrying the request died before producing an outcome
    #[error("request task failed: {0}")]
    TaskFailed(String),
}

impl ClientError {
    /// Message supplied by the server in the error body, if any
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ClientError::Server { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout)
    }

    /// Server message, or `fallback` when the failure carried none
    pub fn describe_or(&self, fallback: &str) -> String {
        self.server_message()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Http(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_present() {
        let err = ClientError::Server {
            status: 400,
            message: Some("Column 'Age' does not exist in the dataset.".to_string()),
        };
        assert_eq!(
            err.describe_or("Failed to apply transformation"),
            "Column 'Age' does not exist in the dataset."
        );
    }

    #[test]
    fn test_server_message_missing_falls_back() {
        let err = ClientError::Server { status: 500, message: None };
        assert_eq!(err.describe_or("Upload failed."), "Upload failed.");
    }

    #[test]
    fn test_blank_server_message_falls_back() {
        let err = ClientError::Server { status: 500, message: Some("  ".to_string()) };
        assert_eq!(err.describe_or("Login failed"), "Login failed");
    }

    #[test]
    fn test_non_server_errors_have_no_message() {
        assert!(ClientError::Timeout.server_message().is_none());
        assert!(ClientError::TaskFailed("panicked".into()).server_message().is_none());
        assert!(ClientError::Timeout.is_timeout());
    }
}
