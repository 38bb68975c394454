pub mod client;
pub mod config;
pub mod credentials;
pub mod dataset;
pub mod error;
pub mod message;
pub mod session;

// Re-export main types for convenience
pub use client::{ServiceClient, TransformBackend, TransformRequest, TransformResponse};
pub use config::Config;
pub use credentials::{AuthSession, CredentialStore};
pub use dataset::{FileType, UploadMode};
pub use error::ClientError;
pub use message::{Message, Sender, Transcript};
pub use session::{NavigationRequest, SessionController, Submission};
