//! Conversational command session
//!
//! Owns the transcript and the small amount of state that decides what a line
//! of user input means: a dataset switch, an answer to an outstanding yes/no
//! prompt, or a transformation command for the service.
//!
//! Submitting is split in two so a front-end can keep rendering while a
//! request is in flight: [`SessionController::submit`] routes the input and
//! says what the caller has to do, and [`SessionController::resolve`] folds
//! the single backend outcome back in. [`SessionController::submit_and_wait`]
//! runs both back to back for callers that don't need to render in between.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::{TransformBackend, TransformRequest, TransformResponse};
use crate::config::DEFAULT_TIMEOUT_SECS;
use crate::error::ClientError;
use crate::message::{Message, Transcript};

pub const WELCOME_TEXT: &str = "\
Welcome to Intelligent Service! Upload your dataset and perform transformations effortlessly.

Supported Commands:
● remove column <column_name>
  Example: remove column Age
● rename column <old_name> to <new_name>
  Example: rename column Age to Years
● filter rows where <condition>
  Example: filter rows where Age > 25
● columns
  Example: columns (to list all column names)
● size
  Example: size (to get the dataset dimensions)
● change dataset
  Example: change dataset (to upload a different dataset)";

/// Reserved input that leaves the chat for the upload flow
pub const DATASET_SWITCH_KEYWORD: &str = "change dataset";

/// Pause between the redirect notice and the actual navigation
pub const NAVIGATION_DELAY: Duration = Duration::from_secs(1);

pub const INVALID_COMMAND: &str = "Please enter a valid command.";
pub const REDIRECT_NOTICE: &str = "Redirecting to dataset upload...";
pub const TRANSFORM_FAILED: &str = "Failed to apply transformation";
pub const TRANSFORM_TIMED_OUT: &str = "Transformation request timed out";
pub const DOWNLOAD_TEXT: &str = "Download your transformed dataset here:";
pub const USING_UPDATED_DATASET: &str = "Now using the updated dataset for transformations.";
pub const USING_ORIGINAL_DATASET: &str = "Now using the original dataset for transformations.";
pub const ANSWER_YES_OR_NO: &str = "Please respond with 'yes' or 'no'.";

/// Ask the surrounding application to open the dataset upload flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationRequest {
    pub replace_dataset: bool,
    pub delay: Duration,
}

/// What the caller must do after [`SessionController::submit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A request is already in flight; nothing changed
    Rejected,
    /// Fully handled locally
    Handled,
    /// Navigate once the delay has passed
    Navigate(NavigationRequest),
    /// Send this to the backend, then call [`SessionController::resolve`]
    Dispatch(TransformRequest),
}

#[derive(Debug, Clone)]
pub struct SessionController {
    transcript: Transcript,
    pending_input: String,
    awaiting_confirmation: bool,
    use_updated_dataset: bool,
    busy: bool,
    timeout: Duration,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController {
    /// Start a session with the help text as its only message
    pub fn new() -> Self {
        let mut transcript = Transcript::default();
        transcript.push(Message::system(WELCOME_TEXT));

        Self {
            transcript,
            pending_input: String::new(),
            awaiting_confirmation: false,
            use_updated_dataset: false,
            busy: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    /// Editable input buffer; `None` while a request is in flight
    pub fn pending_input_mut(&mut self) -> Option<&mut String> {
        if self.busy {
            None
        } else {
            Some(&mut self.pending_input)
        }
    }

    pub fn set_pending_input(&mut self, text: impl Into<String>) {
        if let Some(input) = self.pending_input_mut() {
            *input = text.into();
        }
    }

    pub fn awaiting_confirmation(&self) -> bool {
        self.awaiting_confirmation
    }

    pub fn use_updated_dataset(&self) -> bool {
        self.use_updated_dataset
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Submit whatever is in the input buffer
    pub fn submit_pending(&mut self) -> Submission {
        let text = self.pending_input.clone();
        self.submit(&text)
    }

    /// Route one line of user input
    pub fn submit(&mut self, text: &str) -> Submission {
        if self.busy {
            warn!("submission ignored while a transformation is in flight");
            return Submission::Rejected;
        }

        let command = text.trim();
        if command.is_empty() {
            self.transcript.push(Message::ai(INVALID_COMMAND));
            return Submission::Handled;
        }

        if command.to_lowercase() == DATASET_SWITCH_KEYWORD {
            info!("dataset switch requested");
            self.transcript.push(Message::user(command));
            self.transcript.push(Message::system(REDIRECT_NOTICE));
            self.pending_input.clear();
            return Submission::Navigate(NavigationRequest {
                replace_dataset: true,
                delay: NAVIGATION_DELAY,
            });
        }

        if self.awaiting_confirmation {
            self.reply_to_confirmation(&command.to_lowercase());
            self.pending_input.clear();
            return Submission::Handled;
        }

        self.busy = true;
        debug!(command, use_updated = self.use_updated_dataset, "dispatching transformation");
        Submission::Dispatch(TransformRequest {
            command: command.to_string(),
            use_updated_dataset: self.use_updated_dataset,
        })
    }

    fn reply_to_confirmation(&mut self, answer: &str) {
        match answer {
            "yes" => {
                self.use_updated_dataset = true;
                self.transcript.push(Message::user(answer));
                self.transcript.push(Message::system(USING_UPDATED_DATASET));
                self.awaiting_confirmation = false;
            }
            "no" => {
                self.use_updated_dataset = false;
                self.transcript.push(Message::user(answer));
                self.transcript.push(Message::system(USING_ORIGINAL_DATASET));
                self.awaiting_confirmation = false;
            }
            _ => {
                // prompt stays outstanding until a real answer arrives
                self.transcript.push(Message::user(answer));
                self.transcript.push(Message::ai(ANSWER_YES_OR_NO));
            }
        }
        debug!(answer, use_updated = self.use_updated_dataset, "confirmation reply");
    }

    /// Fold the outcome of a dispatched request into the transcript.
    ///
    /// The user's line is echoed here rather than at submit time, so it always
    /// lands directly before its response. Calling this with nothing in flight
    /// is a no-op.
    pub fn resolve(&mut self, request: &TransformRequest, outcome: Result<TransformResponse, ClientError>) {
        if !self.busy {
            warn!(command = %request.command, "outcome arrived with no request in flight, ignoring");
            return;
        }

        self.transcript.push(Message::user(request.command.as_str()));

        match outcome {
            Ok(response) => {
                self.transcript.push(Message::ai(response.message));

                if let Some(url) = response.download_url.filter(|u| !u.is_empty()) {
                    self.transcript.push(Message::download(DOWNLOAD_TEXT, url));
                }

                if let Some(prompt) = response.prompt.filter(|p| !p.is_empty()) {
                    self.transcript.push(Message::system(prompt));
                    self.awaiting_confirmation = true;
                }
            }
            Err(err) => {
                warn!(command = %request.command, error = %err, "transformation failed");
                let text = if err.is_timeout() {
                    TRANSFORM_TIMED_OUT.to_string()
                } else {
                    err.describe_or(TRANSFORM_FAILED)
                };
                self.transcript.push(Message::ai(text));
            }
        }

        self.busy = false;
        self.pending_input.clear();
    }

    /// Route, send, and resolve as one sequential pipeline
    pub async fn submit_and_wait<B>(&mut self, text: &str, backend: &B) -> Submission
    where
        B: TransformBackend + ?Sized,
    {
        let submission = self.submit(text);
        if let Submission::Dispatch(request) = &submission {
            let outcome = send_with_timeout(backend, request, self.timeout).await;
            self.resolve(request, outcome);
        }
        submission
    }
}

/// Send one request, turning an overrun of `limit` into [`ClientError::Timeout`]
pub async fn send_with_timeout<B>(
    backend: &B,
    request: &TransformRequest,
    limit: Duration,
) -> Result<TransformResponse, ClientError>
where
    B: TransformBackend + ?Sized,
{
    match tokio::time::timeout(limit, backend.transform(request)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(ClientError::Timeout),
    }
}
