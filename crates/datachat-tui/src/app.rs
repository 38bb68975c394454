use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use datachat_core::session::send_with_timeout;
use datachat_core::{
    AuthSession, ClientError, Config, CredentialStore, FileType, NavigationRequest, ServiceClient, SessionController,
    Submission, TransformRequest, TransformResponse, UploadMode,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Login,
    Dataset,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Name,
    Email,
    Password,
}

#[derive(Debug, Default)]
pub struct LoginForm {
    /// Creating an account rather than logging in
    pub signup: bool,
    pub name: String,
    pub email: String,
    pub password: String,
    pub focus: Option<LoginField>,
}

impl LoginForm {
    pub fn fields(&self) -> Vec<LoginField> {
        if self.signup {
            vec![LoginField::Name, LoginField::Email, LoginField::Password]
        } else {
            vec![LoginField::Email, LoginField::Password]
        }
    }

    pub fn focused(&self) -> LoginField {
        self.focus
            .filter(|f| self.fields().contains(f))
            .unwrap_or(LoginField::Email)
    }

    pub fn focus_next(&mut self) {
        let fields = self.fields();
        let i = fields.iter().position(|f| *f == self.focused()).unwrap_or(0);
        self.focus = Some(fields[(i + 1) % fields.len()]);
    }

    pub fn focus_prev(&mut self) {
        let fields = self.fields();
        let i = fields.iter().position(|f| *f == self.focused()).unwrap_or(0);
        self.focus = Some(fields[(i + fields.len() - 1) % fields.len()]);
    }

    pub fn focused_value_mut(&mut self) -> &mut String {
        match self.focused() {
            LoginField::Name => &mut self.name,
            LoginField::Email => &mut self.email,
            LoginField::Password => &mut self.password,
        }
    }

    pub fn toggle_signup(&mut self) {
        self.signup = !self.signup;
        self.password.clear();
        self.focus = Some(if self.signup { LoginField::Name } else { LoginField::Email });
    }
}

#[derive(Debug, Default)]
pub struct DatasetForm {
    /// `None` until the service has answered
    pub dataset_exists: Option<bool>,
    /// Opened to replace an existing dataset
    pub replace: bool,
    pub path: String,
    pub file_type: FileType,
}

impl DatasetForm {
    /// Existing dataset and no replace requested: offer continue/replace instead of the upload form
    pub fn shows_choice(&self) -> bool {
        self.dataset_exists == Some(true) && !self.replace
    }

    pub fn upload_mode(&self) -> UploadMode {
        if self.replace {
            UploadMode::Replace
        } else {
            UploadMode::First
        }
    }

    pub fn set_path(&mut self, path: String) {
        if let Some(file_type) = FileType::from_path(std::path::Path::new(path.trim())) {
            self.file_type = file_type;
        }
        self.path = path;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusLine {
    pub kind: StatusKind,
    pub text: String,
}

/// A transformation request running in the background
pub struct InFlight {
    pub request: TransformRequest,
    pub task: JoinHandle<Result<TransformResponse, ClientError>>,
}

/// Account or dataset call running in the background
pub enum Job {
    Signup(JoinHandle<Result<String, ClientError>>),
    Login {
        email: String,
        task: JoinHandle<Result<AuthSession, ClientError>>,
    },
    DatasetStatus(JoinHandle<Result<bool, ClientError>>),
    Upload {
        path: PathBuf,
        mode: UploadMode,
        task: JoinHandle<Result<String, ClientError>>,
    },
}

impl Job {
    pub fn is_finished(&self) -> bool {
        match self {
            Job::Signup(task) => task.is_finished(),
            Job::Login { task, .. } => task.is_finished(),
            Job::DatasetStatus(task) => task.is_finished(),
            Job::Upload { task, .. } => task.is_finished(),
        }
    }

    fn abort(&self) {
        match self {
            Job::Signup(task) => task.abort(),
            Job::Login { task, .. } => task.abort(),
            Job::DatasetStatus(task) => task.abort(),
            Job::Upload { task, .. } => task.abort(),
        }
    }
}

/// Await a finished task, folding a panicked or cancelled task into a client error
async fn join<T>(task: JoinHandle<Result<T, ClientError>>) -> Result<T, ClientError> {
    task.await
        .unwrap_or_else(|e| Err(ClientError::TaskFailed(e.to_string())))
}

pub struct App {
    pub should_quit: bool,
    pub screen: Screen,

    pub config: Config,
    pub credentials: CredentialStore,
    pub client: ServiceClient,

    pub login: LoginForm,
    pub dataset: DatasetForm,
    pub job: Option<Job>,

    // Chat state; the controller lives exactly as long as the chat screen
    pub chat: Option<SessionController>,
    pub input_cursor: usize,
    pub in_flight: Option<InFlight>,
    pub pending_navigation: Option<(Instant, NavigationRequest)>,
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,

    pub status: Option<StatusLine>,
    pub animation_frame: u8,
}

impl App {
    pub fn new(config: Config, credentials: CredentialStore) -> anyhow::Result<Self> {
        let mut client = ServiceClient::new(&config)?;

        let stored = credentials.load().unwrap_or_else(|e| {
            warn!(error = %e, "ignoring unreadable stored credential");
            None
        });
        let screen = match stored {
            Some(session) => {
                info!(email = %session.email, "resuming stored session");
                client = client.with_session(session);
                Screen::Dataset
            }
            None => Screen::Login,
        };

        let login = LoginForm {
            email: config.last_email.clone().unwrap_or_default(),
            ..Default::default()
        };

        Ok(Self {
            should_quit: false,
            screen,
            config,
            credentials,
            client,
            login,
            dataset: DatasetForm::default(),
            job: None,
            chat: None,
            input_cursor: 0,
            in_flight: None,
            pending_navigation: None,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            status: None,
            animation_frame: 0,
        })
    }

    pub fn set_status(&mut self, kind: StatusKind, text: impl Into<String>) {
        self.status = Some(StatusLine { kind, text: text.into() });
    }

    pub fn is_busy(&self) -> bool {
        self.chat.as_ref().is_some_and(|c| c.is_busy())
    }

    /// An account or dataset call is running
    pub fn is_working(&self) -> bool {
        self.job.is_some()
    }

    /// The chat has asked to leave and is waiting out the delay
    pub fn is_redirecting(&self) -> bool {
        self.pending_navigation.is_some()
    }

    pub fn logged_in_as(&self) -> Option<&str> {
        self.client.session().map(|s| s.email.as_str())
    }

    /// Apply the result of the background job once it has finished
    pub async fn poll_job(&mut self) {
        if !self.job.as_ref().is_some_and(Job::is_finished) {
            return;
        }
        let Some(job) = self.job.take() else {
            return;
        };

        match job {
            Job::Signup(task) => self.finish_signup(join(task).await),
            Job::Login { email, task } => self.finish_login(email, join(task).await),
            Job::DatasetStatus(task) => self.finish_dataset_status(join(task).await),
            Job::Upload { path, mode, task } => self.finish_upload(&path, mode, join(task).await),
        }
    }

    // Authentication

    pub fn submit_login(&mut self) {
        if self.is_working() {
            return;
        }

        let name = self.login.name.trim().to_string();
        let email = self.login.email.trim().to_string();
        let password = self.login.password.clone();
        if self.login.signup && name.is_empty() {
            self.set_status(StatusKind::Warning, "Please enter your name.");
            return;
        }
        if email.is_empty() || password.is_empty() {
            self.set_status(StatusKind::Warning, "Please enter your email and password.");
            return;
        }

        let client = self.client.clone();
        if self.login.signup {
            self.set_status(StatusKind::Info, "Creating account...");
            let task = tokio::spawn(async move { client.signup(&name, &email, &password).await });
            self.job = Some(Job::Signup(task));
        } else {
            self.set_status(StatusKind::Info, "Logging in...");
            let task = {
                let email = email.clone();
                tokio::spawn(async move { client.login(&email, &password).await })
            };
            self.job = Some(Job::Login { email, task });
        }
    }

    fn finish_signup(&mut self, outcome: Result<String, ClientError>) {
        match outcome {
            Ok(message) => {
                info!("account created");
                self.set_status(StatusKind::Success, message);
                self.login.toggle_signup();
            }
            Err(e) => {
                warn!(error = %e, "signup failed");
                self.set_status(StatusKind::Error, e.describe_or("Signup failed"));
            }
        }
    }

    fn finish_login(&mut self, email: String, outcome: Result<AuthSession, ClientError>) {
        match outcome {
            Ok(session) => {
                info!(%email, "logged in");
                if let Err(e) = self.credentials.save(&session) {
                    warn!(error = %e, "could not persist credential");
                }
                if let Err(e) = Config::save_last_email(&email) {
                    warn!(error = %e, "could not remember email");
                }
                self.client = self.client.clone().with_session(session);
                self.login.password.clear();
                self.set_status(StatusKind::Success, "Login successful!");
                self.enter_dataset_screen(false);
            }
            Err(e) => {
                warn!(%email, error = %e, "login failed");
                self.set_status(StatusKind::Error, e.describe_or("Login failed"));
            }
        }
    }

    /// Drop the session context and its stored credential
    pub fn logout(&mut self) {
        if self.is_busy() {
            self.set_status(StatusKind::Warning, "Wait for the current transformation to finish.");
            return;
        }

        if let Some(job) = self.job.take() {
            job.abort();
        }
        if let Err(e) = self.credentials.clear() {
            warn!(error = %e, "could not remove stored credential");
        }
        info!("logged out");
        self.client.clear_session();
        self.close_chat();
        self.dataset = DatasetForm::default();
        self.screen = Screen::Login;
        self.set_status(StatusKind::Info, "You have been logged out!");
    }

    // Dataset screen

    pub fn enter_dataset_screen(&mut self, replace: bool) {
        self.screen = Screen::Dataset;
        self.dataset.replace = replace;
        self.dataset.dataset_exists = None;
        self.refresh_dataset_status();
    }

    pub fn refresh_dataset_status(&mut self) {
        if self.is_working() {
            return;
        }
        let client = self.client.clone();
        self.job = Some(Job::DatasetStatus(tokio::spawn(async move { client.dataset_status().await })));
    }

    fn finish_dataset_status(&mut self, outcome: Result<bool, ClientError>) {
        match outcome {
            Ok(exists) => self.dataset.dataset_exists = Some(exists),
            Err(e) => {
                warn!(error = %e, "dataset status check failed");
                self.dataset.dataset_exists = Some(false);
                self.set_status(StatusKind::Error, "Failed to check dataset status.");
            }
        }
    }

    pub fn upload_dataset(&mut self) {
        if self.is_working() {
            return;
        }
        let path = self.dataset.path.trim();
        if path.is_empty() {
            self.set_status(StatusKind::Warning, "Please select a dataset to upload.");
            return;
        }
        let path = PathBuf::from(expand_home(path));

        let mode = self.dataset.upload_mode();
        let file_type = self.dataset.file_type;
        let client = self.client.clone();
        let task = {
            let path = path.clone();
            tokio::spawn(async move { client.upload(&path, file_type, mode).await })
        };
        self.set_status(StatusKind::Info, "Uploading...");
        self.job = Some(Job::Upload { path, mode, task });
    }

    fn finish_upload(&mut self, path: &Path, mode: UploadMode, outcome: Result<String, ClientError>) {
        match outcome {
            Ok(message) => {
                info!(path = %path.display(), ?mode, "dataset uploaded");
                self.set_status(StatusKind::Success, message);
                self.dataset.dataset_exists = Some(true);
                self.dataset.replace = false;
                self.open_chat();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "upload failed");
                let text = match &e {
                    ClientError::Io(io) => format!("Could not read {}: {}", path.display(), io),
                    _ => e.describe_or("Upload failed."),
                };
                self.set_status(StatusKind::Error, text);
            }
        }
    }

    // Chat screen

    pub fn open_chat(&mut self) {
        self.chat = Some(SessionController::new().with_timeout(self.config.request_timeout()));
        self.input_cursor = 0;
        self.chat_scroll = 0;
        self.pending_navigation = None;
        self.screen = Screen::Chat;
    }

    pub fn close_chat(&mut self) {
        self.chat = None;
        self.in_flight = None;
        self.pending_navigation = None;
        self.input_cursor = 0;
    }

    pub fn submit_chat(&mut self) {
        // The chat is on its way out; anything sent now would never be resolved
        if self.is_redirecting() {
            return;
        }
        let Some(chat) = self.chat.as_mut() else {
            return;
        };

        match chat.submit_pending() {
            Submission::Rejected | Submission::Handled => {}
            Submission::Navigate(navigation) => {
                self.pending_navigation = Some((Instant::now() + navigation.delay, navigation));
            }
            Submission::Dispatch(request) => {
                let client = self.client.clone();
                let limit = chat.timeout();
                let sent = request.clone();
                let task = tokio::spawn(async move { send_with_timeout(&client, &sent, limit).await });
                self.in_flight = Some(InFlight { request, task });
            }
        }

        self.input_cursor = self.input_cursor.min(self.pending_chars());
        self.scroll_chat_to_bottom();
    }

    /// Resolve the in-flight request once its task has finished
    pub async fn poll_in_flight(&mut self) {
        let finished = self.in_flight.as_ref().is_some_and(|f| f.task.is_finished());
        if !finished {
            return;
        }
        let Some(InFlight { request, task }) = self.in_flight.take() else {
            return;
        };

        let outcome = join(task).await;
        if let Some(chat) = self.chat.as_mut() {
            chat.resolve(&request, outcome);
        }
        self.input_cursor = 0;
        self.scroll_chat_to_bottom();
    }

    /// Navigation request whose delay has elapsed, if any
    pub fn take_due_navigation(&mut self, now: Instant) -> Option<NavigationRequest> {
        match self.pending_navigation {
            Some((deadline, navigation)) if now >= deadline => {
                self.pending_navigation = None;
                Some(navigation)
            }
            _ => None,
        }
    }

    pub fn poll_navigation(&mut self, now: Instant) {
        if let Some(navigation) = self.take_due_navigation(now) {
            self.close_chat();
            self.enter_dataset_screen(navigation.replace_dataset);
        }
    }

    fn pending_chars(&self) -> usize {
        self.chat
            .as_ref()
            .map(|c| c.pending_input().chars().count())
            .unwrap_or(0)
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Chat scrolling

    pub fn scroll_chat_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_chat_down(&mut self, lines: u16) {
        let max_scroll = self.chat_line_count().saturating_sub(self.visible_chat_height());
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max_scroll);
    }

    /// Scroll chat to bottom so the newest entries (and the spinner) are visible
    pub fn scroll_chat_to_bottom(&mut self) {
        let total_lines = self.chat_line_count();
        let visible_height = self.visible_chat_height();

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    fn visible_chat_height(&self) -> u16 {
        if self.chat_height > 0 { self.chat_height } else { 20 }
    }

    /// Rendered line count of the transcript at the current chat width
    pub fn chat_line_count(&self) -> u16 {
        let Some(chat) = &self.chat else {
            return 0;
        };

        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 50 };
        let mut total_lines: u16 = 0;

        for msg in chat.transcript() {
            let mut lines = 2; // sender line and trailing blank
            for line in msg.text.lines() {
                // character count, not byte length
                lines += line.chars().count() / wrap_width + 1;
            }
            if msg.download_url.is_some() {
                lines += 1;
            }
            total_lines = total_lines.saturating_add(lines.min(u16::MAX as usize) as u16);
        }

        if chat.is_busy() {
            total_lines = total_lines.saturating_add(2);
        }

        total_lines
    }
}

/// Expand a leading `~/` against the home directory
fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest).to_string_lossy().into_owned(),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_app(dir: &std::path::Path) -> App {
        App::new(Config::new(), CredentialStore::new(dir)).unwrap()
    }

    #[test]
    fn test_starts_on_login_without_credential() {
        let dir = tempdir().unwrap();
        let app = test_app(dir.path());
        assert_eq!(app.screen, Screen::Login);
        assert!(app.logged_in_as().is_none());
    }

    #[test]
    fn test_resumes_stored_credential() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        store.save(&datachat_core::AuthSession::new("tok", "ana@example.com")).unwrap();

        let app = App::new(Config::new(), store).unwrap();
        assert_eq!(app.screen, Screen::Dataset);
        assert_eq!(app.logged_in_as(), Some("ana@example.com"));
    }

    #[test]
    fn test_logout_clears_credential() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        store.save(&datachat_core::AuthSession::new("tok", "ana@example.com")).unwrap();
        let mut app = App::new(Config::new(), store.clone()).unwrap();
        app.open_chat();

        app.logout();

        assert_eq!(app.screen, Screen::Login);
        assert!(app.chat.is_none());
        assert!(app.logged_in_as().is_none());
        assert!(store.load().unwrap().is_none());
    }

    /// Wait for the background job without driving the whole event loop
    async fn settle_job(app: &mut App) {
        while !app.job.as_ref().is_some_and(Job::is_finished) {
            tokio::task::yield_now().await;
        }
        app.poll_job().await;
    }

    #[tokio::test]
    async fn test_change_dataset_waits_for_delay() {
        let dir = tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.open_chat();
        app.chat.as_mut().unwrap().set_pending_input("Change Dataset");

        app.submit_chat();

        assert!(!app.is_busy());
        assert!(app.in_flight.is_none());
        let (deadline, _) = app.pending_navigation.unwrap();

        assert_eq!(app.take_due_navigation(deadline - Duration::from_millis(500)), None);
        assert_eq!(app.screen, Screen::Chat);

        let navigation = app.take_due_navigation(deadline).unwrap();
        assert!(navigation.replace_dataset);
        assert!(app.pending_navigation.is_none());
    }

    #[tokio::test]
    async fn test_commands_during_redirect_are_not_sent() {
        let dir = tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.open_chat();
        app.chat.as_mut().unwrap().set_pending_input("change dataset");
        app.submit_chat();
        let (deadline, _) = app.pending_navigation.unwrap();
        assert!(app.is_redirecting());

        app.chat.as_mut().unwrap().set_pending_input("remove column Age");
        app.submit_chat();

        assert!(app.in_flight.is_none());
        assert!(!app.is_busy());
        // welcome, echo, redirect notice
        assert_eq!(app.chat.as_ref().unwrap().transcript().len(), 3);

        app.poll_navigation(deadline - Duration::from_millis(1));
        assert_eq!(app.screen, Screen::Chat);

        app.poll_navigation(deadline);
        assert_eq!(app.screen, Screen::Dataset);
        assert!(app.dataset.replace);
        assert!(app.chat.is_none());
        assert!(matches!(app.job, Some(Job::DatasetStatus(_))));
    }

    #[test]
    fn test_signup_requires_name() {
        let dir = tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.login.toggle_signup();
        app.login.email = "ana@example.com".to_string();
        app.login.password = "hunter2".to_string();

        app.submit_login();

        assert!(app.job.is_none());
        let status = app.status.unwrap();
        assert_eq!(status.kind, StatusKind::Warning);
        assert_eq!(status.text, "Please enter your name.");
    }

    #[tokio::test]
    async fn test_login_runs_in_background() {
        let dir = tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.login.email = "ana@example.com".to_string();
        app.login.password = "hunter2".to_string();

        app.submit_login();

        assert!(matches!(app.job, Some(Job::Login { ref email, .. }) if email == "ana@example.com"));
        assert!(app.is_working());
        assert_eq!(app.screen, Screen::Login);

        // a second Enter while waiting changes nothing
        app.login.email = "other@example.com".to_string();
        app.submit_login();
        assert!(matches!(app.job, Some(Job::Login { ref email, .. }) if email == "ana@example.com"));

        app.logout();
        assert!(app.job.is_none());
    }

    #[tokio::test]
    async fn test_finished_upload_opens_chat() {
        let dir = tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.enter_dataset_screen(true);
        if let Some(job) = app.job.take() {
            job.abort();
        }

        app.job = Some(Job::Upload {
            path: PathBuf::from("people.csv"),
            mode: UploadMode::Replace,
            task: tokio::spawn(async { Ok::<_, ClientError>("Dataset replaced successfully!".to_string()) }),
        });
        settle_job(&mut app).await;

        assert!(app.job.is_none());
        assert_eq!(app.screen, Screen::Chat);
        assert_eq!(app.dataset.dataset_exists, Some(true));
        assert!(!app.dataset.replace);
        assert_eq!(app.status.unwrap().text, "Dataset replaced successfully!");
    }

    #[tokio::test]
    async fn test_failed_status_check_shows_upload_form() {
        let dir = tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.screen = Screen::Dataset;

        app.job = Some(Job::DatasetStatus(tokio::spawn(async {
            Err::<bool, _>(ClientError::Server { status: 500, message: None })
        })));
        settle_job(&mut app).await;

        assert_eq!(app.dataset.dataset_exists, Some(false));
        assert!(!app.dataset.shows_choice());
        let status = app.status.unwrap();
        assert_eq!(status.kind, StatusKind::Error);
        assert_eq!(status.text, "Failed to check dataset status.");
    }

    #[tokio::test]
    async fn test_blank_chat_submission_stays_local() {
        let dir = tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.open_chat();

        app.submit_chat();

        assert!(app.in_flight.is_none());
        let chat = app.chat.as_ref().unwrap();
        assert_eq!(chat.transcript().len(), 2);
        assert!(!chat.is_busy());
    }

    #[test]
    fn test_login_focus_cycles() {
        let mut form = LoginForm::default();
        assert_eq!(form.focused(), LoginField::Email);
        form.focus_next();
        assert_eq!(form.focused(), LoginField::Password);
        form.focus_next();
        assert_eq!(form.focused(), LoginField::Email);

        form.toggle_signup();
        assert_eq!(form.focused(), LoginField::Name);
        form.focus_prev();
        assert_eq!(form.focused(), LoginField::Password);
    }

    #[test]
    fn test_dataset_form_modes() {
        let mut form = DatasetForm::default();
        assert!(!form.shows_choice());
        form.dataset_exists = Some(true);
        assert!(form.shows_choice());
        assert_eq!(form.upload_mode(), UploadMode::First);

        form.replace = true;
        assert!(!form.shows_choice());
        assert_eq!(form.upload_mode(), UploadMode::Replace);

        form.set_path("~/data/people.tsv".to_string());
        assert_eq!(form.file_type, FileType::Tsv);
    }
}
