use std::time::Duration;

use tracing::warn;

use crate::errors::ClientError;

const DEFAULT_CHAT_URL: &str = "http://127.0.0.1:8080/v2/chat/completions";
const DEFAULT_IMAGE_SUBMIT_URL: &str = "http://127.0.0.1:8080/image/submit";
const DEFAULT_IMAGE_QUERY_URL: &str = "http://127.0.0.1:8080/image/query";

/// Fixed-interval, attempt-bounded polling schedule for image jobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait between two status queries.
    pub interval: Duration,
    /// Maximum number of status queries before giving up.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3_000),
            max_attempts: 60,
        }
    }
}

impl PollPolicy {
    /// Overrides the wait between queries.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Overrides the attempt budget.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Configuration shared by the chat and image clients.
///
/// Passed explicitly to every client; nothing is read from globals after
/// construction.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Application id sent as `X-App-Id` on every request.
    pub app_id: String,
    /// Streaming chat completions endpoint.
    pub chat_url: String,
    /// Image job submission endpoint.
    pub image_submit_url: String,
    /// Image job status endpoint.
    pub image_query_url: String,
    /// Synchronous inline-image endpoint, when the backend offers one.
    pub image_inline_url: Option<String>,
    /// Timeout for the non-streaming image requests.
    pub request_timeout: Duration,
    /// Connect timeout for every request (the chat body itself is unbounded).
    pub connect_timeout: Duration,
    /// Image job polling schedule.
    pub poll: PollPolicy,
}

impl ClientConfig {
    /// Creates a config with local defaults and the given app id.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            chat_url: DEFAULT_CHAT_URL.to_string(),
            image_submit_url: DEFAULT_IMAGE_SUBMIT_URL.to_string(),
            image_query_url: DEFAULT_IMAGE_QUERY_URL.to_string(),
            image_inline_url: None,
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            poll: PollPolicy::default(),
        }
    }

    /// Builds a config from `DISH_MUSE_*` environment variables.
    ///
    /// `DISH_MUSE_APP_ID` is required. Endpoint and polling variables are
    /// optional; blank or unparsable values keep the defaults.
    pub fn from_env() -> Result<Self, ClientError> {
        let app_id = std::env::var("DISH_MUSE_APP_ID").unwrap_or_default();
        if app_id.trim().is_empty() {
            return Err(ClientError::Config("missing DISH_MUSE_APP_ID".into()));
        }
        let mut config = Self::new(app_id.trim());
        if let Some(url) = non_blank_env("DISH_MUSE_CHAT_URL") {
            config.chat_url = url;
        }
        if let Some(url) = non_blank_env("DISH_MUSE_IMAGE_SUBMIT_URL") {
            config.image_submit_url = url;
        }
        if let Some(url) = non_blank_env("DISH_MUSE_IMAGE_QUERY_URL") {
            config.image_query_url = url;
        }
        config.image_inline_url = non_blank_env("DISH_MUSE_IMAGE_INLINE_URL");
        if let Some(ms) = parsed_env::<u64>("DISH_MUSE_POLL_INTERVAL_MS") {
            config.poll.interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = parsed_env::<u32>("DISH_MUSE_POLL_MAX_ATTEMPTS") {
            config.poll.max_attempts = attempts;
        }
        Ok(config)
    }

    /// Overrides the chat endpoint.
    pub fn chat_url(mut self, url: impl Into<String>) -> Self {
        self.chat_url = url.into();
        self
    }

    /// Overrides the image submission endpoint.
    pub fn image_submit_url(mut self, url: impl Into<String>) -> Self {
        self.image_submit_url = url.into();
        self
    }

    /// Overrides the image status endpoint.
    pub fn image_query_url(mut self, url: impl Into<String>) -> Self {
        self.image_query_url = url.into();
        self
    }

    /// Sets the inline-image endpoint.
    pub fn image_inline_url(mut self, url: impl Into<String>) -> Self {
        self.image_inline_url = Some(url.into());
        self
    }

    /// Overrides the timeout for non-streaming requests.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Overrides the polling schedule.
    pub fn poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.app_id.trim().is_empty() {
            return Err(ClientError::Config("app_id must not be empty".into()));
        }
        if self.poll.max_attempts == 0 {
            return Err(ClientError::Config(
                "poll max_attempts must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client, ClientError> {
        self.validate()?;
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))
    }
}

fn non_blank_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = non_blank_env(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}
