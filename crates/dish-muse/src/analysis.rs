use std::sync::Arc;

use dish_muse_client::{
    CancellationToken, ChatClient, ChatEvent, ChatMessage, ClientConfig, ClientError, ImageClient,
    ImageTaskApi, PollPolicy, poll_image,
};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::recipe::RecipeDraft;

/// Receives progress while an analysis runs. All methods default to no-ops.
pub trait AnalysisObserver: Send {
    /// Full evaluation text after each streamed delta.
    fn on_text(&mut self, _full_text: &str) {}
    /// Image job progress in `[0, 1]`, never decreasing.
    fn on_image_progress(&mut self, _fraction: f64) {}
    /// The image stage failed; the evaluation text is still valid.
    fn on_image_error(&mut self, _err: &ClientError) {}
}

impl AnalysisObserver for () {}

#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisResult {
    /// First non-empty line of the evaluation.
    pub taste_summary: String,
    pub full_evaluation: String,
    /// Empty when the image stage failed.
    pub image_url: String,
}

impl AnalysisResult {
    fn new(full_evaluation: String, image_url: String) -> Self {
        Self {
            taste_summary: taste_summary(&full_evaluation),
            full_evaluation,
            image_url,
        }
    }
}

fn taste_summary(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or(text)
        .to_string()
}

/// Runs the evaluation stream, then the image job, for one recipe draft.
#[derive(Clone)]
pub struct Analyzer {
    chat: ChatClient,
    images: Arc<dyn ImageTaskApi>,
    poll: PollPolicy,
}

impl Analyzer {
    pub fn new(chat: ChatClient, images: Arc<dyn ImageTaskApi>, poll: PollPolicy) -> Self {
        Self { chat, images, poll }
    }

    /// Builds both backend clients from one configuration.
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let poll = config.poll.clone();
        let chat = ChatClient::new(config.clone())?;
        let images = Arc::new(ImageClient::new(config)?);
        Ok(Self::new(chat, images, poll))
    }

    pub async fn analyze(
        &self,
        draft: RecipeDraft,
        cancel: CancellationToken,
        observer: &mut dyn AnalysisObserver,
    ) -> Result<AnalysisResult, AppError> {
        let draft = draft.validate()?;
        let evaluation = self.evaluate(&draft, cancel.clone(), observer).await?;
        info!(chars = evaluation.chars().count(), "evaluation complete");

        let image_url = match self.generate_image(&draft.image_prompt(), cancel, observer).await {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "image stage failed");
                observer.on_image_error(&err);
                String::new()
            }
        };
        Ok(AnalysisResult::new(evaluation, image_url))
    }

    async fn evaluate(
        &self,
        draft: &RecipeDraft,
        cancel: CancellationToken,
        observer: &mut dyn AnalysisObserver,
    ) -> Result<String, AppError> {
        let messages = [ChatMessage::user(draft.evaluation_prompt())];
        let mut stream = self.chat.start_stream(&messages, cancel);
        while let Some(event) = stream.next_event().await {
            match event {
                ChatEvent::Update { content } => observer.on_text(&content),
                ChatEvent::Completed => return Ok(stream.content().to_string()),
                ChatEvent::Failed(err) => return Err(err.into()),
                ChatEvent::Aborted => return Err(AppError::Cancelled),
            }
        }
        Err(ClientError::Protocol("chat stream ended without a terminal event".into()).into())
    }

    /// Submits an image job and polls it to completion.
    ///
    /// Cancelling `cancel` stops polling and yields [`ClientError::Cancelled`].
    pub async fn generate_image(
        &self,
        prompt: &str,
        cancel: CancellationToken,
        observer: &mut dyn AnalysisObserver,
    ) -> Result<String, ClientError> {
        let job = async {
            let task_id = self.images.submit(prompt).await?;
            info!(%task_id, "image job submitted");
            poll_image(self.images.as_ref(), &task_id, &self.poll, |p| {
                observer.on_image_progress(p)
            })
            .await
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = job => result,
        }
    }
}
