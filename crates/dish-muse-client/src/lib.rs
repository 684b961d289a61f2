//! Client side of the dish-muse backends: a streaming chat pipeline and an
//! image-generation job poller.
//!
//! # Streaming an evaluation
//!
//! ```no_run
//! use dish_muse_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let chat = ChatClient::new(ClientConfig::from_env()?)?;
//! let text = chat
//!     .start_stream(
//!         &[ChatMessage::user("Tomato and egg, stir-fried. How will it taste?")],
//!         CancellationToken::new(),
//!     )
//!     .finish_with(|so_far| println!("{} chars so far", so_far.chars().count()))
//!     .await?;
//! println!("{text}");
//! # Ok(())
//! # }
//! ```
//!
//! # Generating a dish image
//!
//! ```no_run
//! use dish_muse_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let images = ImageClient::new(ClientConfig::from_env()?)?;
//! let task_id = images.submit("A stir-fried tomato and egg dish, food photography").await?;
//! let url = poll_image(&images, &task_id, &PollPolicy::default(), |p| {
//!     eprintln!("{:.0}%", p * 100.0)
//! })
//! .await?;
//! println!("{url}");
//! # Ok(())
//! # }
//! ```

/// Streaming chat calls and delta accumulation.
pub mod chat;
/// Client configuration and polling policy.
pub mod config;
/// Error taxonomy shared by all clients.
pub mod errors;
/// Image job submission, polling and inline images.
pub mod image;
/// Common imports for typical usage.
pub mod prelude;
/// Pull-based byte stream reader.
pub mod reader;
/// Incremental SSE decoding.
pub mod sse;

pub use chat::{ChatClient, ChatEvent, ChatMessage, ChatStream, ContentAccumulator, Role};
pub use config::{ClientConfig, PollPolicy};
pub use errors::ClientError;
pub use image::{
    DataUri, ImageClient, ImageJob, ImageTaskApi, TaskId, TaskStatus, extract_data_uri,
    poll_image,
};
pub use reader::{ReadOutcome, ReadStep, StreamReader};
pub use sse::{EventDecoder, SseDecoder, StreamEvent, Utf8ChunkDecoder};
pub use tokio_util::sync::CancellationToken;
