//! Common imports for typical client usage.
pub use crate::{
    CancellationToken, ChatClient, ChatEvent, ChatMessage, ChatStream, ClientConfig, ClientError,
    ImageClient, ImageTaskApi, PollPolicy, TaskId, TaskStatus, poll_image,
};
