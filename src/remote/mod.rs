//! Notification sink and shared file store
//!
//! The core talks to consumers through [`Notifier`] and [`FileStore`].
//! [`OneBotClient`] implements both for a OneBot v11 HTTP endpoint, where a
//! consumer is a chat group and the file store is its group files.

mod onebot;
mod traits;

pub use onebot::OneBotClient;
pub use traits::{FileStore, Notifier, RemoteFile, RemoteFolder};
