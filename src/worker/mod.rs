//! Worker lifecycle, page messages, push notifications and sync tags.

mod lifecycle;
mod message;

pub use lifecycle::{Worker, WorkerEvent, WorkerState};
pub use message::{ClientMessage, Notification, NotificationAction, PushPayload, SyncTag};
