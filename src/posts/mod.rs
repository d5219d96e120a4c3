//! Captured posts: model, operator notices, rendering and lifecycle.

pub mod model;
pub mod notifier;
pub mod publisher;
pub mod service;

pub use model::{MediaItem, MediaKind, MediaRef, NewMediaItem, NewPost, Post};
pub use notifier::{Notifier, PostNotice};
pub use publisher::Publisher;
pub use service::PostService;
