//! Post Relay: channel monitoring, operator review and republishing.

pub mod app;
pub mod chat_id;
pub mod config;
pub mod error;
pub mod format;
pub mod llm;
pub mod monitor;
pub mod operator;
pub mod posts;
pub mod registry;
pub mod rewrite;
pub mod settings;
pub mod store;
pub mod telegram;
