//! Operator-facing bot interface.
//!
//! - `callback`: inline button token grammar
//! - `keyboards`: inline keyboards for every screen
//! - `session`: per-operator preview and pending-input state
//! - `handler`: commands, follow-up input and button dispatch

pub mod callback;
pub mod handler;
pub mod keyboards;
pub mod session;

pub use callback::Callback;
pub use handler::OperatorHandler;
pub use session::{OperatorSessions, PendingInput};
