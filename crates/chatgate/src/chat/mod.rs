//! Message processing: one user turn in, one persisted exchange out.

mod error;
mod locks;
mod processor;

pub use error::{ChatError, ChatResult};
pub use locks::{SessionGuard, SessionLocks};
pub use processor::{MessageProcessor, ProcessedExchange};
