//! spool-core — wire framing, protocol messages, task model, and config.
//! All other spool crates depend on this one.

pub mod config;
pub mod frame;
pub mod message;
pub mod task;

pub use frame::{read_frame, write_frame, FrameError, DEFAULT_MAX_FRAME};
pub use message::{Handshake, Message, Role};
pub use task::{exception_value, is_exception, StoredTarget, TaskDescriptor, TaskTarget};
