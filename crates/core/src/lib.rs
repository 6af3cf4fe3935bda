//! # Tally Core
//!
//! Types shared by the counter actors and the web front door: the counter
//! key, the update message streamed to clients, and the core error type.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod error;
pub mod key;
pub mod message;

pub use error::{Error, Result};
pub use key::{CounterKey, MAX_KEY_LEN};
pub use message::UpdateMessage;
