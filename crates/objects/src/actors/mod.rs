//! Actor-based counter instances.
//!
//! Each counter key is served by at most one ractor actor at a time. The
//! actor migrates its store before it accepts a message, then handles
//! reads, mutations and connection changes strictly one at a time.
//!
//! # Components
//!
//! - `CounterActorDef`: the per-key actor
//! - `CounterMessage`: messages the actor handles
//! - `CounterRouter`: maps keys to live instances, spawning and rehydrating
//! - `CounterError`: business errors returned via RPC replies
//!
//! # Example
//!
//! ```ignore
//! use tally_objects::actors::{CounterRouter, RouterConfig};
//! use tally_objects::persistence::StoreConfig;
//!
//! let router = CounterRouter::new(StoreConfig::in_memory(), RouterConfig::default());
//! let key = "room1".parse()?;
//! assert_eq!(router.increment(&key).await?, 1);
//! ```

pub mod counter;
pub mod errors;
pub mod messages;
pub mod router;

pub use counter::{CounterActorDef, CounterArguments, CounterState};
pub use errors::CounterError;
pub use messages::{CountReply, CounterMessage};
pub use router::{CounterRouter, DEFAULT_CONNECTION_BUFFER, RouterConfig};
