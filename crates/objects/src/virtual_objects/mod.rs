//! Virtual Objects for per-key counter instances.
//!
//! A counter key is a virtual object: it always exists logically, while
//! its actor instance is created on demand, gated until its schema is
//! migrated, and may be evicted and rebuilt at any time.
//!
//! # Key Types
//!
//! - `InitGate`: one-shot barrier holding callers until an instance is ready
//! - `ConnectionSet`: the live streaming connections of one key
//! - `ConnectionRegistry`: connection sets of all keys, outliving instances

mod connections;
mod gate;

pub use connections::{
    Connection, ConnectionId, ConnectionRegistry, ConnectionSet, ConnectionState, FanoutReport,
    Outbound, SendFailure, SharedConnectionSet,
};
pub use gate::{GatePhase, InitGate};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn test_new_connection_is_open() {
        let (connection, _rx) = Connection::channel(4);
        assert_eq!(connection.state(), ConnectionState::Open);
    }

    #[test]
    fn test_gate_default_is_initializing() {
        let gate: InitGate<()> = InitGate::default();
        assert_eq!(gate.phase(), GatePhase::Initializing);
    }
}
