//! Message types for the counter actor.
//!
//! Design principles:
//! - Commands are fire-and-forget (use `cast!`)
//! - Queries and mutations return responses (use `call!`)
//! - Business errors are returned in RPC replies, NOT as actor crashes

use ractor::RpcReplyPort;

use crate::virtual_objects::{Connection, ConnectionId};

use super::errors::CounterError;

/// Reply carrying a count or a business error.
pub type CountReply = RpcReplyPort<Result<i64, CounterError>>;

/// Messages handled by one counter instance, one at a time.
#[derive(Debug)]
pub enum CounterMessage {
    // ═══════════════════════════════════════════════════════════════════════
    // QUERIES AND MUTATIONS (request-response via call!)
    // ═══════════════════════════════════════════════════════════════════════
    /// Current count, creating the row with 0 if needed.
    GetCount { reply: CountReply },

    /// Add one, persist, fan out, reply with the new count.
    Increment { reply: CountReply },

    /// Subtract one, persist, fan out, reply with the new count.
    Decrement { reply: CountReply },

    /// Register a streaming connection and send it the current count.
    ///
    /// Replies with the snapshot count that was sent.
    Join {
        connection: Connection,
        reply: CountReply,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // COMMANDS (fire-and-forget via cast!)
    // ═══════════════════════════════════════════════════════════════════════
    /// Remove a connection from the live set.
    Leave { id: ConnectionId },

    /// Echo a close frame to a connection and remove it.
    Close {
        id: ConnectionId,
        code: u16,
        reason: String,
    },

    /// Timer tick; the instance hibernates once it has been idle long enough.
    IdleCheck,
}
