//! Scheduling priorities, 0..=31. Higher is more urgent.
//!
//! The band above [`HIGHEST`] is reserved for the description exchange and
//! the query protocol.

pub type Priority = u8;

/// Send the message descriptor.
pub const DESCRIPTION: Priority = 31;
/// Descriptor sent while fast loading the whole catalog.
pub const DESCRIPTIONLOW: Priority = 30;
/// Clear a query lock and send the arguments.
pub const UNLOCK_ARGS: Priority = 29;
/// Ask the peer for its arguments.
pub const QUERY_ARGS: Priority = 27;
/// The reply to a query has arrived.
pub const QUERY_WAIT: Priority = 26;
/// Send the arguments and wait for the peer to echo them.
pub const UPDATE_ARGS: Priority = 25;
/// Arguments requested by the peer.
pub const HIGHEST: Priority = 15;
pub const HIGH: Priority = 8;
pub const NORMAL: Priority = 4;
pub const LOW: Priority = 1;
/// Remove from the queue and drop any query lock.
pub const CLEAR: Priority = 0;

pub const MAX: Priority = 31;

/// Priorities a locked message still accepts.
pub fn passes_lock(priority: Priority) -> bool {
    matches!(priority, DESCRIPTION | DESCRIPTIONLOW | UNLOCK_ARGS)
}
