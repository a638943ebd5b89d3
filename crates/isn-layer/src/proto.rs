//! Protocol tags.
//!
//! The first byte of every packet selects its protocol. Assignments are
//! fixed for interoperability with other ISN nodes.

/// Ping / liveness.
pub const PING: u8 = 0x00;

/// First user protocol.
pub const USER1: u8 = 0x01;

/// Last user protocol.
pub const USER7: u8 = 0x07;

/// Transport, multi-port list form.
pub const TRANS_LIST: u8 = 0x7D;

/// Transport, single port.
pub const TRANS: u8 = 0x7E;

/// Message catalog protocol.
pub const MSG: u8 = 0x7F;

/// Frame layer control. Every tag at or above this value folds onto it.
pub const FRAME: u8 = 0x80;

/// Returns the protocol a packet belongs to, folding frame control tags.
pub fn protocol_of(tag: u8) -> u8 {
    if tag >= FRAME {
        FRAME
    } else {
        tag
    }
}

/// Returns a human-readable name for a protocol tag.
pub fn protocol_name(tag: u8) -> &'static str {
    match protocol_of(tag) {
        PING => "PING",
        USER1..=USER7 => "USER",
        TRANS_LIST => "TRANS_LIST",
        TRANS => "TRANS",
        MSG => "MSG",
        FRAME => "FRAME",
        _ => "RESERVED",
    }
}

/// Returns true if the tag is one of the seven user protocols.
pub fn is_user(tag: u8) -> bool {
    (USER1..=USER7).contains(&tag)
}
