use std::fmt;

/// Direction of a node link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// Toward the wire.
    Child,
    /// Toward the application.
    Parent,
    /// Sibling receiving bytes outside of frames.
    Other,
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::Child => f.write_str("child"),
            Link::Parent => f.write_str("parent"),
            Link::Other => f.write_str("other"),
        }
    }
}

/// Errors raised by layers at runtime or while wiring a stack.
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    /// The layer was used before `init` linked it into a stack.
    #[error("{layer} used before init")]
    NotInitialized { layer: &'static str },

    /// `init` was called more than once.
    #[error("{layer} already initialized")]
    AlreadyInitialized { layer: &'static str },

    /// The layer is terminal in the requested direction, or the linked
    /// layer has been dropped.
    #[error("{layer} has no {link} link")]
    Unlinked { layer: &'static str, link: Link },

    /// The layer does not implement the requested operation.
    #[error("{layer} does not support {operation}")]
    Unsupported {
        layer: &'static str,
        operation: &'static str,
    },

    /// The packet exceeds what the layer can carry.
    #[error("packet too large ({size} bytes, max {max})")]
    PacketTooLarge { size: usize, max: usize },

    /// The layer cannot accept a packet right now.
    #[error("{layer} is busy")]
    Busy { layer: &'static str },

    /// Packets must carry at least a protocol tag.
    #[error("packet is empty")]
    EmptyPacket,

    /// No handler is bound for the packet's protocol tag.
    #[error("protocol 0x{0:02x} is not bound")]
    Unbound(u8),

    /// An I/O error occurred in a driver.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LayerError>;

/// Errors raised while building a fixed-capacity table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// `add` was called on a table whose declared capacity is filled.
    #[error("table capacity exceeded (capacity {capacity})")]
    CapacityExceeded { capacity: usize },

    /// `set` addressed a slot outside the declared capacity.
    #[error("slot {index} out of range (capacity {capacity})")]
    IndexOutOfRange { index: usize, capacity: usize },

    /// The table was sealed with fewer entries than declared.
    #[error("table size not matching (declared {expected}, bound {found})")]
    SizeMismatch { expected: usize, found: usize },

    /// A slot below the watermark was never assigned.
    #[error("slot {index} was never assigned")]
    EmptySlot { index: usize },
}
