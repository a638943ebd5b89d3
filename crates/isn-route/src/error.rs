use isn_layer::{LayerError, TableError};

use crate::bind::Route;

/// Errors raised while building routing tables and layers.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// The table was not built to its declared size.
    #[error("bind table: {0}")]
    Table(#[from] TableError),

    /// The same route appears in two slots.
    #[error("route {0} bound more than once")]
    DuplicateRoute(Route),

    /// A catch-all binding shadows the bindings after it.
    #[error("catch-all route must be the last binding (found at slot {index})")]
    MisplacedCatchAll { index: usize },

    /// User layers carry protocols 0x01..=0x07 only.
    #[error("0x{0:02x} is not a user protocol")]
    InvalidUser(u8),

    /// Linking a layer failed.
    #[error(transparent)]
    Layer(#[from] LayerError),
}

pub type Result<T> = std::result::Result<T, RouteError>;
