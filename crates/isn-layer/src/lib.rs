//! Composable layer abstraction for the ISN protocol stack.
//!
//! Every element of a stack (drivers, framing, dispatch, message catalog) is
//! a [`Layer`] wired into a tree of nodes:
//! - the *child* link points toward the wire and owns the next layer down
//! - the *parent* link points toward the application and never owns
//!
//! Links are set once by `init` and are immutable afterward. Everything runs
//! on one thread; progress happens only when the application polls a driver,
//! schedules a message catalog or advances the [`Clock`].

pub mod clock;
pub mod error;
pub mod layer;
pub mod node;
pub mod proto;
pub mod stats;
pub mod table;

pub use clock::{Clock, Tick, Timer};
pub use error::{LayerError, Link, Result, TableError};
pub use layer::{as_layer, receiver, write, Delivery, DeliveryStatus, Layer, LayerRef, WeakLayer};
pub use node::Node;
pub use stats::{Counters, DriverStats, STATS_WIRE_SIZE};
pub use table::TableBuilder;
