//! Layered protocol stack for links between embedded devices and hosts.
//!
//! A stack is assembled bottom-up from independent layers, each owning the
//! layer below it:
//!
//! ```text
//!   Message catalog   Transport   User   ping
//!          └──────────────┴─────────┴──────┘
//!                       Dispatch
//!                          │
//!                        Frame
//!                          │
//!          Duplex channel (loopback, UDP, serial)
//! ```
//!
//! # Crate Structure
//!
//! - [`layer`]: node links, the layer contract, clock and counters
//! - [`driver`]: duplex channel drivers
//! - [`frame`]: delimited, checksummed framing with retransmission
//! - [`route`]: dispatch, transport ports, user tags, duplicator, redirect
//! - [`msg`]: self-describing message catalog
//! - [`config`]: JSON stack configuration
//! - `logging`: `tracing-subscriber` setup (behind the `logging` feature)

pub mod config;
#[cfg(feature = "logging")]
pub mod logging;

pub use config::{ConfigError, StackConfig};

/// Re-export layer primitives.
pub mod layer {
    pub use isn_layer::*;
}

/// Re-export channel drivers.
pub mod driver {
    pub use isn_driver::*;
}

/// Re-export frame types.
pub mod frame {
    pub use isn_frame::*;
}

/// Re-export routing layers.
pub mod route {
    pub use isn_route::*;
}

/// Re-export the message catalog.
pub mod msg {
    pub use isn_msg::*;
}
