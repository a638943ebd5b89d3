//! Duplex channel drivers.
//!
//! The lowest layer of an ISN stack. A driver moves raw bytes between the
//! physical link and its parent layer:
//! - [`LoopbackChannel`]: in-memory pair for tests and local bridging
//! - [`UdpChannel`]: UDP socket with a learned client table
//! - `SerialChannel`: serial port (behind the `serial` feature)
//!
//! Drivers never spawn threads. Input is only read inside
//! [`DuplexChannel::poll`].

pub mod channel;
pub mod error;
pub mod loopback;
pub mod serial;
pub mod udp;

pub use channel::DuplexChannel;
pub use error::{DriverError, Result};
pub use loopback::LoopbackChannel;
pub use serial::{FlowControl, Parity, SerialParams};
pub use udp::{UdpChannel, UdpConfig};

#[cfg(feature = "serial")]
pub use serial::SerialChannel;
