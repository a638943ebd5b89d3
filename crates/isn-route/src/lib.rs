//! Routing layers of the ISN protocol stack.
//!
//! - [`Dispatch`] demultiplexes packets by protocol tag through a sealed
//!   [`BindTable`]
//! - [`Transport`] does the same by port number under tags 0x7E and 0x7D
//! - [`UserLayer`] carries raw user protocols 0x01..=0x07
//! - [`Duplicator`] mirrors one stream onto two children
//! - [`Redirect`] forwards everything it receives into another stack

pub mod bind;
pub mod dispatch;
pub mod dup;
pub mod error;
pub mod redirect;
pub mod transport;
pub mod user;

#[cfg(test)]
mod testing;

pub use bind::{BindTable, BindTableBuilder, Binding, Handler, Route};
pub use dispatch::Dispatch;
pub use dup::{Branch, Duplicator};
pub use error::{Result, RouteError};
pub use redirect::{bridge, Bridge, Redirect};
pub use transport::{Transport, TransportPort, TRANS_HEADER};
pub use user::UserLayer;
