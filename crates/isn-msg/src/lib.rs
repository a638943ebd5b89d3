//! Message catalog layer for the ISN protocol stack.
//!
//! A device publishes a table of numbered messages. Each entry carries a
//! printf-like descriptor that names and formats its binary arguments, so a
//! host can discover the whole catalog at run time and then query or update
//! individual values.
//!
//! ```text
//! [0x7F][flags][args ...]
//!        │
//!        ├── bit 7     descriptor request / response
//!        └── bits 0..6 message number (127 = load the whole catalog)
//! ```
//!
//! Outbound traffic is priority driven: [`Message::send`] posts an entry and
//! [`Message::schedule`] drains the queue while the lower layer has room.
//! Queries and updates lock their entry until the peer answers or the query
//! times out on the shared [`isn_layer::Clock`].

pub mod descriptor;
pub mod error;
pub mod message;
pub mod priority;
pub mod queue;
pub mod table;

pub use descriptor::{Conversion, Descriptor, Endian, FieldFormat, Marker, Token, Value};
pub use error::{DescriptorError, MessageError, Result};
pub use message::{Message, MessageConfig, DESCRIPTOR_FLAG};
pub use priority::Priority;
pub use queue::OutboundQueue;
pub use table::{
    handler, HandlerRef, MessageEntry, MessageHandler, MessageTable, MessageTableBuilder,
    MAX_ARGS_SIZE, MAX_MESSAGES, NUM_LAST,
};
