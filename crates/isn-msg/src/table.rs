use std::fmt;
use std::rc::Rc;

use isn_layer::TableBuilder;

use crate::descriptor::Descriptor;
use crate::error::{MessageError, Result};
use crate::priority::{Priority, MAX};

/// Messages per catalog. Number 127 is the fast-load request.
pub const MAX_MESSAGES: usize = 127;
/// Largest argument block of one message.
pub const MAX_ARGS_SIZE: usize = 64;
/// Message number asking for the whole catalog.
pub const NUM_LAST: u8 = 127;

/// Argument codec of one message.
///
/// Called with the received arguments when the peer wrote them, or `None`
/// when they are only being read. Returns the current arguments to send, or
/// `None` to send nothing.
pub trait MessageHandler {
    fn call(&self, input: Option<&[u8]>) -> Option<Vec<u8>>;
}

impl<F> MessageHandler for F
where
    F: Fn(Option<&[u8]>) -> Option<Vec<u8>>,
{
    fn call(&self, input: Option<&[u8]>) -> Option<Vec<u8>> {
        self(input)
    }
}

pub type HandlerRef = Rc<dyn MessageHandler>;

/// Wrap a closure as a [`HandlerRef`].
pub fn handler<F>(f: F) -> HandlerRef
where
    F: Fn(Option<&[u8]>) -> Option<Vec<u8>> + 'static,
{
    Rc::new(f)
}

pub struct MessageEntry {
    pub descriptor: Descriptor,
    /// Argument bytes.
    pub size: usize,
    pub handler: Option<HandlerRef>,
    /// Priority queued when the layer starts.
    pub priority: Priority,
}

impl fmt::Debug for MessageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEntry")
            .field("descriptor", &self.descriptor.as_str())
            .field("size", &self.size)
            .field("handler", &self.handler.is_some())
            .field("priority", &self.priority)
            .finish()
    }
}

struct Declared {
    descriptor: String,
    size: usize,
    handler: Option<HandlerRef>,
    priority: Priority,
}

/// Fixed-size message table under construction.
pub struct MessageTableBuilder {
    inner: TableBuilder<Declared>,
}

impl MessageTableBuilder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: TableBuilder::with_capacity(capacity),
        }
    }

    pub fn add(
        &mut self,
        descriptor: &str,
        size: usize,
        handler: Option<HandlerRef>,
        priority: Priority,
    ) -> Result<usize> {
        Ok(self.inner.add(Declared {
            descriptor: descriptor.to_string(),
            size,
            handler,
            priority,
        })?)
    }

    pub fn set(
        &mut self,
        index: usize,
        descriptor: &str,
        size: usize,
        handler: Option<HandlerRef>,
        priority: Priority,
    ) -> Result<usize> {
        Ok(self.inner.set(
            index,
            Declared {
                descriptor: descriptor.to_string(),
                size,
                handler,
                priority,
            },
        )?)
    }

    /// Parse every descriptor and check the catalog.
    pub fn seal(self) -> Result<MessageTable> {
        let declared = self.inner.seal()?;
        if declared.len() > MAX_MESSAGES {
            return Err(MessageError::TooManyMessages {
                count: declared.len(),
                max: MAX_MESSAGES,
            });
        }

        let mut entries = Vec::with_capacity(declared.len());
        for (index, entry) in declared.into_iter().enumerate() {
            let descriptor = Descriptor::parse(&entry.descriptor)
                .map_err(|source| MessageError::Descriptor { index, source })?;
            if entry.priority > MAX {
                return Err(MessageError::InvalidPriority {
                    priority: entry.priority,
                });
            }
            if entry.size > MAX_ARGS_SIZE {
                return Err(MessageError::ArgsTooLarge {
                    index,
                    size: entry.size,
                    max: MAX_ARGS_SIZE,
                });
            }
            if descriptor.has_fields() && descriptor.args_size() != entry.size {
                return Err(MessageError::SizeMismatch {
                    index,
                    declared: entry.size,
                    fields: descriptor.args_size(),
                });
            }
            if index != 0 && descriptor.title().is_some() {
                return Err(MessageError::MisplacedTitle { index });
            }
            entries.push(MessageEntry {
                descriptor,
                size: entry.size,
                handler: entry.handler,
                priority: entry.priority,
            });
        }

        let last = entries.len().checked_sub(1);
        match entries.iter().position(|e| e.descriptor.is_terminator()) {
            None => return Err(MessageError::MissingTerminator),
            Some(index) if Some(index) != last => {
                return Err(MessageError::MisplacedTerminator { index })
            }
            Some(_) => {}
        }
        Ok(MessageTable { entries })
    }
}

/// Sealed message catalog, indexed by message number.
#[derive(Debug)]
pub struct MessageTable {
    entries: Vec<MessageEntry>,
}

impl MessageTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Never true for a sealed table; the terminator is mandatory.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, num: u8) -> Option<&MessageEntry> {
        self.entries.get(num as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageEntry> {
        self.entries.iter()
    }

    /// Number of the terminator message.
    pub fn terminator(&self) -> u8 {
        (self.entries.len() - 1) as u8
    }

    /// First message whose handler is `handler`.
    pub fn find_handler(&self, handler: &HandlerRef) -> Option<u8> {
        self.entries
            .iter()
            .position(|entry| {
                entry
                    .handler
                    .as_ref()
                    .is_some_and(|h| std::ptr::addr_eq(Rc::as_ptr(h), Rc::as_ptr(handler)))
            })
            .map(|num| num as u8)
    }
}
