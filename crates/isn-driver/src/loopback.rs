use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;
use isn_layer::{Counters, DriverStats, Layer, LayerError, LayerRef, Node};
use tracing::debug;

use crate::channel::{deliver, DuplexChannel};

/// Default largest write accepted by a loopback end.
pub const DEFAULT_MAX_PACKET: usize = 8192;

type Inbox = Rc<RefCell<VecDeque<Bytes>>>;

/// One end of an in-memory duplex link.
///
/// Bytes written on one end are delivered, one write at a time, by the
/// other end's next [`poll`](DuplexChannel::poll).
pub struct LoopbackChannel {
    node: Node,
    inbox: Inbox,
    peer: Inbox,
    max_packet: usize,
    counters: Counters,
}

impl LoopbackChannel {
    /// Create two connected ends.
    pub fn pair() -> (Rc<Self>, Rc<Self>) {
        Self::pair_with_capacity(DEFAULT_MAX_PACKET)
    }

    /// Create two connected ends accepting writes up to `max_packet` bytes.
    pub fn pair_with_capacity(max_packet: usize) -> (Rc<Self>, Rc<Self>) {
        let a: Inbox = Rc::default();
        let b: Inbox = Rc::default();
        let left = Rc::new(Self::end(a.clone(), b.clone(), max_packet));
        let right = Rc::new(Self::end(b, a, max_packet));
        (left, right)
    }

    fn end(inbox: Inbox, peer: Inbox, max_packet: usize) -> Self {
        Self {
            node: Node::new("loopback"),
            inbox,
            peer,
            max_packet,
            counters: Counters::new(),
        }
    }

    /// Link the driver to the layer receiving its input.
    pub fn init(&self, parent: Option<LayerRef>) -> isn_layer::Result<()> {
        self.node.init(None, parent)
    }

    /// Queue raw bytes as if the peer had written them.
    pub fn inject(&self, bytes: &[u8]) {
        self.inbox
            .borrow_mut()
            .push_back(Bytes::copy_from_slice(bytes));
    }

    /// Writes waiting to be polled on this end.
    pub fn pending(&self) -> usize {
        self.inbox.borrow().len()
    }
}

impl DuplexChannel for LoopbackChannel {
    fn write(&self, bytes: &[u8]) -> isn_layer::Result<usize> {
        if bytes.len() > self.max_packet {
            self.counters.tx_dropped();
            return Err(LayerError::PacketTooLarge {
                size: bytes.len(),
                max: self.max_packet,
            });
        }
        self.peer
            .borrow_mut()
            .push_back(Bytes::copy_from_slice(bytes));
        self.counters.tx_packet(bytes.len());
        Ok(bytes.len())
    }

    fn poll(&self, _timeout: Duration) -> isn_layer::Result<usize> {
        self.node.ensure_initialized()?;
        let mut processed = 0;
        loop {
            // Release the inbox before delivering; the parent may write back.
            let next = self.inbox.borrow_mut().pop_front();
            let Some(chunk) = next else { break };
            processed += chunk.len();
            deliver(&self.node, &self.counters, &chunk);
        }
        if processed > 0 {
            debug!(processed, "loopback poll");
        }
        Ok(processed)
    }
}

impl Layer for LoopbackChannel {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn recv(&self, _buf: &[u8]) -> isn_layer::Result<usize> {
        Err(LayerError::Unsupported {
            layer: "loopback",
            operation: "recv",
        })
    }

    fn send(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.write(buf)
    }

    fn capacity(&self) -> usize {
        self.max_packet
    }

    fn stats(&self) -> DriverStats {
        self.counters.snapshot()
    }
}
