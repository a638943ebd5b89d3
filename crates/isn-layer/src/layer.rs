use std::rc::{Rc, Weak};

use bytes::Bytes;

use crate::error::{LayerError, Link, Result};
use crate::stats::{Counters, DriverStats};

/// Outcome of a confirmed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The peer acknowledged the packet.
    Acked,
    /// Retries were exhausted and the packet was given up on.
    Dropped,
}

/// Upward notification about a packet sent with
/// [`Layer::send_confirmed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub status: DeliveryStatus,
    /// The packet as handed to `send_confirmed`, protocol tag first.
    pub packet: Bytes,
}

/// A node in a protocol stack.
///
/// `recv` carries bytes from the wire toward the application, `send`
/// carries bytes the other way. Both return the number of bytes accepted.
pub trait Layer {
    fn name(&self) -> &'static str;

    fn recv(&self, buf: &[u8]) -> Result<usize>;

    fn send(&self, buf: &[u8]) -> Result<usize>;

    /// Send a packet that must be acknowledged by the peer. Layers without
    /// confirmation semantics treat this as a plain send.
    fn send_confirmed(&self, buf: &[u8]) -> Result<usize> {
        self.send(buf)
    }

    /// Largest packet `send` currently accepts. Zero means busy.
    fn capacity(&self) -> usize;

    /// Result of an earlier `send_confirmed`.
    fn delivered(&self, _report: &Delivery) {}

    fn stats(&self) -> DriverStats {
        DriverStats::default()
    }
}

pub type LayerRef = Rc<dyn Layer>;
pub type WeakLayer = Weak<dyn Layer>;

/// Erase a concrete layer into a shared [`LayerRef`].
pub fn as_layer<L: Layer + 'static>(layer: &Rc<L>) -> LayerRef {
    layer.clone()
}

/// Write a whole packet into any layer, failing instead of truncating.
pub fn write(layer: &dyn Layer, packet: &[u8]) -> Result<usize> {
    if packet.is_empty() {
        return Err(LayerError::EmptyPacket);
    }
    let capacity = layer.capacity();
    if capacity == 0 {
        return Err(LayerError::Busy {
            layer: layer.name(),
        });
    }
    if packet.len() > capacity {
        return Err(LayerError::PacketTooLarge {
            size: packet.len(),
            max: capacity,
        });
    }
    layer.send(packet)
}

/// Receive-only layer backed by a closure.
pub struct Receiver<F> {
    name: &'static str,
    handler: F,
    counters: Counters,
}

/// Wrap a closure as a terminal receiver (ping responders, sinks).
///
/// The closure returns how many bytes it consumed.
pub fn receiver<F>(name: &'static str, handler: F) -> LayerRef
where
    F: Fn(&[u8]) -> usize + 'static,
{
    Rc::new(Receiver {
        name,
        handler,
        counters: Counters::new(),
    })
}

impl<F> Layer for Receiver<F>
where
    F: Fn(&[u8]) -> usize,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn recv(&self, buf: &[u8]) -> Result<usize> {
        let used = (self.handler)(buf);
        self.counters.rx_packet(used);
        Ok(used)
    }

    fn send(&self, _buf: &[u8]) -> Result<usize> {
        Err(LayerError::Unlinked {
            layer: self.name,
            link: Link::Child,
        })
    }

    fn capacity(&self) -> usize {
        0
    }

    fn stats(&self) -> DriverStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Sink {
        max: usize,
        sent: RefCell<Vec<Vec<u8>>>,
    }

    impl Layer for Sink {
        fn name(&self) -> &'static str {
            "sink"
        }
        fn recv(&self, buf: &[u8]) -> Result<usize> {
            Ok(buf.len())
        }
        fn send(&self, buf: &[u8]) -> Result<usize> {
            self.sent.borrow_mut().push(buf.to_vec());
            Ok(buf.len())
        }
        fn capacity(&self) -> usize {
            self.max
        }
    }

    #[test]
    fn write_checks_capacity() {
        let sink = Sink {
            max: 4,
            sent: RefCell::new(Vec::new()),
        };
        assert_eq!(write(&sink, &[1, 2, 3]).unwrap(), 3);
        assert!(matches!(
            write(&sink, &[0; 5]),
            Err(LayerError::PacketTooLarge { size: 5, max: 4 })
        ));
        assert!(matches!(write(&sink, &[]), Err(LayerError::EmptyPacket)));
        assert_eq!(sink.sent.borrow().len(), 1);
    }

    #[test]
    fn write_reports_busy() {
        let sink = Sink {
            max: 0,
            sent: RefCell::new(Vec::new()),
        };
        assert!(matches!(write(&sink, &[1]), Err(LayerError::Busy { .. })));
    }

    #[test]
    fn receiver_runs_closure() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let rx = receiver("tap", move |buf| {
            log.borrow_mut().extend_from_slice(buf);
            buf.len()
        });
        assert_eq!(rx.recv(&[9, 8]).unwrap(), 2);
        assert_eq!(*seen.borrow(), vec![9, 8]);
        assert_eq!(rx.stats().rx_packets, 1);
        assert!(matches!(rx.send(&[1]), Err(LayerError::Unlinked { .. })));
    }

    #[test]
    fn confirmed_send_defaults_to_send() {
        let sink = Sink {
            max: 8,
            sent: RefCell::new(Vec::new()),
        };
        sink.send_confirmed(&[7]).unwrap();
        assert_eq!(*sink.sent.borrow(), vec![vec![7]]);
    }
}
