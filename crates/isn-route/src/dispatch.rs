//! Protocol demultiplexer.
//!
//! ```text
//!            +-------+-------+-------+
//!   parents  | 0x7F  | 0x00  | 0x80  |   (bound handlers)
//!            +---+---+---+---+---+---+
//!                 \      |      /
//!                  [  Dispatch  ]        first byte selects the handler
//!                        |
//!                     child              (frame layer)
//! ```
//!
//! Tags `0x80..=0xFF` fold onto `0x80`, the frame control protocol.

use std::rc::Rc;

use isn_layer::proto::protocol_of;
use isn_layer::{Counters, Delivery, DriverStats, Layer, LayerError, LayerRef, Node};
use tracing::{debug, trace};

use crate::bind::BindTable;

pub struct Dispatch {
    node: Node,
    table: BindTable,
    counters: Counters,
}

impl Dispatch {
    pub fn new(table: BindTable) -> Rc<Self> {
        Rc::new(Self {
            node: Node::new("dispatch"),
            table,
            counters: Counters::new(),
        })
    }

    /// Link the wire-ward layer. Parents are the bound handlers.
    pub fn init(&self, child: Option<LayerRef>) -> isn_layer::Result<()> {
        self.node.init(child, None)
    }

    pub fn table(&self) -> &BindTable {
        &self.table
    }

    fn outbound(&self, buf: &[u8]) -> isn_layer::Result<&LayerRef> {
        self.node.ensure_initialized()?;
        let tag = *buf.first().ok_or(LayerError::EmptyPacket)?;
        if !self.table.contains(protocol_of(tag)) {
            debug!(tag, "send on unbound protocol");
            self.counters.tx_dropped();
            return Err(LayerError::Unbound(tag));
        }
        self.node.child()
    }

    fn sent(&self, result: isn_layer::Result<usize>) -> isn_layer::Result<usize> {
        match result {
            Ok(n) => {
                if n > 0 {
                    self.counters.tx_packet(n);
                }
                Ok(n)
            }
            Err(err) => {
                self.counters.tx_dropped();
                Err(err)
            }
        }
    }
}

impl Layer for Dispatch {
    fn name(&self) -> &'static str {
        "dispatch"
    }

    fn recv(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.node.ensure_initialized()?;
        let Some(&tag) = buf.first() else {
            self.counters.rx_error();
            return Ok(0);
        };
        let protocol = protocol_of(tag);
        let Some(handler) = self.table.lookup(protocol) else {
            debug!(tag, "no handler bound");
            self.counters.rx_error();
            return Ok(0);
        };
        let Some(layer) = handler.resolve() else {
            debug!(tag, "handler dropped");
            self.counters.rx_dropped();
            return Ok(0);
        };
        trace!(tag, len = buf.len(), handler = layer.name(), "dispatch");
        self.counters.rx_packet(buf.len());
        layer.recv(buf)
    }

    fn send(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        let child = self.outbound(buf)?;
        self.sent(child.send(buf))
    }

    fn send_confirmed(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        let child = self.outbound(buf)?;
        self.sent(child.send_confirmed(buf))
    }

    fn capacity(&self) -> usize {
        self.node.child().map(|child| child.capacity()).unwrap_or(0)
    }

    fn delivered(&self, report: &Delivery) {
        let handler = report
            .packet
            .first()
            .and_then(|&tag| self.table.lookup(protocol_of(tag)))
            .and_then(|handler| handler.resolve());
        if let Some(layer) = handler {
            layer.delivered(report);
        }
    }

    fn stats(&self) -> DriverStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::{BindTableBuilder, Handler, Route};
    use crate::testing::Tap;
    use bytes::Bytes;
    use isn_layer::{as_layer, DeliveryStatus};

    struct Fixture {
        dispatch: Rc<Dispatch>,
        wire: Rc<Tap>,
        msg: Rc<Tap>,
        ping: Rc<Tap>,
        control: Rc<Tap>,
    }

    fn fixture() -> Fixture {
        let wire = Tap::new("wire");
        let msg = Tap::new("msg");
        let ping = Tap::new("ping");
        let control = Tap::new("control");
        let mut builder = BindTableBuilder::with_capacity(3);
        builder.add(0x7F, Handler::layer(&as_layer(&msg))).unwrap();
        builder.add(0x00, Handler::layer(&as_layer(&ping))).unwrap();
        builder.add(0x80, Handler::layer(&as_layer(&control))).unwrap();
        let dispatch = Dispatch::new(builder.seal().unwrap());
        dispatch.init(Some(as_layer(&wire))).unwrap();
        Fixture {
            dispatch,
            wire,
            msg,
            ping,
            control,
        }
    }

    #[test]
    fn each_packet_reaches_exactly_one_handler() {
        let f = fixture();
        f.dispatch.recv(&[0x7F, 1, 2]).unwrap();
        f.dispatch.recv(&[0x00, 9]).unwrap();
        f.dispatch.recv(&[0xC3, 5]).unwrap();

        assert_eq!(*f.msg.received.borrow(), vec![vec![0x7F, 1, 2]]);
        assert_eq!(*f.ping.received.borrow(), vec![vec![0x00, 9]]);
        assert_eq!(*f.control.received.borrow(), vec![vec![0xC3, 5]]);
        assert_eq!(f.dispatch.stats().rx_packets, 3);
    }

    #[test]
    fn unknown_tag_counts_error() {
        let f = fixture();
        assert_eq!(f.dispatch.recv(&[0x05, 1]).unwrap(), 0);
        assert_eq!(f.dispatch.recv(&[]).unwrap(), 0);
        assert_eq!(f.dispatch.stats().rx_errors, 2);
        assert!(f.msg.received.borrow().is_empty());
    }

    #[test]
    fn dropped_handler_counts_drop() {
        let f = fixture();
        drop(f.ping);
        assert_eq!(f.dispatch.recv(&[0x00]).unwrap(), 0);
        assert_eq!(f.dispatch.stats().rx_dropped, 1);
    }

    #[test]
    fn send_requires_bound_tag() {
        let f = fixture();
        assert_eq!(f.dispatch.send(&[0x7F, 3]).unwrap(), 2);
        f.dispatch.send_confirmed(&[0x00, 4]).unwrap();
        assert!(matches!(
            f.dispatch.send(&[0x02, 1]),
            Err(LayerError::Unbound(0x02))
        ));
        assert_eq!(*f.wire.sent.borrow(), vec![vec![0x7F, 3]]);
        assert_eq!(*f.wire.confirmed.borrow(), vec![vec![0x00, 4]]);
        assert_eq!(f.dispatch.stats().tx_dropped, 1);
        assert_eq!(f.dispatch.stats().tx_packets, 2);
    }

    #[test]
    fn catch_all_accepts_any_tag() {
        let wire = Tap::new("wire");
        let rest = Tap::new("rest");
        let mut builder = BindTableBuilder::with_capacity(1);
        builder.add(Route::Any, Handler::layer(&as_layer(&rest))).unwrap();
        let dispatch = Dispatch::new(builder.seal().unwrap());
        dispatch.init(Some(as_layer(&wire))).unwrap();

        dispatch.recv(&[0x03, 1]).unwrap();
        dispatch.send(&[0x04, 2]).unwrap();
        assert_eq!(rest.received.borrow().len(), 1);
        assert_eq!(wire.sent.borrow().len(), 1);
    }

    #[test]
    fn delivery_reports_follow_the_tag() {
        let f = fixture();
        let report = Delivery {
            status: DeliveryStatus::Acked,
            packet: Bytes::from_static(&[0x7F, 1]),
        };
        f.dispatch.delivered(&report);
        assert_eq!(*f.msg.reports.borrow(), vec![report]);
        assert!(f.ping.reports.borrow().is_empty());
    }

    #[test]
    fn capacity_is_the_childs() {
        let f = fixture();
        f.wire.capacity.set(10);
        assert_eq!(f.dispatch.capacity(), 10);
    }

    #[test]
    fn use_before_init_fails() {
        let dispatch = Dispatch::new(BindTableBuilder::with_capacity(0).seal().unwrap());
        assert!(matches!(
            dispatch.recv(&[0x7F]),
            Err(LayerError::NotInitialized { layer: "dispatch" })
        ));
        assert_eq!(dispatch.capacity(), 0);
    }
}
