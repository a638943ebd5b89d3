//! Port addressing over one protocol tag.
//!
//! ```text
//!   single port   [0x7E][port][payload ...]
//!   port list     [0x7D][count][port 0]..[port n-1][payload ...]
//! ```
//!
//! Inbound payloads are routed by a bind table keyed on port number; the
//! transport header is stripped before delivery.

use std::rc::Rc;

use isn_layer::proto::{TRANS, TRANS_LIST};
use isn_layer::{Counters, Delivery, DriverStats, Layer, LayerError, LayerRef, Node};
use tracing::debug;

use crate::bind::BindTable;

/// Bytes added in front of a single-port payload.
pub const TRANS_HEADER: usize = 2;

pub struct Transport {
    node: Node,
    ports: BindTable,
    counters: Counters,
}

impl Transport {
    pub fn new(ports: BindTable) -> Rc<Self> {
        Rc::new(Self {
            node: Node::new("transport"),
            ports,
            counters: Counters::new(),
        })
    }

    /// Link the wire-ward layer. Parents are the bound ports.
    pub fn init(&self, child: Option<LayerRef>) -> isn_layer::Result<()> {
        self.node.init(child, None)
    }

    /// Endpoint layer sending on `port`.
    pub fn port(self: &Rc<Self>, port: u8) -> Rc<TransportPort> {
        Rc::new(TransportPort {
            transport: self.clone(),
            port,
        })
    }

    /// Send `payload` to a single port.
    pub fn send_to(&self, port: u8, payload: &[u8]) -> isn_layer::Result<usize> {
        self.emit(&[TRANS, port], payload, false)
    }

    /// Send one payload to several ports at once.
    pub fn send_list(&self, ports: &[u8], payload: &[u8]) -> isn_layer::Result<usize> {
        let count = u8::try_from(ports.len()).map_err(|_| LayerError::PacketTooLarge {
            size: ports.len(),
            max: u8::MAX as usize,
        })?;
        let mut header = Vec::with_capacity(ports.len() + TRANS_HEADER);
        header.push(TRANS_LIST);
        header.push(count);
        header.extend_from_slice(ports);
        self.emit(&header, payload, false)
    }

    fn emit(&self, header: &[u8], payload: &[u8], confirmed: bool) -> isn_layer::Result<usize> {
        let child = self.node.child()?;
        let mut packet = Vec::with_capacity(header.len() + payload.len());
        packet.extend_from_slice(header);
        packet.extend_from_slice(payload);
        let result = if confirmed {
            child.send_confirmed(&packet)
        } else {
            child.send(&packet)
        };
        match result {
            Ok(n) if n >= packet.len() => {
                self.counters.tx_packet(payload.len());
                Ok(payload.len())
            }
            Ok(_) => {
                self.counters.tx_dropped();
                Ok(0)
            }
            Err(err) => {
                self.counters.tx_dropped();
                Err(err)
            }
        }
    }

    fn route(&self, port: u8, payload: &[u8]) -> isn_layer::Result<usize> {
        let Some(handler) = self.ports.lookup(port) else {
            debug!(port, "no handler bound to port");
            self.counters.rx_error();
            return Ok(0);
        };
        let Some(layer) = handler.resolve() else {
            self.counters.rx_dropped();
            return Ok(0);
        };
        self.counters.rx_packet(payload.len());
        layer.recv(payload)
    }

    fn route_list(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        let count = buf.get(1).copied().unwrap_or(0) as usize;
        let Some(ports) = buf.get(TRANS_HEADER..TRANS_HEADER + count) else {
            self.counters.rx_error();
            return Ok(0);
        };
        let payload = &buf[TRANS_HEADER + count..];
        let mut delivered = None;
        let mut failure = None;
        for &port in ports {
            match self.route(port, payload) {
                Ok(n) => delivered = Some(delivered.unwrap_or(0).max(n)),
                Err(err) => {
                    debug!(port, %err, "listed port rejected payload");
                    self.counters.rx_dropped();
                    failure.get_or_insert(err);
                }
            }
        }
        match (delivered, failure) {
            (None, Some(err)) => Err(err),
            (delivered, _) => Ok(delivered.unwrap_or(0)),
        }
    }
}

impl Layer for Transport {
    fn name(&self) -> &'static str {
        "transport"
    }

    fn recv(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.node.ensure_initialized()?;
        match buf {
            [TRANS, port, payload @ ..] => self.route(*port, payload),
            [TRANS_LIST, _, ..] => self.route_list(buf),
            _ => {
                debug!(len = buf.len(), "malformed transport packet");
                self.counters.rx_error();
                Ok(0)
            }
        }
    }

    /// `buf` is `[port][payload ...]`.
    fn send(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        let (&port, payload) = buf.split_first().ok_or(LayerError::EmptyPacket)?;
        self.send_to(port, payload)
    }

    fn capacity(&self) -> usize {
        self.node
            .child()
            .map(|child| child.capacity().saturating_sub(TRANS_HEADER))
            .unwrap_or(0)
    }

    fn delivered(&self, report: &Delivery) {
        let [TRANS, port, ..] = report.packet.as_ref() else {
            return;
        };
        if let Some(layer) = self.ports.lookup(*port).and_then(|h| h.resolve()) {
            layer.delivered(&Delivery {
                status: report.status,
                packet: report.packet.slice(TRANS_HEADER..),
            });
        }
    }

    fn stats(&self) -> DriverStats {
        self.counters.snapshot()
    }
}

/// Child-side endpoint for one port, handed to upper layers as their child.
pub struct TransportPort {
    transport: Rc<Transport>,
    port: u8,
}

impl TransportPort {
    pub fn port(&self) -> u8 {
        self.port
    }
}

impl Layer for TransportPort {
    fn name(&self) -> &'static str {
        "transport-port"
    }

    fn recv(&self, _buf: &[u8]) -> isn_layer::Result<usize> {
        Err(LayerError::Unsupported {
            layer: "transport-port",
            operation: "recv",
        })
    }

    fn send(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.transport.emit(&[TRANS, self.port], buf, false)
    }

    fn send_confirmed(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.transport.emit(&[TRANS, self.port], buf, true)
    }

    fn capacity(&self) -> usize {
        self.transport.capacity()
    }
}
