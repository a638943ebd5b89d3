use std::rc::Rc;

use isn_layer::proto::is_user;
use isn_layer::{Counters, DriverStats, Layer, LayerRef, Node};
use tracing::debug;

use crate::error::{Result, RouteError};

/// Raw user protocol (tags 0x01..=0x07).
///
/// Prefixes the user id on send and strips it on receive, so the
/// application above sees bare payloads.
pub struct UserLayer {
    node: Node,
    user: u8,
    counters: Counters,
}

impl UserLayer {
    pub fn new(user: u8) -> Result<Rc<Self>> {
        if !is_user(user) {
            return Err(RouteError::InvalidUser(user));
        }
        Ok(Rc::new(Self {
            node: Node::new("user"),
            user,
            counters: Counters::new(),
        }))
    }

    pub fn init(&self, child: Option<LayerRef>, parent: Option<LayerRef>) -> isn_layer::Result<()> {
        self.node.init(child, parent)
    }

    pub fn user(&self) -> u8 {
        self.user
    }
}

impl Layer for UserLayer {
    fn name(&self) -> &'static str {
        "user"
    }

    fn recv(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.node.ensure_initialized()?;
        let Some((&tag, payload)) = buf.split_first() else {
            self.counters.rx_error();
            return Ok(0);
        };
        if tag != self.user {
            debug!(tag, user = self.user, "packet for another user protocol");
            self.counters.rx_error();
            return Ok(0);
        }
        let Some(parent) = self.node.try_parent()? else {
            self.counters.rx_dropped();
            return Ok(0);
        };
        self.counters.rx_packet(payload.len());
        parent.recv(payload)
    }

    fn send(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        let child = self.node.child()?;
        let mut packet = Vec::with_capacity(buf.len() + 1);
        packet.push(self.user);
        packet.extend_from_slice(buf);
        match child.send(&packet) {
            Ok(n) if n >= packet.len() => {
                self.counters.tx_packet(buf.len());
                Ok(buf.len())
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

    fn capacity(&self) -> usize {
        self.node
            .child()
            .map(|child| child.capacity().saturating_sub(1))
            .unwrap_or(0)
    }

    fn stats(&self) -> DriverStats {
        self.counters.snapshot()
    }
}
