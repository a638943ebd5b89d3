//! Forwarding between independent stacks.
//!
//! A redirect sends everything it receives into its target. Two of them
//! bound crosswise form a bridge:
//!
//! ```text
//!   serial -> frame A --parent--> [to_right] --send--> frame B -> udp
//!   serial <- frame A <--send-- [to_left] <--parent-- frame B <- udp
//! ```

use std::cell::OnceCell;
use std::rc::Rc;

use isn_layer::{Counters, DriverStats, Layer, LayerError, LayerRef};
use tracing::debug;

pub struct Redirect {
    target: OnceCell<LayerRef>,
    fragment: bool,
    counters: Counters,
}

impl Redirect {
    pub fn new() -> Rc<Self> {
        Self::build(false)
    }

    /// A redirect that forwards the prefix the target has room for
    /// instead of dropping the packet.
    pub fn fragmenting() -> Rc<Self> {
        Self::build(true)
    }

    fn build(fragment: bool) -> Rc<Self> {
        Rc::new(Self {
            target: OnceCell::new(),
            fragment,
            counters: Counters::new(),
        })
    }

    pub fn init(&self, target: LayerRef) -> isn_layer::Result<()> {
        self.target
            .set(target)
            .map_err(|_| LayerError::AlreadyInitialized { layer: "redirect" })
    }

    fn forward(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        let target = self
            .target
            .get()
            .ok_or(LayerError::NotInitialized { layer: "redirect" })?;
        self.counters.rx_packet(buf.len());

        let room = target.capacity();
        let len = if buf.len() <= room {
            buf.len()
        } else if self.fragment && room > 0 {
            room
        } else {
            debug!(layer = target.name(), len = buf.len(), room, "target full, dropping");
            self.counters.tx_dropped();
            self.counters.tx_retry();
            return Ok(0);
        };

        match target.send(&buf[..len]) {
            Ok(n) => {
                self.counters.tx_packet(n);
                Ok(n)
            }
            Err(err) => {
                debug!(layer = target.name(), %err, "redirect failed");
                self.counters.tx_dropped();
                Ok(0)
            }
        }
    }
}

impl Layer for Redirect {
    fn name(&self) -> &'static str {
        "redirect"
    }

    fn recv(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.forward(buf)
    }

    fn send(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.forward(buf)
    }

    fn capacity(&self) -> usize {
        self.target.get().map(|t| t.capacity()).unwrap_or(0)
    }

    fn stats(&self) -> DriverStats {
        self.counters.snapshot()
    }
}

/// Pair of redirects splicing two stacks. Keep it alive for as long as
/// the bridge should run; the stacks only hold it weakly.
pub struct Bridge {
    /// Parent for the right-hand stack; sends into `left`.
    pub to_left: Rc<Redirect>,
    /// Parent for the left-hand stack; sends into `right`.
    pub to_right: Rc<Redirect>,
}

pub fn bridge(left: LayerRef, right: LayerRef) -> isn_layer::Result<Bridge> {
    let to_left = Redirect::new();
    let to_right = Redirect::new();
    to_left.init(left)?;
    to_right.init(right)?;
    Ok(Bridge { to_left, to_right })
}
