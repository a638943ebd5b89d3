//! Per-layer traffic counters.
//!
//! The serialized snapshot is nine little-endian `u32` fields with no
//! padding, in this order:
//!
//! ```text
//! ┌────────────┬────────────┬───────────┬────────────┬────────────┐
//! │ rx_packets │ rx_counter │ rx_errors │ rx_retries │ rx_dropped │
//! ├────────────┼────────────┼───────────┼────────────┼────────────┘
//! │ tx_packets │ tx_counter │ tx_dropped│ tx_retries │
//! └────────────┴────────────┴───────────┴────────────┘
//! ```

use std::cell::Cell;

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Size of a serialized [`DriverStats`] snapshot.
pub const STATS_WIRE_SIZE: usize = 9 * 4;

/// Snapshot of a layer's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverStats {
    /// Packets delivered upward.
    pub rx_packets: u32,
    /// Bytes delivered upward.
    pub rx_counter: u32,
    /// Corrupted or unroutable input.
    pub rx_errors: u32,
    /// Retransmissions received.
    pub rx_retries: u32,
    /// Input discarded without being an error (timeouts, dead handlers).
    pub rx_dropped: u32,
    /// Packets sent toward the wire.
    pub tx_packets: u32,
    /// Bytes sent toward the wire.
    pub tx_counter: u32,
    /// Packets given up on.
    pub tx_dropped: u32,
    /// Retransmissions sent.
    pub tx_retries: u32,
}

impl DriverStats {
    /// Serialize in wire order.
    pub fn to_bytes(&self) -> [u8; STATS_WIRE_SIZE] {
        let mut buf = BytesMut::with_capacity(STATS_WIRE_SIZE);
        self.encode(&mut buf);
        let mut out = [0u8; STATS_WIRE_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    /// Append the snapshot to `dst` in wire order.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(STATS_WIRE_SIZE);
        for value in self.fields() {
            dst.put_u32_le(value);
        }
    }

    /// Parse a snapshot. Returns `None` if `src` is shorter than
    /// [`STATS_WIRE_SIZE`]; trailing bytes are ignored.
    pub fn from_bytes(mut src: &[u8]) -> Option<Self> {
        if src.len() < STATS_WIRE_SIZE {
            return None;
        }
        Some(Self {
            rx_packets: src.get_u32_le(),
            rx_counter: src.get_u32_le(),
            rx_errors: src.get_u32_le(),
            rx_retries: src.get_u32_le(),
            rx_dropped: src.get_u32_le(),
            tx_packets: src.get_u32_le(),
            tx_counter: src.get_u32_le(),
            tx_dropped: src.get_u32_le(),
            tx_retries: src.get_u32_le(),
        })
    }

    fn fields(&self) -> [u32; 9] {
        [
            self.rx_packets,
            self.rx_counter,
            self.rx_errors,
            self.rx_retries,
            self.rx_dropped,
            self.tx_packets,
            self.tx_counter,
            self.tx_dropped,
            self.tx_retries,
        ]
    }
}

/// Interior-mutable counter block owned by a layer.
///
/// Counters saturate at `u32::MAX` and never decrease.
#[derive(Debug, Default)]
pub struct Counters {
    inner: Cell<DriverStats>,
}

fn bump(counter: &mut u32, by: usize) {
    let by = u32::try_from(by).unwrap_or(u32::MAX);
    *counter = counter.saturating_add(by);
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> DriverStats {
        self.inner.get()
    }

    fn update(&self, f: impl FnOnce(&mut DriverStats)) {
        let mut stats = self.inner.get();
        f(&mut stats);
        self.inner.set(stats);
    }

    pub fn rx_packet(&self, len: usize) {
        self.update(|s| {
            bump(&mut s.rx_packets, 1);
            bump(&mut s.rx_counter, len);
        });
    }

    pub fn rx_error(&self) {
        self.update(|s| bump(&mut s.rx_errors, 1));
    }

    pub fn rx_retry(&self) {
        self.update(|s| bump(&mut s.rx_retries, 1));
    }

    pub fn rx_dropped(&self) {
        self.update(|s| bump(&mut s.rx_dropped, 1));
    }

    pub fn tx_packet(&self, len: usize) {
        self.update(|s| {
            bump(&mut s.tx_packets, 1);
            bump(&mut s.tx_counter, len);
        });
    }

    pub fn tx_dropped(&self) {
        self.update(|s| bump(&mut s.tx_dropped, 1));
    }

    pub fn tx_retry(&self) {
        self.update(|s| bump(&mut s.tx_retries, 1));
    }
}
