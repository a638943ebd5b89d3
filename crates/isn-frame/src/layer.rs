//! Frame layer.
//!
//! Sits on a duplex channel and turns its byte stream into packets. Bytes
//! that are not part of a frame go to the optional `other` layer, which lets
//! two frame layers with different delimiters share one channel.
//!
//! Confirmed packets travel inside the frame control protocol:
//!
//! ```text
//! data: [0x80][0x01][seq][tag][payload...]
//! ack:  [0x80][0x02][seq]
//! ```
//!
//! Only one confirmed packet is outstanding at a time. It is retransmitted
//! every `ack_timeout` ticks until acknowledged or `max_retries` is reached.

use std::cell::{Cell, OnceCell, RefCell};
use std::rc::{Rc, Weak};

use bytes::{BufMut, Bytes, BytesMut};
use isn_layer::{
    proto, Clock, Counters, Delivery, DeliveryStatus, DriverStats, Layer, LayerError, LayerRef,
    Node, Tick, Timer,
};
use tracing::{debug, trace, warn};

use crate::codec::{Decoded, FrameCodec, FrameConfig, Packet};
use crate::error::{FrameError, Result};

/// Smallest usable `max_size`: a control header plus one tag byte.
pub const MIN_FRAME_SIZE: usize = CONTROL_HEADER + 1;

/// Control opcode carrying a confirmed packet.
pub const CTRL_DATA: u8 = 0x01;

/// Control opcode acknowledging a confirmed packet.
pub const CTRL_ACK: u8 = 0x02;

const CONTROL_HEADER: usize = 3;

/// Retransmission state of a frame layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    AwaitingAck { seq: u8, retries: u8 },
}

struct Outstanding {
    seq: u8,
    sent_at: Tick,
    retries: u8,
    wire: Bytes,
    packet: Bytes,
}

struct RxState {
    buf: BytesMut,
    last_rx: Tick,
    /// Last confirmed sequence number and when it was seen.
    last_seq: Option<(u8, Tick)>,
}

enum Expiry {
    Retransmit(Bytes),
    Drop(Bytes),
}

impl From<FrameError> for LayerError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::PayloadTooLarge { size, max } => LayerError::PacketTooLarge { size, max },
            FrameError::EmptyBody => LayerError::EmptyPacket,
            FrameError::Layer(err) => err,
            other => LayerError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                other.to_string(),
            )),
        }
    }
}

/// Framing layer over a duplex channel.
pub struct Frame {
    node: Node,
    other: OnceCell<Option<LayerRef>>,
    codec: FrameCodec,
    config: FrameConfig,
    clock: Clock,
    rx: RefCell<RxState>,
    outstanding: RefCell<Option<Outstanding>>,
    next_seq: Cell<u8>,
    counters: Counters,
}

impl Frame {
    /// Create a frame layer driven by `clock`.
    pub fn new(config: FrameConfig, clock: &Clock) -> Result<Rc<Self>> {
        config.validate()?;
        let frame = Rc::new(Self {
            node: Node::new("frame"),
            other: OnceCell::new(),
            codec: FrameCodec::from_config(&config),
            config,
            clock: clock.clone(),
            rx: RefCell::new(RxState {
                buf: BytesMut::new(),
                last_rx: clock.now(),
                last_seq: None,
            }),
            outstanding: RefCell::new(None),
            next_seq: Cell::new(0),
            counters: Counters::new(),
        });
        let timer: Weak<dyn Timer> = Rc::downgrade(&frame) as Weak<dyn Timer>;
        clock.register(timer);
        Ok(frame)
    }

    /// Link the layer: `child` carries wire bytes, `other` receives bytes
    /// outside of frames, `parent` receives decoded packets.
    pub fn init(
        &self,
        child: Option<LayerRef>,
        other: Option<LayerRef>,
        parent: Option<LayerRef>,
    ) -> isn_layer::Result<()> {
        self.node.init(child, parent)?;
        self.other
            .set(other)
            .map_err(|_| LayerError::AlreadyInitialized { layer: "frame" })
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn state(&self) -> RetryState {
        match self.outstanding.borrow().as_ref() {
            Some(o) => RetryState::AwaitingAck {
                seq: o.seq,
                retries: o.retries,
            },
            None => RetryState::Idle,
        }
    }

    /// Evaluate receive and retry timers against the clock.
    pub fn service(&self) {
        self.expire_partial();
        self.expire_outstanding();
    }

    fn expire_partial(&self) {
        let mut rx = self.rx.borrow_mut();
        if !rx.buf.is_empty() && self.clock.elapsed(rx.last_rx) > self.config.rx_timeout {
            debug!(discarded = rx.buf.len(), "frame receive timeout");
            rx.buf.clear();
            self.counters.rx_dropped();
        }
    }

    fn expire_outstanding(&self) {
        let expiry = {
            let mut outstanding = self.outstanding.borrow_mut();
            let Some(o) = outstanding.as_mut() else {
                return;
            };
            if self.clock.elapsed(o.sent_at) < self.config.ack_timeout {
                return;
            }
            if o.retries < self.config.max_retries {
                o.retries += 1;
                o.sent_at = self.clock.now();
                trace!(seq = o.seq, retry = o.retries, "retransmitting");
                Expiry::Retransmit(o.wire.clone())
            } else {
                let Some(o) = outstanding.take() else {
                    return;
                };
                warn!(
                    seq = o.seq,
                    retries = o.retries,
                    "confirmed packet dropped, no acknowledgement"
                );
                Expiry::Drop(o.packet)
            }
        };

        match expiry {
            Expiry::Retransmit(wire) => {
                self.counters.tx_retry();
                match self.node.child() {
                    Ok(child) => {
                        if let Err(err) = child.send(&wire) {
                            debug!(%err, "retransmission failed");
                        }
                    }
                    Err(err) => debug!(%err, "retransmission failed"),
                }
            }
            Expiry::Drop(packet) => {
                self.counters.tx_dropped();
                self.report(DeliveryStatus::Dropped, packet);
            }
        }
    }

    fn report(&self, status: DeliveryStatus, packet: Bytes) {
        if let Ok(Some(parent)) = self.node.try_parent() {
            parent.delivered(&Delivery { status, packet });
        }
    }

    /// Ticks from a first transmission to the last retransmission.
    fn retry_span(&self) -> Tick {
        self.config
            .ack_timeout
            .saturating_mul(Tick::from(self.config.max_retries) + 1)
    }

    fn body_limit(&self) -> usize {
        self.codec.max_size()
    }

    /// Frame `body` and hand it to the child. Returns the wire bytes.
    fn write_body(&self, body: &[u8]) -> isn_layer::Result<Bytes> {
        let mut wire = BytesMut::new();
        self.codec.encode(body, &mut wire)?;
        let wire = wire.freeze();
        let child = self.node.child()?;
        match child.send(&wire) {
            Ok(written) if written == wire.len() => {
                self.counters.tx_packet(body.len());
                Ok(wire)
            }
            Ok(written) => {
                debug!(written, expected = wire.len(), "short write, frame dropped");
                self.counters.tx_dropped();
                Err(LayerError::Busy {
                    layer: child.name(),
                })
            }
            Err(err) => {
                self.counters.tx_dropped();
                Err(err)
            }
        }
    }

    fn check_size(&self, len: usize, overhead: usize) -> isn_layer::Result<()> {
        if len == 0 {
            return Err(LayerError::EmptyPacket);
        }
        let max = self.body_limit() - overhead;
        if len > max {
            return Err(LayerError::PacketTooLarge { size: len, max });
        }
        Ok(())
    }

    fn drain(&self) {
        loop {
            let decoded = {
                let mut rx = self.rx.borrow_mut();
                self.codec.decode(&mut rx.buf)
            };
            match decoded {
                Ok(Some(Decoded::Packet(packet))) => self.on_packet(packet),
                Ok(Some(Decoded::Stray(bytes))) => self.on_stray(&bytes),
                Ok(None) => break,
                Err(err) => {
                    debug!(%err, "discarding corrupted frame");
                    self.counters.rx_error();
                }
            }
        }
    }

    fn on_stray(&self, bytes: &[u8]) {
        match self.other.get() {
            Some(Some(other)) => {
                if let Err(err) = other.recv(bytes) {
                    trace!(%err, "other layer rejected bytes");
                }
            }
            _ => trace!(len = bytes.len(), "ignoring bytes outside of frames"),
        }
    }

    fn on_packet(&self, packet: Packet) {
        if proto::protocol_of(packet.protocol) == proto::FRAME {
            self.on_control(&packet);
        } else {
            self.deliver(packet.body());
        }
    }

    fn deliver(&self, body: &[u8]) {
        match self.node.try_parent() {
            Ok(Some(parent)) => {
                self.counters.rx_packet(body.len());
                if let Err(err) = parent.recv(body) {
                    trace!(%err, "parent rejected packet");
                }
            }
            _ => self.counters.rx_dropped(),
        }
    }

    fn on_control(&self, packet: &Packet) {
        let payload = &packet.payload;
        match (payload.first(), payload.get(1)) {
            (Some(&CTRL_DATA), Some(&seq)) if payload.len() > 2 => {
                if let Err(err) = self.write_body(&[proto::FRAME, CTRL_ACK, seq]) {
                    debug!(%err, seq, "failed to send acknowledgement");
                }
                let duplicate = {
                    let mut rx = self.rx.borrow_mut();
                    let now = self.clock.now();
                    // Repeats older than the sender's whole retry span are a
                    // restarted peer, not a retransmission.
                    let duplicate = rx.last_seq.is_some_and(|(last, at)| {
                        last == seq && self.clock.elapsed(at) <= self.retry_span()
                    });
                    rx.last_seq = Some((seq, now));
                    duplicate
                };
                if duplicate {
                    trace!(seq, "duplicate confirmed packet");
                    self.counters.rx_retry();
                } else {
                    self.deliver(&payload[2..]);
                }
            }
            (Some(&CTRL_ACK), Some(&seq)) => {
                let acked = {
                    let mut outstanding = self.outstanding.borrow_mut();
                    match outstanding.as_ref() {
                        Some(o) if o.seq == seq => outstanding.take(),
                        _ => None,
                    }
                };
                match acked {
                    Some(o) => self.report(DeliveryStatus::Acked, o.packet),
                    None => trace!(seq, "stale acknowledgement"),
                }
            }
            _ => {
                debug!(len = payload.len(), "malformed frame control packet");
                self.counters.rx_error();
            }
        }
    }
}

impl Timer for Frame {
    fn on_tick(&self, _now: Tick) {
        self.service();
    }
}

impl Layer for Frame {
    fn name(&self) -> &'static str {
        "frame"
    }

    fn recv(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.node.ensure_initialized()?;
        self.expire_partial();
        {
            let mut rx = self.rx.borrow_mut();
            rx.buf.extend_from_slice(buf);
            rx.last_rx = self.clock.now();
        }
        self.drain();
        self.expire_outstanding();
        Ok(buf.len())
    }

    fn send(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.node.ensure_initialized()?;
        self.check_size(buf.len(), 0)?;
        self.write_body(buf)?;
        Ok(buf.len())
    }

    fn send_confirmed(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.node.ensure_initialized()?;
        self.check_size(buf.len(), CONTROL_HEADER)?;
        if self.outstanding.borrow().is_some() {
            return Err(LayerError::Busy { layer: "frame" });
        }

        let seq = self.next_seq.get();
        self.next_seq.set(seq.wrapping_add(1));
        let mut body = BytesMut::with_capacity(CONTROL_HEADER + buf.len());
        body.put_slice(&[proto::FRAME, CTRL_DATA, seq]);
        body.put_slice(buf);

        let wire = self.write_body(&body)?;
        *self.outstanding.borrow_mut() = Some(Outstanding {
            seq,
            sent_at: self.clock.now(),
            retries: 0,
            wire,
            packet: Bytes::copy_from_slice(buf),
        });
        Ok(buf.len())
    }

    fn capacity(&self) -> usize {
        let Ok(child) = self.node.child() else {
            return 0;
        };
        let overhead = self.config.mode.overhead(self.body_limit());
        child
            .capacity()
            .saturating_sub(overhead)
            .min(self.body_limit())
    }

    fn stats(&self) -> DriverStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FrameMode, SHORT_MAX_SIZE};
    use isn_driver::{DuplexChannel, LoopbackChannel};
    use isn_layer::{as_layer, receiver};
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        packets: RefCell<Vec<Vec<u8>>>,
        reports: RefCell<Vec<Delivery>>,
    }

    impl Layer for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }
        fn recv(&self, buf: &[u8]) -> isn_layer::Result<usize> {
            self.packets.borrow_mut().push(buf.to_vec());
            Ok(buf.len())
        }
        fn send(&self, _buf: &[u8]) -> isn_layer::Result<usize> {
            Ok(0)
        }
        fn capacity(&self) -> usize {
            0
        }
        fn delivered(&self, report: &Delivery) {
            self.reports.borrow_mut().push(report.clone());
        }
    }

    struct Side {
        chan: Rc<LoopbackChannel>,
        frame: Rc<Frame>,
        app: Rc<Recorder>,
    }

    impl Side {
        fn poll(&self) {
            self.chan.poll(Duration::ZERO).unwrap();
        }
    }

    fn link(config: FrameConfig) -> (Clock, Side, Side) {
        let clock = Clock::manual();
        let (left, right) = LoopbackChannel::pair();
        let build = |chan: Rc<LoopbackChannel>| {
            let frame = Frame::new(config, &clock).unwrap();
            let app = Rc::new(Recorder::default());
            frame
                .init(Some(as_layer(&chan)), None, Some(as_layer(&app)))
                .unwrap();
            chan.init(Some(as_layer(&frame))).unwrap();
            Side { chan, frame, app }
        };
        let a = build(left);
        let b = build(right);
        (clock, a, b)
    }

    #[test]
    fn packets_cross_the_link() {
        let (_clock, a, b) = link(FrameConfig::default());
        assert_eq!(a.frame.send(&[0x7F, 1, 2, 3]).unwrap(), 4);
        b.poll();
        assert_eq!(*b.app.packets.borrow(), vec![vec![0x7F, 1, 2, 3]]);
        assert_eq!(a.frame.stats().tx_packets, 1);
        assert_eq!(a.frame.stats().tx_counter, 4);
        assert_eq!(b.frame.stats().rx_packets, 1);
        assert_eq!(b.frame.stats().rx_errors, 0);
    }

    #[test]
    fn byte_at_a_time_delivery() {
        let (_clock, a, b) = link(FrameConfig::short());
        let mut wire = BytesMut::new();
        a.frame
            .codec
            .encode(&[0x00, 0xAA, 0xBB], &mut wire)
            .unwrap();
        for byte in wire.iter() {
            b.frame.recv(&[*byte]).unwrap();
        }
        assert_eq!(*b.app.packets.borrow(), vec![vec![0x00, 0xAA, 0xBB]]);
    }

    #[test]
    fn size_limits() {
        let (_clock, a, _b) = link(FrameConfig::short());
        assert!(matches!(a.frame.send(&[]), Err(LayerError::EmptyPacket)));
        assert!(matches!(
            a.frame.send(&[0; SHORT_MAX_SIZE + 1]),
            Err(LayerError::PacketTooLarge { max: 64, .. })
        ));
        assert!(matches!(
            a.frame.send_confirmed(&[0; SHORT_MAX_SIZE - 2]),
            Err(LayerError::PacketTooLarge { max: 61, .. })
        ));
        assert_eq!(a.frame.capacity(), SHORT_MAX_SIZE);
    }

    #[test]
    fn confirmed_send_is_acknowledged() {
        let (_clock, a, b) = link(FrameConfig::default());
        a.frame.send_confirmed(&[0x7F, 9]).unwrap();
        assert_eq!(a.frame.state(), RetryState::AwaitingAck { seq: 0, retries: 0 });

        b.poll();
        assert_eq!(*b.app.packets.borrow(), vec![vec![0x7F, 9]]);
        a.poll();
        assert_eq!(a.frame.state(), RetryState::Idle);
        assert_eq!(
            *a.app.reports.borrow(),
            vec![Delivery {
                status: DeliveryStatus::Acked,
                packet: Bytes::from_static(&[0x7F, 9]),
            }]
        );
        // Acks are not delivered as packets.
        assert!(a.app.packets.borrow().is_empty());
    }

    #[test]
    fn second_confirmed_send_is_busy() {
        let (_clock, a, _b) = link(FrameConfig::default());
        a.frame.send_confirmed(&[0x01]).unwrap();
        assert!(matches!(
            a.frame.send_confirmed(&[0x02]),
            Err(LayerError::Busy { .. })
        ));
        // Plain sends are unaffected.
        assert!(a.frame.send(&[0x03]).is_ok());
    }

    #[test]
    fn retransmission_is_delivered_once() {
        let config = FrameConfig {
            ack_timeout: 10,
            ..FrameConfig::default()
        };
        let (clock, a, b) = link(config);
        a.frame.send_confirmed(&[0x01, 0x42]).unwrap();
        clock.advance(9);
        assert_eq!(a.frame.stats().tx_retries, 0);
        clock.advance(1);
        assert_eq!(a.frame.stats().tx_retries, 1);
        assert_eq!(
            a.frame.state(),
            RetryState::AwaitingAck { seq: 0, retries: 1 }
        );

        b.poll();
        assert_eq!(*b.app.packets.borrow(), vec![vec![0x01, 0x42]]);
        assert_eq!(b.frame.stats().rx_retries, 1);

        a.poll();
        assert_eq!(a.frame.state(), RetryState::Idle);
        assert_eq!(a.app.reports.borrow().len(), 1);
    }

    #[test]
    fn repeated_sequence_after_idle_is_a_new_packet() {
        let (clock, a, b) = link(FrameConfig::default());
        let control = |body: &[u8]| {
            let mut packet = vec![proto::FRAME, CTRL_DATA, 0];
            packet.extend_from_slice(body);
            let mut wire = BytesMut::new();
            a.frame.codec.encode(&packet, &mut wire).unwrap();
            wire
        };

        b.chan.inject(&control(&[0x01, 0x42]));
        b.chan.inject(&control(&[0x01, 0x42]));
        b.poll();
        assert_eq!(b.frame.stats().rx_retries, 1);

        // The peer restarted and numbers from zero again.
        clock.advance(50 * 4 + 1);
        b.chan.inject(&control(&[0x01, 0x43]));
        b.poll();
        assert_eq!(
            *b.app.packets.borrow(),
            vec![vec![0x01, 0x42], vec![0x01, 0x43]]
        );
        assert_eq!(b.frame.stats().rx_retries, 1);
    }

    #[test]
    fn retries_exhausted_reports_drop() {
        let config = FrameConfig {
            ack_timeout: 5,
            max_retries: 2,
            ..FrameConfig::default()
        };
        let (clock, a, _b) = link(config);
        a.frame.send_confirmed(&[0x7F, 1]).unwrap();
        for _ in 0..3 {
            clock.advance(5);
        }
        let stats = a.frame.stats();
        assert_eq!(stats.tx_retries, 2);
        assert_eq!(stats.tx_dropped, 1);
        assert_eq!(a.frame.state(), RetryState::Idle);
        assert_eq!(
            *a.app.reports.borrow(),
            vec![Delivery {
                status: DeliveryStatus::Dropped,
                packet: Bytes::from_static(&[0x7F, 1]),
            }]
        );
        // Further ticks do nothing.
        clock.advance(50);
        assert_eq!(a.frame.stats().tx_retries, 2);
        assert!(a.frame.send_confirmed(&[0x7F, 2]).is_ok());
    }

    #[test]
    fn partial_frame_times_out() {
        let config = FrameConfig {
            rx_timeout: 4,
            ..FrameConfig::short()
        };
        let (clock, a, b) = link(config);
        let mut wire = BytesMut::new();
        a.frame.codec.encode(&[0x00, 1, 2], &mut wire).unwrap();

        b.chan.inject(&wire[..3]);
        b.poll();
        clock.advance(5);
        assert_eq!(b.frame.stats().rx_dropped, 1);

        // The tail of the stale frame is stray bytes; the next frame decodes.
        b.chan.inject(&wire[3..]);
        b.chan.inject(&wire);
        b.poll();
        assert_eq!(*b.app.packets.borrow(), vec![vec![0x00, 1, 2]]);
        assert_eq!(b.frame.stats().rx_errors, 0);
    }

    #[test]
    fn corrupted_frame_is_counted_not_delivered() {
        let (_clock, a, b) = link(FrameConfig::short());
        let mut wire = BytesMut::new();
        a.frame.codec.encode(&[0x7F, 5, 6, 7], &mut wire).unwrap();
        wire[4] ^= 0x10;
        b.chan.inject(&wire);
        b.poll();
        assert!(b.app.packets.borrow().is_empty());
        assert_eq!(b.frame.stats().rx_errors, 1);
    }

    #[test]
    fn stray_bytes_reach_other() {
        let clock = Clock::manual();
        let (left, _right) = LoopbackChannel::pair();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let terminal = receiver("terminal", move |buf| {
            log.borrow_mut().extend_from_slice(buf);
            buf.len()
        });
        let frame = Frame::new(FrameConfig::default(), &clock).unwrap();
        frame
            .init(Some(as_layer(&left)), Some(terminal), None)
            .unwrap();
        left.init(Some(as_layer(&frame))).unwrap();

        left.inject(b"boot ok\n");
        left.poll(Duration::ZERO).unwrap();
        assert_eq!(*seen.borrow(), b"boot ok\n".to_vec());
        assert_eq!(frame.stats().rx_errors, 0);
    }

    #[test]
    fn two_frames_share_one_channel() {
        let clock = Clock::manual();
        let (left, right) = LoopbackChannel::pair();
        let inner = FrameConfig {
            delimiter: 0x7E,
            ..FrameConfig::short()
        };

        // Receiving side: outer frame hands stray bytes to the inner frame.
        let outer_app = Rc::new(Recorder::default());
        let inner_app = Rc::new(Recorder::default());
        let outer = Frame::new(FrameConfig::short(), &clock).unwrap();
        let inner_rx = Frame::new(inner, &clock).unwrap();
        inner_rx
            .init(Some(as_layer(&right)), None, Some(as_layer(&inner_app)))
            .unwrap();
        outer
            .init(
                Some(as_layer(&right)),
                Some(as_layer(&inner_rx)),
                Some(as_layer(&outer_app)),
            )
            .unwrap();
        right.init(Some(as_layer(&outer))).unwrap();

        // Sending side: two frames writing into the same channel.
        let tx_outer = Frame::new(FrameConfig::short(), &clock).unwrap();
        let tx_inner = Frame::new(inner, &clock).unwrap();
        tx_outer.init(Some(as_layer(&left)), None, None).unwrap();
        tx_inner.init(Some(as_layer(&left)), None, None).unwrap();
        left.init(None).unwrap();

        tx_inner.send(&[0x01, b'h', b'i']).unwrap();
        tx_outer.send(&[0x7F, 0x00]).unwrap();
        right.poll(Duration::ZERO).unwrap();

        assert_eq!(*inner_app.packets.borrow(), vec![vec![0x01, b'h', b'i']]);
        assert_eq!(*outer_app.packets.borrow(), vec![vec![0x7F, 0x00]]);
        assert_eq!(outer.stats().rx_errors, 0);
        assert_eq!(inner_rx.stats().rx_errors, 0);
    }

    #[test]
    fn use_before_init_fails() {
        let clock = Clock::manual();
        let frame = Frame::new(FrameConfig::default(), &clock).unwrap();
        assert!(matches!(
            frame.send(&[1]),
            Err(LayerError::NotInitialized { .. })
        ));
        assert!(matches!(
            frame.recv(&[1]),
            Err(LayerError::NotInitialized { .. })
        ));
        assert_eq!(frame.capacity(), 0);
    }

    #[test]
    fn double_init_fails() {
        let clock = Clock::manual();
        let frame = Frame::new(FrameConfig::default(), &clock).unwrap();
        frame.init(None, None, None).unwrap();
        assert!(matches!(
            frame.init(None, None, None),
            Err(LayerError::AlreadyInitialized { .. })
        ));
    }

    #[test]
    fn invalid_config_rejected() {
        let clock = Clock::manual();
        let config = FrameConfig {
            mode: FrameMode::Short,
            max_size: 100,
            ..FrameConfig::default()
        };
        assert!(matches!(
            Frame::new(config, &clock),
            Err(FrameError::InvalidConfig { .. })
        ));
    }
}
