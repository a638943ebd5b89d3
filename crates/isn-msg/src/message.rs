//! Message layer: the catalog, its outbound queue and the query protocol.
//!
//! ```text
//!   arguments     [0x7F][num][args ...]
//!   descriptor    [0x7F][0x80 | num][descriptor text]
//!   request       [0x7F][num]                 (no arguments)
//! ```
//!
//! Number 127 asks for the whole catalog at once. Numbers past the end of
//! the table address the terminator, which tells the peer how many messages
//! there are.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use isn_layer::proto::MSG;
use isn_layer::{
    Clock, Counters, Delivery, DeliveryStatus, DriverStats, Layer, LayerError, LayerRef, Node,
    Tick, Timer,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::error::{MessageError, Result};
use crate::priority::{
    passes_lock, Priority, CLEAR, DESCRIPTION, DESCRIPTIONLOW, HIGHEST, LOW, MAX, QUERY_ARGS,
    QUERY_WAIT, UNLOCK_ARGS, UPDATE_ARGS,
};
use crate::queue::OutboundQueue;
use crate::table::{HandlerRef, MessageTable, NUM_LAST};

/// Flag on the message number marking a descriptor.
pub const DESCRIPTOR_FLAG: u8 = 0x80;
const HEADER: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    /// Log every message in and out at info level.
    pub verbose: bool,
    /// Ticks to wait for a reply before querying again.
    pub query_timeout: Tick,
    /// Re-sent queries before giving up on a reply.
    pub query_retries: u8,
    /// Send query requests with `send_confirmed`, so a lost request releases
    /// its lock as soon as the link gives up on it.
    pub confirm_queries: bool,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            query_timeout: 1000,
            query_retries: 3,
            confirm_queries: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockKind {
    /// Sent a request, waiting for arguments.
    Query,
    /// Sent arguments, waiting for the echo.
    Update,
}

impl LockKind {
    fn retry_priority(self) -> Priority {
        match self {
            LockKind::Query => QUERY_ARGS,
            LockKind::Update => UPDATE_ARGS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Lock {
    kind: LockKind,
    since: Tick,
    retries: u8,
}

/// Arguments received for one message, held until its handler runs.
struct Inbox {
    num: u8,
    data: Vec<u8>,
}

enum Step {
    Sent,
    Quiet,
    /// Child has no room right now.
    Stall,
}

pub struct Message {
    node: Node,
    table: MessageTable,
    config: MessageConfig,
    clock: Clock,
    queue: RefCell<OutboundQueue>,
    locks: RefCell<Vec<Option<Lock>>>,
    inbox: RefCell<Option<Inbox>>,
    running: Cell<Option<u8>>,
    handler_priority: Cell<Priority>,
    counters: Counters,
}

impl Message {
    /// Create the layer and queue every message at its table priority.
    pub fn new(table: MessageTable, config: MessageConfig, clock: &Clock) -> Rc<Self> {
        let mut queue = OutboundQueue::new(table.len());
        for (num, entry) in table.iter().enumerate() {
            queue.post(num as u8, entry.priority);
        }
        let locks = vec![None; table.len()];
        let message = Rc::new(Self {
            node: Node::new("msg"),
            table,
            config,
            clock: clock.clone(),
            queue: RefCell::new(queue),
            locks: RefCell::new(locks),
            inbox: RefCell::new(None),
            running: Cell::new(None),
            handler_priority: Cell::new(CLEAR),
            counters: Counters::new(),
        });
        let timer: Weak<dyn Timer> = Rc::downgrade(&message) as Weak<dyn Timer>;
        clock.register(timer);
        message
    }

    /// Link the layer: `child` carries packets toward the wire, `parent`
    /// (optional) sees every message packet received.
    pub fn init(&self, child: Option<LayerRef>, parent: Option<LayerRef>) -> isn_layer::Result<()> {
        self.node.init(child, parent)
    }

    pub fn table(&self) -> &MessageTable {
        &self.table
    }

    pub fn config(&self) -> &MessageConfig {
        &self.config
    }

    /// Queue message `num` at `priority`.
    ///
    /// Queued messages are only ever promoted. [`CLEAR`] removes the message
    /// and its query lock. A handler cannot re-queue its own message, and a
    /// message waiting for a reply only accepts description and
    /// [`UNLOCK_ARGS`] priorities.
    pub fn send(&self, num: u8, priority: Priority) -> Result<()> {
        if num as usize >= self.table.len() {
            return Err(MessageError::UnknownMessage(num));
        }
        if priority > MAX {
            return Err(MessageError::InvalidPriority { priority });
        }
        if self.running.get() == Some(num) {
            return Ok(());
        }
        if priority == CLEAR {
            self.queue.borrow_mut().remove(num);
            self.locks.borrow_mut()[num as usize] = None;
            self.discard_input(num);
            return Ok(());
        }
        if self.is_locked(num) && !passes_lock(priority) {
            trace!(num, priority, "message locked, send ignored");
            return Ok(());
        }
        self.queue.borrow_mut().post(num, priority);
        Ok(())
    }

    /// Queue the first message served by `handler`. Returns its number.
    pub fn sendqby(&self, handler: &HandlerRef, priority: Priority) -> Result<Option<u8>> {
        let Some(num) = self.table.find_handler(handler) else {
            return Ok(None);
        };
        self.send(num, priority)?;
        Ok(Some(num))
    }

    /// Priority the running handler was invoked with.
    pub fn handler_priority(&self) -> Priority {
        self.handler_priority.get()
    }

    /// The running handler was invoked by a peer request for its arguments.
    pub fn is_query(&self) -> bool {
        self.handler_priority.get() == HIGHEST
    }

    /// The running handler is answering an earlier query.
    pub fn is_reply(&self) -> bool {
        matches!(self.handler_priority.get(), QUERY_WAIT | QUERY_ARGS)
    }

    pub fn is_locked(&self, num: u8) -> bool {
        self.locks
            .borrow()
            .get(num as usize)
            .is_some_and(Option::is_some)
    }

    /// Messages waiting for a reply.
    pub fn pending(&self) -> usize {
        self.locks.borrow().iter().flatten().count()
    }

    /// Messages waiting in the outbound queue.
    pub fn queued(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Re-queue every unanswered query now. Returns how many were queued.
    pub fn resend_queries(&self) -> usize {
        let now = self.clock.now();
        let mut requeue = Vec::new();
        for (num, lock) in self.locks.borrow_mut().iter_mut().enumerate() {
            if let Some(lock) = lock {
                lock.since = now;
                requeue.push((num as u8, lock.kind.retry_priority()));
            }
        }
        let mut queue = self.queue.borrow_mut();
        for &(num, priority) in &requeue {
            queue.post(num, priority);
            self.counters.tx_retry();
        }
        requeue.len()
    }

    /// Send queued messages in priority order until the queue is empty or
    /// the child has no room. Returns the number of packets sent.
    pub fn schedule(&self) -> isn_layer::Result<usize> {
        let child = self.node.child()?.clone();
        self.expire_queries();
        let mut sent = 0;
        loop {
            if child.capacity() == 0 {
                break;
            }
            let Some((num, priority)) = self.queue.borrow_mut().pop() else {
                break;
            };
            match self.step(&child, num, priority)? {
                Step::Sent => sent += 1,
                Step::Quiet => {}
                Step::Stall => {
                    self.queue.borrow_mut().post(num, priority);
                    break;
                }
            }
        }
        Ok(sent)
    }

    fn step(&self, child: &LayerRef, num: u8, priority: Priority) -> isn_layer::Result<Step> {
        let Some(entry) = self.table.get(num) else {
            return Ok(Step::Quiet);
        };

        if priority >= DESCRIPTIONLOW {
            let descriptor = entry.descriptor.as_bytes();
            let step = self.emit(child, num | DESCRIPTOR_FLAG, descriptor, false)?;
            if !matches!(step, Step::Stall) {
                self.unlock(num);
                let next = if self.holds_input(num) { HIGHEST } else { LOW };
                self.queue.borrow_mut().post(num, next);
            }
            return Ok(step);
        }

        match priority {
            QUERY_ARGS => {
                // Input already arrived; answer it instead of asking again.
                if self.holds_input(num) {
                    let next = if self.is_locked(num) { QUERY_WAIT } else { HIGHEST };
                    self.queue.borrow_mut().post(num, next);
                    return Ok(Step::Quiet);
                }
                let step = self.emit(child, num, &[], self.config.confirm_queries)?;
                if matches!(step, Step::Sent) {
                    self.arm(num, LockKind::Query);
                }
                Ok(step)
            }
            QUERY_WAIT => {
                self.unlock(num);
                self.invoke(num, priority);
                Ok(Step::Quiet)
            }
            _ => {
                if priority == UNLOCK_ARGS {
                    self.unlock(num);
                }
                if child.capacity() < HEADER + entry.size {
                    debug!(num, size = entry.size, "arguments exceed child capacity");
                    self.counters.tx_dropped();
                    self.discard_input(num);
                    return Ok(Step::Quiet);
                }
                let Some(args) = self.invoke(num, priority) else {
                    return Ok(Step::Quiet);
                };
                if args.len() != entry.size {
                    warn!(
                        num,
                        expected = entry.size,
                        found = args.len(),
                        "handler returned wrong size"
                    );
                    self.counters.tx_dropped();
                    return Ok(Step::Quiet);
                }
                let step = self.emit(child, num, &args, false)?;
                if priority == UPDATE_ARGS && matches!(step, Step::Sent) {
                    self.arm(num, LockKind::Update);
                }
                Ok(step)
            }
        }
    }

    /// Run the handler of `num` with any received input.
    fn invoke(&self, num: u8, priority: Priority) -> Option<Vec<u8>> {
        let entry = self.table.get(num)?;
        let input = {
            let mut inbox = self.inbox.borrow_mut();
            match inbox.as_ref() {
                Some(held) if held.num == num => inbox.take().map(|held| held.data),
                _ => None,
            }
        };
        let Some(handler) = entry.handler.clone() else {
            return Some(vec![0; entry.size]);
        };
        self.running.set(Some(num));
        self.handler_priority.set(priority);
        let output = handler.call(input.as_deref());
        self.running.set(None);
        output
    }

    fn holds_input(&self, num: u8) -> bool {
        self.inbox.borrow().as_ref().is_some_and(|held| held.num == num)
    }

    fn discard_input(&self, num: u8) {
        let mut inbox = self.inbox.borrow_mut();
        if inbox.as_ref().is_some_and(|held| held.num == num) {
            *inbox = None;
        }
    }

    fn emit(
        &self,
        child: &LayerRef,
        flags: u8,
        data: &[u8],
        confirmed: bool,
    ) -> isn_layer::Result<Step> {
        let mut packet = Vec::with_capacity(HEADER + data.len());
        packet.push(MSG);
        packet.push(flags);
        packet.extend_from_slice(data);

        let room = child.capacity();
        if room == 0 {
            return Ok(Step::Stall);
        }
        if packet.len() > room {
            debug!(
                num = flags & !DESCRIPTOR_FLAG,
                len = packet.len(),
                room,
                "message too large for child"
            );
            self.counters.tx_dropped();
            return Ok(Step::Quiet);
        }

        let result = if confirmed {
            child.send_confirmed(&packet)
        } else {
            child.send(&packet)
        };
        match result {
            Ok(n) if n >= packet.len() => {
                if self.config.verbose {
                    info!(
                        num = flags & !DESCRIPTOR_FLAG,
                        descriptor = flags & DESCRIPTOR_FLAG != 0,
                        len = data.len(),
                        "msg sent"
                    );
                }
                self.counters.tx_packet(packet.len());
                Ok(Step::Sent)
            }
            Ok(_) | Err(LayerError::Busy { .. }) => Ok(Step::Stall),
            Err(err) => {
                debug!(%err, "message send failed");
                self.counters.tx_dropped();
                Ok(Step::Quiet)
            }
        }
    }

    fn arm(&self, num: u8, kind: LockKind) {
        let now = self.clock.now();
        let mut locks = self.locks.borrow_mut();
        let retries = match locks[num as usize] {
            Some(lock) if lock.kind == kind => lock.retries,
            _ => 0,
        };
        locks[num as usize] = Some(Lock {
            kind,
            since: now,
            retries,
        });
    }

    fn unlock(&self, num: u8) {
        if let Some(slot) = self.locks.borrow_mut().get_mut(num as usize) {
            *slot = None;
        }
    }

    /// Retry or give up on locks older than the query timeout.
    fn expire_queries(&self) {
        let now = self.clock.now();
        let mut requeue = Vec::new();
        let answered = self.inbox.borrow().as_ref().map(|held| held.num as usize);
        for (num, slot) in self.locks.borrow_mut().iter_mut().enumerate() {
            let Some(lock) = slot else { continue };
            // A held reply is waiting for its QUERY_WAIT turn.
            if answered == Some(num) {
                continue;
            }
            if self.clock.elapsed(lock.since) < self.config.query_timeout {
                continue;
            }
            if lock.retries < self.config.query_retries {
                lock.retries += 1;
                lock.since = now;
                self.counters.tx_retry();
                requeue.push((num as u8, lock.kind.retry_priority()));
            } else {
                debug!(num, "no reply, giving up");
                self.counters.tx_dropped();
                *slot = None;
            }
        }
        let mut queue = self.queue.borrow_mut();
        for (num, priority) in requeue {
            queue.post(num, priority);
        }
    }

    /// Queue whatever the packet asks for. False if it was discarded.
    fn on_message(&self, flags: u8, data: &[u8]) -> bool {
        let describe = flags & DESCRIPTOR_FLAG != 0;
        let mut num = flags & !DESCRIPTOR_FLAG;
        let mut data = data;
        let last = self.table.terminator();

        if num == NUM_LAST {
            let fill = if describe { DESCRIPTIONLOW } else { LOW };
            let mut queue = self.queue.borrow_mut();
            for i in 1..last {
                queue.post(i, fill);
            }
        }
        if num > last {
            num = last;
            data = &[];
        }
        if !data.is_empty() {
            let size = self.table.get(num).map_or(0, |e| e.size);
            if data.len() != size {
                debug!(num, expected = size, found = data.len(), "wrong argument size");
                self.counters.rx_error();
                return false;
            }
            let mut inbox = self.inbox.borrow_mut();
            if inbox.as_ref().is_some_and(|held| held.num != num) {
                trace!(num, "receive buffer busy");
                self.counters.rx_dropped();
                return false;
            }
            *inbox = Some(Inbox {
                num,
                data: data.to_vec(),
            });
        }

        let priority = if describe {
            DESCRIPTION
        } else if self.is_locked(num) {
            if data.is_empty() {
                trace!(num, "request while waiting for reply, ignored");
                return true;
            }
            QUERY_WAIT
        } else {
            HIGHEST
        };
        self.queue.borrow_mut().post(num, priority);
        true
    }
}

impl Timer for Message {
    fn on_tick(&self, _now: Tick) {
        self.expire_queries();
    }
}

impl Layer for Message {
    fn name(&self) -> &'static str {
        "msg"
    }

    fn recv(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.node.ensure_initialized()?;
        let [MSG, flags, data @ ..] = buf else {
            debug!(len = buf.len(), "not a message packet");
            self.counters.rx_error();
            return Ok(0);
        };
        if self.config.verbose {
            info!(
                num = flags & !DESCRIPTOR_FLAG,
                descriptor = flags & DESCRIPTOR_FLAG != 0,
                len = data.len(),
                "msg received"
            );
        }
        if self.on_message(*flags, data) {
            self.counters.rx_packet(buf.len());
        }
        if let Some(parent) = self.node.try_parent()? {
            parent.recv(buf)?;
        }
        Ok(buf.len())
    }

    /// Raw message packets from above go straight to the child.
    fn send(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        if buf.first() != Some(&MSG) {
            self.counters.tx_dropped();
            return Err(LayerError::Unbound(buf.first().copied().unwrap_or(0)));
        }
        self.node.child()?.send(buf)
    }

    fn capacity(&self) -> usize {
        self.node.child().map(|c| c.capacity()).unwrap_or(0)
    }

    fn delivered(&self, report: &Delivery) {
        let [MSG, num] = report.packet.as_ref() else {
            return;
        };
        if report.status == DeliveryStatus::Dropped && self.is_locked(*num) {
            debug!(num, "query request lost");
            self.unlock(*num);
            self.counters.tx_dropped();
        }
    }

    fn stats(&self) -> DriverStats {
        self.counters.snapshot()
    }
}
