use std::cell::{Cell, RefCell};
use std::rc::Rc;

use isn_layer::{Delivery, Layer, LayerError};

/// Records traffic in both directions.
pub(crate) struct Tap {
    pub name: &'static str,
    pub received: RefCell<Vec<Vec<u8>>>,
    pub sent: RefCell<Vec<Vec<u8>>>,
    pub confirmed: RefCell<Vec<Vec<u8>>>,
    pub reports: RefCell<Vec<Delivery>>,
    pub capacity: Cell<usize>,
    pub fail_sends: Cell<bool>,
    pub fail_recvs: Cell<bool>,
}

impl Tap {
    pub fn new(name: &'static str) -> Rc<Self> {
        Self::with_capacity(name, 256)
    }

    pub fn with_capacity(name: &'static str, capacity: usize) -> Rc<Self> {
        Rc::new(Self {
            name,
            received: RefCell::new(Vec::new()),
            sent: RefCell::new(Vec::new()),
            confirmed: RefCell::new(Vec::new()),
            reports: RefCell::new(Vec::new()),
            capacity: Cell::new(capacity),
            fail_sends: Cell::new(false),
            fail_recvs: Cell::new(false),
        })
    }

    fn accept(&self, log: &RefCell<Vec<Vec<u8>>>, buf: &[u8]) -> isn_layer::Result<usize> {
        if self.fail_sends.get() {
            return Err(LayerError::Busy { layer: self.name });
        }
        log.borrow_mut().push(buf.to_vec());
        Ok(buf.len())
    }
}

impl Layer for Tap {
    fn name(&self) -> &'static str {
        self.name
    }

    fn recv(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        if self.fail_recvs.get() {
            return Err(LayerError::Busy { layer: self.name });
        }
        self.received.borrow_mut().push(buf.to_vec());
        Ok(buf.len())
    }

    fn send(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.accept(&self.sent, buf)
    }

    fn send_confirmed(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.accept(&self.confirmed, buf)
    }

    fn capacity(&self) -> usize {
        self.capacity.get()
    }

    fn delivered(&self, report: &Delivery) {
        self.reports.borrow_mut().push(report.clone());
    }
}
