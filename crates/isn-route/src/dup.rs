//! Two children presented as one endpoint.
//!
//! ```text
//!                 parent
//!                   |
//!             [ Duplicator ]
//!              /          \
//!     [branch First]  [branch Second]   adapters, the children's parents
//!            |              |
//!         child 1        child 2
//! ```
//!
//! Sends are mirrored to both children. Packets arriving from either child
//! go to the parent, and the branch they came from is recorded.

use std::cell::{Cell, OnceCell};
use std::rc::{Rc, Weak};

use isn_layer::{Counters, Delivery, DriverStats, Layer, LayerError, LayerRef, Node};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    First,
    Second,
}

pub struct Duplicator {
    node: Node,
    children: OnceCell<[LayerRef; 2]>,
    branches: [Rc<DupBranch>; 2],
    last_origin: Cell<Option<Branch>>,
    dup_errors: Cell<u32>,
    counters: Counters,
}

impl Duplicator {
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|me: &Weak<Self>| Self {
            node: Node::new("dup"),
            children: OnceCell::new(),
            branches: [
                Rc::new(DupBranch {
                    dup: me.clone(),
                    branch: Branch::First,
                }),
                Rc::new(DupBranch {
                    dup: me.clone(),
                    branch: Branch::Second,
                }),
            ],
            last_origin: Cell::new(None),
            dup_errors: Cell::new(0),
            counters: Counters::new(),
        })
    }

    /// Link both children and the parent. Each child must use
    /// [`Duplicator::branch`] as its own parent.
    pub fn init(
        &self,
        first: LayerRef,
        second: LayerRef,
        parent: Option<LayerRef>,
    ) -> isn_layer::Result<()> {
        self.node.init(None, parent)?;
        self.children
            .set([first, second])
            .map_err(|_| LayerError::AlreadyInitialized { layer: "dup" })
    }

    /// Parent layer to hand to the child on `branch`.
    pub fn branch(&self, branch: Branch) -> LayerRef {
        let index = match branch {
            Branch::First => 0,
            Branch::Second => 1,
        };
        self.branches[index].clone()
    }

    /// Branch of the most recent inbound packet.
    pub fn last_origin(&self) -> Option<Branch> {
        self.last_origin.get()
    }

    /// Mirrored sends whose branches disagreed.
    pub fn dup_errors(&self) -> u32 {
        self.dup_errors.get()
    }

    fn children(&self) -> isn_layer::Result<&[LayerRef; 2]> {
        self.children
            .get()
            .ok_or(LayerError::NotInitialized { layer: "dup" })
    }

    fn forward_up(&self, origin: Option<Branch>, buf: &[u8]) -> isn_layer::Result<usize> {
        self.last_origin.set(origin);
        let Some(parent) = self.node.try_parent()? else {
            self.counters.rx_dropped();
            return Ok(0);
        };
        self.counters.rx_packet(buf.len());
        parent.recv(buf)
    }

    fn mirror(
        &self,
        buf: &[u8],
        send: impl Fn(&LayerRef) -> isn_layer::Result<usize>,
    ) -> isn_layer::Result<usize> {
        let [first, second] = self.children()?;
        let results = [send(first), send(second)];
        for (child, result) in [first, second].iter().zip(&results) {
            if let Err(err) = result {
                debug!(child = child.name(), %err, "branch send failed");
                self.counters.tx_dropped();
            }
        }
        let accepted = |r: &isn_layer::Result<usize>| r.as_ref().ok().copied();
        if accepted(&results[0]) != accepted(&results[1]) {
            self.dup_errors.set(self.dup_errors.get().saturating_add(1));
        }

        let [a, b] = results;
        match (a, b) {
            (Ok(x), Ok(y)) => {
                self.counters.tx_packet(buf.len());
                Ok(x.max(y))
            }
            (Ok(n), Err(_)) | (Err(_), Ok(n)) => {
                self.counters.tx_packet(buf.len());
                Ok(n)
            }
            (Err(err), Err(_)) => Err(err),
        }
    }
}

impl Layer for Duplicator {
    fn name(&self) -> &'static str {
        "dup"
    }

    fn recv(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.forward_up(None, buf)
    }

    fn send(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.mirror(buf, |child| child.send(buf))
    }

    fn send_confirmed(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.mirror(buf, |child| child.send_confirmed(buf))
    }

    /// The larger of the two, since a branch that cannot keep up loses
    /// packets on its own.
    fn capacity(&self) -> usize {
        self.children()
            .map(|[a, b]| a.capacity().max(b.capacity()))
            .unwrap_or(0)
    }

    fn delivered(&self, report: &Delivery) {
        if let Ok(Some(parent)) = self.node.try_parent() {
            parent.delivered(report);
        }
    }

    fn stats(&self) -> DriverStats {
        self.counters.snapshot()
    }
}

/// Parent adapter for one branch of a [`Duplicator`].
pub struct DupBranch {
    dup: Weak<Duplicator>,
    branch: Branch,
}

impl DupBranch {
    fn dup(&self) -> isn_layer::Result<Rc<Duplicator>> {
        self.dup.upgrade().ok_or(LayerError::Unlinked {
            layer: "dup-branch",
            link: isn_layer::Link::Parent,
        })
    }
}

impl Layer for DupBranch {
    fn name(&self) -> &'static str {
        "dup-branch"
    }

    fn recv(&self, buf: &[u8]) -> isn_layer::Result<usize> {
        self.dup()?.forward_up(Some(self.branch), buf)
    }

    fn send(&self, _buf: &[u8]) -> isn_layer::Result<usize> {
        Err(LayerError::Unsupported {
            layer: "dup-branch",
            operation: "send",
        })
    }

    fn capacity(&self) -> usize {
        0
    }

    fn delivered(&self, report: &Delivery) {
        if let Ok(dup) = self.dup() {
            dup.delivered(report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Tap;
    use isn_layer::as_layer;

    struct Fixture {
        dup: Rc<Duplicator>,
        first: Rc<Tap>,
        second: Rc<Tap>,
        app: Rc<Tap>,
    }

    fn fixture() -> Fixture {
        let dup = Duplicator::new();
        let first = Tap::new("first");
        let second = Tap::new("second");
        let app = Tap::new("app");
        dup.init(as_layer(&first), as_layer(&second), Some(as_layer(&app)))
            .unwrap();
        Fixture {
            dup,
            first,
            second,
            app,
        }
    }

    #[test]
    fn sends_are_mirrored() {
        let f = fixture();
        assert_eq!(f.dup.send(&[1, 2]).unwrap(), 2);
        f.dup.send_confirmed(&[3]).unwrap();
        assert_eq!(*f.first.sent.borrow(), vec![vec![1, 2]]);
        assert_eq!(*f.second.sent.borrow(), vec![vec![1, 2]]);
        assert_eq!(*f.second.confirmed.borrow(), vec![vec![3]]);
        assert_eq!(f.dup.dup_errors(), 0);
    }

    #[test]
    fn failing_branch_does_not_stop_the_other() {
        let f = fixture();
        f.first.fail_sends.set(true);
        assert_eq!(f.dup.send(&[9]).unwrap(), 1);
        assert_eq!(*f.second.sent.borrow(), vec![vec![9]]);
        assert_eq!(f.dup.stats().tx_dropped, 1);
        assert_eq!(f.dup.dup_errors(), 1);

        f.second.fail_sends.set(true);
        assert!(f.dup.send(&[9]).is_err());
        assert_eq!(f.dup.stats().tx_dropped, 3);
        assert_eq!(f.dup.dup_errors(), 1);
    }

    #[test]
    fn inbound_records_origin() {
        let f = fixture();
        assert_eq!(f.dup.last_origin(), None);
        f.dup.branch(Branch::Second).recv(&[5]).unwrap();
        assert_eq!(f.dup.last_origin(), Some(Branch::Second));
        f.dup.branch(Branch::First).recv(&[6]).unwrap();
        assert_eq!(f.dup.last_origin(), Some(Branch::First));
        assert_eq!(*f.app.received.borrow(), vec![vec![5], vec![6]]);
    }

    #[test]
    fn capacity_is_the_larger_branch() {
        let f = fixture();
        f.first.capacity.set(4);
        f.second.capacity.set(12);
        assert_eq!(f.dup.capacity(), 12);
    }

    #[test]
    fn branch_outliving_duplicator_is_unlinked() {
        let dup = Duplicator::new();
        let branch = dup.branch(Branch::First);
        drop(dup);
        assert!(matches!(
            branch.recv(&[1]),
            Err(LayerError::Unlinked { .. })
        ));
    }

    #[test]
    fn send_before_init_fails() {
        let dup = Duplicator::new();
        assert!(matches!(
            dup.send(&[1]),
            Err(LayerError::NotInitialized { layer: "dup" })
        ));
    }
}
