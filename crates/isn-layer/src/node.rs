use std::cell::OnceCell;
use std::rc::Rc;

use tracing::debug;

use crate::error::{LayerError, Link, Result};
use crate::layer::{LayerRef, WeakLayer};

struct Links {
    child: Option<LayerRef>,
    parent: Option<WeakLayer>,
}

/// Child/parent links of a layer, set exactly once.
///
/// The child (wire-ward) is owned; the parent (application-ward) is held
/// weakly so a stack never forms an ownership cycle.
pub struct Node {
    name: &'static str,
    links: OnceCell<Links>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl Node {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            links: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Link the node. `None` marks the layer terminal in that direction.
    pub fn init(&self, child: Option<LayerRef>, parent: Option<LayerRef>) -> Result<()> {
        let links = Links {
            child,
            parent: parent.as_ref().map(Rc::downgrade),
        };
        self.links.set(links).map_err(|_| {
            debug!(layer = self.name, "second init rejected");
            LayerError::AlreadyInitialized { layer: self.name }
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.links.get().is_some()
    }

    fn links(&self) -> Result<&Links> {
        self.links
            .get()
            .ok_or(LayerError::NotInitialized { layer: self.name })
    }

    /// Fails if the node is not initialized yet.
    pub fn ensure_initialized(&self) -> Result<()> {
        self.links().map(|_| ())
    }

    /// The wire-ward layer.
    pub fn child(&self) -> Result<&LayerRef> {
        self.links()?.child.as_ref().ok_or(LayerError::Unlinked {
            layer: self.name,
            link: Link::Child,
        })
    }

    /// The application-ward layer, if it is still alive.
    pub fn parent(&self) -> Result<LayerRef> {
        self.links()?
            .parent
            .as_ref()
            .and_then(|p| p.upgrade())
            .ok_or(LayerError::Unlinked {
                layer: self.name,
                link: Link::Parent,
            })
    }

    /// Like [`parent`](Self::parent), but a terminal node yields `None`.
    pub fn try_parent(&self) -> Result<Option<LayerRef>> {
        Ok(self.links()?.parent.as_ref().and_then(|p| p.upgrade()))
    }
}
