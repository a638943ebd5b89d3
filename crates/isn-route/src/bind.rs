//! Bind tables map a protocol tag or port number to the layer that
//! handles it.
//!
//! Tables are declared at a fixed size, filled by index or in order, and
//! sealed before use. A sealed table is immutable.

use std::fmt;
use std::rc::Rc;

use isn_layer::{LayerRef, TableBuilder, WeakLayer};

use crate::error::{Result, RouteError};

/// What a binding matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Id(u8),
    /// Matches anything; only valid as the last binding.
    Any,
}

impl Route {
    fn matches(self, id: u8) -> bool {
        match self {
            Route::Id(own) => own == id,
            Route::Any => true,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Id(id) => write!(f, "0x{id:02x}"),
            Route::Any => f.write_str("any"),
        }
    }
}

impl From<u8> for Route {
    fn from(id: u8) -> Self {
        Route::Id(id)
    }
}

/// Target of a binding.
///
/// Application-ward layers are held weakly, like every parent link.
/// Terminal receivers (ping responders, sinks) have no other owner and are
/// held by the table.
#[derive(Clone)]
pub enum Handler {
    Layer(WeakLayer),
    Receiver(LayerRef),
}

impl Handler {
    pub fn layer(layer: &LayerRef) -> Self {
        Handler::Layer(Rc::downgrade(layer))
    }

    pub fn receiver(receiver: LayerRef) -> Self {
        Handler::Receiver(receiver)
    }

    /// The bound layer, unless it has been dropped.
    pub fn resolve(&self) -> Option<LayerRef> {
        match self {
            Handler::Layer(weak) => weak.upgrade(),
            Handler::Receiver(layer) => Some(layer.clone()),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolve() {
            Some(layer) => write!(f, "Handler({})", layer.name()),
            None => f.write_str("Handler(<dropped>)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub route: Route,
    pub handler: Handler,
}

/// Fixed-size table under construction.
pub struct BindTableBuilder {
    inner: TableBuilder<Binding>,
}

impl BindTableBuilder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: TableBuilder::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Append a binding, returning its slot.
    pub fn add(&mut self, route: impl Into<Route>, handler: Handler) -> Result<usize> {
        let route = route.into();
        self.check_unique(route, None)?;
        Ok(self.inner.add(Binding { route, handler })?)
    }

    /// Bind a specific slot.
    pub fn set(&mut self, index: usize, route: impl Into<Route>, handler: Handler) -> Result<usize> {
        let route = route.into();
        self.check_unique(route, Some(index))?;
        Ok(self.inner.set(index, Binding { route, handler })?)
    }

    fn check_unique(&self, route: Route, slot: Option<usize>) -> Result<()> {
        let taken = self
            .inner
            .iter()
            .any(|(index, binding)| Some(index) != slot && binding.route == route);
        if taken {
            return Err(RouteError::DuplicateRoute(route));
        }
        Ok(())
    }

    /// Finish the table. Every declared slot must be bound.
    pub fn seal(self) -> Result<BindTable> {
        let bindings = self.inner.seal()?;
        let last = bindings.len().saturating_sub(1);
        if let Some(index) = bindings
            .iter()
            .position(|binding| binding.route == Route::Any)
        {
            if index != last {
                return Err(RouteError::MisplacedCatchAll { index });
            }
        }
        Ok(BindTable { bindings })
    }
}

/// Sealed bind table.
#[derive(Debug, Clone)]
pub struct BindTable {
    bindings: Vec<Binding>,
}

impl BindTable {
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// First binding matching `id`.
    pub fn lookup(&self, id: u8) -> Option<&Handler> {
        self.bindings
            .iter()
            .find(|binding| binding.route.matches(id))
            .map(|binding| &binding.handler)
    }

    pub fn contains(&self, id: u8) -> bool {
        self.lookup(id).is_some()
    }

    pub fn routes(&self) -> impl Iterator<Item = Route> + '_ {
        self.bindings.iter().map(|binding| binding.route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isn_layer::{receiver, TableError};

    fn sink(name: &'static str) -> LayerRef {
        receiver(name, |buf| buf.len())
    }

    #[test]
    fn lookup_prefers_exact_then_catch_all() {
        let mut builder = BindTableBuilder::with_capacity(2);
        builder.add(0x7F, Handler::receiver(sink("msg"))).unwrap();
        builder.add(Route::Any, Handler::receiver(sink("rest"))).unwrap();
        let table = builder.seal().unwrap();

        assert_eq!(table.lookup(0x7F).unwrap().resolve().unwrap().name(), "msg");
        assert_eq!(table.lookup(0x01).unwrap().resolve().unwrap().name(), "rest");
        assert_eq!(table.routes().collect::<Vec<_>>(), vec![Route::Id(0x7F), Route::Any]);
    }

    #[test]
    fn set_fills_slots_out_of_order() {
        let mut builder = BindTableBuilder::with_capacity(2);
        builder.set(1, 0x00, Handler::receiver(sink("ping"))).unwrap();
        builder.set(0, 0x7F, Handler::receiver(sink("msg"))).unwrap();
        let table = builder.seal().unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.contains(0x00));
        assert!(!table.contains(0x01));
    }

    #[test]
    fn duplicate_routes_rejected() {
        let mut builder = BindTableBuilder::with_capacity(2);
        builder.add(0x7F, Handler::receiver(sink("a"))).unwrap();
        assert!(matches!(
            builder.add(0x7F, Handler::receiver(sink("b"))),
            Err(RouteError::DuplicateRoute(Route::Id(0x7F)))
        ));
        // Rebinding a slot to its own route is fine.
        builder.set(0, 0x7F, Handler::receiver(sink("c"))).unwrap();
    }

    #[test]
    fn catch_all_must_be_last() {
        let mut builder = BindTableBuilder::with_capacity(2);
        builder.add(Route::Any, Handler::receiver(sink("rest"))).unwrap();
        builder.add(0x7F, Handler::receiver(sink("msg"))).unwrap();
        assert!(matches!(
            builder.seal(),
            Err(RouteError::MisplacedCatchAll { index: 0 })
        ));
    }

    #[test]
    fn unfilled_table_does_not_seal() {
        let mut builder = BindTableBuilder::with_capacity(3);
        builder.add(0x7F, Handler::receiver(sink("msg"))).unwrap();
        assert!(matches!(
            builder.seal(),
            Err(RouteError::Table(TableError::SizeMismatch { expected: 3, found: 1 }))
        ));
    }

    #[test]
    fn dropped_layer_no_longer_resolves() {
        let layer = sink("gone");
        let handler = Handler::layer(&layer);
        assert!(handler.resolve().is_some());
        drop(layer);
        assert!(handler.resolve().is_none());
        assert_eq!(format!("{handler:?}"), "Handler(<dropped>)");
    }
}
