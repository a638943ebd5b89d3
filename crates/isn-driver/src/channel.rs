use std::time::Duration;

use isn_layer::{Counters, Layer, Node};
use tracing::trace;

/// Byte transport at the bottom of a stack.
///
/// `poll` reads whatever is available within `timeout`, hands it to the
/// parent layer and returns the number of bytes processed. It never blocks
/// longer than `timeout`. Counters are exposed through [`Layer::stats`].
pub trait DuplexChannel: Layer {
    fn write(&self, bytes: &[u8]) -> isn_layer::Result<usize>;

    fn poll(&self, timeout: Duration) -> isn_layer::Result<usize>;
}

/// Hand received bytes to the parent, counting what happens to them.
pub(crate) fn deliver(node: &Node, counters: &Counters, data: &[u8]) -> usize {
    let parent = match node.try_parent() {
        Ok(Some(parent)) => parent,
        _ => {
            trace!(driver = node.name(), len = data.len(), "no parent, dropping input");
            counters.rx_dropped();
            return 0;
        }
    };
    match parent.recv(data) {
        Ok(used) => {
            counters.rx_packet(data.len());
            used
        }
        Err(err) => {
            trace!(driver = node.name(), %err, "parent rejected input");
            counters.rx_dropped();
            0
        }
    }
}
