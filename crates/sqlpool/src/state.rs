//! Idle/active bookkeeping.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::connection::ConnectionHandle;

/// The two handle lists of a pool.
///
/// Only ever touched with the owning pool's lock held. A handle lives in
/// exactly one list; `active[0]` is always the oldest checkout.
#[derive(Default)]
pub(crate) struct PoolState {
    /// Handles ready for reuse, taken from the front.
    pub(crate) idle: VecDeque<Arc<ConnectionHandle>>,
    /// Checked-out handles in acquisition order.
    pub(crate) active: Vec<Arc<ConnectionHandle>>,
}

impl PoolState {
    /// Remove `handle` from the active list, returning whether it was there.
    pub(crate) fn remove_active(&mut self, handle: &Arc<ConnectionHandle>) -> bool {
        match self.active.iter().position(|h| Arc::ptr_eq(h, handle)) {
            Some(index) => {
                self.active.remove(index);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self, max_active: usize, max_idle: usize) {
        use std::collections::HashSet;

        assert!(self.active.len() <= max_active, "active over bound");
        assert!(self.idle.len() <= max_idle, "idle over bound");

        let mut handles = HashSet::new();
        let mut raws = HashSet::new();
        for handle in self.idle.iter().chain(self.active.iter()) {
            assert!(handles.insert(handle.id), "handle listed twice");
            assert!(raws.insert(handle.raw.id), "raw connection listed twice");
        }
        assert!(self.idle.iter().all(|h| !h.is_in_use()), "idle handle in use");
    }
}
