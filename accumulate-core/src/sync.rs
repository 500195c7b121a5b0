//! Block-level synchronization: the in-flight delivery barrier and the
//! per-routing-bucket latches.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Number of routing buckets per block. Deliveries in distinct buckets run
/// in parallel; within a bucket they are serialized in consensus order.
pub const ROUTING_BUCKETS: u64 = 4;

/// Counts in-flight deliveries so commit can drain them.
#[derive(Default)]
pub struct WaitGroup {
    count: Mutex<usize>,
    cond: Condvar,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self) {
        *self.count.lock() += 1;
    }

    pub fn done(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.cond.notify_all();
        }
    }

    /// Blocks until every added delivery has called `done`.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.cond.wait(&mut count);
        }
    }
}

/// RAII guard pairing `WaitGroup::add` with `done`.
pub struct WaitGuard<'a>(&'a WaitGroup);

impl<'a> WaitGuard<'a> {
    pub fn enter(group: &'a WaitGroup) -> Self {
        group.add();
        Self(group)
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.done();
    }
}

/// One latch per routing bucket, created on demand and reset each block.
#[derive(Default)]
pub struct BucketLatches {
    latches: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl BucketLatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// The latch for a routing value. Hold its lock for the duration of the
    /// delivery.
    pub fn bucket(&self, routing: u64) -> Arc<Mutex<()>> {
        self.latches
            .lock()
            .entry(routing % ROUTING_BUCKETS)
            .or_default()
            .clone()
    }

    /// Drops every latch. Called at the start of each block.
    pub fn reset(&self) {
        self.latches.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn wait_group_drains() {
        let group = Arc::new(WaitGroup::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            group.add();
            let group = group.clone();
            let counter = counter.clone();
            handles.push(thread::spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                group.done();
            }));
        }

        group.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn same_bucket_shares_latch() {
        let latches = BucketLatches::new();
        let a = latches.bucket(1);
        let b = latches.bucket(1 + ROUTING_BUCKETS);
        assert!(Arc::ptr_eq(&a, &b));

        let c = latches.bucket(2);
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
