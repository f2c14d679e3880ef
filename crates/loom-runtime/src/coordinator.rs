//! Single-flight build slot.
//!
//! At most one build of a unit is in flight at a time. Callers arriving
//! while it runs share its handle; the slot empties when the build settles
//! or when it is invalidated. Each started build carries a generation
//! number, so a superseded build that settles late neither clears the slot
//! of its successor nor counts as current.

use futures::future::{BoxFuture, FutureExt, Shared};
use loom_engine::Value;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Shared handle to one unit build; resolves to the index exports.
pub type SharedBuild = Shared<BoxFuture<'static, Option<Value>>>;

#[derive(Default)]
struct Slot {
    current: Option<(u64, SharedBuild)>,
}

#[derive(Default)]
pub struct InflightSlot {
    slot: Arc<Mutex<Slot>>,
    generation: Arc<AtomicU64>,
}

impl InflightSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle of the build in flight, or of a new one made by `start`.
    ///
    /// `start` receives the new build's generation. The build runs as a
    /// tokio task, so it completes even if every caller stops waiting.
    pub fn get_or_start<F, Fut>(&self, start: F) -> SharedBuild
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = Option<Value>> + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if let Some((_, handle)) = &slot.current {
            return handle.clone();
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "starting build");
        let build = start(generation);
        let owner: Weak<Mutex<Slot>> = Arc::downgrade(&self.slot);
        let task = tokio::spawn(async move {
            let exports = build.await;
            if let Some(slot) = owner.upgrade() {
                let mut slot = slot.lock();
                if matches!(&slot.current, Some((current, _)) if *current == generation) {
                    slot.current = None;
                }
            }
            exports
        });

        let handle = async move {
            match task.await {
                Ok(exports) => exports,
                Err(err) => {
                    warn!(generation, error = %err, "build task failed");
                    None
                }
            }
        }
        .boxed()
        .shared();
        slot.current = Some((generation, handle.clone()));
        handle
    }

    /// Forget the build in flight. It keeps running, but later callers
    /// start a new one.
    pub fn invalidate(&self) {
        if self.slot.lock().current.take().is_some() {
            debug!("in-flight build invalidated");
        }
    }

    pub fn is_inflight(&self) -> bool {
        self.slot.lock().current.is_some()
    }

    /// Generation of the most recently started build, 0 before any.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Shared view of the generation counter.
    pub fn generation_counter(&self) -> Arc<AtomicU64> {
        self.generation.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_callers_share_one_build() {
        let slot = InflightSlot::new();
        let starts = Arc::new(AtomicUsize::new(0));
        let (release, gate) = oneshot::channel::<()>();
        let mut gate = Some(gate);

        let mut handles = Vec::new();
        for _ in 0..3 {
            let starts = starts.clone();
            let gate = gate.take();
            handles.push(slot.get_or_start(move |_| async move {
                starts.fetch_add(1, Ordering::SeqCst);
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Some(Value::Number(7.0))
            }));
        }
        release.send(()).unwrap();
        for handle in handles {
            assert_eq!(handle.await.and_then(|v| v.as_number()), Some(7.0));
        }
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(slot.generation(), 1);
    }

    #[tokio::test]
    async fn test_slot_clears_on_settle() {
        let slot = InflightSlot::new();
        slot.get_or_start(|_| async { None }).await;
        assert!(!slot.is_inflight());
        slot.get_or_start(|_| async { None }).await;
        assert_eq!(slot.generation(), 2);
    }

    #[tokio::test]
    async fn test_late_settle_keeps_successor() {
        let slot = InflightSlot::new();
        let (release, gate) = oneshot::channel::<()>();
        let first = slot.get_or_start(move |_| async move {
            let _ = gate.await;
            None
        });
        slot.invalidate();

        let (_hold, pending) = oneshot::channel::<()>();
        let second = slot.get_or_start(move |generation| async move {
            let _ = pending.await;
            Some(Value::Number(generation as f64))
        });
        release.send(()).unwrap();
        first.await;

        assert!(slot.is_inflight());
        drop(second);
    }
}
