//! Delivery of analysis results onto the owner's main thread
//!
//! Decodes settle on worker threads. Results are posted into a
//! [`ResultBridge`] which marshals them onto the [`MainThread`] queue and
//! hands them to the observer only while the owning [`Lifecycle`] is active.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, trace};

use super::result::AnalyzeResult;

type Task = Box<dyn FnOnce() + Send>;

/// Single consumer task queue standing in for a UI thread.
///
/// Whichever thread drives `run_*` is the main thread.
pub struct MainThread {
    tx: flume::Sender<Task>,
    rx: flume::Receiver<Task>,
}

/// Cloneable handle for posting work onto a [`MainThread`]
#[derive(Clone)]
pub struct MainHandle {
    tx: flume::Sender<Task>,
}

impl Default for MainThread {
    fn default() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }
}

impl MainThread {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> MainHandle {
        MainHandle { tx: self.tx.clone() }
    }

    /// Run everything queued right now. Returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Run tasks as they arrive for `duration`.
    pub fn run_for(&self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut ran = 0;
        while let Ok(task) = self.rx.recv_deadline(deadline) {
            task();
            ran += 1;
        }
        ran
    }

    /// Run tasks until `done` returns true or `timeout` passes.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.run_pending();
            if done() {
                return true;
            }
            match self.rx.recv_deadline(deadline) {
                Ok(task) => task(),
                Err(_) => return done(),
            }
        }
    }
}

impl MainHandle {
    /// Queue `task`. Returns false when the main thread is gone.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Box::new(task)).is_ok()
    }
}

/// Owner lifecycle, ordered from dead to fully visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Destroyed,
    Initialized,
    Created,
    Started,
    Resumed,
}

impl LifecycleState {
    pub fn is_at_least(self, state: LifecycleState) -> bool {
        self >= state
    }

    /// Observers receive values only in Started or Resumed.
    pub fn is_active(self) -> bool {
        self.is_at_least(LifecycleState::Started)
    }
}

/// Observable lifecycle of a scanner owner
pub struct Lifecycle {
    state: watch::Sender<LifecycleState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        let (state, _) = watch::channel(LifecycleState::Initialized);
        Self { state }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, state: LifecycleState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(?previous, current = ?state, "lifecycle transition");
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }
}

type Observer<T> = Box<dyn FnMut(Option<AnalyzeResult<T>>) + Send>;

struct Slot<T> {
    pending: VecDeque<Option<AnalyzeResult<T>>>,
    observer: Option<Observer<T>>,
    severed: bool,
}

struct BridgeInner<T> {
    main: MainHandle,
    lifecycle: watch::Receiver<LifecycleState>,
    slot: Mutex<Slot<T>>,
}

/// Lifecycle-aware result slot.
///
/// `None` signals a failed or empty analysis. While the owner is active every
/// posted value reaches the observer once, in order, on the main thread.
/// While inactive only the newest value is kept and it is delivered on the
/// next activation. Destroying the owner severs the observer for good.
pub struct ResultBridge<T> {
    inner: Arc<BridgeInner<T>>,
}

impl<T> Clone for ResultBridge<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Send + 'static> ResultBridge<T> {
    pub fn new(main: MainHandle, lifecycle: &Lifecycle) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                main,
                lifecycle: lifecycle.subscribe(),
                slot: Mutex::new(Slot {
                    pending: VecDeque::new(),
                    observer: None,
                    severed: false,
                }),
            }),
        }
    }

    /// Register the observer, replacing any previous one.
    pub fn observe(&self, observer: impl FnMut(Option<AnalyzeResult<T>>) + Send + 'static) {
        {
            let mut slot = lock(&self.inner.slot);
            if slot.severed {
                return;
            }
            slot.observer = Some(Box::new(observer));
        }
        self.schedule();
    }

    /// Post a value from any thread.
    pub fn post(&self, value: Option<AnalyzeResult<T>>) {
        {
            let mut slot = lock(&self.inner.slot);
            if slot.severed {
                trace!("bridge severed, dropping result");
                return;
            }
            if !self.state().is_active() {
                slot.pending.clear();
            }
            slot.pending.push_back(value);
        }
        self.schedule();
    }

    /// Re-evaluate delivery after a lifecycle change.
    pub fn on_lifecycle_changed(&self) {
        self.schedule();
    }

    pub fn has_pending(&self) -> bool {
        !lock(&self.inner.slot).pending.is_empty()
    }

    fn state(&self) -> LifecycleState {
        *self.inner.lifecycle.borrow()
    }

    fn schedule(&self) {
        let bridge = self.clone();
        if !self.inner.main.post(move || bridge.dispatch()) {
            trace!("main thread gone, result not scheduled");
        }
    }

    /// Runs on the main thread.
    fn dispatch(&self) {
        let state = self.state();
        let mut slot = lock(&self.inner.slot);

        if state == LifecycleState::Destroyed {
            if !slot.severed {
                debug!("owner destroyed, severing result observer");
            }
            slot.severed = true;
            slot.observer = None;
            slot.pending.clear();
            return;
        }
        if !state.is_active() {
            while slot.pending.len() > 1 {
                slot.pending.pop_front();
            }
            return;
        }

        // The observer runs without the lock held so it may post again.
        let Some(mut observer) = slot.observer.take() else {
            return;
        };
        while let Some(value) = slot.pending.pop_front() {
            drop(slot);
            observer(value);
            slot = lock(&self.inner.slot);
            if slot.severed {
                return;
            }
        }
        if slot.observer.is_none() {
            slot.observer = Some(observer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{FrameMetadata, ImageFormat};
    use crate::pipeline::pool::FrameBufferPool;

    fn result(pool: &FrameBufferPool, value: u32) -> AnalyzeResult<u32> {
        AnalyzeResult::new(pool.acquire(2, 2), ImageFormat::Nv21, FrameMetadata::new(2, 2, 0), value)
    }

    fn collecting(bridge: &ResultBridge<u32>) -> Arc<Mutex<Vec<Option<u32>>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bridge.observe(move |value| sink.lock().unwrap().push(value.map(|r| *r.result())));
        seen
    }

    #[test]
    fn test_delivers_in_order_while_active() {
        let main = MainThread::new();
        let lifecycle = Lifecycle::new();
        lifecycle.set(LifecycleState::Resumed);
        let bridge = ResultBridge::new(main.handle(), &lifecycle);
        let seen = collecting(&bridge);
        let pool = FrameBufferPool::new();

        bridge.post(Some(result(&pool, 1)));
        bridge.post(None);
        assert!(seen.lock().unwrap().is_empty());

        main.run_pending();
        assert_eq!(*seen.lock().unwrap(), vec![Some(1), None]);
    }

    #[test]
    fn test_inactive_keeps_newest() {
        let main = MainThread::new();
        let lifecycle = Lifecycle::new();
        lifecycle.set(LifecycleState::Created);
        let bridge = ResultBridge::new(main.handle(), &lifecycle);
        let seen = collecting(&bridge);
        let pool = FrameBufferPool::new();

        bridge.post(Some(result(&pool, 1)));
        bridge.post(Some(result(&pool, 2)));
        main.run_pending();
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(pool.free_count(), 1);

        lifecycle.set(LifecycleState::Started);
        bridge.on_lifecycle_changed();
        main.run_pending();
        assert_eq!(*seen.lock().unwrap(), vec![Some(2)]);
    }

    #[test]
    fn test_destroyed_severs_observer() {
        let main = MainThread::new();
        let lifecycle = Lifecycle::new();
        lifecycle.set(LifecycleState::Resumed);
        let bridge = ResultBridge::new(main.handle(), &lifecycle);
        let seen = collecting(&bridge);

        lifecycle.set(LifecycleState::Destroyed);
        bridge.post(None);
        main.run_pending();

        lifecycle.set(LifecycleState::Resumed);
        bridge.post(None);
        main.run_pending();
        assert!(seen.lock().unwrap().is_empty());
    }
}
