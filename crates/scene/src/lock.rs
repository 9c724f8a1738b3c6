use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use render_queue::{EventId, RenderEventQueue};

/// Cross-thread lock guarding registry mutation and resource creation and
/// destruction. Not reentrant. Ownership is tracked per thread so that the
/// render thread can hold it across several queued events.
pub struct GeneralLock {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

impl Default for GeneralLock {
    fn default() -> Self { Self::new() }
}

impl GeneralLock {
    pub fn new() -> Self { Self { owner: Mutex::new(None), released: Condvar::new() } }

    pub fn lock(&self) -> GeneralGuard<'_> {
        self.acquire_raw();
        GeneralGuard { lock: self, _not_send: PhantomData }
    }

    /// Block until the lock is free, then take it for the calling thread.
    ///
    /// # Panics
    /// If the calling thread already owns the lock.
    pub fn acquire_raw(&self) {
        let me = thread::current().id();
        let mut owner = self.owner.lock();
        assert!(*owner != Some(me), "general lock re-acquired by its owning thread");
        while owner.is_some() {
            self.released.wait(&mut owner);
        }
        *owner = Some(me);
    }

    /// # Panics
    /// If the calling thread does not own the lock.
    pub fn release_raw(&self) {
        let me = thread::current().id();
        let mut owner = self.owner.lock();
        assert!(*owner == Some(me), "general lock released by a thread that does not own it");
        *owner = None;
        self.released.notify_one();
    }

    pub fn is_locked(&self) -> bool { self.owner.lock().is_some() }

    pub fn is_held_by_current_thread(&self) -> bool {
        *self.owner.lock() == Some(thread::current().id())
    }

    /// Queue an acquire so the render thread owns the lock until the matching
    /// [`unlock_on_render_thread`](Self::unlock_on_render_thread) event runs.
    pub fn lock_on_render_thread(self: &Arc<Self>, queue: &RenderEventQueue) -> Option<EventId> {
        let lock = self.clone();
        queue.queue(move || lock.acquire_raw())
    }

    pub fn unlock_on_render_thread(self: &Arc<Self>, queue: &RenderEventQueue) -> Option<EventId> {
        let lock = self.clone();
        queue.queue(move || lock.release_raw())
    }
}

/// Proof of holding the general lock. Released on drop, on the same thread.
pub struct GeneralGuard<'a> {
    lock: &'a GeneralLock,
    _not_send: PhantomData<*const ()>,
}

impl GeneralGuard<'_> {
    pub fn belongs_to(&self, lock: &GeneralLock) -> bool { std::ptr::eq(self.lock, lock) }
}

impl Drop for GeneralGuard<'_> {
    fn drop(&mut self) { self.lock.release_raw(); }
}
