use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::{sync::Arc, thread, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

/// Identifier of a queued render event. Strictly increasing from 1 per queue.
pub type EventId = u64;

type RenderEvent = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("render drain dropped")]
    Disconnected,
    #[error("render thread panicked")]
    Panicked,
    #[error("failed to spawn render thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Host-side dispatch of render events (the graphics plugin event hook).
pub trait RenderPipeline: Send + Sync {
    fn issue(&self, _event: EventId) {}
}

/// Pipeline that dispatches nothing; the drain alone runs the events.
pub struct NoPipeline;

impl RenderPipeline for NoPipeline {}

/// Producer side. Cheap to clone; every clone feeds the same drain.
#[derive(Clone)]
pub struct RenderEventQueue {
    tx: Sender<(EventId, RenderEvent)>,
    last_id: Arc<Mutex<EventId>>,
    pipeline: Arc<dyn RenderPipeline>,
}

/// Consumer side. Exactly one exists per queue.
pub struct RenderDrain {
    rx: Receiver<(EventId, RenderEvent)>,
    last_executed: Option<EventId>,
}

impl RenderEventQueue {
    pub fn new() -> (Self, RenderDrain) { Self::with_pipeline(Arc::new(NoPipeline)) }

    pub fn with_pipeline(pipeline: Arc<dyn RenderPipeline>) -> (Self, RenderDrain) {
        let (tx, rx) = unbounded();
        let queue = RenderEventQueue { tx, last_id: Arc::new(Mutex::new(0)), pipeline };
        (queue, RenderDrain { rx, last_executed: None })
    }

    /// Schedule `event` to run once on the render thread.
    pub fn try_queue<F>(&self, event: F) -> Result<EventId, QueueError>
    where
        F: FnOnce() + Send + 'static,
    {
        let id = {
            // Id assignment and send happen together so drain order matches id order.
            let mut last = self.last_id.lock();
            let id = *last + 1;
            self.tx.send((id, Box::new(event))).map_err(|_| QueueError::Disconnected)?;
            *last = id;
            id
        };
        self.pipeline.issue(id);
        Ok(id)
    }

    /// Like [`try_queue`](Self::try_queue), logging instead of failing when the drain is gone.
    pub fn queue<F>(&self, event: F) -> Option<EventId>
    where
        F: FnOnce() + Send + 'static,
    {
        match self.try_queue(event) {
            Ok(id) => Some(id),
            Err(e) => { warn!("render event dropped: {e}"); None }
        }
    }

    pub fn last_id(&self) -> EventId { *self.last_id.lock() }
}

impl RenderDrain {
    /// Run everything queued so far on the calling thread. Returns how many ran.
    pub fn run_pending(&mut self) -> usize { self.run_up_to(usize::MAX) }

    /// Run at most `limit` events that are already queued, without waiting.
    pub fn run_up_to(&mut self, limit: usize) -> usize {
        let mut ran = 0;
        while ran < limit {
            match self.rx.try_recv() {
                Ok((id, event)) => { self.execute(id, event); ran += 1; }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        ran
    }

    /// Wait up to `timeout` for one event and run it.
    pub fn run_next_timeout(&mut self, timeout: Duration) -> Result<bool, QueueError> {
        match self.rx.recv_timeout(timeout) {
            Ok((id, event)) => { self.execute(id, event); Ok(true) }
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Err(QueueError::Disconnected),
        }
    }

    pub fn pending(&self) -> usize { self.rx.len() }

    pub fn last_executed(&self) -> Option<EventId> { self.last_executed }

    fn execute(&mut self, id: EventId, event: RenderEvent) {
        event();
        self.last_executed = Some(id);
    }
}

/// Dedicated thread that owns the drain and runs events as they arrive.
pub struct RenderThread {
    stop: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<RenderDrain>>,
}

impl RenderThread {
    pub fn spawn(mut drain: RenderDrain) -> Result<Self, QueueError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let worker = thread::Builder::new().name("render".into()).spawn(move || {
            loop {
                if stop_flag.load(Ordering::Acquire) {
                    // Events queued after this point are left for whoever takes the drain back.
                    let queued = drain.pending();
                    drain.run_up_to(queued);
                    break;
                }
                if drain.run_next_timeout(Duration::from_millis(5)).is_err() {
                    break;
                }
            }
            debug!(last = ?drain.last_executed(), "render thread exiting");
            drain
        })?;
        Ok(RenderThread { stop, worker: Some(worker) })
    }

    /// Stop after everything already queued has run, and hand the drain back.
    pub fn stop(mut self) -> Result<RenderDrain, QueueError> {
        self.stop.store(true, Ordering::Release);
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| QueueError::Panicked),
            None => Err(QueueError::Panicked),
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
