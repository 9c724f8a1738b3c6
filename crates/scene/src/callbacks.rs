//! Routing of engine callbacks back to the managed object that asked for them.
//!
//! The engine invokes callbacks on its own threads with the opaque token it was
//! given at creation time. The token is resolved through a table of weak
//! references, so a callback arriving after its asset is gone is simply dropped.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use native_engine::{
    AdaptationSet, CorrelationToken, DataReceivedCallback, InitialisedCallback, Representation,
    SelectRepresentationCallback,
};
use parking_lot::Mutex;
use tracing::{error, trace};

/// Receiver of the engine's per-asset callbacks.
pub trait AssetCallbackTarget: Send + Sync {
    fn on_initialised(&self, error: i32);

    fn select_representation(&self, adaptation: &AdaptationSet, index: u32, candidates: &[Representation]) -> bool {
        let _ = adaptation;
        max_frame_rate_policy(index, candidates)
    }

    fn on_data_received(&self, _mime_type: &str, _codec: &str, _start_time: f32, _data: &[u8]) {}
}

/// Accept a representation iff its max frame rate equals the highest on offer.
pub fn max_frame_rate_policy(index: u32, candidates: &[Representation]) -> bool {
    let Some(candidate) = candidates.get(index as usize) else { return false };
    let max = candidates.iter().map(|r| r.max_fps).fold(f32::MIN, f32::max);
    candidate.max_fps == max
}

struct TableInner {
    next: usize,
    targets: HashMap<usize, Weak<dyn AssetCallbackTarget>>,
}

pub struct CallbackTable {
    inner: Mutex<TableInner>,
}

impl Default for CallbackTable {
    fn default() -> Self { Self::new() }
}

impl CallbackTable {
    pub fn new() -> Self { Self { inner: Mutex::new(TableInner { next: 1, targets: HashMap::new() }) } }

    pub fn register(&self, target: Weak<dyn AssetCallbackTarget>) -> CorrelationToken {
        let mut inner = self.inner.lock();
        let raw = inner.next;
        inner.next += 1;
        inner.targets.insert(raw, target);
        CorrelationToken::from_raw(raw)
    }

    pub fn release(&self, token: CorrelationToken) { self.inner.lock().targets.remove(&token.raw()); }

    pub fn resolve(&self, token: CorrelationToken) -> Option<Arc<dyn AssetCallbackTarget>> {
        let weak = self.inner.lock().targets.get(&token.raw()).cloned()?;
        weak.upgrade()
    }

    pub fn len(&self) -> usize { self.inner.lock().targets.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn dispatch_initialised(&self, error: i32, token: CorrelationToken) {
        if error != 0 {
            error!(error, token = token.raw(), "asset failed to initialise");
        }
        match self.resolve(token) {
            Some(target) => target.on_initialised(error),
            None => trace!(token = token.raw(), "initialised callback for released asset dropped"),
        }
    }

    pub fn dispatch_select_representation(
        &self,
        adaptation: &AdaptationSet,
        index: u32,
        candidates: &[Representation],
        token: CorrelationToken,
    ) -> bool {
        if index as usize >= candidates.len() {
            return false;
        }
        match self.resolve(token) {
            Some(target) => target.select_representation(adaptation, index, candidates),
            None => {
                trace!(token = token.raw(), "representation callback for released asset, taking last");
                index as usize == candidates.len() - 1
            }
        }
    }

    pub fn dispatch_data_received(&self, mime_type: &str, codec: &str, start_time: f32, data: &[u8], token: CorrelationToken) {
        match self.resolve(token) {
            Some(target) => target.on_data_received(mime_type, codec, start_time, data),
            None => trace!(token = token.raw(), "data callback for released asset dropped"),
        }
    }

    /// Engine-facing closures that forward into this table.
    pub fn engine_callbacks(self: &Arc<Self>) -> (InitialisedCallback, SelectRepresentationCallback, DataReceivedCallback) {
        let table = self.clone();
        let on_initialised: InitialisedCallback = Arc::new(move |error, token| table.dispatch_initialised(error, token));
        let table = self.clone();
        let on_select: SelectRepresentationCallback = Arc::new(move |adaptation: &AdaptationSet, index: u32, candidates: &[Representation], token: CorrelationToken| {
            table.dispatch_select_representation(adaptation, index, candidates, token)
        });
        let table = self.clone();
        let on_data: DataReceivedCallback = Arc::new(move |mime: &str, codec: &str, start: f32, data: &[u8], token: CorrelationToken| {
            table.dispatch_data_received(mime, codec, start, data, token)
        });
        (on_initialised, on_select, on_data)
    }
}
