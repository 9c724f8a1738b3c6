use std::mem;
use std::sync::Arc;

use glam::Vec3;
use native_engine::{AdaptationSet, AssetCreationInfo, AssetState, CorrelationToken, Handle, Representation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::callbacks::{max_frame_rate_policy, AssetCallbackTarget};
use crate::config::BridgeConfig;
use crate::context::SceneContext;
use crate::registry::ResourceKind;

use super::report_create_failure;

/// Where an asset's data comes from, judged by its locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetSource {
    Local,
    Vod,
    RealTime,
}

impl AssetSource {
    pub fn from_locator(locator: &str) -> Self {
        if locator.starts_with("tcp") {
            AssetSource::RealTime
        } else if locator.ends_with("8imanifest") {
            AssetSource::Vod
        } else {
            AssetSource::Local
        }
    }

    pub fn is_streamed(self) -> bool { self != AssetSource::Local }
}

/// Bounds in host space: metres, X mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AssetBounds {
    pub center: Vec3,
    pub size: Vec3,
}

impl From<native_engine::Bounds> for AssetBounds {
    fn from(b: native_engine::Bounds) -> Self {
        let center: Vec3 = b.center.into();
        let half: Vec3 = b.half_dims.into();
        Self { center: center * Vec3::new(-1.0, 1.0, 1.0) * 0.01, size: half * 2.0 * 0.01 }
    }
}

/// Decides which stream representations the engine may use.
pub trait RepresentationPolicy: Send + Sync {
    fn accept(&self, adaptation: &AdaptationSet, index: u32, candidates: &[Representation]) -> bool;
}

impl<F> RepresentationPolicy for F
where
    F: Fn(&AdaptationSet, u32, &[Representation]) -> bool + Send + Sync,
{
    fn accept(&self, adaptation: &AdaptationSet, index: u32, candidates: &[Representation]) -> bool {
        self(adaptation, index, candidates)
    }
}

/// Accepts only representations running at the highest frame rate offered.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxFrameRate;

impl RepresentationPolicy for MaxFrameRate {
    fn accept(&self, _adaptation: &AdaptationSet, index: u32, candidates: &[Representation]) -> bool {
        max_frame_rate_policy(index, candidates)
    }
}

pub type InitialisedHook = Arc<dyn Fn(i32) + Send + Sync>;
pub type DataReceivedHook = Arc<dyn Fn(&str, &str, f32, &[u8]) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetOptions {
    pub cache_dir: Option<String>,
    /// Seconds buffered ahead for streamed sources.
    pub buffer_time: f32,
}

impl Default for AssetOptions {
    fn default() -> Self { Self { cache_dir: None, buffer_time: native_engine::DEFAULT_BUFFER_TIME } }
}

impl AssetOptions {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self { cache_dir: config.cache_dir.clone(), buffer_time: config.buffer_time }
    }
}

struct Hooks {
    policy: Arc<dyn RepresentationPolicy>,
    on_initialised: Option<InitialisedHook>,
    on_data_received: Option<DataReceivedHook>,
}

/// The part of an asset the callback table points at. Engine threads only
/// ever see this through a `Weak`.
struct AssetShared {
    hooks: Mutex<Hooks>,
    initialisation: Mutex<Option<i32>>,
}

impl AssetCallbackTarget for AssetShared {
    fn on_initialised(&self, error: i32) {
        *self.initialisation.lock() = Some(error);
        let hook = self.hooks.lock().on_initialised.clone();
        if let Some(hook) = hook {
            hook(error);
        }
    }

    fn select_representation(&self, adaptation: &AdaptationSet, index: u32, candidates: &[Representation]) -> bool {
        let policy = self.hooks.lock().policy.clone();
        policy.accept(adaptation, index, candidates)
    }

    fn on_data_received(&self, mime_type: &str, codec: &str, start_time: f32, data: &[u8]) {
        let hook = self.hooks.lock().on_data_received.clone();
        if let Some(hook) = hook {
            hook(mime_type, codec, start_time, data);
        }
    }
}

/// A volumetric clip opened by the engine.
pub struct Asset {
    ctx: Arc<SceneContext>,
    handle: Handle,
    token: CorrelationToken,
    locator: String,
    options: AssetOptions,
    looping: bool,
    shared: Arc<AssetShared>,
}

impl Asset {
    pub fn new(ctx: &Arc<SceneContext>, locator: &str) -> Self {
        Self::with_options(ctx, locator, AssetOptions::from_config(ctx.config()))
    }

    pub fn with_options(ctx: &Arc<SceneContext>, locator: &str, options: AssetOptions) -> Self {
        let shared = Arc::new(AssetShared {
            hooks: Mutex::new(Hooks { policy: Arc::new(MaxFrameRate), on_initialised: None, on_data_received: None }),
            initialisation: Mutex::new(None),
        });
        let mut asset = Self {
            ctx: ctx.clone(),
            handle: Handle::INVALID,
            token: CorrelationToken::NULL,
            locator: locator.to_string(),
            options,
            looping: false,
            shared,
        };
        asset.create();
        asset
    }

    /// (Re)open the locator. Callbacks from the engine are routed back through
    /// a fresh correlation token.
    pub fn create(&mut self) -> bool {
        self.delete();
        let target: Arc<dyn AssetCallbackTarget> = self.shared.clone();
        let token = self.ctx.callbacks().register(Arc::downgrade(&target));
        let (on_initialised, on_select, on_data) = self.ctx.callbacks().engine_callbacks();
        let mut info = AssetCreationInfo::new(self.locator.as_str()).with_buffer_time(self.options.buffer_time);
        if let Some(dir) = &self.options.cache_dir {
            info = info.with_cache_dir(dir.as_str());
        }
        info.user_data = token;
        info.on_initialised = Some(on_initialised);
        info.on_select_representation = Some(on_select);
        info.on_data_received = Some(on_data);

        *self.shared.initialisation.lock() = None;
        match self.ctx.create_object(ResourceKind::Asset, |engine| engine.asset_create(&info)) {
            Ok(handle) => {
                self.handle = handle;
                self.token = token;
                if self.looping {
                    self.ctx.engine().asset_set_looping(handle, true);
                }
                true
            }
            Err(e) => {
                self.ctx.callbacks().release(token);
                report_create_failure(ResourceKind::Asset, &e);
                false
            }
        }
    }

    pub fn delete(&mut self) {
        if !self.handle.is_valid() {
            return;
        }
        let handle = mem::replace(&mut self.handle, Handle::INVALID);
        self.ctx.destroy_object(ResourceKind::Asset, handle, |engine, h| engine.asset_delete(h));
        self.ctx.callbacks().release(mem::replace(&mut self.token, CorrelationToken::NULL));
    }

    pub fn is_valid(&self) -> bool { self.handle.is_valid() && self.ctx.engine().asset_is_valid(self.handle) }

    pub fn handle(&self) -> Handle { self.handle }

    pub fn correlation_token(&self) -> CorrelationToken { self.token }

    pub fn locator(&self) -> &str { &self.locator }

    pub fn source(&self) -> AssetSource { AssetSource::from_locator(&self.locator) }

    pub fn options(&self) -> &AssetOptions { &self.options }

    fn live(&self) -> Option<Handle> { self.handle.is_valid().then_some(self.handle) }

    pub fn update(&self, absolute_time: f32) {
        if let Some(h) = self.live() {
            self.ctx.engine().asset_update(h, absolute_time);
        }
    }

    pub fn play(&self) {
        if let Some(h) = self.live() {
            self.ctx.engine().asset_play(h);
        }
    }

    pub fn pause(&self) {
        if let Some(h) = self.live() {
            self.ctx.engine().asset_pause(h);
        }
    }

    pub fn seek(&self, time: f32) {
        if let Some(h) = self.live() {
            self.ctx.engine().asset_seek(h, time);
        }
    }

    /// Move by whole frames. Pauses playback.
    pub fn step(&self, frames: i32) {
        if let Some(h) = self.live() {
            self.ctx.engine().asset_step(h, frames);
        }
    }

    pub fn stop(&self) {
        self.pause();
        self.seek(0.0);
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
        if let Some(h) = self.live() {
            self.ctx.engine().asset_set_looping(h, looping);
        }
    }

    pub fn is_looping(&self) -> bool { self.looping }

    pub fn state(&self) -> AssetState { self.live().map_or(AssetState::empty(), |h| self.ctx.engine().asset_state(h)) }

    pub fn is_initialising(&self) -> bool { self.state().contains(AssetState::INITIALISING) }

    pub fn is_playing(&self) -> bool { self.state().contains(AssetState::PLAYING) }

    pub fn is_seeking(&self) -> bool { self.state().contains(AssetState::SEEKING) }

    pub fn is_caching(&self) -> bool { self.state().contains(AssetState::CACHING) }

    pub fn is_offline(&self) -> bool { self.state().contains(AssetState::OFFLINE) }

    pub fn is_fully_cached(&self) -> bool { self.state().contains(AssetState::FULLY_CACHED) }

    pub fn is_invalid(&self) -> bool { self.state().contains(AssetState::INVALID) }

    pub fn current_time(&self) -> f32 { self.live().map_or(0.0, |h| self.ctx.engine().asset_current_time(h)) }

    /// Time of the frame actually on screen.
    pub fn actual_time(&self) -> f32 { self.live().map_or(0.0, |h| self.ctx.engine().asset_actual_time(h)) }

    pub fn duration(&self) -> f32 { self.live().map_or(0.0, |h| self.ctx.engine().asset_duration(h)) }

    pub fn voxel_count(&self) -> u32 { self.live().map_or(0, |h| self.ctx.engine().asset_voxel_count(h)) }

    pub fn bounds(&self) -> AssetBounds {
        self.live().map_or(AssetBounds::default(), |h| self.ctx.engine().asset_bounds(h).into())
    }

    /// Error code from the engine's initialised callback, once it has fired.
    pub fn initialisation_result(&self) -> Option<i32> { *self.shared.initialisation.lock() }

    pub fn set_representation_policy(&self, policy: impl RepresentationPolicy + 'static) {
        self.shared.hooks.lock().policy = Arc::new(policy);
    }

    pub fn on_initialised(&self, hook: impl Fn(i32) + Send + Sync + 'static) {
        self.shared.hooks.lock().on_initialised = Some(Arc::new(hook));
    }

    pub fn on_data_received(&self, hook: impl Fn(&str, &str, f32, &[u8]) + Send + Sync + 'static) {
        self.shared.hooks.lock().on_data_received = Some(Arc::new(hook));
    }
}

impl Drop for Asset {
    fn drop(&mut self) { self.delete(); }
}
