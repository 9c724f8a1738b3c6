use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    info_keys, AdaptationSet, AssetCreationInfo, AssetState, Bounds, ColourSpace, FrameContext, Handle,
    InitialiseInfo, LogEntry, LogLevel, Mat44, NativeEngine, NativePtr, RendererType, Representation,
    UniformValue, Vec3,
};

const FRAME_RATE: f32 = 30.0;
const DEFAULT_DURATION: f32 = 10.0;
const DEFAULT_VOXEL_COUNT: u32 = 250_000;

/// Most recent calls kept in the call log; older ones are dropped.
pub const CALL_LOG_CAPACITY: usize = 4096;

/// One recorded engine call, with the name of the thread that made it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCall {
    pub op: &'static str,
    pub target: Handle,
    pub arg: Handle,
    pub thread: Option<String>,
}

struct PlayerSim {
    detached: bool,
    frames_prepared: u32,
}

#[derive(Default)]
struct ActorSim {
    asset: Handle,
    render_method: Handle,
    transform: Mat44,
    uniforms: HashMap<String, UniformValue>,
}

struct AssetSim {
    info: AssetCreationInfo,
    state: AssetState,
    time: f32,
    duration: f32,
    looping: bool,
    last_update: Option<f32>,
}

struct RenderMethodSim {
    type_name: String,
    subroutines: String,
}

#[derive(Default)]
struct ViewportSim {
    view: Mat44,
    projection: Mat44,
    rect: [f32; 4],
    colour_space: ColourSpace,
    reverse_depth: bool,
}

enum Object {
    Player(PlayerSim),
    Actor(ActorSim),
    Asset(AssetSim),
    RenderMethod(RenderMethodSim),
    Viewport(ViewportSim),
}

struct Inner {
    initialised: bool,
    log_level: LogLevel,
    next_handle: i32,
    objects: HashMap<Handle, Object>,
    log: VecDeque<LogEntry>,
    calls: VecDeque<EngineCall>,
    render_method_types: Vec<String>,
    render_method_default: String,
}

impl Inner {
    fn allocate(&mut self, object: Object) -> Handle {
        let handle = Handle::from_raw(self.next_handle);
        self.next_handle += 1;
        self.objects.insert(handle, object);
        handle
    }

    fn record(&mut self, op: &'static str, target: Handle, arg: Handle) {
        let thread = std::thread::current().name().map(str::to_owned);
        if self.calls.len() == CALL_LOG_CAPACITY {
            self.calls.pop_front();
        }
        self.calls.push_back(EngineCall { op, target, arg, thread });
    }

    fn log(&mut self, level: LogLevel, message: String) {
        if level >= self.log_level && level != LogLevel::None {
            self.log.push_back(LogEntry { level, message });
        }
    }

    fn delete(&mut self, op: &'static str, handle: Handle, matches: fn(&Object) -> bool) {
        if self.objects.get(&handle).is_some_and(matches) {
            self.objects.remove(&handle);
            self.record(op, handle, Handle::INVALID);
            self.log(LogLevel::Debug, format!("{op} {handle}"));
        }
    }

    fn player(&mut self, h: Handle) -> Option<&mut PlayerSim> {
        match self.objects.get_mut(&h) { Some(Object::Player(p)) => Some(p), _ => None }
    }

    fn actor(&mut self, h: Handle) -> Option<&mut ActorSim> {
        match self.objects.get_mut(&h) { Some(Object::Actor(a)) => Some(a), _ => None }
    }

    fn asset(&mut self, h: Handle) -> Option<&mut AssetSim> {
        match self.objects.get_mut(&h) { Some(Object::Asset(a)) => Some(a), _ => None }
    }

    fn render_method(&mut self, h: Handle) -> Option<&mut RenderMethodSim> {
        match self.objects.get_mut(&h) { Some(Object::RenderMethod(r)) => Some(r), _ => None }
    }

    fn viewport(&mut self, h: Handle) -> Option<&mut ViewportSim> {
        match self.objects.get_mut(&h) { Some(Object::Viewport(v)) => Some(v), _ => None }
    }
}

/// In-process engine backend. Keeps playback state for every handle it hands
/// out and records the calls it receives, so callers can be exercised without
/// the native library.
pub struct SoftwareEngine {
    inner: Mutex<Inner>,
}

impl Default for SoftwareEngine {
    fn default() -> Self { Self::new() }
}

impl SoftwareEngine {
    pub fn new() -> Self {
        Self::with_render_method_types(&["PointSprite", "PointBlend", "InstancedCube"], "PointSprite")
    }

    pub fn with_render_method_types(types: &[&str], default: &str) -> Self {
        Self {
            inner: Mutex::new(Inner {
                initialised: false,
                log_level: LogLevel::default(),
                next_handle: 1,
                objects: HashMap::new(),
                log: VecDeque::new(),
                calls: VecDeque::with_capacity(64),
                render_method_types: types.iter().map(|t| t.to_string()).collect(),
                render_method_default: default.to_string(),
            }),
        }
    }

    pub fn calls(&self) -> Vec<EngineCall> { self.inner.lock().calls.iter().cloned().collect() }

    pub fn calls_named(&self, op: &str) -> Vec<EngineCall> {
        self.inner.lock().calls.iter().filter(|c| c.op == op).cloned().collect()
    }

    pub fn clear_calls(&self) { self.inner.lock().calls.clear(); }

    pub fn live_objects(&self) -> usize { self.inner.lock().objects.len() }

    pub fn push_log(&self, level: LogLevel, message: impl Into<String>) {
        self.inner.lock().log(level, message.into());
    }

    pub fn actor_asset(&self, actor: Handle) -> Handle {
        self.inner.lock().actor(actor).map_or(Handle::INVALID, |a| a.asset)
    }

    pub fn actor_render_method(&self, actor: Handle) -> Handle {
        self.inner.lock().actor(actor).map_or(Handle::INVALID, |a| a.render_method)
    }

    pub fn actor_transform(&self, actor: Handle) -> Option<Mat44> {
        self.inner.lock().actor(actor).map(|a| a.transform)
    }

    pub fn actor_uniform(&self, actor: Handle, name: &str) -> Option<UniformValue> {
        self.inner.lock().actor(actor).and_then(|a| a.uniforms.get(name).copied())
    }

    pub fn asset_path(&self, asset: Handle) -> Option<String> {
        self.inner.lock().asset(asset).map(|a| a.info.asset_path.clone())
    }

    pub fn asset_is_looping(&self, asset: Handle) -> bool {
        self.inner.lock().asset(asset).is_some_and(|a| a.looping)
    }

    pub fn set_asset_duration(&self, asset: Handle, duration: f32) {
        if let Some(a) = self.inner.lock().asset(asset) { a.duration = duration.max(0.0); }
    }

    pub fn render_method_type(&self, render_method: Handle) -> Option<String> {
        self.inner.lock().render_method(render_method).map(|r| r.type_name.clone())
    }

    pub fn render_method_subroutines(&self, render_method: Handle) -> Option<String> {
        self.inner.lock().render_method(render_method).map(|r| r.subroutines.clone())
    }

    pub fn viewport_reverse_depth(&self, viewport: Handle) -> Option<bool> {
        self.inner.lock().viewport(viewport).map(|v| v.reverse_depth)
    }

    pub fn viewport_colour_space(&self, viewport: Handle) -> Option<ColourSpace> {
        self.inner.lock().viewport(viewport).map(|v| v.colour_space)
    }

    pub fn viewport_rect(&self, viewport: Handle) -> Option<[f32; 4]> {
        self.inner.lock().viewport(viewport).map(|v| v.rect)
    }

    pub fn viewport_matrices(&self, viewport: Handle) -> Option<(Mat44, Mat44)> {
        self.inner.lock().viewport(viewport).map(|v| (v.view, v.projection))
    }

    pub fn player_frames_prepared(&self, player: Handle) -> u32 {
        self.inner.lock().player(player).map_or(0, |p| p.frames_prepared)
    }

    pub fn player_is_detached(&self, player: Handle) -> bool {
        self.inner.lock().player(player).is_some_and(|p| p.detached)
    }

    /// Finish loading an asset as the engine's loader thread would, then
    /// invoke its initialised callback on the calling thread.
    pub fn complete_initialisation(&self, asset: Handle, error: i32) {
        let callback = {
            let mut inner = self.inner.lock();
            let Some(sim) = inner.asset(asset) else { return };
            sim.state.remove(AssetState::INITIALISING);
            if error != 0 {
                sim.state.insert(AssetState::INVALID);
            } else if !sim.info.asset_path.starts_with("tcp") {
                sim.state.insert(AssetState::FULLY_CACHED);
            }
            let token = sim.info.user_data;
            sim.info.on_initialised.clone().map(|cb| (cb, token))
        };
        if let Some((cb, token)) = callback { cb(error, token); }
    }

    /// Ask the asset's representation callback about each candidate in turn.
    pub fn offer_representations(&self, asset: Handle, adaptation: &AdaptationSet, candidates: &[Representation]) -> Vec<bool> {
        let callback = {
            let mut inner = self.inner.lock();
            inner.asset(asset).and_then(|a| a.info.on_select_representation.clone().map(|cb| (cb, a.info.user_data)))
        };
        let Some((cb, token)) = callback else { return Vec::new() };
        (0..candidates.len()).map(|i| cb(adaptation, i as u32, candidates, token)).collect()
    }

    pub fn deliver_data(&self, asset: Handle, mime_type: &str, codec: &str, start_time: f32, data: &[u8]) {
        let callback = {
            let mut inner = self.inner.lock();
            inner.asset(asset).and_then(|a| a.info.on_data_received.clone().map(|cb| (cb, a.info.user_data)))
        };
        if let Some((cb, token)) = callback { cb(mime_type, codec, start_time, data, token); }
    }
}

impl NativeEngine for SoftwareEngine {
    fn initialise(&self, info: &InitialiseInfo) -> bool {
        let mut inner = self.inner.lock();
        inner.initialised = true;
        inner.log_level = info.log_level;
        let message = format!("initialised for {} {}", info.app_id, info.app_version);
        inner.log(LogLevel::Info, message);
        true
    }

    fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.initialised = false;
        inner.objects.clear();
    }

    fn update(&self) {
        self.inner.lock().record("update", Handle::INVALID, Handle::INVALID);
    }

    fn info(&self, key: &str) -> Option<String> {
        let version = env!("CARGO_PKG_VERSION");
        let mut parts = version.split('.');
        match key {
            info_keys::VERSION => Some(version.to_string()),
            info_keys::VERSION_MAJOR => parts.next().map(str::to_owned),
            info_keys::VERSION_MINOR => parts.nth(1).map(str::to_owned),
            info_keys::VERSION_REVISION => parts.nth(2).map(str::to_owned),
            info_keys::BUILD_INFO => Some("software".to_string()),
            info_keys::GIT_HASH => Some(String::new()),
            _ => None,
        }
    }

    fn pop_log_entry(&self) -> Option<LogEntry> { self.inner.lock().log.pop_front() }

    fn render_method_types(&self) -> Vec<String> { self.inner.lock().render_method_types.clone() }

    fn render_method_default(&self) -> String { self.inner.lock().render_method_default.clone() }

    fn player_create(&self, renderer: RendererType, _device: NativePtr) -> Handle {
        let mut inner = self.inner.lock();
        if renderer == RendererType::None {
            inner.log(LogLevel::Error, "player_create: no renderer".to_string());
            return Handle::INVALID;
        }
        let handle = inner.allocate(Object::Player(PlayerSim { detached: false, frames_prepared: 0 }));
        inner.record("player_create", handle, Handle::INVALID);
        debug!(%handle, ?renderer, "software player created");
        handle
    }

    fn player_delete(&self, player: Handle) {
        self.inner.lock().delete("player_delete", player, |o| matches!(o, Object::Player(_)));
    }

    fn player_is_valid(&self, player: Handle) -> bool { self.inner.lock().player(player).is_some() }

    fn player_detach(&self, player: Handle) {
        let mut inner = self.inner.lock();
        if let Some(p) = inner.player(player) {
            p.detached = true;
            inner.record("player_detach", player, Handle::INVALID);
        }
    }

    fn player_will_render(&self, player: Handle, actor: Handle, viewport: Handle) {
        let mut inner = self.inner.lock();
        if inner.player(player).is_some() && inner.actor(actor).is_some() && inner.viewport(viewport).is_some() {
            inner.record("player_will_render", player, actor);
        }
    }

    fn player_prepare_render(&self, player: Handle, _frame: &FrameContext) {
        let mut inner = self.inner.lock();
        if let Some(p) = inner.player(player) {
            p.frames_prepared += 1;
            inner.record("player_prepare_render", player, Handle::INVALID);
        }
    }

    fn player_render(&self, player: Handle, actor: Handle, viewport: Handle, _frame: &FrameContext) {
        let mut inner = self.inner.lock();
        if inner.player(player).is_some() && inner.actor(actor).is_some() && inner.viewport(viewport).is_some() {
            inner.record("player_render", player, actor);
        }
    }

    fn actor_create(&self) -> Handle {
        let mut inner = self.inner.lock();
        let handle = inner.allocate(Object::Actor(ActorSim::default()));
        inner.record("actor_create", handle, Handle::INVALID);
        handle
    }

    fn actor_delete(&self, actor: Handle) {
        self.inner.lock().delete("actor_delete", actor, |o| matches!(o, Object::Actor(_)));
    }

    fn actor_is_valid(&self, actor: Handle) -> bool { self.inner.lock().actor(actor).is_some() }

    fn actor_set_asset(&self, actor: Handle, asset: Handle) {
        let mut inner = self.inner.lock();
        if let Some(a) = inner.actor(actor) {
            a.asset = asset;
            inner.record("actor_set_asset", actor, asset);
        }
    }

    fn actor_set_render_method(&self, actor: Handle, render_method: Handle) {
        let mut inner = self.inner.lock();
        if let Some(a) = inner.actor(actor) {
            a.render_method = render_method;
            inner.record("actor_set_render_method", actor, render_method);
        }
    }

    fn actor_set_transform(&self, actor: Handle, transform: &Mat44) {
        if let Some(a) = self.inner.lock().actor(actor) { a.transform = *transform; }
    }

    fn actor_set_uniform(&self, actor: Handle, name: &str, value: UniformValue) {
        if let Some(a) = self.inner.lock().actor(actor) { a.uniforms.insert(name.to_string(), value); }
    }

    fn asset_create(&self, info: &AssetCreationInfo) -> Handle {
        let mut inner = self.inner.lock();
        if info.asset_path.is_empty() {
            inner.log(LogLevel::Warning, "asset_create: empty asset path".to_string());
            return Handle::INVALID;
        }
        let sim = AssetSim {
            info: info.clone(),
            state: AssetState::INITIALISING,
            time: 0.0,
            duration: DEFAULT_DURATION,
            looping: false,
            last_update: None,
        };
        let handle = inner.allocate(Object::Asset(sim));
        inner.record("asset_create", handle, Handle::INVALID);
        inner.log(LogLevel::Debug, format!("asset_create {handle} {}", info.asset_path));
        handle
    }

    fn asset_delete(&self, asset: Handle) {
        self.inner.lock().delete("asset_delete", asset, |o| matches!(o, Object::Asset(_)));
    }

    fn asset_is_valid(&self, asset: Handle) -> bool { self.inner.lock().asset(asset).is_some() }

    fn asset_update(&self, asset: Handle, absolute_time: f32) {
        let mut inner = self.inner.lock();
        let Some(a) = inner.asset(asset) else { return };
        if a.state.contains(AssetState::PLAYING) {
            if let Some(last) = a.last_update {
                a.time += (absolute_time - last).max(0.0);
                if a.time >= a.duration {
                    if a.looping && a.duration > 0.0 {
                        a.time %= a.duration;
                    } else {
                        a.time = a.duration;
                        a.state.remove(AssetState::PLAYING);
                    }
                }
            }
        }
        a.last_update = Some(absolute_time);
    }

    fn asset_play(&self, asset: Handle) {
        let mut inner = self.inner.lock();
        if let Some(a) = inner.asset(asset) {
            a.state.insert(AssetState::PLAYING);
            inner.record("asset_play", asset, Handle::INVALID);
        }
    }

    fn asset_pause(&self, asset: Handle) {
        let mut inner = self.inner.lock();
        if let Some(a) = inner.asset(asset) {
            a.state.remove(AssetState::PLAYING);
            inner.record("asset_pause", asset, Handle::INVALID);
        }
    }

    fn asset_seek(&self, asset: Handle, time: f32) {
        let mut inner = self.inner.lock();
        if let Some(a) = inner.asset(asset) {
            a.time = time.clamp(0.0, a.duration);
            inner.record("asset_seek", asset, Handle::INVALID);
        }
    }

    fn asset_step(&self, asset: Handle, frames: i32) {
        if let Some(a) = self.inner.lock().asset(asset) {
            a.state.remove(AssetState::PLAYING);
            a.time = (a.time + frames as f32 / FRAME_RATE).clamp(0.0, a.duration);
        }
    }

    fn asset_set_looping(&self, asset: Handle, looping: bool) {
        if let Some(a) = self.inner.lock().asset(asset) { a.looping = looping; }
    }

    fn asset_state(&self, asset: Handle) -> AssetState {
        self.inner.lock().asset(asset).map_or(AssetState::empty(), |a| a.state)
    }

    fn asset_bounds(&self, asset: Handle) -> Bounds {
        match self.inner.lock().asset(asset) {
            Some(_) => Bounds {
                center: Vec3 { x: 10.0, y: 90.0, z: -5.0 },
                half_dims: Vec3 { x: 50.0, y: 90.0, z: 40.0 },
            },
            None => Bounds::default(),
        }
    }

    fn asset_current_time(&self, asset: Handle) -> f32 {
        self.inner.lock().asset(asset).map_or(0.0, |a| a.time)
    }

    fn asset_actual_time(&self, asset: Handle) -> f32 {
        self.inner.lock().asset(asset).map_or(0.0, |a| (a.time * FRAME_RATE).floor() / FRAME_RATE)
    }

    fn asset_duration(&self, asset: Handle) -> f32 {
        self.inner.lock().asset(asset).map_or(0.0, |a| a.duration)
    }

    fn asset_voxel_count(&self, asset: Handle) -> u32 {
        self.inner.lock().asset(asset).map_or(0, |_| DEFAULT_VOXEL_COUNT)
    }

    fn render_method_create(&self, type_name: &str) -> Handle {
        let mut inner = self.inner.lock();
        if !inner.render_method_types.iter().any(|t| t == type_name) {
            inner.log(LogLevel::Warning, format!("render_method_create: unknown type {type_name}"));
            return Handle::INVALID;
        }
        let sim = RenderMethodSim { type_name: type_name.to_string(), subroutines: String::new() };
        let handle = inner.allocate(Object::RenderMethod(sim));
        inner.record("render_method_create", handle, Handle::INVALID);
        handle
    }

    fn render_method_delete(&self, render_method: Handle) {
        self.inner.lock().delete("render_method_delete", render_method, |o| matches!(o, Object::RenderMethod(_)));
    }

    fn render_method_is_valid(&self, render_method: Handle) -> bool {
        self.inner.lock().render_method(render_method).is_some()
    }

    fn render_method_set_shader_subroutines(&self, render_method: Handle, subroutines: &str) {
        if let Some(r) = self.inner.lock().render_method(render_method) { r.subroutines = subroutines.to_string(); }
    }

    fn viewport_create(&self) -> Handle {
        let mut inner = self.inner.lock();
        let handle = inner.allocate(Object::Viewport(ViewportSim::default()));
        inner.record("viewport_create", handle, Handle::INVALID);
        handle
    }

    fn viewport_delete(&self, viewport: Handle) {
        self.inner.lock().delete("viewport_delete", viewport, |o| matches!(o, Object::Viewport(_)));
    }

    fn viewport_is_valid(&self, viewport: Handle) -> bool { self.inner.lock().viewport(viewport).is_some() }

    fn viewport_set_view(&self, viewport: Handle, view: &Mat44) {
        if let Some(v) = self.inner.lock().viewport(viewport) { v.view = *view; }
    }

    fn viewport_set_projection(&self, viewport: Handle, projection: &Mat44) {
        if let Some(v) = self.inner.lock().viewport(viewport) { v.projection = *projection; }
    }

    fn viewport_set_dimensions(&self, viewport: Handle, x: f32, y: f32, width: f32, height: f32) {
        if let Some(v) = self.inner.lock().viewport(viewport) { v.rect = [x, y, width, height]; }
    }

    fn viewport_set_colour_space(&self, viewport: Handle, colour_space: ColourSpace) {
        if let Some(v) = self.inner.lock().viewport(viewport) { v.colour_space = colour_space; }
    }

    fn viewport_set_reverse_depth(&self, viewport: Handle, reverse: bool) {
        if let Some(v) = self.inner.lock().viewport(viewport) { v.reverse_depth = reverse; }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_handles_are_unique_and_never_zero() {
        let engine = SoftwareEngine::new();
        let a = engine.actor_create();
        let b = engine.viewport_create();
        engine.actor_delete(a);
        let c = engine.actor_create();
        assert!(a.is_valid() && b.is_valid() && c.is_valid());
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn test_delete_is_idempotent_and_type_checked() {
        let engine = SoftwareEngine::new();
        let actor = engine.actor_create();
        engine.asset_delete(actor);
        assert!(engine.actor_is_valid(actor));
        engine.actor_delete(actor);
        engine.actor_delete(actor);
        engine.actor_delete(Handle::INVALID);
        assert!(!engine.actor_is_valid(actor));
        assert_eq!(engine.calls_named("actor_delete").len(), 1);
    }

    #[test]
    fn test_call_log_keeps_only_newest_calls() {
        let engine = SoftwareEngine::new();
        let actor = engine.actor_create();
        for _ in 0..CALL_LOG_CAPACITY + 10 {
            engine.update();
        }
        let calls = engine.calls();
        assert_eq!(calls.len(), CALL_LOG_CAPACITY);
        assert!(calls.iter().all(|c| c.op == "update"));
        assert!(engine.calls_named("actor_create").is_empty());

        engine.actor_set_asset(actor, Handle::INVALID);
        assert_eq!(engine.calls().len(), CALL_LOG_CAPACITY);
        assert_eq!(engine.calls().last().map(|c| c.op), Some("actor_set_asset"));
        engine.clear_calls();
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_asset_creation_rejects_empty_path() {
        let engine = SoftwareEngine::new();
        assert_eq!(engine.asset_create(&AssetCreationInfo::new("")), Handle::INVALID);
        let asset = engine.asset_create(&AssetCreationInfo::new("clips/a"));
        assert!(engine.asset_state(asset).contains(AssetState::INITIALISING));
    }

    #[test]
    fn test_asset_playback_advances_and_stops_at_end() {
        let engine = SoftwareEngine::new();
        let asset = engine.asset_create(&AssetCreationInfo::new("clips/a"));
        engine.set_asset_duration(asset, 2.0);
        engine.asset_play(asset);
        engine.asset_update(asset, 10.0);
        engine.asset_update(asset, 11.5);
        assert!((engine.asset_current_time(asset) - 1.5).abs() < 1e-5);
        engine.asset_update(asset, 13.0);
        assert_eq!(engine.asset_current_time(asset), 2.0);
        assert!(!engine.asset_state(asset).contains(AssetState::PLAYING));
    }

    #[test]
    fn test_asset_looping_wraps() {
        let engine = SoftwareEngine::new();
        let asset = engine.asset_create(&AssetCreationInfo::new("clips/a"));
        engine.set_asset_duration(asset, 2.0);
        engine.asset_set_looping(asset, true);
        engine.asset_play(asset);
        engine.asset_update(asset, 0.0);
        engine.asset_update(asset, 2.5);
        assert!((engine.asset_current_time(asset) - 0.5).abs() < 1e-5);
        assert!(engine.asset_state(asset).contains(AssetState::PLAYING));
    }

    #[test]
    fn test_step_pauses_and_moves_by_frames() {
        let engine = SoftwareEngine::new();
        let asset = engine.asset_create(&AssetCreationInfo::new("clips/a"));
        engine.asset_play(asset);
        engine.asset_step(asset, 3);
        assert!(!engine.asset_state(asset).contains(AssetState::PLAYING));
        assert!((engine.asset_current_time(asset) - 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_complete_initialisation_invokes_callback_outside_lock() {
        let engine = Arc::new(SoftwareEngine::new());
        let seen = Arc::new(AtomicI32::new(-1));
        let mut info = AssetCreationInfo::new("clips/a");
        {
            let engine = engine.clone();
            let seen = seen.clone();
            info.on_initialised = Some(Arc::new(move |error, _token| {
                // Re-entering the engine from the callback must not deadlock.
                let _ = engine.live_objects();
                seen.store(error, Ordering::SeqCst);
            }));
        }
        let asset = engine.asset_create(&info);
        engine.complete_initialisation(asset, 0);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        let state = engine.asset_state(asset);
        assert!(!state.contains(AssetState::INITIALISING));
        assert!(state.contains(AssetState::FULLY_CACHED));
    }

    #[test]
    fn test_initialisation_error_marks_invalid() {
        let engine = SoftwareEngine::new();
        let asset = engine.asset_create(&AssetCreationInfo::new("tcp://10.0.0.1:9000"));
        engine.complete_initialisation(asset, 7);
        assert!(engine.asset_state(asset).contains(AssetState::INVALID));
    }

    #[test]
    fn test_unknown_render_method_type_fails() {
        let engine = SoftwareEngine::with_render_method_types(&["A"], "A");
        assert_eq!(engine.render_method_create("B"), Handle::INVALID);
        assert!(engine.render_method_create("A").is_valid());
    }

    #[test]
    fn test_log_entries_respect_level() {
        let engine = SoftwareEngine::new();
        engine.initialise(&InitialiseInfo { log_level: LogLevel::Warning, ..Default::default() });
        engine.push_log(LogLevel::Debug, "hidden");
        engine.push_log(LogLevel::Error, "shown");
        assert_eq!(engine.pop_log_entry().map(|e| e.message), Some("shown".to_string()));
        assert!(engine.pop_log_entry().is_none());
    }

    #[test]
    fn test_player_requires_renderer() {
        let engine = SoftwareEngine::new();
        assert_eq!(engine.player_create(RendererType::None, NativePtr::NULL), Handle::INVALID);
        let player = engine.player_create(RendererType::OpenGl, NativePtr::NULL);
        engine.player_detach(player);
        assert!(engine.player_is_detached(player));
    }

    #[test]
    fn test_info_keys() {
        let engine = SoftwareEngine::new();
        assert_eq!(engine.info(info_keys::VERSION).as_deref(), Some(env!("CARGO_PKG_VERSION")));
        assert_eq!(engine.info(info_keys::VERSION_MAJOR).as_deref(), Some("0"));
        assert!(engine.info("NOPE").is_none());
    }
}
