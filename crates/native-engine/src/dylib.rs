//! Binding to the engine's shared library through its C ABI.

use std::collections::{HashMap, VecDeque};
use std::ffi::{c_char, c_void, CStr, CString};
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use libloading::Library;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
    AdaptationSet, AssetCreationInfo, AssetState, Bounds, ColourSpace, CorrelationToken, DataReceivedCallback,
    EngineError, FrameContext, Handle, InitialiseInfo, InitialisedCallback, LogEntry, LogLevel, Mat44, NativeEngine,
    NativePtr, RendererType, Representation, SelectRepresentationCallback, UniformValue,
};

const STRING_BUFFER_LEN: usize = 256;

#[repr(C)]
struct CInitialiseInfo {
    struct_size: u32,
    app_id: *const c_char,
    app_version: *const c_char,
    api_key: *const c_char,
    extension_path: *const c_char,
    thread_pool_size: i32,
    log_callback: Option<LogFn>,
    log_level: i32,
}

#[repr(C)]
struct CAdaptationSet {
    mime_type: *const c_char,
    codec: *const c_char,
}

type LogFn = unsafe extern "C" fn(i32, *const c_char);
type InitialisedFn = unsafe extern "C" fn(isize, *mut c_void);
type SelectRepresentationFn =
    unsafe extern "C" fn(*const CAdaptationSet, u32, *const Representation, u32, *mut c_void) -> bool;
type DataReceivedFn = unsafe extern "C" fn(*const c_char, *const c_char, f32, *const u8, u32, *mut c_void);

#[repr(C)]
struct CAssetCreationInfo {
    struct_size: u32,
    asset_path: *const c_char,
    cache_dir: *const c_char,
    user_data: *mut c_void,
    on_initialised: Option<InitialisedFn>,
    on_select_representation: Option<SelectRepresentationFn>,
    on_data_received: Option<DataReceivedFn>,
    buffer_time: f32,
}

#[repr(C)]
struct CFrameContext {
    struct_size: u32,
    pixel_format: u32,
    command_queue: *mut c_void,
    command_encoder: *mut c_void,
}

impl From<&FrameContext> for CFrameContext {
    fn from(frame: &FrameContext) -> Self {
        Self {
            struct_size: std::mem::size_of::<CFrameContext>() as u32,
            pixel_format: frame.pixel_format,
            command_queue: frame.command_queue.addr() as *mut c_void,
            command_encoder: frame.command_encoder.addr() as *mut c_void,
        }
    }
}

macro_rules! engine_symbols {
    ($($field:ident = $symbol:literal : fn($($arg:ty),*) $(-> $ret:ty)?;)*) => {
        struct Symbols {
            $($field: unsafe extern "C" fn($($arg),*) $(-> $ret)?,)*
        }

        impl Symbols {
            /// # Safety
            /// The library must export each symbol with the declared signature.
            unsafe fn resolve(library: &Library) -> Result<Self, EngineError> {
                Ok(Self {
                    $($field: *library
                        .get::<unsafe extern "C" fn($($arg),*) $(-> $ret)?>(concat!($symbol, "\0").as_bytes())
                        .map_err(|_| EngineError::MissingSymbol($symbol))?,)*
                })
            }
        }
    };
}

engine_symbols! {
    interface_initialise = "Interface_Initialise": fn(*const CInitialiseInfo) -> bool;
    interface_shutdown = "Interface_Shutdown": fn();
    interface_update = "Interface_Update": fn();
    interface_get_info = "Interface_GetInfo": fn(*const c_char, *mut c_char, i32) -> bool;
    interface_render_method_type_count = "Interface_GetRenderMethodTypeCount": fn() -> usize;
    interface_render_method_type = "Interface_GetRenderMethodType": fn(usize, *mut c_char, i32) -> bool;
    interface_render_method_default = "Interface_GetRenderMethodDefault": fn(*mut c_char, i32) -> bool;

    player_create = "Player_Create": fn(i32, *mut c_void) -> i32;
    player_delete = "Player_Delete": fn(i32);
    player_is_valid = "Player_IsValid": fn(i32) -> bool;
    player_detach = "Player_Detach": fn(i32);
    player_will_render = "Player_WillRender": fn(i32, i32, i32);
    player_prepare_render = "Player_PrepareRender": fn(i32, *const CFrameContext);
    player_render = "Player_Render": fn(i32, i32, i32, *const CFrameContext);

    actor_create = "Actor_Create": fn() -> i32;
    actor_delete = "Actor_Delete": fn(i32);
    actor_is_valid = "Actor_IsValid": fn(i32) -> bool;
    actor_set_asset = "Actor_SetAsset": fn(i32, i32);
    actor_set_render_method = "Actor_SetRenderMethod": fn(i32, i32);
    actor_set_transform = "Actor_SetTransform": fn(i32, *const Mat44);
    actor_uniform_int = "Actor_SetSubroutineUniformInt": fn(i32, *const c_char, i32);
    actor_uniform_float = "Actor_SetSubroutineUniformFloat": fn(i32, *const c_char, f32);
    actor_uniform_vec2 = "Actor_SetSubroutineUniformVec2": fn(i32, *const c_char, *const crate::Vec2);
    actor_uniform_vec3 = "Actor_SetSubroutineUniformVec3": fn(i32, *const c_char, *const crate::Vec3);
    actor_uniform_vec4 = "Actor_SetSubroutineUniformVec4": fn(i32, *const c_char, *const crate::Vec4);
    actor_uniform_mat33 = "Actor_SetSubroutineUniformMat3x3": fn(i32, *const c_char, *const crate::Mat33);
    actor_uniform_mat44 = "Actor_SetSubroutineUniformMat4x4": fn(i32, *const c_char, *const Mat44);
    actor_uniform_texture = "Actor_SetSubroutineUniformTexture2D": fn(i32, *const c_char, i32, *mut c_void);

    asset_create = "Asset_CreateFromInfo": fn(*const CAssetCreationInfo) -> i32;
    asset_delete = "Asset_Delete": fn(i32);
    asset_is_valid = "Asset_IsValid": fn(i32) -> bool;
    asset_update = "Asset_Update": fn(i32, f32);
    asset_play = "Asset_Play": fn(i32);
    asset_pause = "Asset_Pause": fn(i32);
    asset_seek = "Asset_Seek": fn(i32, f32);
    asset_step = "Asset_Step": fn(i32, i32);
    asset_set_looping = "Asset_SetLooping": fn(i32, bool);
    asset_state = "Asset_GetState": fn(i32) -> i32;
    asset_bounds = "Asset_GetBounds": fn(i32) -> Bounds;
    asset_current_time = "Asset_GetCurrentTime": fn(i32) -> f32;
    asset_actual_time = "Asset_GetActualTime": fn(i32) -> f32;
    asset_duration = "Asset_GetDuration": fn(i32) -> f32;
    asset_voxel_count = "Asset_GetVoxelCount": fn(i32) -> usize;

    render_method_create = "RenderMethod_Create": fn(*const c_char) -> i32;
    render_method_delete = "RenderMethod_Delete": fn(i32);
    render_method_is_valid = "RenderMethod_IsValid": fn(i32) -> bool;
    render_method_set_shader_subroutines = "RenderMethod_SetShaderSubroutines": fn(i32, *const c_char);

    viewport_create = "Viewport_Create": fn() -> i32;
    viewport_delete = "Viewport_Delete": fn(i32);
    viewport_is_valid = "Viewport_IsValid": fn(i32) -> bool;
    viewport_set_view = "Viewport_SetViewMatrix": fn(i32, *const Mat44);
    viewport_set_projection = "Viewport_SetProjMatrix": fn(i32, *const Mat44);
    viewport_set_dimensions = "Viewport_SetDimensions": fn(i32, f32, f32, f32, f32);
    viewport_set_colour_space = "Viewport_SetColourSpace": fn(i32, i32);
    viewport_set_reverse_depth = "Viewport_SetReverseDepthEnabled": fn(i32, i32);
}

/// Callbacks of one asset, reached from the C trampolines by route id.
#[derive(Clone)]
struct Route {
    token: CorrelationToken,
    on_initialised: Option<InitialisedCallback>,
    on_select_representation: Option<SelectRepresentationCallback>,
    on_data_received: Option<DataReceivedCallback>,
}

fn routes() -> &'static Mutex<HashMap<usize, Route>> {
    static ROUTES: OnceLock<Mutex<HashMap<usize, Route>>> = OnceLock::new();
    ROUTES.get_or_init(|| Mutex::new(HashMap::new()))
}

fn engine_log() -> &'static Mutex<VecDeque<LogEntry>> {
    static LOG: OnceLock<Mutex<VecDeque<LogEntry>>> = OnceLock::new();
    LOG.get_or_init(|| Mutex::new(VecDeque::new()))
}

static NEXT_ROUTE: AtomicUsize = AtomicUsize::new(1);

fn route(user_data: *mut c_void) -> Option<Route> {
    let found = routes().lock().get(&(user_data as usize)).cloned();
    if found.is_none() {
        trace!(route = user_data as usize, "engine callback for unknown route dropped");
    }
    found
}

unsafe fn lossy(s: *const c_char) -> String {
    if s.is_null() { String::new() } else { CStr::from_ptr(s).to_string_lossy().into_owned() }
}

unsafe extern "C" fn log_trampoline(message_type: i32, message: *const c_char) {
    let message = lossy(message);
    engine_log().lock().push_back(LogEntry { level: LogLevel::from_code(message_type), message });
}

unsafe extern "C" fn initialised_trampoline(error: isize, user_data: *mut c_void) {
    if let Some(Route { token, on_initialised: Some(cb), .. }) = route(user_data) {
        cb(error as i32, token);
    }
}

unsafe extern "C" fn select_representation_trampoline(
    adaptation: *const CAdaptationSet,
    index: u32,
    representations: *const Representation,
    count: u32,
    user_data: *mut c_void,
) -> bool {
    let Some(Route { token, on_select_representation: Some(cb), .. }) = route(user_data) else {
        return count > 0 && index == count - 1;
    };
    let adaptation = match adaptation.as_ref() {
        Some(a) => AdaptationSet { mime_type: lossy(a.mime_type), codec: lossy(a.codec) },
        None => AdaptationSet::default(),
    };
    let candidates = if representations.is_null() || count == 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(representations, count as usize)
    };
    cb(&adaptation, index, candidates, token)
}

unsafe extern "C" fn data_received_trampoline(
    mime_type: *const c_char,
    codec: *const c_char,
    start_time: f32,
    data: *const u8,
    size: u32,
    user_data: *mut c_void,
) {
    if let Some(Route { token, on_data_received: Some(cb), .. }) = route(user_data) {
        let bytes = if data.is_null() { &[][..] } else { std::slice::from_raw_parts(data, size as usize) };
        cb(&lossy(mime_type), &lossy(codec), start_time, bytes, token);
    }
}

fn c_string(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

fn read_string(fill: impl FnOnce(*mut c_char, i32) -> bool) -> Option<String> {
    let mut buffer = vec![0u8; STRING_BUFFER_LEN];
    if !fill(buffer.as_mut_ptr() as *mut c_char, STRING_BUFFER_LEN as i32) {
        return None;
    }
    let text = CStr::from_bytes_until_nul(&buffer).ok()?;
    Some(text.to_string_lossy().into_owned())
}

/// Engine backed by the vendor shared library.
pub struct DylibEngine {
    api: Symbols,
    /// Asset handle to callback route.
    asset_routes: Mutex<HashMap<Handle, usize>>,
    _library: Library,
}

impl DylibEngine {
    pub fn load(path: &Path) -> Result<Self> {
        let library = unsafe {
            Library::new(path).with_context(|| format!("loading native engine '{}'", path.display()))?
        };
        let api = unsafe { Symbols::resolve(&library) }
            .with_context(|| format!("resolving engine symbols in '{}'", path.display()))?;
        debug!(path = %path.display(), "native engine loaded");
        Ok(Self { api, asset_routes: Mutex::new(HashMap::new()), _library: library })
    }

    fn with_name(&self, name: &str, f: impl FnOnce(*const c_char)) {
        let name = c_string(name);
        f(name.as_ptr());
    }
}

impl NativeEngine for DylibEngine {
    fn initialise(&self, info: &InitialiseInfo) -> bool {
        let app_id = c_string(&info.app_id);
        let app_version = c_string(&info.app_version);
        let api_key = info.api_key.as_deref().map(c_string);
        let extension_path = info.extension_path.as_deref().map(c_string);
        let raw = CInitialiseInfo {
            struct_size: std::mem::size_of::<CInitialiseInfo>() as u32,
            app_id: app_id.as_ptr(),
            app_version: app_version.as_ptr(),
            api_key: api_key.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            extension_path: extension_path.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            thread_pool_size: info.thread_pool_size,
            log_callback: Some(log_trampoline),
            log_level: info.log_level.code(),
        };
        unsafe { (self.api.interface_initialise)(&raw) }
    }

    fn shutdown(&self) { unsafe { (self.api.interface_shutdown)() } }

    fn update(&self) { unsafe { (self.api.interface_update)() } }

    fn info(&self, key: &str) -> Option<String> {
        let key = c_string(key);
        read_string(|buf, len| unsafe { (self.api.interface_get_info)(key.as_ptr(), buf, len) })
    }

    fn pop_log_entry(&self) -> Option<LogEntry> { engine_log().lock().pop_front() }

    fn render_method_types(&self) -> Vec<String> {
        let count = unsafe { (self.api.interface_render_method_type_count)() };
        (0..count)
            .filter_map(|i| read_string(|buf, len| unsafe { (self.api.interface_render_method_type)(i, buf, len) }))
            .collect()
    }

    fn render_method_default(&self) -> String {
        read_string(|buf, len| unsafe { (self.api.interface_render_method_default)(buf, len) }).unwrap_or_default()
    }

    fn player_create(&self, renderer: RendererType, device: NativePtr) -> Handle {
        Handle::from_raw(unsafe { (self.api.player_create)(renderer.code(), device.addr() as *mut c_void) })
    }

    fn player_delete(&self, player: Handle) {
        if player.is_valid() { unsafe { (self.api.player_delete)(player.raw()) } }
    }

    fn player_is_valid(&self, player: Handle) -> bool { unsafe { (self.api.player_is_valid)(player.raw()) } }

    fn player_detach(&self, player: Handle) { unsafe { (self.api.player_detach)(player.raw()) } }

    fn player_will_render(&self, player: Handle, actor: Handle, viewport: Handle) {
        unsafe { (self.api.player_will_render)(player.raw(), actor.raw(), viewport.raw()) }
    }

    fn player_prepare_render(&self, player: Handle, frame: &FrameContext) {
        let frame = CFrameContext::from(frame);
        unsafe { (self.api.player_prepare_render)(player.raw(), &frame) }
    }

    fn player_render(&self, player: Handle, actor: Handle, viewport: Handle, frame: &FrameContext) {
        let frame = CFrameContext::from(frame);
        unsafe { (self.api.player_render)(player.raw(), actor.raw(), viewport.raw(), &frame) }
    }

    fn actor_create(&self) -> Handle { Handle::from_raw(unsafe { (self.api.actor_create)() }) }

    fn actor_delete(&self, actor: Handle) {
        if actor.is_valid() { unsafe { (self.api.actor_delete)(actor.raw()) } }
    }

    fn actor_is_valid(&self, actor: Handle) -> bool { unsafe { (self.api.actor_is_valid)(actor.raw()) } }

    fn actor_set_asset(&self, actor: Handle, asset: Handle) {
        unsafe { (self.api.actor_set_asset)(actor.raw(), asset.raw()) }
    }

    fn actor_set_render_method(&self, actor: Handle, render_method: Handle) {
        unsafe { (self.api.actor_set_render_method)(actor.raw(), render_method.raw()) }
    }

    fn actor_set_transform(&self, actor: Handle, transform: &Mat44) {
        unsafe { (self.api.actor_set_transform)(actor.raw(), transform) }
    }

    fn actor_set_uniform(&self, actor: Handle, name: &str, value: UniformValue) {
        let a = actor.raw();
        self.with_name(name, |n| unsafe {
            match value {
                UniformValue::Int(v) => (self.api.actor_uniform_int)(a, n, v),
                UniformValue::Float(v) => (self.api.actor_uniform_float)(a, n, v),
                UniformValue::Vec2(v) => (self.api.actor_uniform_vec2)(a, n, &v),
                UniformValue::Vec3(v) => (self.api.actor_uniform_vec3)(a, n, &v),
                UniformValue::Vec4(v) => (self.api.actor_uniform_vec4)(a, n, &v),
                UniformValue::Mat33(v) => (self.api.actor_uniform_mat33)(a, n, &v),
                UniformValue::Mat44(v) => (self.api.actor_uniform_mat44)(a, n, &v),
                UniformValue::Texture2D { player, texture } => {
                    (self.api.actor_uniform_texture)(a, n, player.raw(), texture.addr() as *mut c_void)
                }
            }
        });
    }

    fn asset_create(&self, info: &AssetCreationInfo) -> Handle {
        let route_id = NEXT_ROUTE.fetch_add(1, Ordering::Relaxed);
        routes().lock().insert(route_id, Route {
            token: info.user_data,
            on_initialised: info.on_initialised.clone(),
            on_select_representation: info.on_select_representation.clone(),
            on_data_received: info.on_data_received.clone(),
        });

        let asset_path = c_string(&info.asset_path);
        let cache_dir = info.cache_dir.as_deref().map(c_string);
        let raw = CAssetCreationInfo {
            struct_size: std::mem::size_of::<CAssetCreationInfo>() as u32,
            asset_path: asset_path.as_ptr(),
            cache_dir: cache_dir.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            user_data: route_id as *mut c_void,
            on_initialised: Some(initialised_trampoline),
            on_select_representation: Some(select_representation_trampoline),
            on_data_received: Some(data_received_trampoline),
            buffer_time: info.buffer_time,
        };
        let handle = Handle::from_raw(unsafe { (self.api.asset_create)(&raw) });
        if handle.is_valid() {
            self.asset_routes.lock().insert(handle, route_id);
        } else {
            routes().lock().remove(&route_id);
        }
        handle
    }

    fn asset_delete(&self, asset: Handle) {
        if !asset.is_valid() { return; }
        unsafe { (self.api.asset_delete)(asset.raw()) }
        if let Some(route_id) = self.asset_routes.lock().remove(&asset) {
            routes().lock().remove(&route_id);
        }
    }

    fn asset_is_valid(&self, asset: Handle) -> bool { unsafe { (self.api.asset_is_valid)(asset.raw()) } }

    fn asset_update(&self, asset: Handle, absolute_time: f32) {
        unsafe { (self.api.asset_update)(asset.raw(), absolute_time) }
    }

    fn asset_play(&self, asset: Handle) { unsafe { (self.api.asset_play)(asset.raw()) } }

    fn asset_pause(&self, asset: Handle) { unsafe { (self.api.asset_pause)(asset.raw()) } }

    fn asset_seek(&self, asset: Handle, time: f32) { unsafe { (self.api.asset_seek)(asset.raw(), time) } }

    fn asset_step(&self, asset: Handle, frames: i32) { unsafe { (self.api.asset_step)(asset.raw(), frames) } }

    fn asset_set_looping(&self, asset: Handle, looping: bool) {
        unsafe { (self.api.asset_set_looping)(asset.raw(), looping) }
    }

    fn asset_state(&self, asset: Handle) -> AssetState {
        AssetState::from_bits_retain(unsafe { (self.api.asset_state)(asset.raw()) } as u32)
    }

    fn asset_bounds(&self, asset: Handle) -> Bounds { unsafe { (self.api.asset_bounds)(asset.raw()) } }

    fn asset_current_time(&self, asset: Handle) -> f32 { unsafe { (self.api.asset_current_time)(asset.raw()) } }

    fn asset_actual_time(&self, asset: Handle) -> f32 { unsafe { (self.api.asset_actual_time)(asset.raw()) } }

    fn asset_duration(&self, asset: Handle) -> f32 { unsafe { (self.api.asset_duration)(asset.raw()) } }

    fn asset_voxel_count(&self, asset: Handle) -> u32 {
        let count = unsafe { (self.api.asset_voxel_count)(asset.raw()) };
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    fn render_method_create(&self, type_name: &str) -> Handle {
        let name = c_string(type_name);
        Handle::from_raw(unsafe { (self.api.render_method_create)(name.as_ptr()) })
    }

    fn render_method_delete(&self, render_method: Handle) {
        if render_method.is_valid() { unsafe { (self.api.render_method_delete)(render_method.raw()) } }
    }

    fn render_method_is_valid(&self, render_method: Handle) -> bool {
        unsafe { (self.api.render_method_is_valid)(render_method.raw()) }
    }

    fn render_method_set_shader_subroutines(&self, render_method: Handle, subroutines: &str) {
        self.with_name(subroutines, |s| unsafe {
            (self.api.render_method_set_shader_subroutines)(render_method.raw(), s)
        });
    }

    fn viewport_create(&self) -> Handle { Handle::from_raw(unsafe { (self.api.viewport_create)() }) }

    fn viewport_delete(&self, viewport: Handle) {
        if viewport.is_valid() { unsafe { (self.api.viewport_delete)(viewport.raw()) } }
    }

    fn viewport_is_valid(&self, viewport: Handle) -> bool { unsafe { (self.api.viewport_is_valid)(viewport.raw()) } }

    fn viewport_set_view(&self, viewport: Handle, view: &Mat44) {
        unsafe { (self.api.viewport_set_view)(viewport.raw(), view) }
    }

    fn viewport_set_projection(&self, viewport: Handle, projection: &Mat44) {
        unsafe { (self.api.viewport_set_projection)(viewport.raw(), projection) }
    }

    fn viewport_set_dimensions(&self, viewport: Handle, x: f32, y: f32, width: f32, height: f32) {
        unsafe { (self.api.viewport_set_dimensions)(viewport.raw(), x, y, width, height) }
    }

    fn viewport_set_colour_space(&self, viewport: Handle, colour_space: ColourSpace) {
        unsafe { (self.api.viewport_set_colour_space)(viewport.raw(), colour_space.code()) }
    }

    fn viewport_set_reverse_depth(&self, viewport: Handle, reverse: bool) {
        unsafe { (self.api.viewport_set_reverse_depth)(viewport.raw(), i32::from(reverse)) }
    }
}
