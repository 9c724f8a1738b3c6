//! Value types crossing the engine boundary.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Default read-ahead for newly created assets, in seconds.
pub const DEFAULT_BUFFER_TIME: f32 = 2.0;

/// Opaque engine-side identifier. Zero is never a live resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Handle(i32);

impl Handle {
    pub const INVALID: Handle = Handle(0);

    pub const fn from_raw(raw: i32) -> Self { Self(raw) }

    pub const fn raw(self) -> i32 { self.0 }

    pub const fn is_valid(self) -> bool { self.0 != 0 }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Pointer-sized value handed to the engine and returned untouched in callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct CorrelationToken(usize);

impl CorrelationToken {
    pub const NULL: CorrelationToken = CorrelationToken(0);

    pub const fn from_raw(raw: usize) -> Self { Self(raw) }

    pub const fn raw(self) -> usize { self.0 }

    pub const fn is_null(self) -> bool { self.0 == 0 }
}

/// Address of a host graphics object (device, texture, render buffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct NativePtr(usize);

impl NativePtr {
    pub const NULL: NativePtr = NativePtr(0);

    pub const fn from_addr(addr: usize) -> Self { Self(addr) }

    pub const fn addr(self) -> usize { self.0 }

    pub const fn is_null(self) -> bool { self.0 == 0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RendererType {
    None,
    OpenGl,
    Direct3D11,
    Gnmx,
    Metal,
}

impl RendererType {
    pub const fn code(self) -> i32 {
        match self {
            RendererType::None => -1,
            RendererType::OpenGl => 0,
            RendererType::Direct3D11 => 1,
            RendererType::Gnmx => 2,
            RendererType::Metal => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColourSpace {
    #[default]
    Gamma,
    Linear,
}

impl ColourSpace {
    pub const fn code(self) -> i32 {
        match self { ColourSpace::Gamma => 0, ColourSpace::Linear => 1 }
    }
}

/// Engine log severities, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    #[default]
    Error,
    None,
}

impl LogLevel {
    pub const fn code(self) -> i32 {
        match self {
            LogLevel::Debug => 0,
            LogLevel::Info => 1,
            LogLevel::Warning => 2,
            LogLevel::Error => 3,
            LogLevel::None => 4,
        }
    }

    pub const fn from_code(code: i32) -> Self {
        match code {
            i32::MIN..=0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warning,
            3 => LogLevel::Error,
            _ => LogLevel::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

bitflags! {
    /// Snapshot of an asset's playback state. Bits are independent.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AssetState: u32 {
        const INITIALISING = 1 << 0;
        const PLAYING = 1 << 1;
        const SEEKING = 1 << 2;
        const CACHING = 1 << 3;
        const OFFLINE = 1 << 4;
        const FULLY_CACHED = 1 << 5;
        const INVALID = 1 << 6;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct Vec2 { pub x: f32, pub y: f32 }

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct Vec3 { pub x: f32, pub y: f32, pub z: f32 }

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct Vec4 { pub x: f32, pub y: f32, pub z: f32, pub w: f32 }

/// Column-major 3x3 matrix.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct Mat33 { pub m: [f32; 9] }

/// Column-major 4x4 matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Mat44 { pub m: [f32; 16] }

impl Default for Mat44 {
    fn default() -> Self { glam::Mat4::IDENTITY.into() }
}

impl From<glam::Vec2> for Vec2 { fn from(v: glam::Vec2) -> Self { Self { x: v.x, y: v.y } } }
impl From<glam::Vec3> for Vec3 { fn from(v: glam::Vec3) -> Self { Self { x: v.x, y: v.y, z: v.z } } }
impl From<glam::Vec4> for Vec4 { fn from(v: glam::Vec4) -> Self { Self { x: v.x, y: v.y, z: v.z, w: v.w } } }
impl From<Vec3> for glam::Vec3 { fn from(v: Vec3) -> Self { glam::Vec3::new(v.x, v.y, v.z) } }

impl From<glam::Mat3> for Mat33 {
    fn from(m: glam::Mat3) -> Self { Self { m: m.to_cols_array() } }
}

impl From<glam::Mat4> for Mat44 {
    fn from(m: glam::Mat4) -> Self { Self { m: m.to_cols_array() } }
}

impl From<Mat44> for glam::Mat4 {
    fn from(m: Mat44) -> Self { glam::Mat4::from_cols_array(&m.m) }
}

/// Axis-aligned bounds in engine units (centimetres).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct Bounds {
    pub center: Vec3,
    pub half_dims: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    pub alloc_bytes: u64,
    pub alloc_blocks: u64,
    pub free_bytes: u64,
    pub free_blocks: u64,
    pub used_bytes: i64,
    pub used_blocks: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkStats {
    pub received_bits: i64,
    pub sent_bits: i64,
    pub bits_per_second: i64,
}

/// Per-frame command state handed to `prepare_render` / `render`. The queue and
/// encoder are only meaningful on Metal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameContext {
    pub pixel_format: u32,
    pub command_queue: NativePtr,
    pub command_encoder: NativePtr,
}

/// Value assigned to a named shader-subroutine uniform on an actor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat33(Mat33),
    Mat44(Mat44),
    Texture2D { player: Handle, texture: NativePtr },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdaptationSet {
    pub mime_type: String,
    pub codec: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct Representation {
    pub max_fps: f32,
    pub bandwidth: u32,
}

pub type InitialisedCallback = Arc<dyn Fn(i32, CorrelationToken) + Send + Sync>;
pub type SelectRepresentationCallback =
    Arc<dyn Fn(&AdaptationSet, u32, &[Representation], CorrelationToken) -> bool + Send + Sync>;
pub type DataReceivedCallback = Arc<dyn Fn(&str, &str, f32, &[u8], CorrelationToken) + Send + Sync>;

/// Everything the engine needs to open an asset. Built once, read-only afterwards.
#[derive(Clone, Default)]
pub struct AssetCreationInfo {
    pub asset_path: String,
    pub cache_dir: Option<String>,
    pub buffer_time: f32,
    pub user_data: CorrelationToken,
    pub on_initialised: Option<InitialisedCallback>,
    pub on_select_representation: Option<SelectRepresentationCallback>,
    pub on_data_received: Option<DataReceivedCallback>,
}

impl AssetCreationInfo {
    pub fn new(asset_path: impl Into<String>) -> Self {
        Self { asset_path: asset_path.into(), buffer_time: DEFAULT_BUFFER_TIME, ..Default::default() }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<String>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_buffer_time(mut self, seconds: f32) -> Self {
        self.buffer_time = seconds;
        self
    }
}

impl fmt::Debug for AssetCreationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetCreationInfo")
            .field("asset_path", &self.asset_path)
            .field("cache_dir", &self.cache_dir)
            .field("buffer_time", &self.buffer_time)
            .field("user_data", &self.user_data)
            .field("on_initialised", &self.on_initialised.is_some())
            .field("on_select_representation", &self.on_select_representation.is_some())
            .field("on_data_received", &self.on_data_received.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InitialiseInfo {
    pub app_id: String,
    pub app_version: String,
    pub api_key: Option<String>,
    pub extension_path: Option<String>,
    /// Negative lets the engine pick.
    pub thread_pool_size: i32,
    pub log_level: LogLevel,
}

/// Keys accepted by `NativeEngine::info`.
pub mod info_keys {
    pub const VERSION_MAJOR: &str = "VERSION_MAJOR";
    pub const VERSION_MINOR: &str = "VERSION_MINOR";
    pub const VERSION_REVISION: &str = "VERSION_REVISION";
    pub const VERSION: &str = "VERSION";
    pub const BUILD_INFO: &str = "BUILD_INFO";
    pub const GIT_HASH: &str = "GIT_HASH";
}
