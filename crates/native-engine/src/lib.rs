//! Handle-based boundary to the native volumetric playback engine
//!
//! Every engine resource (player, actor, asset, render method, viewport) is an
//! opaque [`Handle`]. The [`NativeEngine`] trait mirrors the engine's C ABI one
//! call per method. Two backends exist: an in-process [`SoftwareEngine`] that
//! simulates playback state, and a `dylib` backend that binds the real library.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

mod software;
mod types;

#[cfg(feature = "dylib")]
mod dylib;

pub use software::{EngineCall, SoftwareEngine};
pub use types::*;

#[cfg(feature = "dylib")]
pub use dylib::DylibEngine;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("native engine library is not available in this build")]
    Unavailable,
    #[error("failed to load native engine from {path}")]
    Load { path: PathBuf },
    #[error("native engine is missing symbol `{0}`")]
    MissingSymbol(&'static str),
}

/// The engine's foreign API. Implementations must be callable from any thread;
/// deletion of invalid or unknown handles is a no-op and creation may return
/// [`Handle::INVALID`].
pub trait NativeEngine: Send + Sync {
    // Interface
    fn initialise(&self, info: &InitialiseInfo) -> bool;
    fn shutdown(&self) {}
    fn update(&self);
    fn info(&self, key: &str) -> Option<String>;
    /// Next buffered engine log message at or above the configured level.
    fn pop_log_entry(&self) -> Option<LogEntry>;
    fn render_method_types(&self) -> Vec<String>;
    fn render_method_default(&self) -> String;
    fn memory_stats(&self) -> MemoryStats { MemoryStats::default() }
    fn network_stats(&self) -> NetworkStats { NetworkStats::default() }

    // Player
    fn player_create(&self, renderer: RendererType, device: NativePtr) -> Handle;
    fn player_delete(&self, player: Handle);
    fn player_is_valid(&self, player: Handle) -> bool;
    fn player_detach(&self, player: Handle);
    fn player_will_render(&self, player: Handle, actor: Handle, viewport: Handle);
    fn player_prepare_render(&self, player: Handle, frame: &FrameContext);
    fn player_render(&self, player: Handle, actor: Handle, viewport: Handle, frame: &FrameContext);

    // Actor
    fn actor_create(&self) -> Handle;
    fn actor_delete(&self, actor: Handle);
    fn actor_is_valid(&self, actor: Handle) -> bool;
    fn actor_set_asset(&self, actor: Handle, asset: Handle);
    fn actor_set_render_method(&self, actor: Handle, render_method: Handle);
    fn actor_set_transform(&self, actor: Handle, transform: &Mat44);
    fn actor_set_uniform(&self, actor: Handle, name: &str, value: UniformValue);

    // Asset
    fn asset_create(&self, info: &AssetCreationInfo) -> Handle;
    fn asset_delete(&self, asset: Handle);
    fn asset_is_valid(&self, asset: Handle) -> bool;
    fn asset_update(&self, asset: Handle, absolute_time: f32);
    fn asset_play(&self, asset: Handle);
    fn asset_pause(&self, asset: Handle);
    fn asset_seek(&self, asset: Handle, time: f32);
    fn asset_step(&self, asset: Handle, frames: i32);
    fn asset_set_looping(&self, asset: Handle, looping: bool);
    fn asset_state(&self, asset: Handle) -> AssetState;
    fn asset_bounds(&self, asset: Handle) -> Bounds;
    fn asset_current_time(&self, asset: Handle) -> f32;
    fn asset_actual_time(&self, asset: Handle) -> f32;
    fn asset_duration(&self, asset: Handle) -> f32;
    fn asset_voxel_count(&self, asset: Handle) -> u32;

    // Render method
    fn render_method_create(&self, type_name: &str) -> Handle;
    fn render_method_delete(&self, render_method: Handle);
    fn render_method_is_valid(&self, render_method: Handle) -> bool;
    fn render_method_set_shader_subroutines(&self, render_method: Handle, subroutines: &str);

    // Viewport
    fn viewport_create(&self) -> Handle;
    fn viewport_delete(&self, viewport: Handle);
    fn viewport_is_valid(&self, viewport: Handle) -> bool;
    fn viewport_set_view(&self, viewport: Handle, view: &Mat44);
    fn viewport_set_projection(&self, viewport: Handle, projection: &Mat44);
    fn viewport_set_dimensions(&self, viewport: Handle, x: f32, y: f32, width: f32, height: f32);
    fn viewport_set_colour_space(&self, viewport: Handle, colour_space: ColourSpace);
    fn viewport_set_reverse_depth(&self, viewport: Handle, reverse: bool);
}

/// Backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the engine's shared library. `None` selects the software backend.
    pub library_path: Option<PathBuf>,
}

/// Create the engine backend described by `config`
pub fn create_engine(config: &EngineConfig) -> Result<Arc<dyn NativeEngine>> {
    match &config.library_path {
        #[cfg(feature = "dylib")]
        Some(path) => Ok(Arc::new(dylib::DylibEngine::load(path)?)),
        #[cfg(not(feature = "dylib"))]
        Some(_) => Err(EngineError::Unavailable.into()),
        None => Ok(Arc::new(SoftwareEngine::new())),
    }
}

/// Check if the native library backend is compiled in
pub fn is_native_engine_available() -> bool {
    cfg!(feature = "dylib")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert!(config.library_path.is_none());
    }

    #[test]
    fn test_create_engine_defaults_to_software() {
        let engine = create_engine(&EngineConfig::default()).unwrap();
        assert!(engine.initialise(&InitialiseInfo::default()));
        assert!(!engine.render_method_types().is_empty());
    }

    #[cfg(not(feature = "dylib"))]
    #[test]
    fn test_library_path_without_dylib_feature() {
        let config = EngineConfig { library_path: Some(PathBuf::from("libengine.so")) };
        let err = create_engine(&config).err().unwrap();
        assert!(matches!(err.downcast_ref::<EngineError>(), Some(EngineError::Unavailable)));
        assert!(!is_native_engine_available());
    }
}
