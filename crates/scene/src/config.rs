use std::fs;
use std::path::Path;

use native_engine::{ColourSpace, EngineConfig, InitialiseInfo, LogLevel, DEFAULT_BUFFER_TIME};
use serde::{Deserialize, Serialize};

use crate::environment::{Environment, Platform};
use crate::SceneError;

/// Bridge settings. Every field has a default so partial JSON files load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub app_id: String,
    pub app_version: String,
    pub api_key: Option<String>,
    pub extension_path: Option<String>,
    /// Engine worker threads; negative lets the engine decide.
    pub thread_pool_size: i32,
    pub log_level: LogLevel,
    pub buffer_time: f32,
    pub cache_dir: Option<String>,
    pub colour_space: ColourSpace,
    /// Render method types hidden on Android and iOS.
    pub mobile_render_method_deny_list: Vec<String>,
    pub environment: Environment,
    pub engine: EngineConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            app_id: "hvr-bridge".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            api_key: None,
            extension_path: None,
            thread_pool_size: -1,
            log_level: LogLevel::Error,
            buffer_time: DEFAULT_BUFFER_TIME,
            cache_dir: None,
            colour_space: ColourSpace::Gamma,
            mobile_render_method_deny_list: vec!["InstancedCube".to_string()],
            environment: Environment::detect(),
            engine: EngineConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Self, SceneError> {
        let text = fs::read_to_string(path)
            .map_err(|source| SceneError::ConfigIo { path: path.to_path_buf(), source })?;
        serde_json::from_str(&text).map_err(|source| SceneError::ConfigParse { path: path.to_path_buf(), source })
    }

    pub fn initialise_info(&self) -> InitialiseInfo {
        InitialiseInfo {
            app_id: self.app_id.clone(),
            app_version: self.app_version.clone(),
            api_key: self.api_key.clone(),
            extension_path: self.extension_path.clone(),
            thread_pool_size: self.thread_pool_size,
            log_level: self.log_level,
        }
    }

    /// Render method types refused on `platform`.
    pub fn denied_render_methods(&self, platform: Platform) -> &[String] {
        if platform.is_mobile() { self.mobile_render_method_deny_list.as_slice() } else { &[] }
    }
}
