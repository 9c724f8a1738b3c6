use native_engine::{NativePtr, RendererType};
use serde::{Deserialize, Serialize};

use crate::SceneError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Android,
    Ios,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Other
        }
    }

    pub fn is_mobile(self) -> bool { matches!(self, Platform::Android | Platform::Ios) }

    pub fn supports(self, backend: GraphicsBackend) -> bool {
        use GraphicsBackend::*;
        match self {
            Platform::Windows => matches!(backend, Direct3D11 | OpenGlCore),
            Platform::MacOs | Platform::Linux => backend == OpenGlCore,
            Platform::Android => backend == OpenGlEs3,
            Platform::Ios => matches!(backend, OpenGlEs3 | Metal),
            Platform::Other => false,
        }
    }

    /// Backend a host on this platform is expected to run.
    pub fn default_backend(self) -> GraphicsBackend {
        match self {
            Platform::Windows => GraphicsBackend::Direct3D11,
            Platform::MacOs | Platform::Linux => GraphicsBackend::OpenGlCore,
            Platform::Android => GraphicsBackend::OpenGlEs3,
            Platform::Ios => GraphicsBackend::Metal,
            Platform::Other => GraphicsBackend::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphicsBackend {
    Direct3D11,
    Direct3D12,
    OpenGlCore,
    OpenGlEs2,
    OpenGlEs3,
    Metal,
    Vulkan,
    PlayStation4,
    XboxOne,
    Null,
}

impl GraphicsBackend {
    pub fn renderer_type(self) -> RendererType {
        match self {
            GraphicsBackend::Direct3D11 => RendererType::Direct3D11,
            GraphicsBackend::OpenGlCore | GraphicsBackend::OpenGlEs2 | GraphicsBackend::OpenGlEs3 => RendererType::OpenGl,
            GraphicsBackend::Metal => RendererType::Metal,
            _ => RendererType::None,
        }
    }

    /// Backends whose depth buffer runs 1 (near) to 0 (far).
    pub fn uses_reverse_depth(self) -> bool {
        matches!(
            self,
            GraphicsBackend::Direct3D11
                | GraphicsBackend::Direct3D12
                | GraphicsBackend::PlayStation4
                | GraphicsBackend::XboxOne
                | GraphicsBackend::Metal
        )
    }
}

/// The host the engine is asked to run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub platform: Platform,
    pub backend: GraphicsBackend,
    /// Headless runs have no graphics device to attach to.
    #[serde(default)]
    pub batch_mode: bool,
    #[serde(skip)]
    pub device: NativePtr,
}

impl Default for Environment {
    fn default() -> Self { Self::detect() }
}

impl Environment {
    pub fn detect() -> Self {
        let platform = Platform::current();
        Self { platform, backend: platform.default_backend(), batch_mode: false, device: NativePtr::NULL }
    }

    pub fn new(platform: Platform, backend: GraphicsBackend) -> Self {
        Self { platform, backend, batch_mode: false, device: NativePtr::NULL }
    }

    pub fn check(&self) -> Result<(), SceneError> {
        if self.batch_mode {
            return Err(SceneError::Unsupported("batch mode has no graphics device".to_string()));
        }
        if !self.platform.supports(self.backend) {
            return Err(SceneError::Unsupported(format!("{:?} is not supported on {:?}", self.backend, self.platform)));
        }
        Ok(())
    }
}
