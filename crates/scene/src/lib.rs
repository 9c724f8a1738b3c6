//! Managed-side control of volumetric engine resources
//!
//! Owns the handle registry, the general lock shared with the render thread,
//! the callback correlation table and the resource wrappers (player, actor,
//! asset, render method, viewport). Everything hangs off one [`SceneContext`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub mod callbacks;
pub mod config;
pub mod context;
pub mod environment;
pub mod lock;
pub mod registry;
pub mod resources;

pub use callbacks::{max_frame_rate_policy, AssetCallbackTarget, CallbackTable};
pub use config::BridgeConfig;
pub use context::SceneContext;
pub use environment::{Environment, GraphicsBackend, Platform};
pub use lock::{GeneralGuard, GeneralLock};
pub use registry::{HandleRegistry, ResourceKind, SceneObjectEntry};
pub use resources::{
    Actor, Asset, AssetBounds, AssetOptions, AssetSource, AssetState, MaxFrameRate, Player, RenderMethod,
    RepresentationPolicy, Viewport,
};

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("unsupported environment: {0}")]
    Unsupported(String),
    #[error("engine failed to initialise")]
    InitialiseFailed,
    #[error("engine returned an invalid handle for a new {0}")]
    CreateFailed(ResourceKind),
    #[error("cannot read config {path:?}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse config {path:?}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
