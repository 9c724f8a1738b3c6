//! Owning wrappers around engine handles. Each wrapper creates its object on
//! construction, deletes it on `delete()` or drop, and turns every call on an
//! invalid handle into a no-op.
//!
//! Wrappers take the general lock while creating and deleting, so they must not
//! be dropped by a thread that is holding it.

mod actor;
mod asset;
mod player;
mod render_method;
mod viewport;

pub use actor::Actor;
pub use asset::{
    Asset, AssetBounds, AssetOptions, AssetSource, DataReceivedHook, InitialisedHook, MaxFrameRate,
    RepresentationPolicy,
};
pub use native_engine::AssetState;
pub use player::Player;
pub use render_method::RenderMethod;
pub use viewport::Viewport;

use tracing::{error, trace};

use crate::registry::ResourceKind;
use crate::SceneError;

fn report_create_failure(kind: ResourceKind, err: &SceneError) {
    match err {
        // Already reported once by the context.
        SceneError::Unsupported(_) => trace!(%kind, "creation skipped: {err}"),
        _ => error!(%kind, "creation failed: {err}"),
    }
}
