use std::mem;
use std::sync::Arc;

use native_engine::Handle;

use crate::context::SceneContext;
use crate::registry::ResourceKind;

use super::report_create_failure;

/// A shading strategy for actors. Unsupported type names fall back to the
/// engine default.
pub struct RenderMethod {
    ctx: Arc<SceneContext>,
    handle: Handle,
    type_name: String,
}

impl RenderMethod {
    pub fn new(ctx: &Arc<SceneContext>, type_name: &str) -> Self {
        let mut render_method = Self { ctx: ctx.clone(), handle: Handle::INVALID, type_name: String::new() };
        render_method.create(type_name);
        render_method
    }

    pub fn with_default_type(ctx: &Arc<SceneContext>) -> Self { Self::new(ctx, "") }

    pub fn create(&mut self, type_name: &str) -> bool {
        self.delete();
        let mut resolved = String::new();
        let created = self.ctx.create_object(ResourceKind::RenderMethod, |engine| {
            resolved = self.ctx.resolve_render_method_type(type_name);
            engine.render_method_create(&resolved)
        });
        match created {
            Ok(handle) => {
                self.handle = handle;
                self.type_name = resolved;
                true
            }
            Err(e) => {
                report_create_failure(ResourceKind::RenderMethod, &e);
                false
            }
        }
    }

    pub fn delete(&mut self) {
        if !self.handle.is_valid() {
            return;
        }
        let handle = mem::replace(&mut self.handle, Handle::INVALID);
        self.ctx.destroy_object(ResourceKind::RenderMethod, handle, |engine, h| engine.render_method_delete(h));
    }

    pub fn is_valid(&self) -> bool { self.handle.is_valid() && self.ctx.engine().render_method_is_valid(self.handle) }

    pub fn handle(&self) -> Handle { self.handle }

    /// Type actually created, after any fallback. Kept after `delete`.
    pub fn type_name(&self) -> &str { &self.type_name }

    pub fn set_shader_subroutines(&self, subroutines: &str) {
        if self.handle.is_valid() {
            self.ctx.engine().render_method_set_shader_subroutines(self.handle, subroutines);
        }
    }
}

impl Drop for RenderMethod {
    fn drop(&mut self) { self.delete(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::environment::{Environment, GraphicsBackend, Platform};
    use native_engine::{NativeEngine, SoftwareEngine};
    use render_queue::RenderEventQueue;

    fn setup() -> (Arc<SoftwareEngine>, Arc<SceneContext>) {
        let engine = Arc::new(SoftwareEngine::new());
        let (queue, _drain) = RenderEventQueue::new();
        let ctx = SceneContext::new(engine.clone(), queue, BridgeConfig {
            environment: Environment::new(Platform::Windows, GraphicsBackend::Direct3D11),
            ..BridgeConfig::default()
        });
        (engine, ctx)
    }

    #[test]
    fn test_create_supported_type() {
        let (engine, ctx) = setup();
        let rm = RenderMethod::new(&ctx, "InstancedCube");
        assert!(rm.is_valid());
        assert_eq!(rm.type_name(), "InstancedCube");
        assert_eq!(engine.render_method_type(rm.handle()).as_deref(), Some("InstancedCube"));
        rm.set_shader_subroutines("Lighting=Unlit");
        assert_eq!(engine.render_method_subroutines(rm.handle()).as_deref(), Some("Lighting=Unlit"));
    }

    #[test]
    fn test_unknown_type_falls_back_to_default() {
        let (_engine, ctx) = setup();
        assert_eq!(RenderMethod::new(&ctx, "Raymarch").type_name(), "PointSprite");
        assert_eq!(RenderMethod::with_default_type(&ctx).type_name(), "PointSprite");
    }

    #[test]
    fn test_delete_is_synchronous() {
        let (engine, ctx) = setup();
        let mut rm = RenderMethod::new(&ctx, "PointBlend");
        let handle = rm.handle();
        rm.delete();
        assert!(!engine.render_method_is_valid(handle));
        assert!(!rm.is_valid());
        assert_eq!(rm.type_name(), "PointBlend");
        assert_eq!(ctx.registry().count(), 0);
    }
}
