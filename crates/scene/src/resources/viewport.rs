use std::mem;
use std::sync::Arc;

use glam::{Mat4, Vec4};
use native_engine::{ColourSpace, Handle};

use crate::context::SceneContext;
use crate::registry::ResourceKind;

use super::report_create_failure;

/// Camera state the engine renders actors through.
pub struct Viewport {
    ctx: Arc<SceneContext>,
    handle: Handle,
}

impl Viewport {
    pub fn new(ctx: &Arc<SceneContext>) -> Self {
        let mut viewport = Self { ctx: ctx.clone(), handle: Handle::INVALID };
        viewport.create();
        viewport
    }

    /// Reverse depth follows the graphics backend; colour space comes from config.
    pub fn create(&mut self) -> bool {
        self.delete();
        let reverse_depth = self.ctx.environment().backend.uses_reverse_depth();
        let colour_space = self.ctx.config().colour_space;
        let created = self.ctx.create_object(ResourceKind::Viewport, |engine| {
            let handle = engine.viewport_create();
            if handle.is_valid() {
                engine.viewport_set_reverse_depth(handle, reverse_depth);
                engine.viewport_set_colour_space(handle, colour_space);
            }
            handle
        });
        match created {
            Ok(handle) => {
                self.handle = handle;
                true
            }
            Err(e) => {
                report_create_failure(ResourceKind::Viewport, &e);
                false
            }
        }
    }

    pub fn delete(&mut self) {
        if !self.handle.is_valid() {
            return;
        }
        let handle = mem::replace(&mut self.handle, Handle::INVALID);
        self.ctx.destroy_object(ResourceKind::Viewport, handle, |engine, h| engine.viewport_delete(h));
    }

    pub fn is_valid(&self) -> bool { self.handle.is_valid() && self.ctx.engine().viewport_is_valid(self.handle) }

    pub fn handle(&self) -> Handle { self.handle }

    pub fn set_view_matrix(&self, view: Mat4) {
        if self.handle.is_valid() {
            self.ctx.engine().viewport_set_view(self.handle, &view.into());
        }
    }

    pub fn set_projection_matrix(&self, projection: Mat4) {
        if self.handle.is_valid() {
            self.ctx.engine().viewport_set_projection(self.handle, &projection.into());
        }
    }

    pub fn set_dimensions(&self, x: f32, y: f32, width: f32, height: f32) {
        if self.handle.is_valid() {
            self.ctx.engine().viewport_set_dimensions(self.handle, x, y, width, height);
        }
    }

    pub fn set_colour_space(&self, colour_space: ColourSpace) {
        if self.handle.is_valid() {
            self.ctx.engine().viewport_set_colour_space(self.handle, colour_space);
        }
    }

    pub fn set_reverse_depth(&self, enabled: bool) {
        if self.handle.is_valid() {
            self.ctx.engine().viewport_set_reverse_depth(self.handle, enabled);
        }
    }

    /// Push a whole camera in one go. `rect` is (x, y, width, height).
    pub fn update(&self, view: Mat4, projection: Mat4, rect: Vec4, colour_space: ColourSpace) {
        self.set_view_matrix(view);
        self.set_projection_matrix(projection);
        self.set_dimensions(rect.x, rect.y, rect.z, rect.w);
        self.set_colour_space(colour_space);
    }
}

impl Drop for Viewport {
    fn drop(&mut self) { self.delete(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::environment::{Environment, GraphicsBackend, Platform};
    use glam::Vec3;
    use native_engine::{Mat44, NativeEngine, SoftwareEngine};
    use render_queue::RenderEventQueue;

    fn setup(platform: Platform, backend: GraphicsBackend) -> (Arc<SoftwareEngine>, Arc<SceneContext>) {
        let engine = Arc::new(SoftwareEngine::new());
        let (queue, _drain) = RenderEventQueue::new();
        let ctx = SceneContext::new(engine.clone(), queue, BridgeConfig {
            environment: Environment::new(platform, backend),
            colour_space: ColourSpace::Linear,
            ..BridgeConfig::default()
        });
        (engine, ctx)
    }

    #[test]
    fn test_reverse_depth_follows_backend() {
        let (engine, ctx) = setup(Platform::Windows, GraphicsBackend::Direct3D11);
        let viewport = Viewport::new(&ctx);
        assert_eq!(engine.viewport_reverse_depth(viewport.handle()), Some(true));
        assert_eq!(engine.viewport_colour_space(viewport.handle()), Some(ColourSpace::Linear));

        let (engine, ctx) = setup(Platform::Linux, GraphicsBackend::OpenGlCore);
        let viewport = Viewport::new(&ctx);
        assert_eq!(engine.viewport_reverse_depth(viewport.handle()), Some(false));
    }

    #[test]
    fn test_update_pushes_camera() {
        let (engine, ctx) = setup(Platform::Linux, GraphicsBackend::OpenGlCore);
        let viewport = Viewport::new(&ctx);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 1.0, 5.0), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh_gl(1.0, 16.0 / 9.0, 0.1, 100.0);
        viewport.update(view, projection, Vec4::new(0.0, 0.0, 1920.0, 1080.0), ColourSpace::Gamma);

        let (v, p) = engine.viewport_matrices(viewport.handle()).unwrap();
        assert_eq!(v, Mat44::from(view));
        assert_eq!(p, Mat44::from(projection));
        assert_eq!(engine.viewport_rect(viewport.handle()), Some([0.0, 0.0, 1920.0, 1080.0]));
        assert_eq!(engine.viewport_colour_space(viewport.handle()), Some(ColourSpace::Gamma));
    }

    #[test]
    fn test_delete_is_synchronous() {
        let (engine, ctx) = setup(Platform::Linux, GraphicsBackend::OpenGlCore);
        let mut viewport = Viewport::new(&ctx);
        let handle = viewport.handle();
        viewport.delete();
        assert!(!engine.viewport_is_valid(handle));
        viewport.set_reverse_depth(true);
        assert_eq!(engine.viewport_reverse_depth(handle), None);
    }
}
