use std::mem;
use std::sync::Arc;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use native_engine::{Handle, NativePtr, UniformValue};

use crate::context::SceneContext;
use crate::registry::ResourceKind;

use super::{report_create_failure, RenderMethod};

/// A renderable instance: one asset drawn with one render method.
pub struct Actor {
    ctx: Arc<SceneContext>,
    handle: Handle,
    asset: Handle,
    render_method: Option<(Handle, String)>,
}

impl Actor {
    pub fn new(ctx: &Arc<SceneContext>) -> Self {
        let mut actor = Self { ctx: ctx.clone(), handle: Handle::INVALID, asset: Handle::INVALID, render_method: None };
        actor.create();
        actor
    }

    pub fn create(&mut self) -> bool {
        self.delete();
        match self.ctx.create_object(ResourceKind::Actor, |engine| engine.actor_create()) {
            Ok(handle) => {
                self.handle = handle;
                true
            }
            Err(e) => {
                report_create_failure(ResourceKind::Actor, &e);
                false
            }
        }
    }

    /// Unregisters now; the engine object is deleted on the render thread.
    pub fn delete(&mut self) {
        if !self.handle.is_valid() {
            return;
        }
        let handle = mem::replace(&mut self.handle, Handle::INVALID);
        self.asset = Handle::INVALID;
        self.render_method = None;
        let engine = self.ctx.engine().clone();
        let queue = self.ctx.queue();
        self.ctx.destroy_object(ResourceKind::Actor, handle, |_, h| {
            queue.queue(move || engine.actor_delete(h));
        });
    }

    pub fn is_valid(&self) -> bool { self.handle.is_valid() && self.ctx.engine().actor_is_valid(self.handle) }

    pub fn handle(&self) -> Handle { self.handle }

    /// Asset handle last bound through [`set_asset`](Self::set_asset).
    pub fn asset(&self) -> Handle { self.asset }

    pub fn set_asset(&mut self, asset: Handle) {
        if !self.handle.is_valid() {
            return;
        }
        self.ctx.engine().actor_set_asset(self.handle, asset);
        self.asset = asset;
    }

    pub fn set_render_method(&mut self, render_method: &RenderMethod) {
        if !self.handle.is_valid() {
            return;
        }
        self.ctx.engine().actor_set_render_method(self.handle, render_method.handle());
        self.render_method = Some((render_method.handle(), render_method.type_name().to_string()));
    }

    pub fn render_method(&self) -> Handle { self.render_method.as_ref().map_or(Handle::INVALID, |(h, _)| *h) }

    pub fn render_method_type(&self) -> Option<&str> { self.render_method.as_ref().map(|(_, t)| t.as_str()) }

    /// Apply a host transform. The engine's X axis points the other way, so the
    /// result is mirrored in X after scaling.
    pub fn set_transform(&self, local_to_world: Mat4, scale_factor: f32) {
        if !self.handle.is_valid() {
            return;
        }
        let matrix = local_to_world
            * Mat4::from_scale(Vec3::splat(scale_factor))
            * Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0));
        self.ctx.engine().actor_set_transform(self.handle, &matrix.into());
    }

    fn set_uniform(&self, name: &str, value: UniformValue) {
        if !self.handle.is_valid() {
            return;
        }
        self.ctx.engine().actor_set_uniform(self.handle, name, value);
    }

    pub fn set_uniform_int(&self, name: &str, value: i32) { self.set_uniform(name, UniformValue::Int(value)); }

    pub fn set_uniform_float(&self, name: &str, value: f32) { self.set_uniform(name, UniformValue::Float(value)); }

    pub fn set_uniform_vec2(&self, name: &str, value: Vec2) { self.set_uniform(name, UniformValue::Vec2(value.into())); }

    pub fn set_uniform_vec3(&self, name: &str, value: Vec3) { self.set_uniform(name, UniformValue::Vec3(value.into())); }

    pub fn set_uniform_vec4(&self, name: &str, value: Vec4) { self.set_uniform(name, UniformValue::Vec4(value.into())); }

    /// Uses the top-left 3x3 of `value`.
    pub fn set_uniform_mat3(&self, name: &str, value: Mat4) {
        self.set_uniform(name, UniformValue::Mat33(Mat3::from_mat4(value).into()));
    }

    pub fn set_uniform_mat4(&self, name: &str, value: Mat4) { self.set_uniform(name, UniformValue::Mat44(value.into())); }

    /// Bind a host texture, resolved through the scene player.
    pub fn set_uniform_texture(&self, name: &str, texture: NativePtr) {
        if !self.handle.is_valid() {
            return;
        }
        let player = self.ctx.scene_player();
        self.set_uniform(name, UniformValue::Texture2D { player, texture });
    }
}

impl Drop for Actor {
    fn drop(&mut self) { self.delete(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::environment::{Environment, GraphicsBackend, Platform};
    use native_engine::{Mat33, NativeEngine, SoftwareEngine};
    use render_queue::{RenderDrain, RenderEventQueue};

    fn setup() -> (Arc<SoftwareEngine>, Arc<SceneContext>, RenderDrain) {
        let engine = Arc::new(SoftwareEngine::new());
        let (queue, drain) = RenderEventQueue::new();
        let ctx = SceneContext::new(engine.clone(), queue, BridgeConfig {
            environment: Environment::new(Platform::Linux, GraphicsBackend::OpenGlCore),
            ..BridgeConfig::default()
        });
        (engine, ctx, drain)
    }

    #[test]
    fn test_create_registers_with_display_name() {
        let (_engine, ctx, _drain) = setup();
        let actor = Actor::new(&ctx);
        assert!(actor.is_valid());
        let name = format!("Actor{}", actor.handle());
        assert_eq!(ctx.registry().entry_by_name(&name), Some(actor.handle()));
        assert_eq!(ctx.registry().kind_of(actor.handle()), Some(ResourceKind::Actor));
    }

    #[test]
    fn test_delete_is_deferred_to_render_drain() {
        let (engine, ctx, mut drain) = setup();
        let mut actor = Actor::new(&ctx);
        let handle = actor.handle();
        actor.delete();
        assert!(!actor.is_valid());
        assert!(!ctx.registry().contains(handle));
        assert!(engine.actor_is_valid(handle));
        drain.run_pending();
        assert!(!engine.actor_is_valid(handle));
    }

    #[test]
    fn test_mutators_after_delete_are_noops() {
        let (engine, ctx, mut drain) = setup();
        let mut actor = Actor::new(&ctx);
        actor.delete();
        drain.run_pending();
        engine.clear_calls();
        actor.set_asset(Handle::from_raw(99));
        actor.set_uniform_int("Tint", 1);
        actor.set_transform(Mat4::IDENTITY, 1.0);
        actor.delete();
        assert!(engine.calls().is_empty());
        assert_eq!(ctx.registry().count(), 0);
        assert_eq!(actor.asset(), Handle::INVALID);
    }

    #[test]
    fn test_transform_scales_and_mirrors_x() {
        let (engine, ctx, _drain) = setup();
        let actor = Actor::new(&ctx);
        actor.set_transform(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)), 2.0);
        let m: Mat4 = engine.actor_transform(actor.handle()).unwrap().into();
        assert_eq!(m.x_axis.x, -2.0);
        assert_eq!(m.y_axis.y, 2.0);
        assert_eq!(m.w_axis.truncate(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_uniforms() {
        let (engine, ctx, _drain) = setup();
        let actor = Actor::new(&ctx);
        actor.set_uniform_float("Exposure", 1.5);
        actor.set_uniform_mat3("Basis", Mat4::from_translation(Vec3::new(7.0, 8.0, 9.0)));
        actor.set_uniform_texture("Lut", NativePtr::from_addr(0x10));

        assert_eq!(engine.actor_uniform(actor.handle(), "Exposure"), Some(UniformValue::Float(1.5)));
        let identity: Mat33 = Mat3::IDENTITY.into();
        assert_eq!(engine.actor_uniform(actor.handle(), "Basis"), Some(UniformValue::Mat33(identity)));
        let player = ctx.registry().shared_player().unwrap();
        assert_eq!(
            engine.actor_uniform(actor.handle(), "Lut"),
            Some(UniformValue::Texture2D { player, texture: NativePtr::from_addr(0x10) })
        );
    }

    #[test]
    fn test_render_method_binding() {
        let (engine, ctx, _drain) = setup();
        let mut actor = Actor::new(&ctx);
        let rm = RenderMethod::new(&ctx, "PointBlend");
        actor.set_render_method(&rm);
        assert_eq!(actor.render_method_type(), Some("PointBlend"));
        assert_eq!(engine.actor_render_method(actor.handle()), rm.handle());
    }
}
