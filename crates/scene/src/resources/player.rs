use std::mem;
use std::sync::Arc;

use native_engine::Handle;

use crate::context::SceneContext;
use crate::environment::GraphicsBackend;
use crate::registry::ResourceKind;

use super::report_create_failure;

/// A player bound to the graphics backend current at creation time.
/// Teardown always runs on the render thread.
pub struct Player {
    ctx: Arc<SceneContext>,
    handle: Handle,
    backend: Option<GraphicsBackend>,
}

impl Player {
    pub fn new(ctx: &Arc<SceneContext>) -> Self {
        let mut player = Self { ctx: ctx.clone(), handle: Handle::INVALID, backend: None };
        player.create();
        player
    }

    pub fn create(&mut self) -> bool {
        self.delete();
        let env = self.ctx.environment();
        let created = self.ctx.create_object(ResourceKind::Player, |engine| {
            engine.player_create(env.backend.renderer_type(), env.device)
        });
        match created {
            Ok(handle) => {
                self.handle = handle;
                self.backend = Some(env.backend);
                true
            }
            Err(e) => {
                report_create_failure(ResourceKind::Player, &e);
                false
            }
        }
    }

    pub fn delete(&mut self) {
        if !self.handle.is_valid() {
            return;
        }
        let handle = mem::replace(&mut self.handle, Handle::INVALID);
        self.backend = None;
        let ctx = self.ctx.clone();
        self.ctx.destroy_object(ResourceKind::Player, handle, |_, h| ctx.queue_player_teardown(h));
    }

    pub fn is_valid(&self) -> bool { self.handle.is_valid() && self.ctx.engine().player_is_valid(self.handle) }

    pub fn handle(&self) -> Handle { self.handle }

    pub fn graphics_backend(&self) -> Option<GraphicsBackend> { self.backend }
}

impl Drop for Player {
    fn drop(&mut self) { self.delete(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::environment::{Environment, Platform};
    use native_engine::SoftwareEngine;
    use render_queue::{RenderEventQueue, RenderThread};

    #[test]
    fn test_teardown_runs_on_render_thread() {
        let engine = Arc::new(SoftwareEngine::new());
        let (queue, drain) = RenderEventQueue::new();
        let render = RenderThread::spawn(drain).unwrap();
        let ctx = SceneContext::new(engine.clone(), queue, BridgeConfig {
            environment: Environment::new(Platform::Linux, GraphicsBackend::OpenGlCore),
            ..BridgeConfig::default()
        });

        let mut player = Player::new(&ctx);
        let handle = player.handle();
        assert!(player.is_valid());
        assert_eq!(player.graphics_backend(), Some(GraphicsBackend::OpenGlCore));
        assert_eq!(ctx.registry().name_of(handle).as_deref(), Some(format!("Player{handle}").as_str()));

        player.delete();
        assert!(!player.is_valid());
        assert!(!ctx.registry().contains(handle));
        render.stop().unwrap();

        let calls: Vec<_> = engine.calls().into_iter().filter(|c| c.target == handle).collect();
        let ops: Vec<_> = calls.iter().map(|c| c.op).collect();
        assert_eq!(ops, vec!["player_create", "player_detach", "player_delete"]);
        assert!(calls[1..].iter().all(|c| c.thread.as_deref() == Some("render")));
        assert!(!ctx.general_lock().is_locked());
    }

    #[test]
    fn test_delete_twice_is_noop() {
        let engine = Arc::new(SoftwareEngine::new());
        let (queue, mut drain) = RenderEventQueue::new();
        let ctx = SceneContext::new(engine.clone(), queue, BridgeConfig {
            environment: Environment::new(Platform::Linux, GraphicsBackend::OpenGlCore),
            ..BridgeConfig::default()
        });
        let mut player = Player::new(&ctx);
        player.delete();
        player.delete();
        drain.run_pending();
        assert_eq!(engine.calls_named("player_delete").len(), 1);
    }
}
