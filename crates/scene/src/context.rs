use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use native_engine::{FrameContext, Handle, LogLevel, NativeEngine, NativePtr};
use parking_lot::Mutex;
use render_queue::{EventId, RenderEventQueue};
use tracing::{debug, error, info, warn};

use crate::callbacks::CallbackTable;
use crate::config::BridgeConfig;
use crate::environment::{Environment, GraphicsBackend};
use crate::lock::{GeneralGuard, GeneralLock};
use crate::registry::{HandleRegistry, ResourceKind};
use crate::resources::{Actor, Viewport};
use crate::SceneError;

/// Process-wide state shared by every resource wrapper.
pub struct SceneContext {
    engine: Arc<dyn NativeEngine>,
    lock: Arc<GeneralLock>,
    registry: HandleRegistry,
    callbacks: Arc<CallbackTable>,
    queue: RenderEventQueue,
    config: BridgeConfig,
    environment: Mutex<Environment>,
    initialised: AtomicBool,
    unsupported_logged: AtomicBool,
    /// Backend and device the shared player was created against.
    player_target: Mutex<Option<(GraphicsBackend, NativePtr)>>,
    last_prepared_frame: Mutex<Option<u64>>,
}

impl SceneContext {
    pub fn new(engine: Arc<dyn NativeEngine>, queue: RenderEventQueue, config: BridgeConfig) -> Arc<Self> {
        let lock = Arc::new(GeneralLock::new());
        Arc::new(Self {
            engine,
            registry: HandleRegistry::new(lock.clone()),
            lock,
            callbacks: Arc::new(CallbackTable::new()),
            queue,
            environment: Mutex::new(config.environment),
            config,
            initialised: AtomicBool::new(false),
            unsupported_logged: AtomicBool::new(false),
            player_target: Mutex::new(None),
            last_prepared_frame: Mutex::new(None),
        })
    }

    pub fn engine(&self) -> &Arc<dyn NativeEngine> { &self.engine }

    pub fn general_lock(&self) -> &Arc<GeneralLock> { &self.lock }

    pub fn lock(&self) -> GeneralGuard<'_> { self.lock.lock() }

    pub fn registry(&self) -> &HandleRegistry { &self.registry }

    pub fn callbacks(&self) -> &Arc<CallbackTable> { &self.callbacks }

    pub fn queue(&self) -> &RenderEventQueue { &self.queue }

    pub fn config(&self) -> &BridgeConfig { &self.config }

    pub fn environment(&self) -> Environment { *self.environment.lock() }

    /// Swap the host description, e.g. after the graphics device was recreated.
    pub fn set_environment(&self, environment: Environment) { *self.environment.lock() = environment; }

    /// Fails while the host cannot run the engine. Logged once per context.
    pub fn check_environment(&self) -> Result<(), SceneError> {
        let result = self.environment().check();
        if let Err(e) = &result {
            if !self.unsupported_logged.swap(true, Ordering::AcqRel) {
                error!("{e}; engine resources will not be created");
            }
        }
        result
    }

    pub fn initialise(&self) -> Result<(), SceneError> {
        let guard = self.lock();
        self.initialise_locked(&guard)
    }

    fn initialise_locked(&self, _guard: &GeneralGuard<'_>) -> Result<(), SceneError> {
        if self.is_initialised() {
            return Ok(());
        }
        self.check_environment()?;
        if !self.engine.initialise(&self.config.initialise_info()) {
            error!(app_id = %self.config.app_id, "engine initialisation failed");
            return Err(SceneError::InitialiseFailed);
        }
        self.initialised.store(true, Ordering::Release);
        info!(app_id = %self.config.app_id, app_version = %self.config.app_version, "engine initialised");
        Ok(())
    }

    pub fn is_initialised(&self) -> bool { self.initialised.load(Ordering::Acquire) }

    /// Per-frame engine tick. Also forwards buffered engine log lines to `tracing`.
    pub fn update(&self) {
        if !self.is_initialised() {
            return;
        }
        self.engine.update();
        while let Some(entry) = self.engine.pop_log_entry() {
            match entry.level {
                LogLevel::Debug => debug!(target: "hvr_engine", "{}", entry.message),
                LogLevel::Info => info!(target: "hvr_engine", "{}", entry.message),
                LogLevel::Warning => warn!(target: "hvr_engine", "{}", entry.message),
                LogLevel::Error => error!(target: "hvr_engine", "{}", entry.message),
                LogLevel::None => {}
            }
        }
    }

    pub fn info(&self, key: &str) -> Option<String> {
        self.initialise().ok()?;
        self.engine.info(key)
    }

    /// Engine render method types, minus those denied on the current platform.
    pub fn render_method_types(&self) -> Vec<String> {
        let platform = self.environment().platform;
        let denied = self.config.denied_render_methods(platform);
        self.engine.render_method_types().into_iter().filter(|t| !denied.contains(t)).collect()
    }

    pub fn render_method_default(&self) -> String {
        let default = self.engine.render_method_default();
        if self.is_render_method_type_supported(&default) {
            return default;
        }
        self.render_method_types().into_iter().next().unwrap_or(default)
    }

    pub fn is_render_method_type_supported(&self, type_name: &str) -> bool {
        self.render_method_types().iter().any(|t| t == type_name)
    }

    pub fn render_method_type_index(&self, type_name: &str) -> Option<usize> {
        self.render_method_types().iter().position(|t| t == type_name)
    }

    /// `requested` if supported, otherwise the default type.
    pub fn resolve_render_method_type(&self, requested: &str) -> String {
        if !requested.is_empty() && self.is_render_method_type_supported(requested) {
            return requested.to_string();
        }
        let fallback = self.render_method_default();
        warn!(requested, fallback = %fallback, "render method type not supported, using default");
        fallback
    }

    pub(crate) fn create_object(
        &self,
        kind: ResourceKind,
        create: impl FnOnce(&dyn NativeEngine) -> Handle,
    ) -> Result<Handle, SceneError> {
        let guard = self.lock();
        self.check_environment()?;
        self.initialise_locked(&guard)?;
        let handle = create(self.engine.as_ref());
        if !handle.is_valid() {
            return Err(SceneError::CreateFailed(kind));
        }
        self.registry.register(&guard, handle, kind.display_name(handle), kind);
        debug!(%handle, %kind, "scene object created");
        Ok(handle)
    }

    pub(crate) fn destroy_object(&self, kind: ResourceKind, handle: Handle, destroy: impl FnOnce(&dyn NativeEngine, Handle)) {
        let guard = self.lock();
        destroy(self.engine.as_ref(), handle);
        self.unregister_locked(&guard, handle);
        debug!(%handle, %kind, "scene object deleted");
    }

    fn unregister_locked(&self, guard: &GeneralGuard<'_>, handle: Handle) {
        if let Some(player) = self.registry.unregister(guard, handle) {
            *self.player_target.lock() = None;
            debug!(%player, "only the scene player remained, tearing it down");
            self.queue_player_teardown(player);
        }
    }

    /// Detach and delete `player` on the render thread, which holds the
    /// general lock for the duration.
    pub(crate) fn queue_player_teardown(&self, player: Handle) {
        self.lock.lock_on_render_thread(&self.queue);
        let engine = self.engine.clone();
        self.queue.queue(move || {
            engine.player_detach(player);
            engine.player_delete(player);
        });
        self.lock.unlock_on_render_thread(&self.queue);
    }

    /// The implicit player every actor renders through, created on demand.
    /// Recreated when the graphics backend or device changed since it was made.
    pub fn scene_player(&self) -> Handle {
        let guard = self.lock();
        self.scene_player_locked(&guard)
    }

    fn scene_player_locked(&self, guard: &GeneralGuard<'_>) -> Handle {
        let env = self.environment();
        if let Some(player) = self.registry.shared_player() {
            let target = *self.player_target.lock();
            if target == Some((env.backend, env.device)) {
                return player;
            }
            debug!(%player, backend = ?env.backend, "graphics device changed, recreating scene player");
            self.registry.unregister(guard, player);
            self.queue_player_teardown(player);
        }
        if let Err(e) = self.check_environment().and_then(|_| self.initialise_locked(guard)) {
            debug!("scene player unavailable: {e}");
            return Handle::INVALID;
        }
        let player = self.engine.player_create(env.backend.renderer_type(), env.device);
        if !player.is_valid() {
            error!(backend = ?env.backend, "engine failed to create the scene player");
            return Handle::INVALID;
        }
        self.registry.register_shared_player(guard, player);
        *self.player_target.lock() = Some((env.backend, env.device));
        debug!(%player, "scene player created");
        player
    }

    pub fn will_render(&self, actor: &Actor, viewport: &Viewport) -> bool {
        if !actor.handle().is_valid() || !viewport.handle().is_valid() {
            return false;
        }
        let player = self.scene_player();
        if !player.is_valid() {
            return false;
        }
        self.engine.player_will_render(player, actor.handle(), viewport.handle());
        true
    }

    /// Queue the once-per-frame render preparation. Repeated calls for the
    /// same frame number queue nothing.
    pub fn prepare_render(&self, frame_number: u64, frame: FrameContext) -> Option<EventId> {
        let player = self.registry.shared_player()?;
        {
            let mut last = self.last_prepared_frame.lock();
            if *last == Some(frame_number) {
                return None;
            }
            *last = Some(frame_number);
        }
        let engine = self.engine.clone();
        self.queue.queue(move || engine.player_prepare_render(player, &frame))
    }

    pub fn render_actor(&self, actor: &Actor, viewport: &Viewport, frame: FrameContext) -> Option<EventId> {
        let player = self.registry.shared_player()?;
        let (actor, viewport) = (actor.handle(), viewport.handle());
        if !actor.is_valid() || !viewport.is_valid() {
            return None;
        }
        let engine = self.engine.clone();
        self.queue.queue(move || engine.player_render(player, actor, viewport, &frame))
    }
}
