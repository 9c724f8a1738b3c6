use std::fmt;
use std::sync::Arc;

use native_engine::Handle;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::lock::{GeneralGuard, GeneralLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Player,
    Actor,
    Asset,
    RenderMethod,
    Viewport,
}

impl ResourceKind {
    pub const fn type_name(self) -> &'static str {
        match self {
            ResourceKind::Player => "Player",
            ResourceKind::Actor => "Actor",
            ResourceKind::Asset => "Asset",
            ResourceKind::RenderMethod => "RenderMethod",
            ResourceKind::Viewport => "Viewport",
        }
    }

    /// `Actor7`, `Asset12`, ...
    pub fn display_name(self, handle: Handle) -> String { format!("{}{}", self.type_name(), handle) }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.type_name()) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneObjectEntry {
    pub handle: Handle,
    pub name: String,
    pub kind: ResourceKind,
}

#[derive(Default)]
struct RegistryInner {
    entries: Vec<SceneObjectEntry>,
    shared_player: Option<Handle>,
}

/// Every live engine object, in creation order. Mutation requires the general lock.
pub struct HandleRegistry {
    lock: Arc<GeneralLock>,
    inner: Mutex<RegistryInner>,
}

impl HandleRegistry {
    pub fn new(lock: Arc<GeneralLock>) -> Self {
        Self { lock, inner: Mutex::new(RegistryInner::default()) }
    }

    fn check(&self, guard: &GeneralGuard<'_>) {
        assert!(guard.belongs_to(&self.lock), "registry mutated under a foreign lock");
    }

    /// Insert `handle` unless it is invalid or already present.
    pub fn register(&self, guard: &GeneralGuard<'_>, handle: Handle, name: impl Into<String>, kind: ResourceKind) -> bool {
        self.check(guard);
        if !handle.is_valid() { return false; }
        let mut inner = self.inner.lock();
        if inner.entries.iter().any(|e| e.handle == handle) { return false; }
        inner.entries.push(SceneObjectEntry { handle, name: name.into(), kind });
        true
    }

    /// Register the implicit player that renders every actor.
    pub fn register_shared_player(&self, guard: &GeneralGuard<'_>, handle: Handle) -> bool {
        let added = self.register(guard, handle, ResourceKind::Player.display_name(handle), ResourceKind::Player);
        if added {
            self.inner.lock().shared_player = Some(handle);
        }
        added
    }

    /// Remove `handle`. When that leaves only the shared player, the player
    /// entry goes too and its handle is returned for native teardown.
    pub fn unregister(&self, guard: &GeneralGuard<'_>, handle: Handle) -> Option<Handle> {
        self.check(guard);
        let mut inner = self.inner.lock();
        let pos = inner.entries.iter().position(|e| e.handle == handle)?;
        inner.entries.remove(pos);
        if inner.shared_player == Some(handle) {
            inner.shared_player = None;
            return None;
        }
        let player = inner.shared_player?;
        if inner.entries.len() == 1 && inner.entries[0].handle == player {
            inner.entries.clear();
            inner.shared_player = None;
            return Some(player);
        }
        None
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.inner.lock().entries.iter().any(|e| e.handle == handle)
    }

    pub fn count(&self) -> usize { self.inner.lock().entries.len() }

    pub fn entry_at(&self, index: usize) -> Option<SceneObjectEntry> { self.inner.lock().entries.get(index).cloned() }

    pub fn entry_by_name(&self, name: &str) -> Option<Handle> {
        self.inner.lock().entries.iter().find(|e| e.name == name).map(|e| e.handle)
    }

    pub fn name_of(&self, handle: Handle) -> Option<String> {
        self.inner.lock().entries.iter().find(|e| e.handle == handle).map(|e| e.name.clone())
    }

    pub fn kind_of(&self, handle: Handle) -> Option<ResourceKind> {
        self.inner.lock().entries.iter().find(|e| e.handle == handle).map(|e| e.kind)
    }

    pub fn shared_player(&self) -> Option<Handle> { self.inner.lock().shared_player }

    pub fn entries(&self) -> Vec<SceneObjectEntry> { self.inner.lock().entries.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(raw: i32) -> Handle { Handle::from_raw(raw) }

    fn registry() -> (Arc<GeneralLock>, HandleRegistry) {
        let lock = Arc::new(GeneralLock::new());
        (lock.clone(), HandleRegistry::new(lock))
    }

    #[test]
    fn test_double_registration_leaves_one_entry() {
        let (lock, reg) = registry();
        let guard = lock.lock();
        assert!(reg.register(&guard, h(3), "Actor3", ResourceKind::Actor));
        assert!(!reg.register(&guard, h(3), "Actor3", ResourceKind::Actor));
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn test_invalid_handle_is_ignored() {
        let (lock, reg) = registry();
        let guard = lock.lock();
        assert!(!reg.register(&guard, Handle::INVALID, "Actor0", ResourceKind::Actor));
        assert_eq!(reg.count(), 0);
        assert_eq!(reg.unregister(&guard, Handle::INVALID), None);
    }

    #[test]
    fn test_lookups() {
        let (lock, reg) = registry();
        let guard = lock.lock();
        reg.register(&guard, h(5), ResourceKind::Viewport.display_name(h(5)), ResourceKind::Viewport);
        reg.register(&guard, h(6), ResourceKind::Asset.display_name(h(6)), ResourceKind::Asset);
        assert_eq!(reg.entry_by_name("Asset6"), Some(h(6)));
        assert_eq!(reg.name_of(h(5)).as_deref(), Some("Viewport5"));
        assert_eq!(reg.kind_of(h(6)), Some(ResourceKind::Asset));
        assert_eq!(reg.entry_at(0).map(|e| e.handle), Some(h(5)));
        assert!(reg.entry_at(2).is_none());
        assert!(reg.kind_of(h(9)).is_none());
    }

    #[test]
    fn test_last_non_player_removal_cascades() {
        let (lock, reg) = registry();
        let guard = lock.lock();
        reg.register(&guard, h(1), "Actor1", ResourceKind::Actor);
        reg.register_shared_player(&guard, h(2));
        assert_eq!(reg.unregister(&guard, h(1)), Some(h(2)));
        assert_eq!(reg.count(), 0);
        assert!(reg.shared_player().is_none());
    }

    #[test]
    fn test_player_stays_with_two_other_entries() {
        let (lock, reg) = registry();
        let guard = lock.lock();
        reg.register(&guard, h(1), "Actor1", ResourceKind::Actor);
        reg.register(&guard, h(3), "Asset3", ResourceKind::Asset);
        reg.register(&guard, h(4), "Viewport4", ResourceKind::Viewport);
        reg.register_shared_player(&guard, h(2));
        assert_eq!(reg.unregister(&guard, h(1)), None);
        assert!(reg.contains(h(2)));
        assert_eq!(reg.unregister(&guard, h(3)), None);
        assert_eq!(reg.unregister(&guard, h(4)), Some(h(2)));
    }

    #[test]
    fn test_removing_shared_player_itself() {
        let (lock, reg) = registry();
        let guard = lock.lock();
        reg.register(&guard, h(1), "Actor1", ResourceKind::Actor);
        reg.register_shared_player(&guard, h(2));
        assert_eq!(reg.unregister(&guard, h(2)), None);
        assert!(reg.shared_player().is_none());
        assert!(reg.contains(h(1)));
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let (lock, reg) = registry();
        let guard = lock.lock();
        reg.register_shared_player(&guard, h(2));
        assert_eq!(reg.unregister(&guard, h(9)), None);
        assert!(reg.contains(h(2)));
    }

    #[test]
    #[should_panic(expected = "foreign lock")]
    fn test_foreign_guard_panics() {
        let (_lock, reg) = registry();
        let other = GeneralLock::new();
        let guard = other.lock();
        reg.register(&guard, h(1), "Actor1", ResourceKind::Actor);
    }
}
