use std::fmt;

use tracing::{debug, warn};

use super::{Canvas, InputSnapshot};

pub trait Scene {
    fn load(&mut self);
    fn update(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot);
    fn render(&mut self, canvas: &mut Canvas<'_>);
    fn unload(&mut self);
    fn debug_title(&self) -> Option<String> {
        None
    }
}

struct SceneRuntime<K> {
    key: K,
    scene: Box<dyn Scene>,
    is_loaded: bool,
}

/// Runs at most one scene of a fixed roster. Starting a scene stops the
/// current one and loads the target from scratch.
pub struct SceneMachine<K> {
    runtimes: Vec<SceneRuntime<K>>,
    active: Option<usize>,
}

impl<K: fmt::Debug> fmt::Debug for SceneMachine<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneMachine")
            .field(
                "roster",
                &self.runtimes.iter().map(|runtime| &runtime.key).collect::<Vec<_>>(),
            )
            .field(
                "active",
                &self.active.map(|index| &self.runtimes[index].key),
            )
            .finish()
    }
}

impl<K: Copy + Eq + fmt::Debug> SceneMachine<K> {
    pub fn new(roster: Vec<(K, Box<dyn Scene>)>) -> Self {
        let mut runtimes: Vec<SceneRuntime<K>> = Vec::with_capacity(roster.len());
        for (key, scene) in roster {
            if runtimes.iter().any(|runtime| runtime.key == key) {
                warn!(scene = ?key, "duplicate_scene_key_ignored");
                continue;
            }
            runtimes.push(SceneRuntime {
                key,
                scene,
                is_loaded: false,
            });
        }
        Self {
            runtimes,
            active: None,
        }
    }

    pub fn active_scene(&self) -> Option<K> {
        self.active.map(|index| self.runtimes[index].key)
    }

    pub fn contains(&self, key: K) -> bool {
        self.index_of(key).is_some()
    }

    pub fn roster(&self) -> Vec<K> {
        self.runtimes.iter().map(|runtime| runtime.key).collect()
    }

    pub fn loaded_count(&self) -> usize {
        self.runtimes.iter().filter(|runtime| runtime.is_loaded).count()
    }

    /// Returns false, changing nothing, when `key` is not in the roster.
    pub fn start(&mut self, key: K) -> bool {
        let Some(target) = self.index_of(key) else {
            warn!(scene = ?key, "unknown_scene_start_ignored");
            return false;
        };

        if let Some(active) = self.active.take() {
            Self::unload_runtime(&mut self.runtimes[active]);
        }
        let runtime = &mut self.runtimes[target];
        Self::unload_runtime(runtime);
        runtime.scene.load();
        runtime.is_loaded = true;
        self.active = Some(target);
        debug!(scene = ?key, "scene_started");
        true
    }

    pub fn update_active(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot) {
        if let Some(runtime) = self.active_runtime_mut() {
            runtime.scene.update(fixed_dt_seconds, input);
        }
    }

    pub fn render_active(&mut self, canvas: &mut Canvas<'_>) {
        if let Some(runtime) = self.active_runtime_mut() {
            runtime.scene.render(canvas);
        }
    }

    pub fn debug_title_active(&self) -> Option<String> {
        self.active
            .and_then(|index| self.runtimes[index].scene.debug_title())
    }

    pub fn shutdown_all(&mut self) {
        for runtime in &mut self.runtimes {
            Self::unload_runtime(runtime);
        }
        self.active = None;
    }

    fn unload_runtime(runtime: &mut SceneRuntime<K>) {
        if runtime.is_loaded {
            runtime.scene.unload();
            runtime.is_loaded = false;
        }
    }

    fn index_of(&self, key: K) -> Option<usize> {
        self.runtimes.iter().position(|runtime| runtime.key == key)
    }

    fn active_runtime_mut(&mut self) -> Option<&mut SceneRuntime<K>> {
        let index = self.active?;
        self.runtimes.get_mut(index)
    }
}
