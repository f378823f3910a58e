//! Ownership of the frame-clocked engine instance.
//!
//! The host builds the engine once its mount preconditions are met, keeps it
//! across ordinary state changes, rebuilds it only when a declared dependency
//! changes, and tears it down exactly once per construction.

use std::fmt;

use thiserror::Error;
use tracing::{info, warn};

use crate::app::{Canvas, InputSnapshot};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine construction failed: {0}")]
    Construct(String),
    #[error("engine teardown failed: {0}")]
    Destroy(String),
}

pub trait FrameEngine {
    fn tick(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot);
    fn render(&mut self, canvas: &mut Canvas<'_>);
    /// Releases engine resources. Called exactly once per constructed engine.
    fn destroy(&mut self) -> Result<(), EngineError>;
}

pub trait EngineFactory {
    type Engine: FrameEngine;
    /// Compared on every sync; a change means the engine must be rebuilt.
    type Deps: PartialEq + Clone + fmt::Debug;

    fn construct(&mut self, deps: &Self::Deps) -> Result<Self::Engine, EngineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    /// Preconditions not met yet; nothing is mounted.
    Deferred,
    Constructed,
    Retained,
    Reconstructed,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleCounters {
    pub constructed: u32,
    pub destroyed: u32,
}

struct MountedEngine<F: EngineFactory> {
    engine: F::Engine,
    deps: F::Deps,
}

pub struct RenderLoopHost<F: EngineFactory> {
    factory: F,
    mounted: Option<MountedEngine<F>>,
    counters: LifecycleCounters,
}

impl<F: EngineFactory> fmt::Debug for RenderLoopHost<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderLoopHost")
            .field("mounted", &self.mounted.as_ref().map(|mounted| &mounted.deps))
            .field("counters", &self.counters)
            .finish()
    }
}

impl<F: EngineFactory> RenderLoopHost<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            mounted: None,
            counters: LifecycleCounters::default(),
        }
    }

    /// Reconciles the mounted engine with the current dependencies.
    /// `None` means the preconditions do not hold (configuration not loaded).
    pub fn sync(&mut self, deps: Option<F::Deps>) -> MountOutcome {
        let Some(deps) = deps else {
            self.teardown("preconditions_lost");
            return MountOutcome::Deferred;
        };

        if let Some(mounted) = &self.mounted {
            if mounted.deps == deps {
                return MountOutcome::Retained;
            }
        }
        let was_mounted = self.teardown("dependencies_changed");

        match self.factory.construct(&deps) {
            Ok(engine) => {
                self.counters.constructed += 1;
                info!(deps = ?deps, constructed = self.counters.constructed, "engine_constructed");
                self.mounted = Some(MountedEngine { engine, deps });
                if was_mounted {
                    MountOutcome::Reconstructed
                } else {
                    MountOutcome::Constructed
                }
            }
            Err(error) => {
                warn!(error = %error, "engine_construct_failed");
                MountOutcome::Failed
            }
        }
    }

    /// Destroys the engine if one is mounted. Returns whether one was.
    pub fn unmount(&mut self) -> bool {
        self.teardown("unmount")
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    pub fn engine(&self) -> Option<&F::Engine> {
        self.mounted.as_ref().map(|mounted| &mounted.engine)
    }

    pub fn engine_mut(&mut self) -> Option<&mut F::Engine> {
        self.mounted.as_mut().map(|mounted| &mut mounted.engine)
    }

    pub fn counters(&self) -> LifecycleCounters {
        self.counters
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    fn teardown(&mut self, reason: &'static str) -> bool {
        // The slot is cleared before destroy runs, so a failing destroy
        // still leaves the host unmounted.
        let Some(mut mounted) = self.mounted.take() else {
            return false;
        };
        self.counters.destroyed += 1;
        match mounted.engine.destroy() {
            Ok(()) => info!(reason, destroyed = self.counters.destroyed, "engine_destroyed"),
            Err(error) => warn!(reason, error = %error, "engine_destroy_failed"),
        }
        true
    }
}

impl<F: EngineFactory> Drop for RenderLoopHost<F> {
    fn drop(&mut self) {
        self.teardown("host_dropped");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    struct CountingEngine {
        destroys: Rc<Cell<u32>>,
        fail_destroy: bool,
    }

    impl FrameEngine for CountingEngine {
        fn tick(&mut self, _fixed_dt_seconds: f32, _input: &InputSnapshot) {}

        fn render(&mut self, _canvas: &mut Canvas<'_>) {}

        fn destroy(&mut self) -> Result<(), EngineError> {
            self.destroys.set(self.destroys.get() + 1);
            if self.fail_destroy {
                Err(EngineError::Destroy("gpu lost".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        destroys: Rc<Cell<u32>>,
        fail_destroy: bool,
        fail_construct: bool,
    }

    impl EngineFactory for CountingFactory {
        type Engine = CountingEngine;
        type Deps = bool;

        fn construct(&mut self, _deps: &bool) -> Result<CountingEngine, EngineError> {
            if self.fail_construct {
                return Err(EngineError::Construct("no adapter".to_string()));
            }
            Ok(CountingEngine {
                destroys: Rc::clone(&self.destroys),
                fail_destroy: self.fail_destroy,
            })
        }
    }

    #[test]
    fn construction_is_deferred_until_preconditions_hold() {
        let mut host = RenderLoopHost::new(CountingFactory::default());
        assert_eq!(host.sync(None), MountOutcome::Deferred);
        assert!(!host.is_mounted());
        assert_eq!(host.counters().constructed, 0);

        assert_eq!(host.sync(Some(true)), MountOutcome::Constructed);
        assert!(host.is_mounted());
    }

    #[test]
    fn unchanged_deps_keep_the_same_engine() {
        let mut host = RenderLoopHost::new(CountingFactory::default());
        host.sync(Some(true));
        for _ in 0..10 {
            assert_eq!(host.sync(Some(true)), MountOutcome::Retained);
        }
        assert_eq!(host.counters().constructed, 1);
        assert_eq!(host.counters().destroyed, 0);
    }

    #[test]
    fn changed_deps_rebuild_once() {
        let mut host = RenderLoopHost::new(CountingFactory::default());
        host.sync(Some(true));
        assert_eq!(host.sync(Some(false)), MountOutcome::Reconstructed);
        assert_eq!(
            host.counters(),
            LifecycleCounters {
                constructed: 2,
                destroyed: 1
            }
        );
    }

    #[test]
    fn construct_and_destroy_counts_match_after_mount_cycles() {
        let factory = CountingFactory::default();
        let destroys = Rc::clone(&factory.destroys);
        let mut host = RenderLoopHost::new(factory);

        for round in 0..5 {
            host.sync(Some(round % 2 == 0));
            host.sync(Some(round % 2 == 0));
            assert!(host.unmount());
            assert!(!host.unmount());
        }

        let counters = host.counters();
        assert_eq!(counters.constructed, 5);
        assert_eq!(counters.constructed, counters.destroyed);
        assert_eq!(destroys.get(), 5);
    }

    #[test]
    fn failing_destroy_still_clears_the_mount() {
        let factory = CountingFactory {
            fail_destroy: true,
            ..CountingFactory::default()
        };
        let mut host = RenderLoopHost::new(factory);
        host.sync(Some(true));

        assert!(host.unmount());
        assert!(!host.is_mounted());
        assert_eq!(host.counters().destroyed, 1);
        assert_eq!(host.sync(Some(true)), MountOutcome::Constructed);
    }

    #[test]
    fn failed_construction_leaves_nothing_mounted() {
        let factory = CountingFactory {
            fail_construct: true,
            ..CountingFactory::default()
        };
        let mut host = RenderLoopHost::new(factory);

        assert_eq!(host.sync(Some(true)), MountOutcome::Failed);
        assert!(!host.is_mounted());
        assert_eq!(host.counters(), LifecycleCounters::default());
    }

    #[test]
    fn dropping_the_host_destroys_the_engine() {
        let factory = CountingFactory::default();
        let destroys = Rc::clone(&factory.destroys);
        {
            let mut host = RenderLoopHost::new(factory);
            host.sync(Some(true));
        }
        assert_eq!(destroys.get(), 1);
    }

    #[test]
    fn losing_preconditions_tears_down() {
        let mut host = RenderLoopHost::new(CountingFactory::default());
        host.sync(Some(true));
        assert_eq!(host.sync(None), MountOutcome::Deferred);
        assert!(!host.is_mounted());
        assert_eq!(host.counters().destroyed, 1);
    }
}
