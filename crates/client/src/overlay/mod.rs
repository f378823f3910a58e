//! HUD drawn over the engine frame.
//!
//! Which widgets exist is recomputed from the stores on every reconcile and
//! never cached. Each mounted widget owns a [`TrackingScope`]: it is rebuilt
//! only when something it read has changed, otherwise its last draw list is
//! repainted. Unmounting a widget drops it together with its timers.

mod widgets;

use std::rc::Rc;

use dungeon_engine::{
    Canvas, Clock, MetricsHandle, Observable, Rgba, TimerQueue, TrackingScope, Viewport,
};
use tracing::debug;

use crate::settings::Settings;
use crate::state::{ActiveScene, Connection, MultiplayerState, SessionState};
use crate::submission::SubmissionStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DrawItem {
    Text {
        x: i32,
        y: i32,
        text: String,
        scale: i32,
        color: Rgba,
    },
    Rect {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        color: Rgba,
        filled: bool,
    },
}

impl DrawItem {
    fn paint(&self, canvas: &mut Canvas<'_>) {
        match self {
            DrawItem::Text {
                x,
                y,
                text,
                scale,
                color,
            } => {
                canvas.text(*x, *y, text, *scale, *color);
            }
            DrawItem::Rect {
                x,
                y,
                width,
                height,
                color,
                filled,
            } => {
                if *filled {
                    canvas.fill_rect(*x, *y, *width, *height, *color);
                } else {
                    canvas.outline_rect(*x, *y, *width, *height, *color);
                }
            }
        }
    }
}

pub(crate) trait Widget {
    /// Produces the draw list. Every store read must go through `scope`.
    fn build(&mut self, scope: &mut TrackingScope) -> Vec<DrawItem>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum WidgetKind {
    BackButton,
    Hearts,
    HealthBar,
    Score,
    Round,
    RoundTimer,
    Fps,
    MultiplayerPanel,
    SubmissionPanel,
}

/// Back control shows on Home unless a room is joined over a live link.
pub(crate) fn back_button_visible(scene: ActiveScene, connection: &Connection) -> bool {
    scene == ActiveScene::Home && !(connection.is_connected() && connection.in_room())
}

pub(crate) fn mounted_widgets(
    scene: ActiveScene,
    connection: &Connection,
    settings: &Settings,
) -> Vec<WidgetKind> {
    let mut kinds = Vec::new();
    if back_button_visible(scene, connection) {
        kinds.push(WidgetKind::BackButton);
    }
    if scene == ActiveScene::Game {
        kinds.push(WidgetKind::Hearts);
        if settings.show_health_bars {
            kinds.push(WidgetKind::HealthBar);
        }
        kinds.extend([WidgetKind::Score, WidgetKind::Round, WidgetKind::RoundTimer]);
    }
    if scene != ActiveScene::Game && connection.in_room() {
        kinds.push(WidgetKind::MultiplayerPanel);
    }
    if scene == ActiveScene::GameOver {
        kinds.push(WidgetKind::SubmissionPanel);
    }
    if settings.show_fps {
        kinds.push(WidgetKind::Fps);
    }
    kinds
}

/// Handles the overlay reads from. Cloned into widgets on mount.
#[derive(Clone)]
pub(crate) struct OverlaySources {
    pub(crate) session: SessionState,
    pub(crate) multiplayer: MultiplayerState,
    pub(crate) settings: Observable<Option<Settings>>,
    pub(crate) submission: Option<Observable<SubmissionStatus>>,
    pub(crate) metrics: MetricsHandle,
    pub(crate) timers: TimerQueue,
    pub(crate) clock: Rc<dyn Clock>,
    pub(crate) viewport: Observable<Viewport>,
}

struct MountedWidget {
    kind: WidgetKind,
    widget: Box<dyn Widget>,
    scope: TrackingScope,
    items: Vec<DrawItem>,
    renders: u32,
}

pub(crate) struct OverlayLayer {
    sources: OverlaySources,
    mounted: Vec<MountedWidget>,
}

impl OverlayLayer {
    pub(crate) fn new(sources: OverlaySources) -> Self {
        Self {
            sources,
            mounted: Vec::new(),
        }
    }

    /// Swaps the submission status source. Mounted widgets are dropped so
    /// none keeps reading the old one.
    pub(crate) fn set_submission_status(&mut self, status: Option<Observable<SubmissionStatus>>) {
        self.sources.submission = status;
        self.mounted.clear();
    }

    pub(crate) fn mounted_kinds(&self) -> Vec<WidgetKind> {
        self.mounted.iter().map(|mounted| mounted.kind).collect()
    }

    /// Mounts and unmounts widgets to match the current store state.
    pub(crate) fn reconcile(&mut self) {
        let scene = self.sources.session.active_scene.get();
        let settings = self.sources.settings.get().unwrap_or_default();
        let desired = self
            .sources
            .multiplayer
            .connection
            .with(|connection| mounted_widgets(scene, connection, &settings));

        let current = self.mounted_kinds();
        if current == desired {
            return;
        }

        let mut previous = std::mem::take(&mut self.mounted);
        for kind in &desired {
            let mounted = match previous.iter().position(|mounted| mounted.kind == *kind) {
                Some(index) => previous.swap_remove(index),
                None => {
                    debug!(widget = ?kind, "overlay_widget_mounted");
                    MountedWidget {
                        kind: *kind,
                        widget: widgets::create(*kind, &self.sources),
                        scope: TrackingScope::new(),
                        items: Vec::new(),
                        renders: 0,
                    }
                }
            };
            self.mounted.push(mounted);
        }
        for dropped in previous {
            debug!(widget = ?dropped.kind, "overlay_widget_unmounted");
        }
    }

    pub(crate) fn render(&mut self, canvas: &mut Canvas<'_>) {
        for mounted in &mut self.mounted {
            if mounted.renders == 0 || mounted.scope.needs_render() {
                mounted.scope.begin();
                mounted.items = mounted.widget.build(&mut mounted.scope);
                mounted.renders += 1;
            }
            for item in &mounted.items {
                item.paint(canvas);
            }
        }
    }
}
