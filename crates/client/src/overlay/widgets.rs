use std::time::Duration;

use dungeon_engine::{
    line_advance, text_width, MetricsHandle, Observable, Rgba, TimerHandle, TrackingScope,
    Viewport,
};

use super::{DrawItem, OverlaySources, Widget, WidgetKind};
use crate::state::{Connection, SessionState, FULL_HEALTH};
use crate::submission::SubmissionStatus;

const MARGIN: i32 = 8;
const TEXT: Rgba = [236, 236, 244, 255];
const ACCENT: Rgba = [236, 208, 120, 255];
const HEART: Rgba = [220, 60, 80, 255];
const BAR_FRAME: Rgba = [200, 200, 210, 255];
const BAR_FILL: Rgba = [80, 200, 110, 255];
const PANEL: Rgba = [0, 0, 0, 150];
const ERROR: Rgba = [240, 110, 100, 255];
const ROUND_TIMER_PERIOD: Duration = Duration::from_millis(100);
const FPS_PERIOD: Duration = Duration::from_millis(250);
const HEART_SIZE: i32 = 10;
const HEALTH_BAR_WIDTH: i32 = 100;
const RECORD_ID_PREFIX_CHARS: usize = 12;

pub(super) fn create(kind: WidgetKind, sources: &OverlaySources) -> Box<dyn Widget> {
    match kind {
        WidgetKind::BackButton => Box::new(BackButton),
        WidgetKind::Hearts => Box::new(Hearts {
            session: sources.session.clone(),
        }),
        WidgetKind::HealthBar => Box::new(HealthBar {
            session: sources.session.clone(),
        }),
        WidgetKind::Score => Box::new(Score {
            session: sources.session.clone(),
            viewport: sources.viewport.clone(),
        }),
        WidgetKind::Round => Box::new(Round {
            session: sources.session.clone(),
            viewport: sources.viewport.clone(),
        }),
        WidgetKind::RoundTimer => Box::new(RoundTimer::mount(sources)),
        WidgetKind::Fps => Box::new(Fps::mount(sources)),
        WidgetKind::MultiplayerPanel => Box::new(MultiplayerPanel {
            connection: sources.multiplayer.connection.clone(),
            roster: sources.multiplayer.roster.clone(),
            viewport: sources.viewport.clone(),
        }),
        WidgetKind::SubmissionPanel => Box::new(SubmissionPanel {
            status: sources.submission.clone(),
            viewport: sources.viewport.clone(),
        }),
    }
}

fn text(x: i32, y: i32, text: impl Into<String>, scale: i32, color: Rgba) -> DrawItem {
    DrawItem::Text {
        x,
        y,
        text: text.into(),
        scale,
        color,
    }
}

fn rect(x: i32, y: i32, width: i32, height: i32, color: Rgba, filled: bool) -> DrawItem {
    DrawItem::Rect {
        x,
        y,
        width,
        height,
        color,
        filled,
    }
}

fn centered_x(viewport: Viewport, line: &str, scale: i32) -> i32 {
    (viewport.width as i32 - text_width(line, scale)) / 2
}

struct BackButton;

impl Widget for BackButton {
    fn build(&mut self, _scope: &mut TrackingScope) -> Vec<DrawItem> {
        let label = "< BACK";
        vec![
            rect(MARGIN, MARGIN, text_width(label, 1) + 8, 13, PANEL, true),
            text(MARGIN + 4, MARGIN + 4, label, 1, TEXT),
        ]
    }
}

struct Hearts {
    session: SessionState,
}

impl Widget for Hearts {
    fn build(&mut self, scope: &mut TrackingScope) -> Vec<DrawItem> {
        let lives = self.session.total_lives.track(scope) as i32;
        (0..lives)
            .map(|index| {
                rect(
                    MARGIN + index * (HEART_SIZE + 4),
                    MARGIN,
                    HEART_SIZE,
                    HEART_SIZE,
                    HEART,
                    true,
                )
            })
            .collect()
    }
}

struct HealthBar {
    session: SessionState,
}

impl Widget for HealthBar {
    fn build(&mut self, scope: &mut TrackingScope) -> Vec<DrawItem> {
        let health = self.session.player_health.track(scope).min(FULL_HEALTH);
        let filled = HEALTH_BAR_WIDTH * health as i32 / FULL_HEALTH as i32;
        let y = MARGIN + HEART_SIZE + 6;
        vec![
            rect(MARGIN, y, HEALTH_BAR_WIDTH + 2, 8, BAR_FRAME, false),
            rect(MARGIN + 1, y + 1, filled, 6, BAR_FILL, true),
        ]
    }
}

struct Score {
    session: SessionState,
    viewport: Observable<Viewport>,
}

impl Widget for Score {
    fn build(&mut self, scope: &mut TrackingScope) -> Vec<DrawItem> {
        let viewport = self.viewport.track(scope);
        let line = format!("Score: {}", self.session.score.track(scope));
        let x = viewport.width as i32 - MARGIN - text_width(&line, 2);
        vec![text(x, MARGIN, line, 2, ACCENT)]
    }
}

struct Round {
    session: SessionState,
    viewport: Observable<Viewport>,
}

impl Widget for Round {
    fn build(&mut self, scope: &mut TrackingScope) -> Vec<DrawItem> {
        let viewport = self.viewport.track(scope);
        let line = format!("Round: {}", self.session.level.track(scope));
        vec![text(centered_x(viewport, &line, 2), MARGIN, line, 2, TEXT)]
    }
}

/// Elapsed time of the current round, refreshed by its own interval timer.
struct RoundTimer {
    elapsed: Observable<Duration>,
    viewport: Observable<Viewport>,
    _timer: TimerHandle,
}

impl RoundTimer {
    fn mount(sources: &OverlaySources) -> Self {
        let now = sources.clock.now();
        let session = sources.session.clone();
        let elapsed = Observable::new(round_elapsed(&session, now));
        let target = elapsed.clone();
        let timer = sources
            .timers
            .set_interval(now, ROUND_TIMER_PERIOD, move |now| {
                target.set(round_elapsed(&session, now));
            });
        Self {
            elapsed,
            viewport: sources.viewport.clone(),
            _timer: timer,
        }
    }
}

fn round_elapsed(session: &SessionState, now: std::time::Instant) -> Duration {
    session
        .current_round()
        .map(|round| now.saturating_duration_since(round.start))
        .unwrap_or_default()
}

fn round_timer_text(elapsed: Duration) -> String {
    if elapsed.is_zero() {
        "Current Round: 0 seconds".to_string()
    } else {
        format!("Current Round: {:.2} seconds", elapsed.as_secs_f64())
    }
}

impl Widget for RoundTimer {
    fn build(&mut self, scope: &mut TrackingScope) -> Vec<DrawItem> {
        let viewport = self.viewport.track(scope);
        let line = round_timer_text(self.elapsed.track(scope));
        let y = MARGIN + line_advance(2) + 2;
        vec![text(centered_x(viewport, &line, 1), y, line, 1, TEXT)]
    }
}

struct Fps {
    fps: Observable<u32>,
    viewport: Observable<Viewport>,
    _timer: TimerHandle,
}

impl Fps {
    fn mount(sources: &OverlaySources) -> Self {
        let metrics = sources.metrics.clone();
        let fps = Observable::new(rounded_fps(&metrics));
        let target = fps.clone();
        let timer = sources
            .timers
            .set_interval(sources.clock.now(), FPS_PERIOD, move |_| {
                target.set(rounded_fps(&metrics));
            });
        Self {
            fps,
            viewport: sources.viewport.clone(),
            _timer: timer,
        }
    }
}

fn rounded_fps(metrics: &MetricsHandle) -> u32 {
    metrics.snapshot().fps.max(0.0).round() as u32
}

impl Widget for Fps {
    fn build(&mut self, scope: &mut TrackingScope) -> Vec<DrawItem> {
        let viewport = self.viewport.track(scope);
        let line = format!("FPS: {}", self.fps.track(scope));
        let y = viewport.height as i32 - MARGIN - line_advance(1);
        vec![text(MARGIN, y, line, 1, TEXT)]
    }
}

struct MultiplayerPanel {
    connection: Observable<Connection>,
    roster: Observable<Vec<String>>,
    viewport: Observable<Viewport>,
}

impl Widget for MultiplayerPanel {
    fn build(&mut self, scope: &mut TrackingScope) -> Vec<DrawItem> {
        let viewport = self.viewport.track(scope);
        let connection = self.connection.track(scope);
        let Some(room) = connection.current_room() else {
            return Vec::new();
        };
        let mut lines = vec![format!("Room: {room}")];
        lines.extend(self.roster.track(scope));

        let width = lines
            .iter()
            .map(|line| text_width(line, 1))
            .max()
            .unwrap_or(0)
            + 8;
        let x = viewport.width as i32 - MARGIN - width;
        let top = MARGIN + line_advance(2) + 4;
        let mut items = vec![rect(
            x,
            top,
            width,
            lines.len() as i32 * line_advance(1) + 6,
            PANEL,
            true,
        )];
        for (index, line) in lines.into_iter().enumerate() {
            let color = if index == 0 { ACCENT } else { TEXT };
            items.push(text(x + 4, top + 4 + index as i32 * line_advance(1), line, 1, color));
        }
        items
    }
}

struct SubmissionPanel {
    status: Option<Observable<SubmissionStatus>>,
    viewport: Observable<Viewport>,
}

impl Widget for SubmissionPanel {
    fn build(&mut self, scope: &mut TrackingScope) -> Vec<DrawItem> {
        let Some(status) = &self.status else {
            return Vec::new();
        };
        let viewport = self.viewport.track(scope);
        let lines: Vec<(String, Rgba)> = match status.track(scope) {
            SubmissionStatus::Idle => Vec::new(),
            SubmissionStatus::Pending => vec![("Saving run...".to_string(), TEXT)],
            SubmissionStatus::Submitted(record_id) => vec![
                ("Run saved".to_string(), ACCENT),
                (
                    format!(
                        "id: {}",
                        record_id
                            .chars()
                            .take(RECORD_ID_PREFIX_CHARS)
                            .collect::<String>()
                    ),
                    TEXT,
                ),
            ],
            SubmissionStatus::Failed(message) => vec![
                (format!("Save failed: {message}"), ERROR),
                ("R to retry".to_string(), TEXT),
            ],
        };

        let bottom = viewport.height as i32 - MARGIN - 2 * line_advance(1);
        lines
            .into_iter()
            .enumerate()
            .map(|(index, (line, color))| {
                let x = centered_x(viewport, &line, 1);
                text(x, bottom + index as i32 * line_advance(1), line, 1, color)
            })
            .collect()
    }
}
