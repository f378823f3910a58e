//! Minimal dungeon rules: one room per level, enemies that chase the player
//! and hurt on contact, and stairs that open once the room is cleared.

use crate::state::{SessionState, FULL_HEALTH};

pub(crate) const ARENA_WIDTH: f32 = 20.0;
pub(crate) const ARENA_HEIGHT: f32 = 13.0;
pub(crate) const CONTACT_DAMAGE: u32 = 25;
pub(crate) const DEFEAT_SCORE: u32 = 10;
const PLAYER_SPEED: f32 = 6.0;
const ENEMY_SPEED: f32 = 2.0;
const ENEMY_SPEED_PER_LEVEL: f32 = 0.25;
const ATTACK_RANGE: f32 = 1.6;
const CONTACT_RANGE: f32 = 0.7;
const STAIRS_RANGE: f32 = 0.6;
const HIT_COOLDOWN_SECONDS: f32 = 0.8;
const MAX_ENEMIES: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct Vec2 {
    pub(crate) x: f32,
    pub(crate) y: f32,
}

impl Vec2 {
    pub(crate) const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn distance(self, other: Vec2) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Enemy {
    pub(crate) position: Vec2,
    pub(crate) alive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct Intent {
    pub(crate) move_x: f32,
    pub(crate) move_y: f32,
    pub(crate) attack: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RuleEvent {
    EnemyDefeated,
    PlayerHit,
    ReachedStairs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HitOutcome {
    Wounded,
    LifeLost,
    Died,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Arena {
    pub(crate) level: u32,
    pub(crate) player: Vec2,
    pub(crate) enemies: Vec<Enemy>,
    pub(crate) stairs: Vec2,
    enemy_speed: f32,
    hit_cooldown: f32,
}

impl Arena {
    /// Same level, same layout.
    pub(crate) fn for_level(level: u32) -> Self {
        let mut rng = LayoutRng::new(level);
        let enemy_count = level.saturating_add(2).min(MAX_ENEMIES);
        let enemies = (0..enemy_count)
            .map(|_| Enemy {
                position: Vec2::new(
                    rng.range(ARENA_WIDTH * 0.4, ARENA_WIDTH - 1.0),
                    rng.range(1.0, ARENA_HEIGHT - 1.0),
                ),
                alive: true,
            })
            .collect();
        Self {
            level,
            player: Vec2::new(1.5, ARENA_HEIGHT / 2.0),
            enemies,
            stairs: Vec2::new(ARENA_WIDTH - 1.5, rng.range(1.5, ARENA_HEIGHT - 1.5)),
            enemy_speed: ENEMY_SPEED + ENEMY_SPEED_PER_LEVEL * level.saturating_sub(1) as f32,
            hit_cooldown: 0.0,
        }
    }

    /// Room without enemies, used where nothing can hurt the player.
    pub(crate) fn empty() -> Self {
        let mut arena = Self::for_level(1);
        arena.enemies.clear();
        arena
    }

    pub(crate) fn living_enemies(&self) -> usize {
        self.enemies.iter().filter(|enemy| enemy.alive).count()
    }

    pub(crate) fn stairs_open(&self) -> bool {
        self.living_enemies() == 0
    }

    pub(crate) fn step(&mut self, dt: f32, intent: Intent) -> Vec<RuleEvent> {
        let mut events = Vec::new();
        self.player.x =
            (self.player.x + intent.move_x * PLAYER_SPEED * dt).clamp(0.5, ARENA_WIDTH - 0.5);
        self.player.y =
            (self.player.y + intent.move_y * PLAYER_SPEED * dt).clamp(0.5, ARENA_HEIGHT - 0.5);

        if intent.attack {
            for enemy in self.enemies.iter_mut().filter(|enemy| enemy.alive) {
                if enemy.position.distance(self.player) <= ATTACK_RANGE {
                    enemy.alive = false;
                    events.push(RuleEvent::EnemyDefeated);
                }
            }
        }

        let player = self.player;
        let reach = self.enemy_speed * dt;
        for enemy in self.enemies.iter_mut().filter(|enemy| enemy.alive) {
            let distance = enemy.position.distance(player);
            if distance > CONTACT_RANGE * 0.5 {
                let step = reach.min(distance);
                enemy.position.x += (player.x - enemy.position.x) / distance * step;
                enemy.position.y += (player.y - enemy.position.y) / distance * step;
            }
        }

        self.hit_cooldown = (self.hit_cooldown - dt).max(0.0);
        let touching = self
            .enemies
            .iter()
            .any(|enemy| enemy.alive && enemy.position.distance(self.player) <= CONTACT_RANGE);
        if touching && self.hit_cooldown <= 0.0 {
            self.hit_cooldown = HIT_COOLDOWN_SECONDS;
            events.push(RuleEvent::PlayerHit);
        }

        if self.stairs_open() && self.player.distance(self.stairs) <= STAIRS_RANGE {
            events.push(RuleEvent::ReachedStairs);
        }
        events
    }
}

/// Applies `damage` to the player. A hit that would empty the health bar
/// costs a life and refills it; on the last life health drops to zero.
pub(crate) fn apply_hit(session: &SessionState, damage: u32) -> HitOutcome {
    let health = session.player_health.get();
    if health > damage {
        session.player_health.set(health - damage);
        return HitOutcome::Wounded;
    }
    let lives = session.total_lives.get();
    if lives > 1 {
        session.total_lives.set(lives - 1);
        session.player_health.set(FULL_HEALTH);
        HitOutcome::LifeLost
    } else {
        session.total_lives.set(0);
        session.player_health.set(0);
        HitOutcome::Died
    }
}

pub(crate) fn award_defeat(session: &SessionState) {
    session
        .score
        .update(|score| *score = score.saturating_add(DEFEAT_SCORE));
}

/// LCG seeded by level number.
struct LayoutRng(u64);

impl LayoutRng {
    fn new(seed: u32) -> Self {
        Self(u64::from(seed).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ 0xD1B5_4A32_D192_ED03)
    }

    fn next_unit(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((self.0 >> 40) as f32) / ((1u64 << 24) as f32)
    }

    fn range(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_unit()
    }
}
