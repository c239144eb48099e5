//! Node mobility providers.
//!
//! Contains:
//! - The `MobilityModel` trait: position as a function of simulated time
//! - Constant position, 2D random walk with boundary reflection, random waypoint
//! - `MobilitySpec`, the serializable form used by scene files and experiments
//!
//! Providers are evaluated lazily: the channel asks for a position when a packet is sent,
//! and the provider advances its internal trajectory up to that instant. Queries must be
//! non-decreasing in time; an earlier query returns the latest known position.

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::geometry::Rectangle;
use super::types::{Position, SimTime};
use crate::error::SimError;

/// Upper bound on boundary reflections handled in one step before clamping.
const MAX_REFLECTIONS_PER_STEP: usize = 10_000;
/// Shortest leg a walker or waypoint traveller takes. Shorter legs are stretched to it.
pub const MIN_LEG_DURATION: SimTime = SimTime::from_millis(1);

pub trait MobilityModel {
    /// Position at `time`. Advances internal state; calls must be non-decreasing in time.
    fn position_at(&mut self, time: SimTime) -> Position;

    fn name(&self) -> &'static str;
}

// ---------- Constant ----------

pub struct ConstantPosition {
    position: Position,
}

impl ConstantPosition {
    pub fn new(position: Position) -> Self {
        ConstantPosition { position }
    }
}

impl MobilityModel for ConstantPosition {
    fn position_at(&mut self, _time: SimTime) -> Position {
        self.position
    }

    fn name(&self) -> &'static str {
        "constant"
    }
}

// ---------- Random walk ----------

/// How long one random-walk leg lasts before direction and speed are re-drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WalkMode {
    /// Walk for a fixed duration (seconds).
    Time { seconds: f64 },
    /// Walk a fixed distance (meters).
    Distance { meters: f64 },
}

impl Default for WalkMode {
    fn default() -> Self {
        WalkMode::Time { seconds: 2.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandomWalkParameters {
    pub bounds: Rectangle,
    #[serde(default)]
    pub mode: WalkMode,
    #[serde(default = "default_speed")]
    pub speed_min: f64,
    #[serde(default = "default_speed")]
    pub speed_max: f64,
}

fn default_speed() -> f64 {
    1.0
}

fn validate_speeds(min: f64, max: f64) -> Result<(), SimError> {
    if !(min >= 0.0 && min <= max && max.is_finite()) {
        return Err(SimError::invalid_argument(format!("speed range [{}, {}] must satisfy 0 <= min <= max", min, max)));
    }
    Ok(())
}

/// 2D random walk inside a rectangle.
///
/// Each leg draws a direction uniformly in [0, 2π) and a speed uniformly in
/// [speed_min, speed_max]. When the walker hits the boundary, the velocity component
/// normal to that edge is reflected and the walk continues for the rest of the leg.
/// An axis with zero extent never moves.
pub struct RandomWalk2d {
    params: RandomWalkParameters,
    rng: StdRng,
    position: Position,
    velocity: (f64, f64),
    updated_at: SimTime,
    leg_end: SimTime,
}

impl RandomWalk2d {
    pub fn new(params: RandomWalkParameters, initial: Position, rng: StdRng) -> Result<Self, SimError> {
        if !params.bounds.is_valid() {
            return Err(SimError::invalid_argument(format!("invalid random walk bounds {:?}", params.bounds)));
        }
        if !params.bounds.contains(&initial) {
            return Err(SimError::invalid_argument(format!("initial position {} outside random walk bounds {:?}", initial, params.bounds)));
        }
        validate_speeds(params.speed_min, params.speed_max)?;
        match params.mode {
            WalkMode::Time { seconds } if !(seconds > 0.0) || SimTime::from_secs_f64(seconds) < MIN_LEG_DURATION => {
                return Err(SimError::invalid_argument(format!("random walk leg time must be at least {}, got {} s", MIN_LEG_DURATION, seconds)));
            }
            WalkMode::Distance { meters } if !(meters > 0.0) => return Err(SimError::invalid_argument(format!("random walk leg distance must be positive, got {}", meters))),
            _ => {}
        }
        let mut walk = RandomWalk2d {
            params,
            rng,
            position: initial,
            velocity: (0.0, 0.0),
            updated_at: SimTime::ZERO,
            leg_end: SimTime::ZERO,
        };
        walk.begin_leg(SimTime::ZERO);
        Ok(walk)
    }

    fn begin_leg(&mut self, start: SimTime) {
        let direction = self.rng.gen_range(0.0..2.0 * PI);
        let speed = if self.params.speed_min < self.params.speed_max {
            self.rng.gen_range(self.params.speed_min..=self.params.speed_max)
        } else {
            self.params.speed_min
        };
        let bounds = &self.params.bounds;
        let vx = if bounds.width() > 0.0 { speed * direction.cos() } else { 0.0 };
        let vy = if bounds.height() > 0.0 { speed * direction.sin() } else { 0.0 };
        self.velocity = (vx, vy);
        self.updated_at = start;
        self.leg_end = match self.params.mode {
            WalkMode::Time { seconds } => start + SimTime::from_secs_f64(seconds),
            WalkMode::Distance { meters } if speed > 0.0 => start + SimTime::from_secs_f64(meters / speed).max(MIN_LEG_DURATION),
            WalkMode::Distance { .. } => SimTime::MAX,
        };
    }

    /// Move for `dt` seconds, reflecting off the boundary.
    fn advance(&mut self, dt: f64) {
        let bounds = self.params.bounds;
        let mut remaining = dt;
        let mut reflections = 0;
        while remaining > 0.0 && reflections < MAX_REFLECTIONS_PER_STEP {
            let (vx, vy) = self.velocity;
            let hit_x = time_to_edge(self.position.x, vx, bounds.x_min, bounds.x_max);
            let hit_y = time_to_edge(self.position.y, vy, bounds.y_min, bounds.y_max);
            let hit = hit_x.min(hit_y);
            if hit >= remaining {
                self.position.x += vx * remaining;
                self.position.y += vy * remaining;
                break;
            }
            self.position.x += vx * hit;
            self.position.y += vy * hit;
            if hit_x <= hit {
                self.velocity.0 = -vx;
            }
            if hit_y <= hit {
                self.velocity.1 = -vy;
            }
            remaining -= hit;
            reflections += 1;
        }
        self.position = bounds.clamp(self.position);
    }
}

/// Seconds until a coordinate moving at `v` reaches `min` or `max`. Infinite when not moving.
fn time_to_edge(coord: f64, v: f64, min: f64, max: f64) -> f64 {
    if v > 0.0 {
        ((max - coord) / v).max(0.0)
    } else if v < 0.0 {
        ((min - coord) / v).max(0.0)
    } else {
        f64::INFINITY
    }
}

impl MobilityModel for RandomWalk2d {
    fn position_at(&mut self, time: SimTime) -> Position {
        while time > self.updated_at {
            let step_end = time.min(self.leg_end);
            self.advance((step_end - self.updated_at).as_secs_f64());
            self.updated_at = step_end;
            if step_end == self.leg_end && time > step_end {
                self.begin_leg(step_end);
            }
        }
        self.position
    }

    fn name(&self) -> &'static str {
        "random-walk-2d"
    }
}

// ---------- Random waypoint ----------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandomWaypointParameters {
    pub bounds: Rectangle,
    pub speed_min: f64,
    pub speed_max: f64,
    /// Pause at each waypoint (seconds).
    #[serde(default)]
    pub pause: f64,
}

enum WaypointPhase {
    Moving { from: Position, to: Position, depart: SimTime, arrive: SimTime },
    Paused { at: Position, until: SimTime },
}

/// Straight-line travel to uniformly drawn waypoints with a pause at each arrival.
pub struct RandomWaypoint {
    params: RandomWaypointParameters,
    rng: StdRng,
    phase: WaypointPhase,
    pause: SimTime,
}

impl RandomWaypoint {
    pub fn new(params: RandomWaypointParameters, initial: Position, rng: StdRng) -> Result<Self, SimError> {
        if !params.bounds.is_valid() {
            return Err(SimError::invalid_argument(format!("invalid random waypoint bounds {:?}", params.bounds)));
        }
        if !params.bounds.contains(&initial) {
            return Err(SimError::invalid_argument(format!("initial position {} outside random waypoint bounds {:?}", initial, params.bounds)));
        }
        validate_speeds(params.speed_min, params.speed_max)?;
        if !(params.pause >= 0.0) {
            return Err(SimError::invalid_argument(format!("random waypoint pause must be non-negative, got {}", params.pause)));
        }
        let mut waypoint = RandomWaypoint {
            pause: SimTime::from_secs_f64(params.pause),
            params,
            rng,
            phase: WaypointPhase::Paused {
                at: initial,
                until: SimTime::ZERO,
            },
        };
        waypoint.begin_leg(initial, SimTime::ZERO);
        Ok(waypoint)
    }

    fn begin_leg(&mut self, from: Position, depart: SimTime) {
        let b = self.params.bounds;
        let to = Position {
            x: if b.width() > 0.0 { self.rng.gen_range(b.x_min..=b.x_max) } else { b.x_min },
            y: if b.height() > 0.0 { self.rng.gen_range(b.y_min..=b.y_max) } else { b.y_min },
            z: from.z,
        };
        let speed = if self.params.speed_min < self.params.speed_max {
            self.rng.gen_range(self.params.speed_min..=self.params.speed_max)
        } else {
            self.params.speed_min
        };
        let length = from.distance_to(&to);
        if speed <= 0.0 || (length == 0.0 && self.pause == SimTime::ZERO) {
            // Nothing would ever advance the clock: park the node.
            self.phase = WaypointPhase::Paused { at: from, until: SimTime::MAX };
            return;
        }
        self.phase = WaypointPhase::Moving {
            from,
            to,
            depart,
            arrive: depart + SimTime::from_secs_f64(length / speed).max(MIN_LEG_DURATION),
        };
    }
}

impl MobilityModel for RandomWaypoint {
    fn position_at(&mut self, time: SimTime) -> Position {
        loop {
            match self.phase {
                WaypointPhase::Moving { from, to, depart, arrive } => {
                    if time < arrive {
                        let span = (arrive - depart).as_secs_f64();
                        let fraction = if span > 0.0 { ((time - depart).as_secs_f64() / span).clamp(0.0, 1.0) } else { 1.0 };
                        let p = Position {
                            x: from.x + (to.x - from.x) * fraction,
                            y: from.y + (to.y - from.y) * fraction,
                            z: from.z,
                        };
                        return self.params.bounds.clamp(p);
                    }
                    self.phase = WaypointPhase::Paused { at: to, until: arrive + self.pause };
                }
                WaypointPhase::Paused { at, until } => {
                    if time < until || until == SimTime::MAX {
                        return at;
                    }
                    self.begin_leg(at, until);
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "random-waypoint"
    }
}

// ---------- Configuration ----------

/// Serializable description of a node's mobility.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MobilitySpec {
    #[default]
    Constant,
    RandomWalk(RandomWalkParameters),
    RandomWaypoint(RandomWaypointParameters),
}

impl MobilitySpec {
    /// Bounds the node must start inside, if the model has any.
    pub fn bounds(&self) -> Option<Rectangle> {
        match self {
            MobilitySpec::Constant => None,
            MobilitySpec::RandomWalk(params) => Some(params.bounds),
            MobilitySpec::RandomWaypoint(params) => Some(params.bounds),
        }
    }

    /// Instantiate the provider, starting at `initial`.
    pub fn build(&self, initial: Position, rng: StdRng) -> Result<Box<dyn MobilityModel>, SimError> {
        Ok(match self {
            MobilitySpec::Constant => Box::new(ConstantPosition::new(initial)),
            MobilitySpec::RandomWalk(params) => Box::new(RandomWalk2d::new(*params, initial, rng)?),
            MobilitySpec::RandomWaypoint(params) => Box::new(RandomWaypoint::new(*params, initial, rng)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn walk_params(bounds: Rectangle) -> RandomWalkParameters {
        RandomWalkParameters {
            bounds,
            mode: WalkMode::Time { seconds: 2.0 },
            speed_min: 1.0,
            speed_max: 1.0,
        }
    }

    #[test]
    fn constant_position_never_moves() {
        let mut model = ConstantPosition::new(Position::new(1.0, 2.0, 3.0));
        assert_eq!(model.position_at(SimTime::from_secs(100)), Position::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn random_walk_stays_in_bounds_for_many_seeds() {
        let bounds = Rectangle::new(0.0, 100.0, 0.0, 50.0);
        for seed in 0..50 {
            let params = RandomWalkParameters {
                speed_min: 5.0,
                speed_max: 40.0,
                ..walk_params(bounds)
            };
            let mut walk = RandomWalk2d::new(params, Position::new(50.0, 25.0, 0.0), StdRng::seed_from_u64(seed)).unwrap();
            for step in 0..500 {
                let p = walk.position_at(SimTime::from_millis(step * 370));
                assert!(bounds.contains(&p), "seed {} step {} left bounds at {}", seed, step, p);
            }
        }
    }

    #[test]
    fn random_walk_moves_at_configured_speed_within_a_leg() {
        let bounds = Rectangle::new(-1000.0, 1000.0, -1000.0, 1000.0);
        let mut walk = RandomWalk2d::new(walk_params(bounds), Position::default(), StdRng::seed_from_u64(3)).unwrap();
        let p = walk.position_at(SimTime::from_secs(1));
        assert!((p.distance_to(&Position::default()) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn random_walk_zero_extent_axis_never_moves() {
        let bounds = Rectangle::new(0.0, 1000.0, 0.0, 0.0);
        let mut walk = RandomWalk2d::new(walk_params(bounds), Position::new(500.0, 0.0, 0.0), StdRng::seed_from_u64(11)).unwrap();
        for s in 1..200 {
            let p = walk.position_at(SimTime::from_secs(s));
            assert_eq!(p.y, 0.0);
            assert!(bounds.contains(&p));
        }
    }

    #[test]
    fn random_walk_is_reproducible() {
        let bounds = Rectangle::new(0.0, 100.0, 0.0, 100.0);
        let run = |seed| {
            let mut walk = RandomWalk2d::new(walk_params(bounds), Position::new(10.0, 10.0, 0.0), StdRng::seed_from_u64(seed)).unwrap();
            (1..50).map(|s| walk.position_at(SimTime::from_secs(s))).collect::<Vec<_>>()
        };
        assert_eq!(run(5), run(5));
        assert_ne!(run(5), run(6));
    }

    #[test]
    fn random_walk_rejects_legs_shorter_than_minimum() {
        let bounds = Rectangle::new(0.0, 10.0, 0.0, 10.0);
        for seconds in [1e-10, 1e-4] {
            let params = RandomWalkParameters {
                mode: WalkMode::Time { seconds },
                ..walk_params(bounds)
            };
            assert!(RandomWalk2d::new(params, Position::new(5.0, 5.0, 0.0), StdRng::seed_from_u64(1)).is_err());
        }
        let params = RandomWalkParameters {
            mode: WalkMode::Time { seconds: 0.001 },
            ..walk_params(bounds)
        };
        assert!(RandomWalk2d::new(params, Position::new(5.0, 5.0, 0.0), StdRng::seed_from_u64(1)).is_ok());
    }

    #[test]
    fn random_walk_tiny_distance_legs_still_advance() {
        let bounds = Rectangle::new(0.0, 10.0, 0.0, 10.0);
        let params = RandomWalkParameters {
            mode: WalkMode::Distance { meters: 1e-12 },
            ..walk_params(bounds)
        };
        let mut walk = RandomWalk2d::new(params, Position::new(5.0, 5.0, 0.0), StdRng::seed_from_u64(4)).unwrap();
        let p = walk.position_at(SimTime::from_secs(1));
        assert!(bounds.contains(&p));
    }

    #[test]
    fn random_waypoint_tiny_bounds_still_advance() {
        let bounds = Rectangle::new(0.0, 1e-9, 0.0, 1e-9);
        let params = RandomWaypointParameters {
            bounds,
            speed_min: 1.0,
            speed_max: 1.0,
            pause: 0.0,
        };
        let mut waypoint = RandomWaypoint::new(params, Position::new(0.0, 0.0, 0.0), StdRng::seed_from_u64(2)).unwrap();
        let p = waypoint.position_at(SimTime::from_secs(1));
        assert!(bounds.contains(&p));
    }

    #[test]
    fn random_walk_rejects_start_outside_bounds() {
        let bounds = Rectangle::new(0.0, 10.0, 0.0, 10.0);
        assert!(RandomWalk2d::new(walk_params(bounds), Position::new(20.0, 0.0, 0.0), StdRng::seed_from_u64(1)).is_err());
    }

    #[test]
    fn random_waypoint_stays_in_bounds_for_many_seeds() {
        let bounds = Rectangle::new(125.0, 225.0, 75.0, 125.0);
        let params = RandomWaypointParameters {
            bounds,
            speed_min: 0.5,
            speed_max: 20.0,
            pause: 1.0,
        };
        for seed in 0..50 {
            let mut model = RandomWaypoint::new(params, Position::new(150.0, 100.0, 1.5), StdRng::seed_from_u64(seed)).unwrap();
            for step in 0..400 {
                let p = model.position_at(SimTime::from_millis(step * 450));
                assert!(bounds.contains(&p), "seed {} step {} left bounds at {}", seed, step, p);
                assert_eq!(p.z, 1.5);
            }
        }
    }

    #[test]
    fn random_waypoint_degenerate_bounds_park_the_node() {
        let bounds = Rectangle::new(5.0, 5.0, 5.0, 5.0);
        let params = RandomWaypointParameters {
            bounds,
            speed_min: 1.0,
            speed_max: 2.0,
            pause: 0.0,
        };
        let mut model = RandomWaypoint::new(params, Position::new(5.0, 5.0, 0.0), StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(model.position_at(SimTime::from_secs(1000)), Position::new(5.0, 5.0, 0.0));
    }

    #[test]
    fn mobility_spec_parses_from_json() {
        let json = r#"{"type": "random_walk", "bounds": {"x_min": 0, "x_max": 100, "y_min": 0, "y_max": 50}, "mode": {"mode": "distance", "meters": 5.0}}"#;
        let spec: MobilitySpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.bounds(), Some(Rectangle::new(0.0, 100.0, 0.0, 50.0)));
        assert!(spec.build(Position::new(10.0, 10.0, 0.0), StdRng::seed_from_u64(0)).is_ok());
    }
}
