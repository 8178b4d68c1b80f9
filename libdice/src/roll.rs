//! Per-die roll state machine: `Idle -> Spinning -> Settling -> Resolved`.

use std::fmt;
use std::sync::Arc;

use nalgebra::{Point3, Quaternion, UnitQuaternion, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::builder::DieType;
use crate::calibration::CalibrationTable;
use crate::error::{ConfigError, RollError};
use crate::physics::{BodyHandle, ConvexShape, Pose, World};
use crate::resolver;
use crate::Real;

/// Slack on time comparisons so `n * dt` float sums hit their deadline.
const TIME_EPS: Real = 1e-3;

/// Impulse, spin and settle parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollConfig {
    /// Horizontal impulse components are drawn from `[-h, h]`.
    pub horizontal_impulse: Real,
    /// Vertical impulse is drawn from `[min, max]`.
    pub lift_impulse: [Real; 2],
    /// Each angular velocity component is drawn from `[-s, s]` rad/s.
    pub spin: Real,
    /// Simulated seconds spent in `Spinning` before settling is checked.
    pub pre_settle: Real,
    pub linear_threshold: Real,
    pub angular_threshold: Real,
    /// How long both speeds must stay under threshold.
    pub settle_hold: Real,
    /// Total simulated seconds after which the die resolves regardless.
    pub timeout: Real,
}

impl Default for RollConfig {
    fn default() -> Self {
        Self {
            horizontal_impulse: 2.0,
            lift_impulse: [2.5, 3.5],
            spin: 30.0,
            pre_settle: 2.2,
            linear_threshold: 0.05,
            angular_threshold: 0.05,
            settle_hold: 0.25,
            timeout: 5.0,
        }
    }
}

impl RollConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name, value| Err(ConfigError::InvalidParameter { name, value });
        if !(self.horizontal_impulse >= 0.0) {
            return invalid("horizontal_impulse", self.horizontal_impulse);
        }
        let [lo, hi] = self.lift_impulse;
        if !(lo > 0.0) {
            return invalid("lift_impulse", lo);
        }
        if !(hi >= lo) {
            return invalid("lift_impulse", hi);
        }
        if !(self.spin >= 0.0) {
            return invalid("spin", self.spin);
        }
        if !(self.linear_threshold > 0.0) {
            return invalid("linear_threshold", self.linear_threshold);
        }
        if !(self.angular_threshold > 0.0) {
            return invalid("angular_threshold", self.angular_threshold);
        }
        if !(self.settle_hold >= 0.0) {
            return invalid("settle_hold", self.settle_hold);
        }
        if !(self.pre_settle >= 0.0) {
            return invalid("pre_settle", self.pre_settle);
        }
        if !(self.timeout.is_finite() && self.timeout > self.pre_settle) {
            return invalid("timeout", self.timeout);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RollState {
    Idle,
    Spinning,
    Settling,
    Resolved,
}

impl RollState {
    pub fn in_flight(self) -> bool {
        matches!(self, RollState::Spinning | RollState::Settling)
    }
}

impl fmt::Display for RollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RollState::Idle => "idle",
            RollState::Spinning => "spinning",
            RollState::Settling => "settling",
            RollState::Resolved => "resolved",
        };
        f.write_str(name)
    }
}

/// A live die: geometry, its physics body, the roll state machine and the
/// cached outcome.
#[derive(Clone, Debug)]
pub struct DieInstance {
    die: DieType,
    shape: Arc<ConvexShape>,
    body: BodyHandle,
    table: CalibrationTable,
    state: RollState,
    elapsed: Real,
    calm: Real,
    value: Option<u32>,
    timed_out: bool,
}

impl DieInstance {
    /// Wraps an existing body. The die starts `Idle`.
    ///
    /// `table` must be the die's table and cover every structural id of
    /// `shape`.
    pub fn new(
        die: DieType,
        shape: Arc<ConvexShape>,
        body: BodyHandle,
        table: CalibrationTable,
    ) -> Result<Self, ConfigError> {
        let ids = resolver::structural_ids(die, &shape);
        if table.die() != die || table.len() != ids {
            return Err(ConfigError::FaceCountMismatch {
                die,
                expected: table.len(),
                actual: ids,
            });
        }
        Ok(Self::from_parts(die, shape, body, table))
    }

    /// [`new`](Self::new) for a table already checked against `shape`.
    pub(crate) fn from_parts(
        die: DieType,
        shape: Arc<ConvexShape>,
        body: BodyHandle,
        table: CalibrationTable,
    ) -> Self {
        Self {
            die,
            shape,
            body,
            table,
            state: RollState::Idle,
            elapsed: 0.0,
            calm: 0.0,
            value: None,
            timed_out: false,
        }
    }

    pub fn die_type(&self) -> DieType {
        self.die
    }

    pub fn shape(&self) -> &Arc<ConvexShape> {
        &self.shape
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn state(&self) -> RollState {
        self.state
    }

    /// Simulated seconds since the current roll started.
    pub fn elapsed(&self) -> Real {
        self.elapsed
    }

    /// Whether the last resolution came from the hard timeout rather than
    /// the velocity check.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Starts a roll: zero both velocities, apply a random impulse through
    /// the center of mass, then set a random spin.
    ///
    /// Rejected with [`RollError::RollInProgress`] while spinning or
    /// settling; the in-flight trajectory is left untouched.
    pub fn roll<R: Rng + ?Sized>(
        &mut self,
        world: &mut World,
        config: &RollConfig,
        rng: &mut R,
    ) -> Result<(), RollError> {
        if self.state.in_flight() {
            return Err(RollError::RollInProgress);
        }
        let body = world.body_mut(self.body).ok_or(RollError::BodyReleased)?;

        let factor = self.die.impulse_factor();
        let h = config.horizontal_impulse;
        let [lift_lo, lift_hi] = config.lift_impulse;
        let impulse = Vector3::new(
            symmetric(rng, h),
            rng.gen_range(lift_lo..=lift_hi),
            symmetric(rng, h),
        ) * factor;
        let spin = Vector3::new(
            symmetric(rng, config.spin),
            symmetric(rng, config.spin),
            symmetric(rng, config.spin),
        );

        body.set_velocities(Vector3::zeros(), Vector3::zeros());
        body.apply_impulse(impulse, self.shape.center_of_mass());
        body.set_angular_velocity(spin);

        self.state = RollState::Spinning;
        self.elapsed = 0.0;
        self.calm = 0.0;
        self.value = None;
        self.timed_out = false;
        debug!(die = %self.die, ?impulse, ?spin, "roll started");
        Ok(())
    }

    /// Advance the state machine after the world has stepped by `dt`.
    ///
    /// The resolver runs exactly once, on the transition into `Resolved`.
    pub fn advance(&mut self, world: &World, dt: Real, config: &RollConfig) -> RollState {
        if !(dt > 0.0) || !self.state.in_flight() {
            return self.state;
        }
        let Some(body) = world.body(self.body) else {
            return self.state;
        };
        self.elapsed += dt;

        if self.state == RollState::Spinning && self.elapsed + TIME_EPS >= config.pre_settle {
            self.state = RollState::Settling;
            debug!(die = %self.die, elapsed = self.elapsed, "settling");
        }

        if self.state == RollState::Settling {
            let (v, w) = body.current_velocities();
            if v.norm() < config.linear_threshold && w.norm() < config.angular_threshold {
                self.calm += dt;
            } else {
                self.calm = 0.0;
            }
        }

        let settled =
            self.state == RollState::Settling && self.calm + TIME_EPS >= config.settle_hold;
        let expired = self.elapsed + TIME_EPS >= config.timeout;
        if settled || expired {
            self.timed_out = !settled;
            let pose = body.current_pose();
            self.value = resolver::value_at(self.die, &self.shape, &pose, &self.table);
            self.state = RollState::Resolved;
            if self.timed_out {
                warn!(
                    die = %self.die,
                    value = ?self.value,
                    elapsed = self.elapsed,
                    "settle timed out, resolving current pose"
                );
            } else {
                debug!(die = %self.die, value = ?self.value, elapsed = self.elapsed, "resolved");
            }
        }
        self.state
    }

    /// The cached outcome. Fails with [`RollError::NotSettled`] until the
    /// die reaches `Resolved`.
    pub fn value(&self) -> Result<u32, RollError> {
        match (self.state, self.value) {
            (RollState::Resolved, Some(value)) => Ok(value),
            _ => Err(RollError::NotSettled),
        }
    }
}

fn symmetric<R: Rng + ?Sized>(rng: &mut R, bound: Real) -> Real {
    if bound > 0.0 {
        rng.gen_range(-bound..=bound)
    } else {
        0.0
    }
}

/// Uniformly distributed orientation.
pub fn random_orientation<R: Rng + ?Sized>(rng: &mut R) -> UnitQuaternion<Real> {
    let u1: Real = rng.gen();
    let u2: Real = rng.gen();
    let u3: Real = rng.gen();
    let q1 = (1.0 - u1).sqrt();
    let q2 = u1.sqrt();
    let theta1 = std::f32::consts::TAU * u2;
    let theta2 = std::f32::consts::TAU * u3;
    UnitQuaternion::from_quaternion(Quaternion::new(
        q1 * theta1.cos(),
        q1 * theta1.sin(),
        q2 * theta2.cos(),
        q2 * theta2.sin(),
    ))
}

/// Spawn pose for die `index` of `count`, spread along the x axis.
pub fn spawn_pose(
    index: usize,
    count: usize,
    spacing: Real,
    height: Real,
    orientation: UnitQuaternion<Real>,
) -> Pose {
    let offset = index as Real - (count.saturating_sub(1)) as Real / 2.0;
    Pose::new(Point3::new(offset * spacing, height, 0.0), orientation)
}
