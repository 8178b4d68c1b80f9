//! Rigid-body simulation for dice resting on static planes.
//!
//! - Semi-implicit integration with exponential damping
//! - Vertex-vs-plane contacts, sequential impulse solver, Coulomb friction
//! - Rolling resistance and positional correction against sinking
//!
//! The [`World`] is the only shared mutable resource of the engine. It is
//! stepped from a single thread; bodies are addressed by generational
//! [`BodyHandle`]s so a released body can never be confused with a new one.

mod body;
mod contact;
mod shape;

pub use body::{BodyParams, Pose, RigidBody};
pub use shape::ConvexShape;

use std::sync::Arc;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use tracing::trace;

use crate::error::ConfigError;
use crate::Real;

slotmap::new_key_type! {
    /// Identifier for a body in a [`World`].
    pub struct BodyHandle;
}

/// Half-space boundary: points with `normal · x >= offset` are free.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vector3<Real>,
    pub offset: Real,
}

impl Plane {
    pub fn new(normal: Vector3<Real>, offset: Real) -> Self {
        Self {
            normal: normal.normalize(),
            offset,
        }
    }
}

/// Simulation parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub gravity: [Real; 3],
    pub solver_iterations: usize,
    pub ground_height: Real,
    /// Half-width of a square tray of walls around the origin, if any.
    pub tray_half_extent: Option<Real>,
    /// Penetration left uncorrected so resting contacts persist.
    pub contact_slop: Real,
    /// Fraction of the remaining penetration removed per step.
    pub position_correction: Real,
    /// Closing speed below which contacts do not bounce.
    pub bounce_threshold: Real,
    /// Keep dice apart using their bounding spheres.
    pub die_collisions: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, -9.82, 0.0],
            solver_iterations: 10,
            ground_height: 0.0,
            tray_half_extent: None,
            contact_slop: 0.002,
            position_correction: 0.8,
            bounce_threshold: 0.3,
            die_collisions: true,
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.solver_iterations == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "solver_iterations",
                value: 0.0,
            });
        }
        if let Some(&g) = self.gravity.iter().find(|g| !g.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                name: "gravity",
                value: g,
            });
        }
        if let Some(extent) = self.tray_half_extent {
            if !(extent > 0.0) {
                return Err(ConfigError::InvalidParameter {
                    name: "tray_half_extent",
                    value: extent,
                });
            }
        }
        if !(self.contact_slop >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "contact_slop",
                value: self.contact_slop,
            });
        }
        if !(0.0..=1.0).contains(&self.position_correction) {
            return Err(ConfigError::InvalidParameter {
                name: "position_correction",
                value: self.position_correction,
            });
        }
        if !(self.bounce_threshold >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "bounce_threshold",
                value: self.bounce_threshold,
            });
        }
        Ok(())
    }

    /// Ground plus the optional tray walls.
    pub fn planes(&self) -> Vec<Plane> {
        let mut planes = vec![Plane::new(Vector3::y(), self.ground_height)];
        if let Some(h) = self.tray_half_extent {
            planes.push(Plane::new(Vector3::x(), -h));
            planes.push(Plane::new(-Vector3::x(), -h));
            planes.push(Plane::new(Vector3::z(), -h));
            planes.push(Plane::new(-Vector3::z(), -h));
        }
        planes
    }
}

/// Owns every body and advances them together.
#[derive(Debug)]
pub struct World {
    config: WorldConfig,
    gravity: Vector3<Real>,
    planes: Vec<Plane>,
    bodies: SlotMap<BodyHandle, RigidBody>,
    elapsed: Real,
}

impl World {
    pub fn new(config: WorldConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            gravity: Vector3::from(config.gravity),
            planes: config.planes(),
            config,
            bodies: SlotMap::with_key(),
            elapsed: 0.0,
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Simulated seconds since creation.
    pub fn elapsed(&self) -> Real {
        self.elapsed
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Adds a body at rest. Shape validity is guaranteed by [`ConvexShape`];
    /// the material parameters are checked here.
    pub fn add_body(
        &mut self,
        shape: Arc<ConvexShape>,
        params: &BodyParams,
        pose: Pose,
    ) -> Result<BodyHandle, ConfigError> {
        params.validate()?;
        Ok(self.insert_body(shape, params.clone(), pose))
    }

    /// [`add_body`](Self::add_body) for parameters validated up front.
    pub(crate) fn insert_body(
        &mut self,
        shape: Arc<ConvexShape>,
        params: BodyParams,
        pose: Pose,
    ) -> BodyHandle {
        self.bodies.insert(RigidBody::new(shape, params, pose))
    }

    pub fn remove_body(&mut self, handle: BodyHandle) -> Option<RigidBody> {
        self.bodies.remove(handle)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    /// Advance every body by `dt` simulated seconds.
    pub fn step(&mut self, dt: Real) {
        if !(dt > 0.0) {
            return;
        }
        let mut total_contacts = 0;
        for body in self.bodies.values_mut() {
            // velocity update
            body.velocity += self.gravity * dt;
            body.velocity *= (1.0 - body.params.linear_damping).powf(dt);
            body.angular_velocity *= (1.0 - body.params.angular_damping).powf(dt);

            // contacts & solver
            let mut contacts = contact::detect(body, &self.planes);
            contact::solve(
                body,
                &mut contacts,
                self.config.solver_iterations,
                self.config.bounce_threshold,
            );
            total_contacts += contacts.len();

            // rolling resistance torque -> angular damping while touching
            if !contacts.is_empty() {
                let inv_iw = body.inv_inertia_world();
                let tau = -body.angular_velocity * body.params.rolling_resistance * body.mass();
                body.angular_velocity += inv_iw * tau * dt;
            }

            // position update
            body.position += body.velocity * dt;
            body.orientation =
                UnitQuaternion::from_scaled_axis(body.angular_velocity * dt) * body.orientation;
            body.orientation.renormalize();

            for plane in &self.planes {
                let depth = contact::max_depth(body, plane);
                let excess = depth - self.config.contact_slop;
                if excess > 0.0 {
                    body.position += plane.normal * (excess * self.config.position_correction);
                }
            }
        }

        let mut pairs = 0;
        if self.config.die_collisions {
            let keys: Vec<BodyHandle> = self.bodies.keys().collect();
            for (i, &ka) in keys.iter().enumerate() {
                for &kb in &keys[i + 1..] {
                    if let Some([a, b]) = self.bodies.get_disjoint_mut([ka, kb]) {
                        if contact::collide_spheres(
                            a,
                            b,
                            self.config.contact_slop,
                            self.config.position_correction,
                        ) {
                            pairs += 1;
                        }
                    }
                }
            }
        }

        self.elapsed += dt;
        trace!(
            bodies = self.bodies.len(),
            contacts = total_contacts,
            die_pairs = pairs,
            elapsed = self.elapsed,
            "world step"
        );
    }
}
