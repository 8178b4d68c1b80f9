use std::sync::Arc;

use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use super::shape::ConvexShape;
use crate::error::ConfigError;
use crate::Real;

/// Material and mass parameters of one die body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyParams {
    pub mass: Real,
    pub friction: Real,
    pub restitution: Real,
    pub linear_damping: Real,
    pub angular_damping: Real,
    pub rolling_resistance: Real,
}

impl Default for BodyParams {
    fn default() -> Self {
        Self {
            mass: 0.5,
            friction: 0.6,
            restitution: 0.3,
            linear_damping: 0.3,
            angular_damping: 0.1,
            rolling_resistance: 0.02,
        }
    }
}

impl BodyParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("mass", self.mass, self.mass > 0.0),
            ("friction", self.friction, (0.0..=1.0).contains(&self.friction)),
            (
                "restitution",
                self.restitution,
                (0.0..=1.0).contains(&self.restitution),
            ),
            (
                "linear_damping",
                self.linear_damping,
                (0.0..1.0).contains(&self.linear_damping),
            ),
            (
                "angular_damping",
                self.angular_damping,
                (0.0..1.0).contains(&self.angular_damping),
            ),
            (
                "rolling_resistance",
                self.rolling_resistance,
                self.rolling_resistance >= 0.0,
            ),
        ];
        for (name, value, ok) in checks {
            if !(ok && value.is_finite()) {
                return Err(ConfigError::InvalidParameter { name, value });
            }
        }
        Ok(())
    }
}

/// World transform of a body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: Point3<Real>,
    pub orientation: UnitQuaternion<Real>,
}

impl Pose {
    pub fn new(position: Point3<Real>, orientation: UnitQuaternion<Real>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn transform_point(&self, local: &Point3<Real>) -> Point3<Real> {
        self.position + self.orientation * local.coords
    }

    /// Rotation only; normals of a rigid body need no inverse-transpose.
    pub fn transform_normal(&self, local: &Vector3<Real>) -> Vector3<Real> {
        self.orientation * local
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::new(Point3::origin(), UnitQuaternion::identity())
    }
}

/// Rigid-body data: mass, inverse mass, inverse inertia in body space, and state.
#[derive(Clone, Debug)]
pub struct RigidBody {
    shape: Arc<ConvexShape>,
    pub(crate) params: BodyParams,
    pub(crate) inv_mass: Real,
    pub(crate) inv_inertia_body: Matrix3<Real>,

    pub(crate) position: Point3<Real>,
    pub(crate) orientation: UnitQuaternion<Real>,
    pub(crate) velocity: Vector3<Real>,
    pub(crate) angular_velocity: Vector3<Real>,
}

impl RigidBody {
    pub(crate) fn new(shape: Arc<ConvexShape>, params: BodyParams, pose: Pose) -> Self {
        let inertia = shape.unit_inertia() * params.mass;
        // singular only for float garbage; treat as a solid sphere then
        let sphere = 1.0 / (params.mass * shape.radius().powi(2));
        let inv_inertia_body = inertia
            .try_inverse()
            .unwrap_or_else(|| Matrix3::identity() * sphere);
        Self {
            inv_mass: 1.0 / params.mass,
            inv_inertia_body,
            shape,
            params,
            position: pose.position,
            orientation: pose.orientation,
            velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
        }
    }

    pub fn shape(&self) -> &Arc<ConvexShape> {
        &self.shape
    }

    pub fn params(&self) -> &BodyParams {
        &self.params
    }

    pub fn mass(&self) -> Real {
        self.params.mass
    }

    /// Hard reset of both velocities.
    pub fn set_velocities(&mut self, linear: Vector3<Real>, angular: Vector3<Real>) {
        self.velocity = linear;
        self.angular_velocity = angular;
    }

    pub fn set_angular_velocity(&mut self, angular: Vector3<Real>) {
        self.angular_velocity = angular;
    }

    /// One-shot linear impulse applied at a point given in the body frame.
    pub fn apply_impulse(&mut self, impulse: Vector3<Real>, at_local_point: Point3<Real>) {
        let r = self.orientation * (at_local_point - self.shape.center_of_mass());
        self.apply_impulse_at_offset(impulse, r);
    }

    pub fn current_pose(&self) -> Pose {
        Pose::new(self.position, self.orientation)
    }

    /// `(linear, angular)` velocity in world space.
    pub fn current_velocities(&self) -> (Vector3<Real>, Vector3<Real>) {
        (self.velocity, self.angular_velocity)
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.position = pose.position;
        self.orientation = pose.orientation;
    }

    /// Return world-space vertices
    pub fn vertices_world(&self) -> impl Iterator<Item = Point3<Real>> + '_ {
        let pose = self.current_pose();
        self.shape
            .vertices()
            .iter()
            .map(move |p| pose.transform_point(p))
    }

    pub(crate) fn inv_inertia_world(&self) -> Matrix3<Real> {
        let binding = self.orientation.to_rotation_matrix();
        let r = binding.matrix();
        r * self.inv_inertia_body * r.transpose()
    }

    /// Impulse at world-space offset `r` from the body origin.
    pub(crate) fn apply_impulse_at_offset(&mut self, impulse: Vector3<Real>, r: Vector3<Real>) {
        self.velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia_world() * r.cross(&impulse);
    }

    /// Velocity of the material point at world offset `r`.
    pub(crate) fn point_velocity(&self, r: &Vector3<Real>) -> Vector3<Real> {
        self.velocity + self.angular_velocity.cross(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{build, DieType};
    use approx::assert_relative_eq;

    fn cube_body() -> RigidBody {
        let shape = Arc::new(ConvexShape::new(build(DieType::Cube, 1.0).unwrap()).unwrap());
        RigidBody::new(shape, BodyParams::default(), Pose::default())
    }

    #[test]
    fn default_params_are_valid() {
        assert!(BodyParams::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_params_are_rejected() {
        let bad = [
            BodyParams {
                mass: 0.0,
                ..BodyParams::default()
            },
            BodyParams {
                friction: 1.5,
                ..BodyParams::default()
            },
            BodyParams {
                restitution: -0.1,
                ..BodyParams::default()
            },
            BodyParams {
                linear_damping: Real::NAN,
                ..BodyParams::default()
            },
        ];
        for params in bad {
            assert!(matches!(
                params.validate(),
                Err(ConfigError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn central_impulse_only_moves_linearly() {
        let mut body = cube_body();
        body.apply_impulse(Vector3::new(0.0, 1.0, 0.0), Point3::origin());
        let (v, w) = body.current_velocities();
        assert_relative_eq!(v, Vector3::new(0.0, 2.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(w, Vector3::zeros(), epsilon = 1e-6);
    }

    #[test]
    fn off_center_impulse_spins() {
        let mut body = cube_body();
        body.apply_impulse(Vector3::new(0.0, 0.0, 1.0), Point3::new(0.5, 0.0, 0.0));
        let (_, w) = body.current_velocities();
        // r × J = (0.5,0,0) × (0,0,1) = (0,-0.5,0); I = m/6 = 1/12
        assert_relative_eq!(w, Vector3::new(0.0, -6.0, 0.0), epsilon = 1e-4);
    }

    #[test]
    fn set_velocities_is_a_hard_reset() {
        let mut body = cube_body();
        body.apply_impulse(Vector3::new(1.0, 2.0, 3.0), Point3::new(0.1, 0.2, 0.3));
        body.set_velocities(Vector3::zeros(), Vector3::zeros());
        assert_eq!(
            body.current_velocities(),
            (Vector3::zeros(), Vector3::zeros())
        );
    }

    #[test]
    fn pose_rotates_normals() {
        let pose = Pose::new(
            Point3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2),
        );
        assert_relative_eq!(pose.transform_normal(&Vector3::x()), Vector3::y(), epsilon = 1e-6);
        assert_relative_eq!(
            pose.transform_point(&Point3::new(1.0, 0.0, 0.0)),
            Point3::new(1.0, 3.0, 3.0),
            epsilon = 1e-6
        );
    }
}
