use nalgebra::{Matrix3, Point3, Vector3};

use crate::error::ConfigError;
use crate::polyhedron::Polyhedron;
use crate::Real;

/// Relative tolerance for the convexity check.
const CONVEX_TOL: Real = 1e-4;

/// Collision shape built from a validated convex polyhedron.
///
/// Holds the per-face outward normals used by the resolver and the mass
/// properties per unit mass, so bodies of any mass can share one shape.
#[derive(Clone, Debug)]
pub struct ConvexShape {
    poly: Polyhedron,
    face_normals: Vec<Vector3<Real>>,
    volume: Real,
    center_of_mass: Point3<Real>,
    unit_inertia: Matrix3<Real>,
    radius: Real,
}

impl ConvexShape {
    /// Rejects invalid, degenerate or non-convex polyhedra.
    pub fn new(poly: Polyhedron) -> Result<Self, ConfigError> {
        poly.validate()?;
        let radius = poly.radius();
        if radius < 1e-6 {
            return Err(ConfigError::DegenerateGeometry(
                "all vertices coincide".to_string(),
            ));
        }

        let mut face_normals = Vec::with_capacity(poly.faces.len());
        for (fi, face) in poly.faces.iter().enumerate() {
            let n = poly.face_normal(fi).ok_or_else(|| {
                ConfigError::DegenerateGeometry(format!("face {fi} has zero area"))
            })?;
            let offset = n.dot(&poly.vertices[face[0]].coords);
            for (vi, v) in poly.vertices.iter().enumerate() {
                if n.dot(&v.coords) - offset > CONVEX_TOL * radius {
                    return Err(ConfigError::NonConvex {
                        face: fi,
                        vertex: vi,
                    });
                }
            }
            face_normals.push(n);
        }

        let (volume, center_of_mass, inertia_origin) = mass_properties(&poly);
        if volume < 1e-9 * radius.powi(3) {
            return Err(ConfigError::DegenerateGeometry(format!(
                "zero-volume polyhedron ({volume})"
            )));
        }

        // unit density -> unit mass, then move to the center of mass
        let density = 1.0 / volume;
        let c = center_of_mass.coords;
        let unit_inertia =
            inertia_origin * density - (Matrix3::identity() * c.dot(&c) - c * c.transpose());

        Ok(Self {
            poly,
            face_normals,
            volume,
            center_of_mass,
            unit_inertia,
            radius,
        })
    }

    pub fn polyhedron(&self) -> &Polyhedron {
        &self.poly
    }

    pub fn vertices(&self) -> &[Point3<Real>] {
        &self.poly.vertices
    }

    /// Outward unit normals, one per logical face, in the body frame.
    pub fn face_normals(&self) -> &[Vector3<Real>] {
        &self.face_normals
    }

    pub fn volume(&self) -> Real {
        self.volume
    }

    pub fn center_of_mass(&self) -> Point3<Real> {
        self.center_of_mass
    }

    /// Inertia tensor about the center of mass for a body of mass 1.
    pub fn unit_inertia(&self) -> Matrix3<Real> {
        self.unit_inertia
    }

    /// Bounding-sphere radius about the body origin.
    pub fn radius(&self) -> Real {
        self.radius
    }
}

/// Volume, centroid and inertia about the origin (unit density).
///
/// Every face is fanned into triangles and each triangle forms a tetrahedron
/// with the origin. Second moments use the exact tetrahedron covariance
/// `V/20 * (sum p pᵀ + s sᵀ)` with `s` the vertex sum.
fn mass_properties(poly: &Polyhedron) -> (Real, Point3<Real>, Matrix3<Real>) {
    let mut volume = 0.0;
    let mut first_moment = Vector3::zeros();
    let mut covariance = Matrix3::zeros();

    for tri in poly.triangles() {
        let [a, b, c] = tri.indices.map(|i| poly.vertices[i].coords);
        let vol = a.dot(&b.cross(&c)) / 6.0;
        let s = a + b + c;

        volume += vol;
        first_moment += s * (vol / 4.0);
        let outer = a * a.transpose() + b * b.transpose() + c * c.transpose() + s * s.transpose();
        covariance += outer * (vol / 20.0);
    }

    let centroid = if volume.abs() > Real::EPSILON {
        Point3::from(first_moment / volume)
    } else {
        Point3::origin()
    };
    let inertia = Matrix3::identity() * covariance.trace() - covariance;
    (volume, centroid, inertia)
}
