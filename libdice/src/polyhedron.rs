//! Polyhedral geometry shared by the builder, the physics adapter and the
//! face resolver.

use nalgebra::{Point3, Vector3};

use crate::error::ConfigError;
use crate::Real;

/// Two vertices closer than this are the same vertex.
pub const VERTEX_EPS: Real = 1e-6;

/// Polyhedron: vertices and logical faces (lists of vertex indices).
///
/// Faces are CCW when viewed from outside, so the fan triangle
/// `(f[0], f[1], f[2])` yields the outward normal.
#[derive(Clone, Debug, PartialEq)]
pub struct Polyhedron {
    pub vertices: Vec<Point3<Real>>,
    pub faces: Vec<Vec<usize>>,
}

/// One triangle of the physics hull, tagged with the logical face it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Triangle {
    pub face: usize,
    pub indices: [usize; 3],
}

impl Polyhedron {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vertices.len() < 4 {
            return Err(ConfigError::DegenerateGeometry(format!(
                "{} vertices, need at least 4",
                self.vertices.len()
            )));
        }
        if self.faces.len() < 4 {
            return Err(ConfigError::DegenerateGeometry(format!(
                "{} faces, need at least 4",
                self.faces.len()
            )));
        }
        for (fi, f) in self.faces.iter().enumerate() {
            if f.len() < 3 {
                return Err(ConfigError::DegenerateGeometry(format!(
                    "face {fi} has fewer than 3 vertices"
                )));
            }
            if let Some(&bad) = f.iter().find(|&&i| i >= self.vertices.len()) {
                return Err(ConfigError::DegenerateGeometry(format!(
                    "face {fi} references vertex {bad} out of {}",
                    self.vertices.len()
                )));
            }
        }
        Ok(())
    }

    /// Mean of the vertices.
    pub fn centroid(&self) -> Point3<Real> {
        if self.vertices.is_empty() {
            return Point3::origin();
        }
        let sum = self
            .vertices
            .iter()
            .fold(Vector3::zeros(), |acc, v| acc + v.coords);
        Point3::from(sum / self.vertices.len() as Real)
    }

    /// Translate so the vertex centroid sits at the origin.
    pub fn centered(mut self) -> Self {
        let c = self.centroid().coords;
        for v in &mut self.vertices {
            *v -= c;
        }
        self
    }

    /// Uniform scale about the origin. Face ids and winding are unchanged.
    pub fn scaled(mut self, factor: Real) -> Self {
        for v in &mut self.vertices {
            v.coords *= factor;
        }
        self
    }

    /// Outward unit normal of a logical face in the local frame.
    ///
    /// Uses the first fan triangle; returns `None` for a collapsed face.
    pub fn face_normal(&self, face: usize) -> Option<Vector3<Real>> {
        let f = self.faces.get(face)?;
        let a = self.vertices.get(*f.first()?)?;
        let b = self.vertices.get(*f.get(1)?)?;
        let c = self.vertices.get(*f.get(2)?)?;
        (b - a).cross(&(c - a)).try_normalize(1e-12)
    }

    /// Fan triangulation of every logical face. Faces with fewer than
    /// three vertices or out-of-range indices contribute nothing.
    pub fn triangles(&self) -> Vec<Triangle> {
        let mut out = Vec::new();
        for (face, f) in self.faces.iter().enumerate() {
            if f.iter().any(|&i| i >= self.vertices.len()) {
                continue;
            }
            for i in 1..f.len().saturating_sub(1) {
                out.push(Triangle {
                    face,
                    indices: [f[0], f[i], f[i + 1]],
                });
            }
        }
        out
    }

    /// Largest distance from the origin to any vertex.
    pub fn radius(&self) -> Real {
        self.vertices
            .iter()
            .map(|v| v.coords.norm())
            .fold(0.0, Real::max)
    }
}

/// Drop points that coincide with an earlier point within `eps`,
/// keeping first-seen order.
pub fn dedup_vertices(points: &[Point3<Real>], eps: Real) -> Vec<Point3<Real>> {
    let mut unique: Vec<Point3<Real>> = Vec::with_capacity(points.len());
    for p in points {
        let seen = unique.iter().any(|u| {
            (u.x - p.x).abs() < eps && (u.y - p.y).abs() < eps && (u.z - p.z).abs() < eps
        });
        if !seen {
            unique.push(*p);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // helper to build a unit cube centered at origin
    fn unit_cube() -> Polyhedron {
        let h = 0.5;
        let vertices = vec![
            Point3::new(-h, -h, -h),
            Point3::new(h, -h, -h),
            Point3::new(h, h, -h),
            Point3::new(-h, h, -h),
            Point3::new(-h, -h, h),
            Point3::new(h, -h, h),
            Point3::new(h, h, h),
            Point3::new(-h, h, h),
        ];
        let faces = vec![
            vec![0, 3, 2, 1], // -Z
            vec![4, 5, 6, 7], // +Z
            vec![0, 1, 5, 4], // -Y
            vec![2, 3, 7, 6], // +Y
            vec![1, 2, 6, 5], // +X
            vec![0, 4, 7, 3], // -X
        ];
        Polyhedron { vertices, faces }
    }

    #[test]
    fn degenerate_faces_do_not_panic() {
        let mut poly = unit_cube();
        poly.faces = vec![vec![], vec![0, 1], vec![0, 1, 42], vec![0, 3, 2, 1]];
        assert_eq!(poly.face_normal(0), None);
        assert_eq!(poly.face_normal(1), None);
        assert_eq!(poly.face_normal(2), None);
        assert_eq!(poly.face_normal(9), None);
        assert!(poly.validate().is_err());

        let tris = poly.triangles();
        assert_eq!(tris.len(), 2);
        assert!(tris.iter().all(|t| t.face == 3));
    }

    #[test]
    fn cube_validates() {
        assert!(unit_cube().validate().is_ok());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut cube = unit_cube();
        cube.faces[2][1] = 8;
        assert!(matches!(
            cube.validate(),
            Err(ConfigError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn short_face_is_rejected() {
        let mut cube = unit_cube();
        cube.faces[0].truncate(2);
        assert!(cube.validate().is_err());
    }

    #[test]
    fn face_normals_point_outward() {
        let cube = unit_cube();
        assert_relative_eq!(cube.face_normal(0).unwrap(), -Vector3::z());
        assert_relative_eq!(cube.face_normal(3).unwrap(), Vector3::y());
        assert_relative_eq!(cube.face_normal(4).unwrap(), Vector3::x());
        assert!(cube.face_normal(6).is_none());
    }

    #[test]
    fn quads_split_into_two_triangles_per_face() {
        let tris = unit_cube().triangles();
        assert_eq!(tris.len(), 12);
        assert_eq!(tris.iter().filter(|t| t.face == 5).count(), 2);
    }

    #[test]
    fn centering_moves_centroid_to_origin() {
        let shifted = unit_cube().scaled(2.0);
        let mut moved = shifted.clone();
        for v in &mut moved.vertices {
            v.x += 3.0;
            v.z -= 1.0;
        }
        let centered = moved.centered();
        assert_relative_eq!(centered.centroid(), Point3::origin(), epsilon = 1e-6);
        assert_relative_eq!(centered.radius(), shifted.radius(), epsilon = 1e-6);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let pts = [
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0 + 1e-8, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let unique = dedup_vertices(&pts, VERTEX_EPS);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0], pts[0]);
    }
}
