//! Canonical geometry for every supported die.

use std::f32::consts::{PI, TAU};
use std::fmt;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, RollError};
use crate::hull::convex_polyhedron;
use crate::polyhedron::{dedup_vertices, Polyhedron, VERTEX_EPS};
use crate::Real;

/// The six standard tabletop dice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum DieType {
    Tetrahedron,
    Cube,
    Octahedron,
    PentagonalBipyramid,
    Dodecahedron,
    Icosahedron,
}

impl DieType {
    pub const ALL: [DieType; 6] = [
        DieType::Tetrahedron,
        DieType::Cube,
        DieType::Octahedron,
        DieType::PentagonalBipyramid,
        DieType::Dodecahedron,
        DieType::Icosahedron,
    ];

    pub fn sides(self) -> u32 {
        match self {
            DieType::Tetrahedron => 4,
            DieType::Cube => 6,
            DieType::Octahedron => 8,
            DieType::PentagonalBipyramid => 10,
            DieType::Dodecahedron => 12,
            DieType::Icosahedron => 20,
        }
    }

    pub fn from_sides(sides: u32) -> Result<Self, RollError> {
        DieType::ALL
            .into_iter()
            .find(|d| d.sides() == sides)
            .ok_or(RollError::UnsupportedDie(sides))
    }

    /// The d4 is read from the corner pointing up; everything else from the
    /// face pointing up.
    pub fn reads_vertex(self) -> bool {
        self == DieType::Tetrahedron
    }

    /// Multiplier on the roll impulse.
    pub fn impulse_factor(self) -> Real {
        match self {
            DieType::Tetrahedron => 0.9,
            DieType::Cube | DieType::Octahedron | DieType::PentagonalBipyramid => 1.0,
            DieType::Dodecahedron | DieType::Icosahedron => 1.1,
        }
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D{}", self.sides())
    }
}

impl TryFrom<u32> for DieType {
    type Error = RollError;

    fn try_from(sides: u32) -> Result<Self, Self::Error> {
        DieType::from_sides(sides)
    }
}

impl From<DieType> for u32 {
    fn from(die: DieType) -> u32 {
        die.sides()
    }
}

/// Build the die's solid, centered on its vertex centroid and uniformly
/// scaled by `scale`.
///
/// Deterministic: the same die type always yields the same vertex and face
/// order, which is what the calibration tables index.
pub fn build(die: DieType, scale: Real) -> Result<Polyhedron, ConfigError> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(ConfigError::InvalidParameter {
            name: "die_scale",
            value: scale,
        });
    }
    let points = dedup_vertices(&canonical_vertices(die), VERTEX_EPS);
    let poly = convex_polyhedron(points)?.centered().scaled(scale);
    poly.validate()?;
    Ok(poly)
}

fn canonical_vertices(die: DieType) -> Vec<Point3<Real>> {
    let phi = (1.0 + 5f32.sqrt()) / 2.0;
    match die {
        DieType::Tetrahedron => {
            let s = 1.0 / 3f32.sqrt();
            vec![
                Point3::new(s, s, s),
                Point3::new(-s, -s, s),
                Point3::new(-s, s, -s),
                Point3::new(s, -s, -s),
            ]
        }
        DieType::Cube => {
            let h = 0.5;
            let mut verts = Vec::with_capacity(8);
            for x in [-h, h] {
                for y in [-h, h] {
                    for z in [-h, h] {
                        verts.push(Point3::new(x, y, z));
                    }
                }
            }
            verts
        }
        DieType::Octahedron => vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, -1.0),
        ],
        DieType::PentagonalBipyramid => {
            // ring offset keeps no face normal on the azimuth seam
            let mut verts = vec![Point3::new(0.0, 1.0, 0.0)];
            for k in 0..5 {
                let angle = TAU * k as Real / 5.0 + PI / 10.0;
                verts.push(Point3::new(angle.cos(), 0.0, angle.sin()));
            }
            verts.push(Point3::new(0.0, -1.0, 0.0));
            verts
        }
        DieType::Dodecahedron => {
            let inv = 1.0 / phi;
            let mut verts = Vec::with_capacity(20);
            for x in [-1.0, 1.0] {
                for y in [-1.0, 1.0] {
                    for z in [-1.0, 1.0] {
                        verts.push(Point3::new(x, y, z));
                    }
                }
            }
            for a in [-1.0, 1.0] {
                for b in [-1.0, 1.0] {
                    verts.push(Point3::new(0.0, a * inv, b * phi));
                    verts.push(Point3::new(a * inv, b * phi, 0.0));
                    verts.push(Point3::new(a * phi, 0.0, b * inv));
                }
            }
            let r = 3f32.sqrt();
            verts.into_iter().map(|p| p / r).collect()
        }
        DieType::Icosahedron => {
            let mut verts = Vec::with_capacity(12);
            for a in [-1.0, 1.0] {
                for b in [-1.0, 1.0] {
                    verts.push(Point3::new(0.0, a, b * phi));
                    verts.push(Point3::new(a, b * phi, 0.0));
                    verts.push(Point3::new(a * phi, 0.0, b));
                }
            }
            let r = (1.0 + phi * phi).sqrt();
            verts.into_iter().map(|p| p / r).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn face_counts_match_sides() {
        for die in DieType::ALL {
            let poly = build(die, 1.0).unwrap();
            assert_eq!(poly.faces.len(), die.sides() as usize, "{die}");
        }
    }

    #[test]
    fn vertex_counts_match_solids() {
        let expected = [4, 8, 6, 7, 20, 12];
        for (die, want) in DieType::ALL.into_iter().zip(expected) {
            assert_eq!(build(die, 1.0).unwrap().vertices.len(), want, "{die}");
        }
    }

    #[test]
    fn face_shapes_match_solids() {
        let cube = build(DieType::Cube, 1.0).unwrap();
        assert!(cube.faces.iter().all(|f| f.len() == 4));
        let d12 = build(DieType::Dodecahedron, 1.0).unwrap();
        assert!(d12.faces.iter().all(|f| f.len() == 5));
        assert_eq!(d12.triangles().len(), 36);
        for die in [
            DieType::Tetrahedron,
            DieType::Octahedron,
            DieType::PentagonalBipyramid,
            DieType::Icosahedron,
        ] {
            assert!(build(die, 1.0).unwrap().faces.iter().all(|f| f.len() == 3));
        }
    }

    #[test]
    fn solids_are_centered_and_indices_valid() {
        for die in DieType::ALL {
            let poly = build(die, 0.37).unwrap();
            assert_relative_eq!(poly.centroid(), Point3::origin(), epsilon = 1e-5);
            assert!(poly.validate().is_ok());
            let nverts = poly.vertices.len();
            assert!(poly.faces.iter().flatten().all(|&i| i < nverts));
        }
    }

    #[test]
    fn scale_is_uniform() {
        for die in DieType::ALL {
            let unit = build(die, 1.0).unwrap();
            let big = build(die, 2.5).unwrap();
            assert_eq!(unit.faces, big.faces);
            for (a, b) in unit.vertices.iter().zip(&big.vertices) {
                assert_relative_eq!(a.coords * 2.5, b.coords, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn build_is_deterministic() {
        for die in DieType::ALL {
            assert_eq!(build(die, 1.0).unwrap(), build(die, 1.0).unwrap());
        }
    }

    #[test]
    fn non_positive_scale_is_rejected() {
        assert!(matches!(
            build(DieType::Cube, 0.0),
            Err(ConfigError::InvalidParameter { .. })
        ));
        assert!(build(DieType::Cube, f32::NAN).is_err());
    }

    #[test]
    fn every_vertex_is_behind_every_face() {
        for die in DieType::ALL {
            let poly = build(die, 1.0).unwrap();
            for (fi, face) in poly.faces.iter().enumerate() {
                let n: Vector3<Real> = poly.face_normal(fi).unwrap();
                let d = n.dot(&poly.vertices[face[0]].coords);
                for v in &poly.vertices {
                    assert!(n.dot(&v.coords) - d <= 1e-4, "{die} face {fi}");
                }
            }
        }
    }

    #[test]
    fn sides_round_trip_through_u32() {
        for die in DieType::ALL {
            assert_eq!(DieType::try_from(u32::from(die)), Ok(die));
        }
        assert_eq!(DieType::from_sides(7), Err(RollError::UnsupportedDie(7)));
    }
}
