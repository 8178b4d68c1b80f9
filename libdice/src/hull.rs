//! Face extraction for small convex point sets.
//!
//! Dice have at most 20 vertices, so every vertex triple is tried as a
//! candidate supporting plane. Coplanar hull vertices are merged into one
//! logical face, which is what keeps a d6 side or a d12 pentagon a single
//! calibratable face even though physics sees triangles.

use std::f32::consts::{PI, TAU};

use nalgebra::{Point3, Vector3};

use crate::error::ConfigError;
use crate::polyhedron::Polyhedron;
use crate::Real;

/// Distance tolerance for "on the plane", relative to a unit-size solid.
const PLANE_EPS: Real = 1e-4;
/// Two supporting planes with normals this close are the same face.
const SAME_NORMAL_DOT: Real = 1.0 - 1e-4;
/// Quantization grid used for the canonical sort keys.
const KEY_GRID: Real = 1e3;

/// Build a polyhedron whose faces are the facets of the convex hull of
/// `vertices`, in canonical order.
///
/// Every input point must lie on the hull; interior points are reported as
/// degenerate geometry.
pub fn convex_polyhedron(vertices: Vec<Point3<Real>>) -> Result<Polyhedron, ConfigError> {
    let n = vertices.len();
    if n < 4 {
        return Err(ConfigError::DegenerateGeometry(format!(
            "{n} points cannot enclose a volume"
        )));
    }

    let mut planes: Vec<(Vector3<Real>, Vec<usize>)> = Vec::new();
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                let a = vertices[i];
                let Some(mut normal) = (vertices[j] - a)
                    .cross(&(vertices[k] - a))
                    .try_normalize(1e-9)
                else {
                    continue;
                };
                let mut offset = normal.dot(&a.coords);

                let above = vertices
                    .iter()
                    .any(|v| normal.dot(&v.coords) - offset > PLANE_EPS);
                let below = vertices
                    .iter()
                    .any(|v| normal.dot(&v.coords) - offset < -PLANE_EPS);
                match (above, below) {
                    (true, true) => continue,
                    (true, false) => {
                        normal = -normal;
                        offset = -offset;
                    }
                    _ => {}
                }

                if planes.iter().any(|(m, _)| m.dot(&normal) > SAME_NORMAL_DOT) {
                    continue;
                }

                let members: Vec<usize> = (0..n)
                    .filter(|&m| (normal.dot(&vertices[m].coords) - offset).abs() <= PLANE_EPS)
                    .collect();
                planes.push((normal, members));
            }
        }
    }

    if planes.len() < 4 {
        return Err(ConfigError::DegenerateGeometry(
            "point set is flat".to_string(),
        ));
    }
    if let Some(lonely) = (0..n).find(|v| !planes.iter().any(|(_, m)| m.contains(v))) {
        return Err(ConfigError::DegenerateGeometry(format!(
            "vertex {lonely} is not on the hull"
        )));
    }

    let mut faces: Vec<(Vector3<Real>, Vec<usize>)> = planes
        .into_iter()
        .map(|(normal, members)| {
            let ring = wind_ccw(&vertices, &normal, members);
            (normal, ring)
        })
        .collect();

    faces.sort_by_key(|(normal, _)| canonical_key(normal));

    Ok(Polyhedron {
        vertices,
        faces: faces.into_iter().map(|(_, ring)| ring).collect(),
    })
}

/// Order face members counter-clockwise as seen from outside.
fn wind_ccw(vertices: &[Point3<Real>], normal: &Vector3<Real>, members: Vec<usize>) -> Vec<usize> {
    let center = members
        .iter()
        .fold(Vector3::zeros(), |acc, &m| acc + vertices[m].coords)
        / members.len() as Real;
    let u = (vertices[members[0]].coords - center).normalize();
    let w = normal.cross(&u);

    let mut ring: Vec<(i64, usize)> = members
        .into_iter()
        .map(|m| {
            let d = vertices[m].coords - center;
            let angle = d.dot(&w).atan2(d.dot(&u));
            (quantize(angle), m)
        })
        .collect();
    ring.sort_unstable();
    ring.into_iter().map(|(_, m)| m).collect()
}

/// Upper-hemisphere faces first (descending y, then azimuth); lower faces
/// follow, keyed by their negated normal so antipodal faces line up.
fn canonical_key(normal: &Vector3<Real>) -> (u8, i64, i64) {
    let upper = normal.y > PLANE_EPS
        || (normal.y.abs() <= PLANE_EPS
            && (normal.z > PLANE_EPS || (normal.z.abs() <= PLANE_EPS && normal.x > 0.0)));
    let (half, n) = if upper { (0, *normal) } else { (1, -normal) };

    let mut azimuth = n.z.atan2(n.x);
    if azimuth < -PI + PLANE_EPS {
        azimuth += TAU;
    }
    (half, -quantize(n.y), quantize(azimuth))
}

fn quantize(value: Real) -> i64 {
    (value * KEY_GRID).round() as i64
}
