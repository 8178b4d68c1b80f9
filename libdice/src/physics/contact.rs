//! Body-vs-static-plane contacts and the sequential impulse solver.

use nalgebra::Vector3;

use super::body::RigidBody;
use super::Plane;
use crate::Real;

/// One penetrating vertex against one plane.
#[derive(Clone, Debug)]
pub(crate) struct Contact {
    pub r: Vector3<Real>,      // vector from body position to contact point
    pub normal: Vector3<Real>, // plane normal, pointing into free space
    normal_mass: Real,
    target_vn: Real,
    acc_normal: Real,
    acc_tangent: Vector3<Real>,
}

/// Every world vertex that lies behind a plane becomes a contact.
pub(crate) fn detect(body: &RigidBody, planes: &[Plane]) -> Vec<Contact> {
    let mut contacts = Vec::new();
    for plane in planes {
        for p in body.vertices_world() {
            let depth = plane.offset - plane.normal.dot(&p.coords);
            if depth > 0.0 {
                contacts.push(Contact {
                    r: p - body.position,
                    normal: plane.normal,
                    normal_mass: 0.0,
                    target_vn: 0.0,
                    acc_normal: 0.0,
                    acc_tangent: Vector3::zeros(),
                });
            }
        }
    }
    contacts
}

/// Resolve normal + friction impulses with accumulated, clamped impulses.
///
/// Restitution applies only to contacts closing faster than
/// `bounce_threshold`, so resting contacts do not jitter.
pub(crate) fn solve(
    body: &mut RigidBody,
    contacts: &mut [Contact],
    iterations: usize,
    bounce_threshold: Real,
) {
    if contacts.is_empty() {
        return;
    }
    let inv_i = body.inv_inertia_world();
    let inv_mass = body.inv_mass;
    let effective_mass = |r: &Vector3<Real>, dir: &Vector3<Real>| {
        let angular = (inv_i * r.cross(dir)).cross(r).dot(dir);
        1.0 / (inv_mass + angular).max(Real::EPSILON)
    };

    for c in contacts.iter_mut() {
        c.normal_mass = effective_mass(&c.r, &c.normal);
        let vn = body.point_velocity(&c.r).dot(&c.normal);
        c.target_vn = if vn < -bounce_threshold {
            -body.params.restitution * vn
        } else {
            0.0
        };
    }

    let friction = body.params.friction;
    for _ in 0..iterations {
        for c in contacts.iter_mut() {
            let vn = body.point_velocity(&c.r).dot(&c.normal);
            let lambda = (c.target_vn - vn) * c.normal_mass;
            let accumulated = (c.acc_normal + lambda).max(0.0);
            let applied = accumulated - c.acc_normal;
            c.acc_normal = accumulated;
            body.apply_impulse_at_offset(c.normal * applied, c.r);

            // friction impulse (Coulomb), clamped to the cone of the
            // accumulated normal impulse
            let v = body.point_velocity(&c.r);
            let vt = v - c.normal * v.dot(&c.normal);
            let vt_len = vt.norm();
            if vt_len <= 1e-6 {
                continue;
            }
            let t = vt / vt_len;
            let jt = -vt_len * effective_mass(&c.r, &t);
            let mut candidate = c.acc_tangent + t * jt;
            let max_friction = friction * c.acc_normal;
            let len = candidate.norm();
            if len > max_friction {
                candidate *= max_friction / len;
            }
            let delta = candidate - c.acc_tangent;
            c.acc_tangent = candidate;
            body.apply_impulse_at_offset(delta, c.r);
        }
    }
}

/// Die-vs-die contact on bounding spheres: a restitution impulse along the
/// center line if the pair is closing, then positional separation split by
/// inverse mass. Returns whether the spheres overlapped.
pub(crate) fn collide_spheres(
    a: &mut RigidBody,
    b: &mut RigidBody,
    slop: Real,
    correction: Real,
) -> bool {
    let delta = b.position - a.position;
    let reach = a.shape().radius() + b.shape().radius();
    let dist = delta.norm();
    if dist >= reach || dist <= 1e-6 {
        return false;
    }
    let n = delta / dist;
    let inv_sum = a.inv_mass + b.inv_mass;

    let vn = (b.velocity - a.velocity).dot(&n);
    if vn < 0.0 {
        let e = a.params.restitution.min(b.params.restitution);
        let j = -(1.0 + e) * vn / inv_sum;
        a.velocity -= n * (j * a.inv_mass);
        b.velocity += n * (j * b.inv_mass);
    }

    let excess = reach - dist - slop;
    if excess > 0.0 {
        let push = excess * correction / inv_sum;
        a.position -= n * (push * a.inv_mass);
        b.position += n * (push * b.inv_mass);
    }
    true
}

/// Deepest penetration of the body behind `plane`.
pub(crate) fn max_depth(body: &RigidBody, plane: &Plane) -> Real {
    body.vertices_world()
        .map(|p| plane.offset - plane.normal.dot(&p.coords))
        .fold(Real::NEG_INFINITY, Real::max)
}
