//! libdice: physically simulated polyhedral dice (d4, d6, d8, d10, d12, d20).
//!
//! - Canonical convex solids with a fixed face order
//! - Calibration tables mapping structural faces to printed values
//! - Rigid-body rolling on static planes with an impulse contact solver
//! - Per-die `Idle -> Spinning -> Settling -> Resolved` state machine
//! - Face-up resolution (the d4 is read by its top vertex)
//! - Sessions of several dice rolled and awaited together
//!
//! Public API:
//! - `SessionManager::new(config, rng)`
//! - `manager.start_roll(&[(DieType::Cube, 3)]) -> SessionHandle`
//! - `manager.step(dt)` once per frame, `manager.is_complete(handle)`
//! - `manager.await_results(handle) -> Vec<u32>`
//!
//! Example:
//! let mut dice = SessionManager::new(EngineConfig::default(), OsRng)?;
//! let roll = dice.start_roll(&[(DieType::Icosahedron, 1)])?;
//! let values = dice.run_until_complete(roll, 1.0 / 120.0, 600)?;

pub use nalgebra::{Matrix3, Point3, Quaternion, UnitQuaternion, Vector3};

pub type Real = f32;

pub mod builder;
pub mod calibration;
pub mod config;
pub mod error;
mod hull;
pub mod physics;
pub mod polyhedron;
pub mod resolver;
pub mod roll;
pub mod session;

pub use builder::{build, DieType};
pub use calibration::{CalibrationSet, CalibrationTable};
pub use config::EngineConfig;
pub use error::{ConfigError, DiceError, Result, RollError};
pub use physics::{BodyHandle, BodyParams, ConvexShape, Plane, Pose, RigidBody, World, WorldConfig};
pub use polyhedron::Polyhedron;
pub use roll::{DieInstance, RollConfig, RollState};
pub use session::{DieId, RollReport, RollSession, SessionHandle, SessionManager};
