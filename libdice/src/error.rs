use thiserror::Error;

use crate::builder::DieType;

/// Top-level error type for the dice engine.
#[derive(Debug, Error)]
pub enum DiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Roll(#[from] RollError),
}

/// Construction-time failures: bad tables, bad geometry, bad parameters.
///
/// These are raised by constructors only and are never produced while a
/// simulation is running.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("calibration table for {die} is invalid: {reason}")]
    Calibration { die: DieType, reason: String },

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("polyhedron is not convex: vertex {vertex} lies outside face {face}")]
    NonConvex { face: usize, vertex: usize },

    #[error("{die} has {actual} faces but its calibration covers {expected}")]
    FaceCountMismatch {
        die: DieType,
        expected: usize,
        actual: usize,
    },

    #[error("parameter {name} = {value} is out of range")]
    InvalidParameter { name: &'static str, value: f32 },
}

/// Runtime misuse of a die or session. The engine state is left unchanged
/// whenever one of these is returned.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RollError {
    #[error("roll already in progress")]
    RollInProgress,

    #[error("die has not settled yet")]
    NotSettled,

    #[error("unsupported die: d{0}")]
    UnsupportedDie(u32),

    #[error("roll request contains no dice")]
    EmptyRoll,

    #[error("unknown roll session")]
    UnknownSession,

    #[error("unknown die")]
    UnknownDie,

    #[error("physics body has been released")]
    BodyReleased,
}

/// Convenience type alias for results using [`DiceError`].
pub type Result<T> = std::result::Result<T, DiceError>;
