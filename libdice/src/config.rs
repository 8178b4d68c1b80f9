use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::physics::{BodyParams, WorldConfig};
use crate::roll::RollConfig;
use crate::Real;

/// Everything a [`SessionManager`](crate::SessionManager) needs, with
/// defaults for every field so partial JSON files are accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub world: WorldConfig,
    pub body: BodyParams,
    pub roll: RollConfig,
    /// Uniform scale applied to the canonical solids.
    pub die_scale: Real,
    /// Distance between neighbouring dice at spawn.
    pub die_spacing: Real,
    /// Spawn height of each die's center.
    pub drop_height: Real,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            body: BodyParams::default(),
            roll: RollConfig::default(),
            die_scale: 0.2,
            die_spacing: 0.5,
            drop_height: 0.5,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.world.validate()?;
        self.body.validate()?;
        self.roll.validate()?;
        for (name, value) in [
            ("die_scale", self.die_scale),
            ("die_spacing", self.die_spacing),
            ("drop_height", self.drop_height),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidParameter { name, value });
            }
        }
        if self.drop_height <= self.world.ground_height {
            return Err(ConfigError::InvalidParameter {
                name: "drop_height",
                value: self.drop_height,
            });
        }
        Ok(())
    }
}
