//! Structural id → printed value tables.
//!
//! Ids index [`Polyhedron::faces`](crate::Polyhedron) in canonical order, or
//! the vertex list for the d4. For the centrally symmetric dice, id `i` and
//! id `i + sides / 2` are opposite faces and carry values summing to
//! `sides + 1`, as on a physical die.

use std::collections::BTreeMap;

use crate::builder::DieType;
use crate::error::ConfigError;

const D4: [u32; 4] = [1, 2, 3, 4];
const D6: [u32; 6] = [3, 5, 1, 4, 2, 6];
const D8: [u32; 8] = [1, 7, 3, 5, 8, 2, 6, 4];
// upper cap odd, lower cap even
const D10: [u32; 10] = [1, 7, 3, 9, 5, 10, 4, 8, 2, 6];
const D12: [u32; 12] = [12, 2, 10, 4, 8, 6, 1, 11, 3, 9, 5, 7];
const D20: [u32; 20] = [
    20, 8, 14, 2, 12, 6, 18, 4, 16, 10, //
    1, 13, 7, 19, 9, 15, 3, 17, 5, 11,
];

/// A validated bijection from structural ids to `1..=sides`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalibrationTable {
    die: DieType,
    values: Vec<u32>,
}

impl CalibrationTable {
    /// Checks that `values` covers `1..=sides` exactly once.
    pub fn new(die: DieType, values: Vec<u32>) -> Result<Self, ConfigError> {
        let sides = die.sides();
        if values.len() != sides as usize {
            return Err(ConfigError::Calibration {
                die,
                reason: format!("{} entries for {sides} sides", values.len()),
            });
        }
        let mut seen = vec![false; sides as usize];
        for (id, &value) in values.iter().enumerate() {
            if value == 0 || value > sides {
                return Err(ConfigError::Calibration {
                    die,
                    reason: format!("id {id} maps to {value}, outside 1..={sides}"),
                });
            }
            let slot = &mut seen[value as usize - 1];
            if *slot {
                return Err(ConfigError::Calibration {
                    die,
                    reason: format!("value {value} appears twice"),
                });
            }
            *slot = true;
        }
        Ok(Self { die, values })
    }

    pub fn die(&self) -> DieType {
        self.die
    }

    pub fn value_of(&self, id: usize) -> Option<u32> {
        self.values.get(id).copied()
    }

    pub fn is_valid(&self, id: usize) -> bool {
        id < self.values.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }
}

/// One table per die type, checked once at startup.
#[derive(Clone, Debug)]
pub struct CalibrationSet {
    tables: BTreeMap<DieType, CalibrationTable>,
}

impl CalibrationSet {
    /// The built-in tables. Fails if any of them is not a bijection.
    pub fn standard() -> Result<Self, ConfigError> {
        let mut tables = BTreeMap::new();
        for die in DieType::ALL {
            let values = match die {
                DieType::Tetrahedron => D4.to_vec(),
                DieType::Cube => D6.to_vec(),
                DieType::Octahedron => D8.to_vec(),
                DieType::PentagonalBipyramid => D10.to_vec(),
                DieType::Dodecahedron => D12.to_vec(),
                DieType::Icosahedron => D20.to_vec(),
            };
            tables.insert(die, CalibrationTable::new(die, values)?);
        }
        Ok(Self { tables })
    }

    /// Replaces the table for `table.die()`, e.g. for a custom face layout.
    pub fn insert(&mut self, table: CalibrationTable) -> Option<CalibrationTable> {
        self.tables.insert(table.die(), table)
    }

    pub fn table(&self, die: DieType) -> Option<&CalibrationTable> {
        self.tables.get(&die)
    }

    pub fn value_of(&self, die: DieType, id: usize) -> Option<u32> {
        self.table(die)?.value_of(id)
    }

    pub fn is_valid(&self, die: DieType, id: usize) -> bool {
        self.table(die).is_some_and(|t| t.is_valid(id))
    }
}
