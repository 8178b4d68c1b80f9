//! Coordinates every die of one roll request.
//!
//! A [`SessionManager`] owns the physics [`World`], the shared per-type
//! shapes and calibration tables, and every live [`DieInstance`]. Callers
//! start sessions, drive [`SessionManager::step`] once per frame, and poll
//! [`SessionManager::is_complete`] until the slowest die has settled.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use slotmap::SlotMap;
use tracing::{debug, info};

use crate::builder::{build, DieType};
use crate::calibration::CalibrationSet;
use crate::config::EngineConfig;
use crate::error::{ConfigError, DiceError, RollError};
use crate::physics::{ConvexShape, Pose, World};
use crate::resolver;
use crate::roll::{random_orientation, spawn_pose, DieInstance, RollState};
use crate::Real;

slotmap::new_key_type! {
    /// Identifier for a live die.
    pub struct DieId;
    /// Identifier for a roll request.
    pub struct SessionHandle;
}

/// The dice created for one roll request and, once every one of them has
/// resolved, their values in request order.
#[derive(Clone, Debug)]
pub struct RollSession {
    dice: Vec<DieId>,
    kinds: Vec<DieType>,
    results: Option<Vec<u32>>,
}

/// Per-die values of a completed session plus their sum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RollReport {
    pub rolls: Vec<(DieType, u32)>,
    pub total: u32,
}

impl RollSession {
    pub fn dice(&self) -> &[DieId] {
        &self.dice
    }

    pub fn die_types(&self) -> &[DieType] {
        &self.kinds
    }

    pub fn is_complete(&self) -> bool {
        self.results.is_some()
    }

    pub fn results(&self) -> Option<&[u32]> {
        self.results.as_deref()
    }

    /// `None` until every die has resolved.
    pub fn report(&self) -> Option<RollReport> {
        let results = self.results.as_ref()?;
        let rolls: Vec<(DieType, u32)> = self
            .kinds
            .iter()
            .copied()
            .zip(results.iter().copied())
            .collect();
        let total = results.iter().sum();
        Some(RollReport { rolls, total })
    }
}

/// Owner of the world and every die in it.
///
/// All mutation happens through `&mut self` on the simulation thread.
#[derive(Debug)]
pub struct SessionManager<R> {
    config: EngineConfig,
    world: World,
    shapes: BTreeMap<DieType, Arc<ConvexShape>>,
    calibration: CalibrationSet,
    dice: SlotMap<DieId, DieInstance>,
    sessions: SlotMap<SessionHandle, RollSession>,
    rng: R,
}

impl<R: Rng> SessionManager<R> {
    /// Builds every die shape and checks the built-in calibration tables
    /// against them. Any failure here is fatal.
    pub fn new(config: EngineConfig, rng: R) -> Result<Self, DiceError> {
        Self::with_calibration(config, CalibrationSet::standard()?, rng)
    }

    /// Like [`new`](Self::new) with caller-supplied calibration tables.
    pub fn with_calibration(
        config: EngineConfig,
        calibration: CalibrationSet,
        rng: R,
    ) -> Result<Self, DiceError> {
        config.validate()?;
        let world = World::new(config.world.clone())?;

        let mut shapes = BTreeMap::new();
        for die in DieType::ALL {
            let shape = ConvexShape::new(build(die, config.die_scale)?)?;
            let table = calibration
                .table(die)
                .ok_or_else(|| ConfigError::Calibration {
                    die,
                    reason: "no table".to_string(),
                })?;
            let ids = resolver::structural_ids(die, &shape);
            if table.len() != ids {
                return Err(ConfigError::FaceCountMismatch {
                    die,
                    expected: table.len(),
                    actual: ids,
                }
                .into());
            }
            shapes.insert(die, Arc::new(shape));
        }
        info!(scale = config.die_scale, "dice engine ready");

        Ok(Self {
            config,
            world,
            shapes,
            calibration,
            dice: SlotMap::with_key(),
            sessions: SlotMap::with_key(),
            rng,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn calibration(&self) -> &CalibrationSet {
        &self.calibration
    }

    pub fn shape(&self, die: DieType) -> Option<&Arc<ConvexShape>> {
        self.shapes.get(&die)
    }

    pub fn die(&self, id: DieId) -> Option<&DieInstance> {
        self.dice.get(id)
    }

    pub fn session(&self, handle: SessionHandle) -> Option<&RollSession> {
        self.sessions.get(handle)
    }

    /// Creates `count` dice of each requested type, spread along the x
    /// axis with random orientations, and rolls every one of them.
    pub fn start_roll(&mut self, specs: &[(DieType, usize)]) -> Result<SessionHandle, RollError> {
        let total: usize = specs.iter().map(|&(_, count)| count).sum();
        if total == 0 {
            return Err(RollError::EmptyRoll);
        }

        let kinds: Vec<DieType> = specs
            .iter()
            .flat_map(|&(die, count)| std::iter::repeat(die).take(count))
            .collect();
        let mut ids = Vec::with_capacity(total);
        for (index, &die) in kinds.iter().enumerate() {
            match self.spawn(die, index, total) {
                Ok(id) => ids.push(id),
                Err(err) => {
                    self.release(&ids);
                    return Err(err);
                }
            }
        }
        for &id in &ids {
            if let Err(err) = self.roll_die(id) {
                self.release(&ids);
                return Err(err);
            }
        }

        let handle = self.sessions.insert(RollSession {
            dice: ids,
            kinds,
            results: None,
        });
        debug!(?handle, dice = total, "roll started");
        Ok(handle)
    }

    /// Rolls every die of a finished session again. Rejected without side
    /// effects while any of its dice is still in flight.
    pub fn reroll(&mut self, handle: SessionHandle) -> Result<(), RollError> {
        let session = self.sessions.get(handle).ok_or(RollError::UnknownSession)?;
        let ids = session.dice.clone();
        for &id in &ids {
            let die = self.dice.get(id).ok_or(RollError::UnknownDie)?;
            if die.state().in_flight() {
                return Err(RollError::RollInProgress);
            }
        }
        for &id in &ids {
            self.roll_die(id)?;
        }
        if let Some(session) = self.sessions.get_mut(handle) {
            session.results = None;
        }
        debug!(?handle, "re-rolled");
        Ok(())
    }

    /// Advances the world by `dt`, then every die's state machine, then
    /// marks sessions whose dice have all resolved as complete.
    pub fn step(&mut self, dt: Real) {
        if !(dt > 0.0) {
            return;
        }
        self.world.step(dt);
        for die in self.dice.values_mut() {
            die.advance(&self.world, dt, &self.config.roll);
        }
        for (handle, session) in self.sessions.iter_mut() {
            if session.results.is_some() {
                continue;
            }
            let values: Option<Vec<u32>> = session
                .dice
                .iter()
                .map(|&id| self.dice.get(id).and_then(|d| resolver::resolve(d).ok()))
                .collect();
            if let Some(values) = values {
                debug!(?handle, ?values, "session complete");
                session.results = Some(values);
            }
        }
    }

    /// True once every die of the session has resolved. Unknown handles
    /// are never complete.
    pub fn is_complete(&self, handle: SessionHandle) -> bool {
        self.sessions.get(handle).is_some_and(RollSession::is_complete)
    }

    /// Values in request order, or [`RollError::NotSettled`] while any die
    /// is still rolling. Never blocks.
    pub fn await_results(&self, handle: SessionHandle) -> Result<Vec<u32>, RollError> {
        let session = self.sessions.get(handle).ok_or(RollError::UnknownSession)?;
        session.results.clone().ok_or(RollError::NotSettled)
    }

    /// Steps the world until the session completes or `max_steps` have run.
    pub fn run_until_complete(
        &mut self,
        handle: SessionHandle,
        dt: Real,
        max_steps: usize,
    ) -> Result<Vec<u32>, RollError> {
        if !self.sessions.contains_key(handle) {
            return Err(RollError::UnknownSession);
        }
        for _ in 0..max_steps {
            if self.is_complete(handle) {
                break;
            }
            self.step(dt);
        }
        self.await_results(handle)
    }

    /// Drops the session and releases its dice and their bodies. Works on
    /// running and completed sessions alike.
    pub fn cancel(&mut self, handle: SessionHandle) -> Result<(), RollError> {
        let session = self.sessions.remove(handle).ok_or(RollError::UnknownSession)?;
        self.release(&session.dice);
        debug!(?handle, dice = session.dice.len(), "session released");
        Ok(())
    }

    /// World transform of a die, for rendering.
    pub fn pose(&self, id: DieId) -> Result<Pose, RollError> {
        let die = self.dice.get(id).ok_or(RollError::UnknownDie)?;
        let body = self.world.body(die.body()).ok_or(RollError::BodyReleased)?;
        Ok(body.current_pose())
    }

    /// State of a single die.
    pub fn state(&self, id: DieId) -> Result<RollState, RollError> {
        self.dice
            .get(id)
            .map(DieInstance::state)
            .ok_or(RollError::UnknownDie)
    }

    fn spawn(&mut self, die: DieType, index: usize, count: usize) -> Result<DieId, RollError> {
        let (shape, table) = match (self.shapes.get(&die), self.calibration.table(die)) {
            (Some(shape), Some(table)) => (shape.clone(), table.clone()),
            _ => return Err(RollError::UnsupportedDie(die.sides())),
        };
        let orientation = random_orientation(&mut self.rng);
        let pose = spawn_pose(
            index,
            count,
            self.config.die_spacing,
            self.config.drop_height,
            orientation,
        );
        let body = self
            .world
            .insert_body(shape.clone(), self.config.body.clone(), pose);
        Ok(self
            .dice
            .insert(DieInstance::from_parts(die, shape, body, table)))
    }

    fn roll_die(&mut self, id: DieId) -> Result<(), RollError> {
        let die = self.dice.get_mut(id).ok_or(RollError::UnknownDie)?;
        die.roll(&mut self.world, &self.config.roll, &mut self.rng)
    }

    fn release(&mut self, ids: &[DieId]) {
        for &id in ids {
            if let Some(die) = self.dice.remove(id) {
                self.world.remove_body(die.body());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationTable;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const DT: Real = 1.0 / 120.0;

    fn manager(seed: u64) -> SessionManager<StdRng> {
        SessionManager::new(EngineConfig::default(), StdRng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn empty_requests_are_rejected() {
        let mut m = manager(1);
        assert_eq!(m.start_roll(&[]), Err(RollError::EmptyRoll));
        assert_eq!(
            m.start_roll(&[(DieType::Cube, 0), (DieType::Icosahedron, 0)]),
            Err(RollError::EmptyRoll)
        );
        assert!(m.world().is_empty());
    }

    #[test]
    fn dice_spawn_spread_out() {
        let mut m = manager(2);
        let h = m.start_roll(&[(DieType::Cube, 3)]).unwrap();
        let session = m.session(h).unwrap();
        assert_eq!(session.dice().len(), 3);
        let xs: Vec<Real> = session
            .dice()
            .iter()
            .map(|&id| m.pose(id).unwrap().position.x)
            .collect();
        assert!(xs[0] < xs[1] && xs[1] < xs[2], "{xs:?}");
        assert_eq!(m.world().len(), 3);
    }

    #[test]
    fn results_wait_for_every_die() {
        let mut m = manager(3);
        let h = m.start_roll(&[(DieType::Cube, 2), (DieType::Octahedron, 1)]).unwrap();
        m.step(DT);
        assert!(!m.is_complete(h));
        assert_eq!(m.await_results(h), Err(RollError::NotSettled));
        assert!(m.session(h).unwrap().report().is_none());

        let values = m.run_until_complete(h, DT, 600).unwrap();
        assert_eq!(values.len(), 3);
        assert!(values[..2].iter().all(|v| (1..=6).contains(v)));
        assert!((1..=8).contains(&values[2]));

        let report = m.session(h).unwrap().report().unwrap();
        assert_eq!(report.total, values.iter().sum::<u32>());
        assert_eq!(report.rolls[2].0, DieType::Octahedron);
    }

    #[test]
    fn invalid_frames_are_ignored() {
        let mut m = manager(13);
        let h = m.start_roll(&[(DieType::Cube, 1)]).unwrap();
        let id = m.session(h).unwrap().dice()[0];
        m.step(DT);
        let pose = m.pose(id).unwrap();
        let elapsed = m.die(id).unwrap().elapsed();
        let world_time = m.world().elapsed();

        for dt in [Real::NAN, -1.0, 0.0] {
            m.step(dt);
        }
        assert_eq!(m.pose(id).unwrap(), pose);
        assert_eq!(m.die(id).unwrap().elapsed(), elapsed);
        assert_eq!(m.world().elapsed(), world_time);
        assert_eq!(m.state(id), Ok(RollState::Spinning));

        let values = m.run_until_complete(h, DT, 600).unwrap();
        assert!((1..=6).contains(&values[0]));
    }

    #[test]
    fn results_are_stable_once_complete() {
        let mut m = manager(4);
        let h = m.start_roll(&[(DieType::Icosahedron, 1)]).unwrap();
        let first = m.run_until_complete(h, DT, 600).unwrap();
        for _ in 0..60 {
            m.step(DT);
        }
        assert_eq!(m.await_results(h).unwrap(), first);
    }

    #[test]
    fn reroll_in_flight_is_rejected() {
        let mut m = manager(5);
        let h = m.start_roll(&[(DieType::Dodecahedron, 2)]).unwrap();
        m.step(DT);
        let id = m.session(h).unwrap().dice()[0];
        let before = m.pose(id).unwrap();
        assert_eq!(m.reroll(h), Err(RollError::RollInProgress));
        assert_eq!(m.pose(id).unwrap(), before);

        m.run_until_complete(h, DT, 600).unwrap();
        m.reroll(h).unwrap();
        assert!(!m.is_complete(h));
        assert_eq!(m.state(id), Ok(RollState::Spinning));
        assert_eq!(m.run_until_complete(h, DT, 600).unwrap().len(), 2);
    }

    #[test]
    fn cancel_releases_bodies() {
        let mut m = manager(6);
        let keep = m.start_roll(&[(DieType::Cube, 1)]).unwrap();
        let drop = m.start_roll(&[(DieType::Tetrahedron, 2)]).unwrap();
        let dropped = m.session(drop).unwrap().dice().to_vec();
        m.step(DT);
        m.cancel(drop).unwrap();

        assert_eq!(m.world().len(), 1);
        assert_eq!(m.await_results(drop), Err(RollError::UnknownSession));
        assert_eq!(m.cancel(drop), Err(RollError::UnknownSession));
        assert_eq!(m.pose(dropped[0]), Err(RollError::UnknownDie));

        let values = m.run_until_complete(keep, DT, 600).unwrap();
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn sessions_complete_independently() {
        let mut m = manager(7);
        let a = m.start_roll(&[(DieType::Cube, 1)]).unwrap();
        let first = m.run_until_complete(a, DT, 600).unwrap();
        let b = m.start_roll(&[(DieType::Cube, 1)]).unwrap();
        m.step(DT);
        assert!(m.is_complete(a));
        assert!(!m.is_complete(b));
        m.run_until_complete(b, DT, 600).unwrap();
        assert_eq!(m.await_results(a).unwrap(), first);
    }

    #[test]
    fn invalid_config_fails_at_startup() {
        let config = EngineConfig {
            die_scale: -1.0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            SessionManager::new(config, StdRng::seed_from_u64(0)),
            Err(DiceError::Config(_))
        ));
    }

    #[test]
    fn custom_tables_are_used() {
        let mut calibration = CalibrationSet::standard().unwrap();
        calibration.insert(CalibrationTable::new(DieType::Cube, vec![1, 2, 3, 4, 5, 6]).unwrap());
        let mut m = SessionManager::with_calibration(
            EngineConfig::default(),
            calibration,
            StdRng::seed_from_u64(8),
        )
        .unwrap();
        assert_eq!(
            m.calibration().table(DieType::Cube).unwrap().values(),
            &[1, 2, 3, 4, 5, 6]
        );
        let h = m.start_roll(&[(DieType::Cube, 1)]).unwrap();
        let value = m.run_until_complete(h, DT, 600).unwrap()[0];
        assert!((1..=6).contains(&value));
    }

    #[test]
    fn unknown_handles() {
        let mut m = manager(9);
        let h = m.start_roll(&[(DieType::Cube, 1)]).unwrap();
        m.cancel(h).unwrap();
        assert!(!m.is_complete(h));
        assert_eq!(m.reroll(h), Err(RollError::UnknownSession));
        assert_eq!(m.run_until_complete(h, DT, 10), Err(RollError::UnknownSession));
    }
}
