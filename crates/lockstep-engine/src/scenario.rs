//! Demonstration scenario: random walkers on a ring.
//!
//! Walkers enter the ring at a random cell while the environment is still
//! in setup, then take one random step (-1, 0, or +1) per tick and report
//! it to a tally. Two handlers own all shared state:
//!
//! | Handler | Tags | Owned keys |
//! |---------|------|------------|
//! | `ring` | `enter`, `move` | `ring` |
//! | `tally` | `tally` | `tally` |
//!
//! A reporter plugin reads both keys through its `PluginManager` and logs
//! them; the optional state recorder writes them to a `MemoryDatabase`.

use std::collections::BTreeMap;
use std::sync::Arc;

use lockstep_core::{
    ComponentError, KernelConfig, OperatorState, Participant, ParticipantFactory,
    ParticipantHandle, Plugin, Simulation, SimulationResult, TickCallback, TickContext,
    TickSummary, run_simulation,
};
use lockstep_db::{DatabaseService, MemoryDatabase, STATE_TABLE, StateRecorderPlugin};
use lockstep_env::{
    ActionHandler, EnvironmentBuilder, HandlerError, MembersService, PluginManager, StateError,
    StateView, StateWriter,
};
use lockstep_types::{Action, ActionOutcome, ActionTag, ParticipantId, StateKey};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::EngineError;

/// Shared-state key holding the [`RingState`].
pub const RING_KEY: &str = "ring";

/// Shared-state key holding the number of tallied steps.
pub const TALLY_KEY: &str = "tally";

// -----------------------------------------------------------------------
// Shared state
// -----------------------------------------------------------------------

/// Where every walker stands, and how often two ended up on one cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingState {
    /// Cell of each walker on the ring.
    pub positions: BTreeMap<ParticipantId, u32>,
    /// Moves that landed on an occupied cell.
    pub collisions: u64,
}

impl RingState {
    /// Read the ring from shared state. An absent key is an empty ring.
    pub fn load(view: &StateView) -> Result<Self, HandlerError> {
        match view.read(&StateKey::from(RING_KEY)) {
            Ok(value) => Self::from_value(value),
            Err(StateError::NotFound { .. }) => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Number of distinct occupied cells.
    pub fn occupied(&self) -> usize {
        let mut cells: Vec<u32> = self.positions.values().copied().collect();
        cells.sort_unstable();
        cells.dedup();
        cells.len()
    }

    fn from_value(value: Value) -> Result<Self, HandlerError> {
        serde_json::from_value(value).map_err(|e| HandlerError::failed(format!("corrupt ring: {e}")))
    }

    fn to_value(&self) -> Result<Value, HandlerError> {
        serde_json::to_value(self).map_err(|e| HandlerError::failed(format!("ring encode: {e}")))
    }
}

/// Parameters of the `enter` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterParams {
    /// Cell to start on.
    pub cell: u32,
}

/// Parameters of the `move` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveParams {
    /// -1, 0, or +1.
    pub step: i8,
}

// -----------------------------------------------------------------------
// Handlers
// -----------------------------------------------------------------------

/// Why a ring update did not happen.
enum RingRefusal {
    Rejected(&'static str),
    Failed(HandlerError),
}

impl From<StateError> for RingRefusal {
    fn from(err: StateError) -> Self {
        Self::Failed(err.into())
    }
}

impl From<HandlerError> for RingRefusal {
    fn from(err: HandlerError) -> Self {
        Self::Failed(err)
    }
}

/// Owns the ring: placement and movement of walkers.
#[derive(Debug, Clone)]
pub struct RingHandler {
    size: u32,
}

impl RingHandler {
    /// A ring with `size` cells.
    pub fn new(size: u32) -> Result<Self, EngineError> {
        if size == 0 {
            return Err(EngineError::Scenario {
                message: "ring_size must be at least 1".to_owned(),
            });
        }
        Ok(Self { size })
    }

    fn enter(&self, ring: &mut RingState, actor: ParticipantId, cell: u32) -> Result<(), RingRefusal> {
        if cell >= self.size {
            return Err(RingRefusal::Rejected("cell outside the ring"));
        }
        if ring.positions.contains_key(&actor) {
            return Err(RingRefusal::Rejected("already on the ring"));
        }
        if ring.positions.values().any(|&c| c == cell) {
            ring.collisions = ring.collisions.saturating_add(1);
        }
        ring.positions.insert(actor, cell);
        Ok(())
    }

    fn step(&self, ring: &mut RingState, actor: ParticipantId, step: i8) -> Result<(), RingRefusal> {
        if !(-1..=1).contains(&step) {
            return Err(RingRefusal::Rejected("step must be -1, 0, or 1"));
        }
        let current = *ring
            .positions
            .get(&actor)
            .ok_or(RingRefusal::Rejected("not on the ring"))?;
        let next = i64::from(current)
            .saturating_add(i64::from(step))
            .checked_rem_euclid(i64::from(self.size))
            .and_then(|cell| u32::try_from(cell).ok())
            .ok_or_else(|| HandlerError::failed("ring arithmetic out of range"))?;
        if next != current && ring.positions.values().any(|&c| c == next) {
            ring.collisions = ring.collisions.saturating_add(1);
        }
        ring.positions.insert(actor, next);
        Ok(())
    }
}

impl ActionHandler for RingHandler {
    fn name(&self) -> &str {
        "ring"
    }

    fn action_tags(&self) -> Vec<ActionTag> {
        vec![ActionTag::from("enter"), ActionTag::from("move")]
    }

    fn owned_keys(&self) -> Vec<StateKey> {
        vec![StateKey::from(RING_KEY)]
    }

    fn handle(
        &self,
        action: &Action,
        actor: ParticipantId,
        state: &StateWriter<'_>,
    ) -> Result<ActionOutcome, HandlerError> {
        let updated = state.update::<RingRefusal, _>(&StateKey::from(RING_KEY), |current| {
            let mut ring = current.map_or_else(
                || Ok(RingState::default()),
                |value| RingState::from_value(value.clone()),
            )?;
            if action.tag().as_str() == "enter" {
                let params: EnterParams = action.params().map_err(HandlerError::from)?;
                self.enter(&mut ring, actor, params.cell)?;
            } else {
                let params: MoveParams = action.params().map_err(HandlerError::from)?;
                self.step(&mut ring, actor, params.step)?;
            }
            Ok(ring.to_value()?)
        });

        match updated {
            Ok(ring) => Ok(ActionOutcome::applied_with(ring)),
            Err(RingRefusal::Rejected(reason)) => Ok(ActionOutcome::rejected(reason)),
            Err(RingRefusal::Failed(err)) => Err(err),
        }
    }
}

/// Owns the tally: counts the steps walkers report.
#[derive(Debug, Clone, Copy, Default)]
pub struct TallyHandler;

impl ActionHandler for TallyHandler {
    fn name(&self) -> &str {
        "tally"
    }

    fn action_tags(&self) -> Vec<ActionTag> {
        vec![ActionTag::from("tally")]
    }

    fn owned_keys(&self) -> Vec<StateKey> {
        vec![StateKey::from(TALLY_KEY)]
    }

    fn handle(
        &self,
        _action: &Action,
        _actor: ParticipantId,
        state: &StateWriter<'_>,
    ) -> Result<ActionOutcome, HandlerError> {
        let next = state.update::<HandlerError, _>(&StateKey::from(TALLY_KEY), |current| {
            let count = current.and_then(Value::as_u64).unwrap_or(0);
            Ok(json!(count.saturating_add(1)))
        })?;
        Ok(ActionOutcome::applied_with(next))
    }
}

// -----------------------------------------------------------------------
// Participants
// -----------------------------------------------------------------------

/// A walker taking one random step per tick.
pub struct Walker {
    id: ParticipantId,
    name: String,
    ring_size: u32,
    rng: SmallRng,
    handle: Option<ParticipantHandle>,
}

impl Walker {
    fn handle(&self) -> Result<&ParticipantHandle, ComponentError> {
        self.handle
            .as_ref()
            .ok_or_else(|| ComponentError::failed("walker used before initialise"))
    }
}

impl Participant for Walker {
    fn id(&self) -> ParticipantId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn initialise(&mut self, handle: ParticipantHandle) -> Result<(), ComponentError> {
        let cell = self.rng.random_range(0..self.ring_size);
        let enter = Action::with_params("enter", &EnterParams { cell })
            .map_err(ComponentError::other)?;
        let outcome = handle.act(&enter)?;
        if !outcome.is_applied() {
            return Err(ComponentError::failed(format!(
                "could not enter the ring: {outcome:?}"
            )));
        }
        debug!(walker = %self.name, cell, "Walker entered the ring");
        self.handle = Some(handle);
        Ok(())
    }

    fn step(&mut self, ctx: &TickContext) -> Result<(), ComponentError> {
        let step: i8 = self.rng.random_range(-1..=1);
        let action = Action::with_params("move", &MoveParams { step })
            .map_err(ComponentError::other)?;
        let handle = self.handle()?;
        let outcome = handle.act(&action)?;
        if !outcome.is_applied() {
            debug!(walker = %self.name, tick = ctx.tick, ?outcome, "Move rejected");
        }
        handle.act(&Action::bare("tally"))?;
        Ok(())
    }
}

/// Creates walkers with reproducible random streams.
///
/// The n-th walker created is seeded with `seed + n`.
#[derive(Debug, Clone, Copy)]
pub struct WalkerFactory {
    seed: u64,
    ring_size: u32,
    created: u64,
}

impl WalkerFactory {
    /// A factory for walkers on a ring of `ring_size` cells.
    pub const fn new(seed: u64, ring_size: u32) -> Self {
        Self {
            seed,
            ring_size,
            created: 0,
        }
    }
}

impl ParticipantFactory for WalkerFactory {
    fn create(&mut self, id: ParticipantId, name: &str) -> Box<dyn Participant> {
        let rng = SmallRng::seed_from_u64(self.seed.wrapping_add(self.created));
        self.created = self.created.saturating_add(1);
        Box::new(Walker {
            id,
            name: name.to_owned(),
            ring_size: self.ring_size,
            rng,
            handle: None,
        })
    }
}

// -----------------------------------------------------------------------
// Plugins and callbacks
// -----------------------------------------------------------------------

/// Logs ring occupancy every tick and the final state on completion.
#[derive(Debug, Default)]
pub struct RingReporter {
    view: Option<StateView>,
    members: Option<Arc<MembersService>>,
}

impl RingReporter {
    fn view(&self) -> Result<&StateView, ComponentError> {
        self.view
            .as_ref()
            .ok_or_else(|| ComponentError::failed("reporter used before initialise"))
    }
}

impl Plugin for RingReporter {
    fn name(&self) -> &str {
        "ring-reporter"
    }

    fn initialise(&mut self, manager: &PluginManager) -> Result<(), ComponentError> {
        self.view = Some((*manager.get_environment_service::<StateView>()?).clone());
        self.members = Some(manager.get_environment_service::<MembersService>()?);
        Ok(())
    }

    fn execute(&mut self, ctx: &TickContext) -> Result<(), ComponentError> {
        let ring = RingState::load(self.view()?).map_err(ComponentError::other)?;
        debug!(
            tick = ctx.tick,
            walkers = self.members.as_deref().map_or(0, MembersService::len),
            occupied = ring.occupied(),
            collisions = ring.collisions,
            "Ring occupancy"
        );
        Ok(())
    }

    fn on_simulation_complete(&mut self) -> Result<(), ComponentError> {
        let view = self.view()?;
        let ring = RingState::load(view).map_err(ComponentError::other)?;
        let tally = view
            .read(&StateKey::from(TALLY_KEY))
            .ok()
            .as_ref()
            .and_then(Value::as_u64)
            .unwrap_or(0);
        info!(
            walkers = ring.positions.len(),
            occupied = ring.occupied(),
            collisions = ring.collisions,
            tally,
            "Ring final state"
        );
        Ok(())
    }
}

/// Logs a progress line every `every` ticks.
#[derive(Debug, Clone, Copy)]
pub struct ProgressCallback {
    every: u64,
}

impl ProgressCallback {
    /// Log every `every` ticks (0 never logs).
    pub const fn new(every: u64) -> Self {
        Self { every }
    }
}

impl TickCallback for ProgressCallback {
    fn on_tick(&mut self, summary: &TickSummary, simulation: &Simulation) {
        if summary.tick.checked_rem(self.every) == Some(0) {
            info!(
                tick = summary.tick,
                participants = simulation.active_participants().len(),
                applied = summary.actions.applied,
                rejected = summary.actions.rejected,
                "Progress"
            );
        }
    }
}

// -----------------------------------------------------------------------
// Run
// -----------------------------------------------------------------------

/// What the scenario produced.
#[derive(Debug)]
pub struct ScenarioOutcome {
    /// How the run ended.
    pub result: SimulationResult,
    /// The ring after the last tick.
    pub ring: RingState,
    /// Steps tallied over the whole run.
    pub tally: u64,
    /// Rows written by the state recorder (0 if recording is off).
    pub recorded_rows: usize,
}

/// Build the ring environment from `config`, run it, and read the result.
pub async fn run(
    config: &KernelConfig,
    operator: &Arc<OperatorState>,
) -> Result<ScenarioOutcome, EngineError> {
    let scenario = &config.scenario;

    let mut builder = EnvironmentBuilder::new();
    builder.register_handler(RingHandler::new(scenario.ring_size)?)?;
    builder.register_handler(TallyHandler)?;
    let db = scenario.record_state.then(|| Arc::new(MemoryDatabase::new()));
    if let Some(db) = &db {
        builder.add_service(Arc::clone(db));
    }
    let (connector, gate) = builder.build();
    info!(
        handlers = connector.handlers().len(),
        services = ?connector.environment_service_names(),
        "Environment built"
    );

    let mut simulation = Simulation::new(connector, gate, config.driver.clone());

    let names = (0..scenario.walkers).map(|n| format!("walker-{n}"));
    let mut factory = WalkerFactory::new(scenario.seed, scenario.ring_size);
    simulation.spawn_participants(&mut factory, names)?;

    simulation.add_plugin(Box::new(RingReporter::default()))?;
    if let Some(db) = &db {
        let recorder = StateRecorderPlugin::new(Arc::clone(db) as Arc<dyn DatabaseService>);
        simulation.add_plugin(Box::new(recorder))?;
    }

    let mut callback = ProgressCallback::new(10);
    let result = run_simulation(&mut simulation, operator, &mut callback).await?;

    let view = simulation.connector().state_view();
    let ring = RingState::load(&view).map_err(|e| EngineError::Scenario {
        message: e.to_string(),
    })?;
    let tally = view
        .read(&StateKey::from(TALLY_KEY))
        .ok()
        .as_ref()
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let recorded_rows = db.map_or(Ok(0), |db| db.rows(STATE_TABLE).map(|rows| rows.len()))?;

    Ok(ScenarioOutcome {
        result,
        ring,
        tally,
        recorded_rows,
    })
}
