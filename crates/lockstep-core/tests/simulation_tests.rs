//! Integration tests for the time-step driver.
//!
//! Build a real environment with a counter handler, drive participants and
//! plugins through `Simulation`, and check ordering, failure policies, and
//! the completion hook.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lockstep_core::{
    ComponentError, ComponentRef, DriverConfig, DriverStatus, ExecutionMode, FailurePolicy,
    NoOpCallback, OperatorState, Participant, ParticipantHandle, Plugin, Simulation,
    SimulationBoundsConfig, SimulationEndReason, TickContext, TickError, run_simulation,
};
use lockstep_env::{
    ActionHandler, EnvironmentBuilder, EnvironmentError, EnvironmentRegistrationRequest,
    HandlerError, MembersService, PluginManager, StateView, StateWriter,
};
use lockstep_types::{Action, ActionOutcome, ActionTag, IntegerTime, ParticipantId, StateKey};
use serde_json::{Value, json};

// =============================================================================
// Fixtures
// =============================================================================

/// Owns `counter`. `increment` adds one; `explode` always fails.
struct Counter;

impl ActionHandler for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    fn action_tags(&self) -> Vec<ActionTag> {
        vec![ActionTag::from("increment"), ActionTag::from("explode")]
    }

    fn owned_keys(&self) -> Vec<StateKey> {
        vec![StateKey::from("counter")]
    }

    fn handle(
        &self,
        action: &Action,
        _actor: ParticipantId,
        state: &StateWriter<'_>,
    ) -> Result<ActionOutcome, HandlerError> {
        if action.tag().as_str() == "explode" {
            return Err(HandlerError::failed("kaboom"));
        }
        let next = state.update::<HandlerError, _>(&StateKey::from("counter"), |cur| {
            Ok(json!(cur.and_then(Value::as_i64).unwrap_or(0).saturating_add(1)))
        })?;
        Ok(ActionOutcome::applied_with(next))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Step { who: String, tick: u64 },
    Execute { tick: u64, counter: i64 },
}

type Log = Arc<Mutex<Vec<Entry>>>;

/// What a [`Worker`] does on a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Increment,
    FailAt(u64),
    PanicAt(u64),
    ExplodeAt(u64),
    LeaveAt(u64),
}

struct Worker {
    id: ParticipantId,
    name: String,
    behaviour: Behaviour,
    delay: Duration,
    log: Log,
    handle: Option<ParticipantHandle>,
    kept: Arc<Mutex<Option<ParticipantHandle>>>,
}

impl Worker {
    fn new(name: &str, behaviour: Behaviour, log: &Log) -> Self {
        Self {
            id: ParticipantId::new(),
            name: name.to_owned(),
            behaviour,
            delay: Duration::ZERO,
            log: Arc::clone(log),
            handle: None,
            kept: Arc::new(Mutex::new(None)),
        }
    }

    const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Participant for Worker {
    fn id(&self) -> ParticipantId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn initialise(&mut self, handle: ParticipantHandle) -> Result<(), ComponentError> {
        *self.kept.lock().unwrap() = Some(handle.clone());
        self.handle = Some(handle);
        Ok(())
    }

    fn step(&mut self, ctx: &TickContext) -> Result<(), ComponentError> {
        std::thread::sleep(self.delay);
        let handle = self.handle.as_ref().expect("initialised");
        self.log.lock().unwrap().push(Entry::Step {
            who: self.name.clone(),
            tick: ctx.tick,
        });
        match self.behaviour {
            Behaviour::FailAt(t) if t == ctx.tick => return Err(ComponentError::failed("gave up")),
            Behaviour::PanicAt(t) if t == ctx.tick => panic!("worker fell over"),
            Behaviour::ExplodeAt(t) if t == ctx.tick => {
                let err = handle.act(&Action::bare("explode")).unwrap_err();
                assert!(matches!(err, EnvironmentError::ActionExecutionFailed { .. }));
                return Ok(());
            }
            Behaviour::LeaveAt(t) if t == ctx.tick => {
                handle.deregister()?;
                return Ok(());
            }
            _ => {}
        }
        handle.act(&Action::bare("increment"))?;
        Ok(())
    }
}

/// Logs the counter after every tick and counts completion calls.
struct Observer {
    log: Log,
    view: Option<StateView>,
    completed: Arc<AtomicUsize>,
    fail_at: Option<u64>,
}

impl Observer {
    fn new(log: &Log) -> (Self, Arc<AtomicUsize>) {
        let completed = Arc::new(AtomicUsize::new(0));
        let observer = Self {
            log: Arc::clone(log),
            view: None,
            completed: Arc::clone(&completed),
            fail_at: None,
        };
        (observer, completed)
    }
}

impl Plugin for Observer {
    fn name(&self) -> &str {
        "observer"
    }

    fn initialise(&mut self, manager: &PluginManager) -> Result<(), ComponentError> {
        self.view = Some((*manager.get_environment_service::<StateView>()?).clone());
        Ok(())
    }

    fn execute(&mut self, ctx: &TickContext) -> Result<(), ComponentError> {
        if self.fail_at == Some(ctx.tick) {
            return Err(ComponentError::failed("observer broke"));
        }
        let counter = self
            .view
            .as_ref()
            .and_then(|view| view.read(&StateKey::from("counter")).ok())
            .and_then(|value| value.as_i64())
            .unwrap_or(0);
        self.log.lock().unwrap().push(Entry::Execute {
            tick: ctx.tick,
            counter,
        });
        Ok(())
    }

    fn on_simulation_complete(&mut self) -> Result<(), ComponentError> {
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn simulation(driver: DriverConfig) -> Simulation {
    let mut builder = EnvironmentBuilder::new();
    builder.register_handler(Counter).unwrap();
    let (connector, gate) = builder.build();
    Simulation::new(connector, gate, driver)
}

fn driver(execution: ExecutionMode, component_failure: FailurePolicy) -> DriverConfig {
    DriverConfig {
        execution,
        component_failure,
        ..DriverConfig::default()
    }
}

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entry_tick(entry: &Entry) -> u64 {
    match entry {
        Entry::Step { tick, .. } | Entry::Execute { tick, .. } => *tick,
    }
}

fn steps_at(log: &Log, tick: u64) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|entry| match entry {
            Entry::Step { who, tick: t } if *t == tick => Some(who.clone()),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Lockstep ordering
// =============================================================================

#[test]
fn three_ticks_two_participants_one_plugin() {
    let log = new_log();
    let mut sim = simulation(DriverConfig::default());
    sim.add_participant(Box::new(Worker::new("a", Behaviour::Increment, &log)))
        .unwrap();
    sim.add_participant(Box::new(Worker::new("b", Behaviour::Increment, &log)))
        .unwrap();
    let (observer, completed) = Observer::new(&log);
    sim.add_plugin(Box::new(observer)).unwrap();

    let mut times = Vec::new();
    for _ in 0..3 {
        let summary = sim.run_tick().unwrap();
        assert_eq!(summary.participants_stepped, 2);
        assert_eq!(summary.plugins_executed, 1);
        assert_eq!(summary.actions.applied, 2);
        times.push(summary.time);
    }
    assert_eq!(
        times,
        vec![IntegerTime::new(1), IntegerTime::new(2), IntegerTime::new(3)]
    );

    let expected = vec![
        Entry::Step { who: "a".to_owned(), tick: 1 },
        Entry::Step { who: "b".to_owned(), tick: 1 },
        Entry::Execute { tick: 1, counter: 2 },
        Entry::Step { who: "a".to_owned(), tick: 2 },
        Entry::Step { who: "b".to_owned(), tick: 2 },
        Entry::Execute { tick: 2, counter: 4 },
        Entry::Step { who: "a".to_owned(), tick: 3 },
        Entry::Step { who: "b".to_owned(), tick: 3 },
        Entry::Execute { tick: 3, counter: 6 },
    ];
    assert_eq!(*log.lock().unwrap(), expected);

    sim.finish().unwrap();
    sim.finish().unwrap();
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert_eq!(sim.status(), &DriverStatus::Completed { ticks: 3 });
}

#[test]
fn concurrent_steps_finish_before_plugins_and_next_tick() {
    let log = new_log();
    let mut sim = simulation(driver(ExecutionMode::Concurrent, FailurePolicy::Abort));
    for (i, name) in (0_u64..).zip(["slow", "medium", "fast", "instant"]) {
        let delay = Duration::from_millis(15_u64.saturating_sub(i.saturating_mul(5)));
        let worker = Worker::new(name, Behaviour::Increment, &log).with_delay(delay);
        sim.add_participant(Box::new(worker)).unwrap();
    }
    let (observer, _completed) = Observer::new(&log);
    sim.add_plugin(Box::new(observer)).unwrap();

    for _ in 0..5 {
        sim.run_tick().unwrap();
    }

    let entries = log.lock().unwrap().clone();
    assert_eq!(entries.len(), 25);
    for pair in entries.windows(2) {
        assert!(entry_tick(&pair[0]) <= entry_tick(&pair[1]));
    }
    for (tick, chunk) in (1_u64..).zip(entries.chunks(5)) {
        assert!(chunk[..4].iter().all(|e| matches!(e, Entry::Step { .. })));
        assert_eq!(
            chunk[4],
            Entry::Execute {
                tick,
                counter: i64::try_from(tick.saturating_mul(4)).unwrap()
            }
        );
    }
}

#[test]
fn sequential_order_follows_registration() {
    let log = new_log();
    let mut sim = simulation(DriverConfig::default());
    for name in ["c", "a", "b"] {
        sim.add_participant(Box::new(Worker::new(name, Behaviour::Increment, &log)))
            .unwrap();
    }
    sim.run_tick().unwrap();
    sim.run_tick().unwrap();
    assert_eq!(steps_at(&log, 1), vec!["c", "a", "b"]);
    assert_eq!(steps_at(&log, 2), vec!["c", "a", "b"]);
}

#[test]
fn participant_added_between_ticks_joins_next_tick() {
    let log = new_log();
    let mut sim = simulation(DriverConfig::default());
    sim.add_participant(Box::new(Worker::new("early", Behaviour::Increment, &log)))
        .unwrap();
    sim.run_tick().unwrap();
    sim.add_participant(Box::new(Worker::new("late", Behaviour::Increment, &log)))
        .unwrap();
    sim.run_tick().unwrap();
    assert_eq!(steps_at(&log, 1), vec!["early"]);
    assert_eq!(steps_at(&log, 2), vec!["early", "late"]);
}

// =============================================================================
// Failure policies
// =============================================================================

#[test]
fn failing_participant_aborts_by_default() {
    let log = new_log();
    let mut sim = simulation(DriverConfig::default());
    let failing = Worker::new("flaky", Behaviour::FailAt(2), &log);
    let failing_id = failing.id;
    sim.add_participant(Box::new(failing)).unwrap();
    sim.add_participant(Box::new(Worker::new("steady", Behaviour::Increment, &log)))
        .unwrap();
    let (observer, completed) = Observer::new(&log);
    sim.add_plugin(Box::new(observer)).unwrap();

    sim.run_tick().unwrap();
    let err = sim.run_tick().unwrap_err();
    match err {
        TickError::ComponentFailed {
            tick,
            component: ComponentRef::Participant { id, name },
            ..
        } => {
            assert_eq!(tick, 2);
            assert_eq!(id, failing_id);
            assert_eq!(name, "flaky");
        }
        other => panic!("unexpected error: {other}"),
    }

    // The barrier held: the other participant still stepped, no plugin ran.
    assert_eq!(steps_at(&log, 2), vec!["flaky", "steady"]);
    assert!(!log
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, Entry::Execute { tick: 2, .. })));

    assert_eq!(sim.status(), &DriverStatus::Aborted { tick: 2 });
    assert!(matches!(sim.run_tick(), Err(TickError::NotRunnable { .. })));
    assert!(matches!(sim.finish(), Err(TickError::NotRunnable { .. })));
    assert_eq!(completed.load(Ordering::SeqCst), 0);
}

#[test]
fn continue_policy_excludes_failed_participant() {
    let log = new_log();
    let mut sim = simulation(driver(ExecutionMode::Sequential, FailurePolicy::Continue));
    sim.add_participant(Box::new(Worker::new("flaky", Behaviour::FailAt(1), &log)))
        .unwrap();
    sim.add_participant(Box::new(Worker::new("steady", Behaviour::Increment, &log)))
        .unwrap();

    let first = sim.run_tick().unwrap();
    assert_eq!(first.participants_stepped, 2);
    assert_eq!(first.failures.len(), 1);
    assert_eq!(first.failures[0].reason, "gave up");

    let second = sim.run_tick().unwrap();
    assert_eq!(second.participants_stepped, 1);
    assert!(second.failures.is_empty());
    assert_eq!(steps_at(&log, 2), vec!["steady"]);
    assert_eq!(sim.active_participants().len(), 1);
}

#[test]
fn panicking_participant_is_caught_in_concurrent_mode() {
    let log = new_log();
    let mut sim = simulation(driver(ExecutionMode::Concurrent, FailurePolicy::Abort));
    sim.add_participant(Box::new(Worker::new("fragile", Behaviour::PanicAt(1), &log)))
        .unwrap();
    sim.add_participant(Box::new(Worker::new("steady", Behaviour::Increment, &log)))
        .unwrap();

    let err = sim.run_tick().unwrap_err();
    let TickError::ComponentFailed { source, .. } = err else {
        panic!("expected a component failure");
    };
    assert!(matches!(*source, ComponentError::Panicked { ref message } if message == "worker fell over"));
}

#[test]
fn failing_plugin_under_continue_is_not_completed() {
    let log = new_log();
    let mut sim = simulation(driver(ExecutionMode::Sequential, FailurePolicy::Continue));
    sim.add_participant(Box::new(Worker::new("a", Behaviour::Increment, &log)))
        .unwrap();
    let (mut observer, completed) = Observer::new(&log);
    observer.fail_at = Some(1);
    sim.add_plugin(Box::new(observer)).unwrap();

    let summary = sim.run_tick().unwrap();
    assert!(matches!(summary.failures[0].component, ComponentRef::Plugin { .. }));
    assert_eq!(sim.run_tick().unwrap().plugins_executed, 0);
    assert!(sim.active_plugins().is_empty());

    sim.finish().unwrap();
    assert_eq!(completed.load(Ordering::SeqCst), 0);
}

#[test]
fn handler_failure_continues_by_default() {
    let log = new_log();
    let mut sim = simulation(DriverConfig::default());
    sim.add_participant(Box::new(Worker::new("bomber", Behaviour::ExplodeAt(1), &log)))
        .unwrap();

    let summary = sim.run_tick().unwrap();
    assert_eq!(summary.actions.failed, 1);
    assert_eq!(summary.actions.failures[0].handler, "counter");
    assert_eq!(summary.actions.failures[0].reason, "kaboom");

    let summary = sim.run_tick().unwrap();
    assert_eq!(summary.actions.failed, 0);
    assert_eq!(summary.actions.applied, 1);
}

#[test]
fn handler_failure_aborts_when_configured() {
    let log = new_log();
    let mut sim = simulation(DriverConfig {
        action_failure: FailurePolicy::Abort,
        ..DriverConfig::default()
    });
    sim.add_participant(Box::new(Worker::new("bomber", Behaviour::ExplodeAt(2), &log)))
        .unwrap();

    sim.run_tick().unwrap();
    let err = sim.run_tick().unwrap_err();
    match err {
        TickError::ActionFailed { tick, failure } => {
            assert_eq!(tick, 2);
            assert_eq!(failure.tag, ActionTag::from("explode"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sim.status(), &DriverStatus::Aborted { tick: 2 });
}

// =============================================================================
// Membership
// =============================================================================

#[test]
fn deregistered_participant_stops_receiving_ticks() {
    let log = new_log();
    let mut sim = simulation(DriverConfig::default());
    let leaver = Worker::new("leaver", Behaviour::LeaveAt(2), &log);
    let leaver_id = leaver.id;
    let kept = Arc::clone(&leaver.kept);
    sim.add_participant(Box::new(leaver)).unwrap();
    sim.add_participant(Box::new(Worker::new("stayer", Behaviour::Increment, &log)))
        .unwrap();

    sim.run_tick().unwrap();
    let summary = sim.run_tick().unwrap();
    assert_eq!(summary.participants_stepped, 2);
    assert_eq!(summary.participants_registered, 1);

    let summary = sim.run_tick().unwrap();
    assert_eq!(summary.participants_stepped, 1);
    assert_eq!(steps_at(&log, 3), vec!["stayer"]);
    assert!(!sim.active_participants().contains(&leaver_id));

    let members = sim
        .connector()
        .get_environment_service::<MembersService>()
        .unwrap();
    assert!(!members.contains(leaver_id));

    let handle = kept.lock().unwrap().clone().unwrap();
    assert!(matches!(
        handle.act(&Action::bare("increment")),
        Err(EnvironmentError::InvalidAuthorization { .. })
    ));
}

#[test]
fn rejoining_with_the_same_id_drives_only_the_new_instance() {
    let log = new_log();
    let mut sim = simulation(DriverConfig::default());
    let leaver = Worker::new("leaver", Behaviour::LeaveAt(1), &log);
    let id = leaver.id;
    sim.add_participant(Box::new(leaver)).unwrap();
    sim.run_tick().unwrap();
    assert!(!sim.connector().is_registered(id));

    let mut rejoined = Worker::new("rejoined", Behaviour::Increment, &log);
    rejoined.id = id;
    sim.add_participant(Box::new(rejoined)).unwrap();
    assert_eq!(sim.active_participants(), vec![id]);

    let summary = sim.run_tick().unwrap();
    assert_eq!(summary.participants_stepped, 1);
    assert_eq!(steps_at(&log, 2), vec!["rejoined"]);
    assert_eq!(summary.actions.applied, 1);
    assert_eq!(summary.actions.refused, 0);

    sim.run_tick().unwrap();
    assert_eq!(steps_at(&log, 3), vec!["rejoined"]);
    assert_eq!(sim.status(), &DriverStatus::Running { tick: 3 });
}

#[test]
fn id_taken_over_outside_the_driver_is_not_stepped() {
    let log = new_log();
    let mut sim = simulation(DriverConfig::default());
    let leaver = Worker::new("leaver", Behaviour::LeaveAt(1), &log);
    let id = leaver.id;
    sim.add_participant(Box::new(leaver)).unwrap();
    sim.run_tick().unwrap();

    sim.connector()
        .register(EnvironmentRegistrationRequest::new(id, "outsider"))
        .unwrap();
    assert!(sim.active_participants().is_empty());

    let summary = sim.run_tick().unwrap();
    assert_eq!(summary.participants_stepped, 0);
    assert_eq!(summary.participants_registered, 1);
    assert!(steps_at(&log, 2).is_empty());
}

#[test]
fn concurrent_leaver_finishes_its_step_and_gets_no_more_ticks() {
    let log = new_log();
    let mut sim = simulation(driver(ExecutionMode::Concurrent, FailurePolicy::Abort));
    let leaver =
        Worker::new("leaver", Behaviour::LeaveAt(2), &log).with_delay(Duration::from_millis(20));
    let leaver_id = leaver.id;
    sim.add_participant(Box::new(leaver)).unwrap();
    sim.add_participant(Box::new(
        Worker::new("stayer", Behaviour::Increment, &log).with_delay(Duration::from_millis(5)),
    ))
    .unwrap();
    let (observer, _) = Observer::new(&log);
    sim.add_plugin(Box::new(observer)).unwrap();

    sim.run_tick().unwrap();
    let summary = sim.run_tick().unwrap();
    assert_eq!(summary.participants_stepped, 2);
    assert!(summary.failures.is_empty());

    // Both tick-2 steps returned before the plugin ran.
    let entries = log.lock().unwrap().clone();
    let execute_at_2 = entries
        .iter()
        .position(|e| matches!(e, Entry::Execute { tick: 2, .. }))
        .unwrap();
    let steps_before = entries[..execute_at_2]
        .iter()
        .filter(|e| matches!(e, Entry::Step { tick: 2, .. }))
        .count();
    assert_eq!(steps_before, 2);

    for tick in 3..=4 {
        let summary = sim.run_tick().unwrap();
        assert_eq!(summary.participants_stepped, 1);
        assert_eq!(steps_at(&log, tick), vec!["stayer"]);
    }
    assert!(!sim.active_participants().contains(&leaver_id));
}

#[test]
fn acting_after_completion_is_refused() {
    let log = new_log();
    let mut sim = simulation(DriverConfig::default());
    let worker = Worker::new("late", Behaviour::Increment, &log);
    let kept = Arc::clone(&worker.kept);
    sim.add_participant(Box::new(worker)).unwrap();
    sim.run_tick().unwrap();
    sim.finish().unwrap();

    let handle = kept.lock().unwrap().clone().unwrap();
    assert!(matches!(
        handle.act(&Action::bare("increment")),
        Err(EnvironmentError::TickClosed { tick: 1 })
    ));
}

#[test]
fn spawn_participants_from_a_closure() {
    let log = new_log();
    let mut sim = simulation(DriverConfig::default());
    let mut factory = |id: ParticipantId, name: &str| -> Box<dyn Participant> {
        let mut worker = Worker::new(name, Behaviour::Increment, &log);
        worker.id = id;
        Box::new(worker)
    };
    let ids = sim
        .spawn_participants(&mut factory, ["w-0", "w-1", "w-2"])
        .unwrap();
    assert_eq!(ids.len(), 3);
    assert_eq!(sim.active_participants(), ids);

    let members = sim
        .connector()
        .get_environment_service::<MembersService>()
        .unwrap();
    let names: Vec<String> = members.members().into_iter().map(|m| m.name).collect();
    assert_eq!(names, vec!["w-0", "w-1", "w-2"]);

    let summary = sim.run_tick().unwrap();
    assert_eq!(summary.actions.applied, 3);
}

// =============================================================================
// Run loop
// =============================================================================

#[tokio::test]
async fn bounded_run_completes_plugins_once() {
    let log = new_log();
    let mut sim = simulation(DriverConfig::default());
    sim.add_participant(Box::new(Worker::new("a", Behaviour::Increment, &log)))
        .unwrap();
    let (observer, completed) = Observer::new(&log);
    sim.add_plugin(Box::new(observer)).unwrap();

    let bounds = SimulationBoundsConfig {
        max_ticks: 4,
        max_real_time_seconds: 0,
    };
    let operator = Arc::new(OperatorState::new(0, &bounds));
    let result = run_simulation(&mut sim, &operator, &mut NoOpCallback)
        .await
        .unwrap();

    assert_eq!(result.end_reason, SimulationEndReason::MaxTicksReached);
    assert_eq!(result.total_ticks, 4);
    assert_eq!(completed.load(Ordering::SeqCst), 1);

    let summary = result.final_summary.unwrap();
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["tick"], 4);
    assert_eq!(json["time"], 4);
    assert_eq!(json["actions"]["applied"], 1);
}

#[tokio::test]
async fn aborted_run_surfaces_the_tick_error() {
    let log = new_log();
    let mut sim = simulation(DriverConfig::default());
    sim.add_participant(Box::new(Worker::new("flaky", Behaviour::FailAt(3), &log)))
        .unwrap();
    let (observer, completed) = Observer::new(&log);
    sim.add_plugin(Box::new(observer)).unwrap();

    let bounds = SimulationBoundsConfig {
        max_ticks: 10,
        max_real_time_seconds: 0,
    };
    let operator = Arc::new(OperatorState::new(0, &bounds));
    let err = run_simulation(&mut sim, &operator, &mut NoOpCallback)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("participant `flaky`"));
    assert_eq!(completed.load(Ordering::SeqCst), 0);
    assert!(operator.end_reason().await.is_none());
}
