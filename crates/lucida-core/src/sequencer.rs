//! Ordered stage runner for scripted interactions with remote systems.
//!
//! A [`Sequencer`] owns a fixed list of [`Stage`]s and a cursor into it. Each
//! [`tick`](Sequencer::tick) runs the stage under the cursor with a watchdog:
//!
//! ```text
//!   cursor == len ──────────────────────────────▶ Completed
//!   stage → Advance ── cursor += 1 ─────────────▶ Advanced
//!   stage → Halt(s) / Err ──────────────────────▶ Halted(s)   (sticky)
//!   watchdog expires ── cursor unchanged ───────▶ TimedOut    (same stage next tick)
//! ```
//!
//! Stages are therefore invoked at least once and must re-check remote state
//! before acting. The cursor never moves backwards.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::exit::ExitStatus;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// What a stage asks the sequencer to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Advance,
    /// Stop the whole sequence; the status becomes the exit code.
    /// `Halt(ExitStatus::Success)` is treated as [`StageOutcome::Advance`].
    Halt(ExitStatus),
}

/// One unit of a scripted interaction.
///
/// `ctx` is the mutable state shared by all stages (browser session,
/// credentials, values discovered by earlier stages). An `Err` is treated as
/// an unanticipated failure and halts with [`ExitStatus::AutomationError`].
#[async_trait]
pub trait Stage<C: Send>: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &mut C) -> anyhow::Result<StageOutcome>;
}

// ---------------------------------------------------------------------------
// Options / state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SequencerOptions {
    /// Delay between ticks.
    pub poll_interval: Duration,
    /// How long a single stage invocation may take before it is abandoned
    /// and re-invoked on the next tick.
    pub watchdog: Duration,
    /// Halt after this many consecutive watchdog expiries of one stage.
    /// `None` re-invokes forever.
    pub max_timeouts: Option<u32>,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            watchdog: Duration::from_secs(30),
            max_timeouts: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencerState {
    /// Index of the next stage to run.
    pub cursor: usize,
    /// A stage invocation is currently awaiting completion.
    pub in_flight: bool,
    /// Consecutive watchdog expiries of the stage under the cursor.
    pub timeouts: u32,
}

/// Result of a single [`Sequencer::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Advanced,
    TimedOut,
    Completed,
    Halted(ExitStatus),
}

/// Terminal result of [`Sequencer::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Halted { stage: String, status: ExitStatus },
}

impl Outcome {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Outcome::Completed => ExitStatus::Success,
            Outcome::Halted { status, .. } => *status,
        }
    }
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

pub struct Sequencer<C: Send> {
    stages: Vec<Box<dyn Stage<C>>>,
    options: SequencerOptions,
    state: SequencerState,
    halted: Option<(usize, ExitStatus)>,
}

impl<C: Send> Sequencer<C> {
    pub fn new(stages: Vec<Box<dyn Stage<C>>>, options: SequencerOptions) -> Self {
        Self {
            stages,
            options,
            state: SequencerState::default(),
            halted: None,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run the stage under the cursor once.
    pub async fn tick(&mut self, ctx: &mut C) -> Tick {
        if let Some((_, status)) = self.halted {
            return Tick::Halted(status);
        }
        let cursor = self.state.cursor;
        if cursor >= self.stages.len() {
            return Tick::Completed;
        }

        self.state.in_flight = true;
        let stage = &self.stages[cursor];
        let name = stage.name().to_string();
        tracing::debug!(stage = %name, cursor, "running stage");
        let result = timeout(self.options.watchdog, stage.run(ctx)).await;
        self.state.in_flight = false;

        match result {
            // Only failure statuses halt.
            Ok(Ok(StageOutcome::Advance | StageOutcome::Halt(ExitStatus::Success))) => {
                self.state.cursor += 1;
                self.state.timeouts = 0;
                tracing::info!(stage = %name, cursor = self.state.cursor, "stage complete");
                Tick::Advanced
            }
            Ok(Ok(StageOutcome::Halt(status))) => self.halt(cursor, &name, status),
            Ok(Err(e)) => {
                tracing::error!(stage = %name, "stage error: {e:#}");
                self.halt(cursor, &name, ExitStatus::AutomationError)
            }
            Err(_elapsed) => {
                self.state.timeouts += 1;
                tracing::warn!(
                    stage = %name,
                    timeouts = self.state.timeouts,
                    "stage timed out after {:?}; will re-invoke",
                    self.options.watchdog
                );
                match self.options.max_timeouts {
                    Some(max) if self.state.timeouts >= max => {
                        self.halt(cursor, &name, ExitStatus::AutomationError)
                    }
                    _ => Tick::TimedOut,
                }
            }
        }
    }

    /// Tick on a fixed interval until every stage has advanced or one halts.
    pub async fn run(&mut self, ctx: &mut C) -> Outcome {
        let mut ticker = interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.tick(ctx).await {
                Tick::Completed => return Outcome::Completed,
                Tick::Halted(status) => {
                    let stage = self
                        .halted
                        .and_then(|(idx, _)| self.stages.get(idx))
                        .map(|s| s.name().to_string())
                        .unwrap_or_default();
                    return Outcome::Halted { stage, status };
                }
                Tick::Advanced | Tick::TimedOut => {}
            }
        }
    }

    fn halt(&mut self, cursor: usize, name: &str, status: ExitStatus) -> Tick {
        tracing::error!(stage = %name, code = status.code(), "sequence halted: {status}");
        self.halted = Some((cursor, status));
        Tick::Halted(status)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Records its name into the context, optionally stalling for the first
    /// `stalls` invocations, then returns `outcome`.
    struct Scripted {
        name: &'static str,
        outcome: StageOutcome,
        stalls: u32,
        calls: Arc<AtomicU32>,
    }

    impl Scripted {
        fn boxed(name: &'static str, outcome: StageOutcome) -> Box<dyn Stage<Vec<String>>> {
            Box::new(Scripted {
                name,
                outcome,
                stalls: 0,
                calls: Arc::new(AtomicU32::new(0)),
            })
        }
    }

    #[async_trait]
    impl Stage<Vec<String>> for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self, ctx: &mut Vec<String>) -> anyhow::Result<StageOutcome> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            ctx.push(self.name.to_string());
            if n < self.stalls {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(self.outcome)
        }
    }

    struct Failing;

    #[async_trait]
    impl Stage<Vec<String>> for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn run(&self, _ctx: &mut Vec<String>) -> anyhow::Result<StageOutcome> {
            anyhow::bail!("selector vanished")
        }
    }

    fn advancing(names: &[&'static str]) -> Vec<Box<dyn Stage<Vec<String>>>> {
        names
            .iter()
            .map(|&n| Scripted::boxed(n, StageOutcome::Advance))
            .collect()
    }

    fn fast() -> SequencerOptions {
        SequencerOptions {
            poll_interval: Duration::from_millis(10),
            watchdog: Duration::from_secs(5),
            max_timeouts: None,
        }
    }

    #[tokio::test]
    async fn cursor_equals_successful_ticks() {
        let mut seq = Sequencer::new(advancing(&["a", "b", "c"]), fast());
        let mut log = Vec::new();
        for k in 1..=3 {
            assert_eq!(seq.tick(&mut log).await, Tick::Advanced);
            assert_eq!(seq.state().cursor, k);
            assert!(!seq.state().in_flight);
        }
        assert_eq!(seq.tick(&mut log).await, Tick::Completed);
        assert_eq!(log, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn run_completes_when_every_stage_advances_once() {
        let mut seq = Sequencer::new(advancing(&["a", "b", "c", "d"]), fast());
        let mut log = Vec::new();
        assert_eq!(seq.run(&mut log).await, Outcome::Completed);
        assert_eq!(log, vec!["a", "b", "c", "d"]);
        assert_eq!(seq.state().cursor, 4);
    }

    #[tokio::test]
    async fn empty_sequence_completes_immediately() {
        let mut seq: Sequencer<Vec<String>> = Sequencer::new(Vec::new(), fast());
        let mut log = Vec::new();
        assert!(seq.is_empty());
        assert_eq!(seq.run(&mut log).await.exit_status(), ExitStatus::Success);
    }

    #[tokio::test]
    async fn halt_stops_before_later_stages() {
        let stages = vec![
            Scripted::boxed("login", StageOutcome::Advance),
            Scripted::boxed("find-bot", StageOutcome::Halt(ExitStatus::NotFound)),
            Scripted::boxed("publish", StageOutcome::Advance),
        ];
        let mut seq = Sequencer::new(stages, fast());
        let mut log = Vec::new();
        let outcome = seq.run(&mut log).await;
        assert_eq!(
            outcome,
            Outcome::Halted {
                stage: "find-bot".into(),
                status: ExitStatus::NotFound
            }
        );
        assert_eq!(log, vec!["login", "find-bot"]);
        assert_eq!(seq.state().cursor, 1);
    }

    #[tokio::test]
    async fn halted_sequencer_stays_halted() {
        let stages = vec![
            Scripted::boxed("a", StageOutcome::Halt(ExitStatus::Forbidden)),
            Scripted::boxed("b", StageOutcome::Advance),
        ];
        let mut seq = Sequencer::new(stages, fast());
        let mut log = Vec::new();
        assert_eq!(
            seq.tick(&mut log).await,
            Tick::Halted(ExitStatus::Forbidden)
        );
        assert_eq!(
            seq.tick(&mut log).await,
            Tick::Halted(ExitStatus::Forbidden)
        );
        assert_eq!(log, vec!["a"]);
    }

    #[tokio::test]
    async fn success_halt_advances_instead_of_finishing_early() {
        let stages = vec![
            Scripted::boxed("a", StageOutcome::Halt(ExitStatus::Success)),
            Scripted::boxed("b", StageOutcome::Advance),
        ];
        let mut seq = Sequencer::new(stages, fast());
        let mut log = Vec::new();
        assert_eq!(seq.tick(&mut log).await, Tick::Advanced);
        assert_eq!(seq.state().cursor, 1);
        assert_eq!(seq.run(&mut log).await, Outcome::Completed);
        assert_eq!(log, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn stage_error_maps_to_automation_error() {
        let stages: Vec<Box<dyn Stage<Vec<String>>>> =
            vec![Scripted::boxed("a", StageOutcome::Advance), Box::new(Failing)];
        let mut seq = Sequencer::new(stages, fast());
        let mut log = Vec::new();
        let outcome = seq.run(&mut log).await;
        assert_eq!(outcome.exit_status(), ExitStatus::AutomationError);
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_reinvokes_same_stage() {
        let calls = Arc::new(AtomicU32::new(0));
        let stages: Vec<Box<dyn Stage<Vec<String>>>> = vec![
            Box::new(Scripted {
                name: "slow",
                outcome: StageOutcome::Advance,
                stalls: 2,
                calls: calls.clone(),
            }),
            Scripted::boxed("next", StageOutcome::Advance),
        ];
        let mut seq = Sequencer::new(stages, fast());
        let mut log = Vec::new();

        assert_eq!(seq.tick(&mut log).await, Tick::TimedOut);
        assert_eq!(seq.state().cursor, 0);
        assert_eq!(seq.state().timeouts, 1);
        assert!(!seq.state().in_flight);

        assert_eq!(seq.run(&mut log).await, Outcome::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(log, vec!["slow", "slow", "slow", "next"]);
    }

    #[tokio::test(start_paused = true)]
    async fn max_timeouts_halts_stuck_stage() {
        let stages: Vec<Box<dyn Stage<Vec<String>>>> = vec![Box::new(Scripted {
            name: "stuck",
            outcome: StageOutcome::Advance,
            stalls: u32::MAX,
            calls: Arc::new(AtomicU32::new(0)),
        })];
        let options = SequencerOptions {
            max_timeouts: Some(3),
            ..fast()
        };
        let mut seq = Sequencer::new(stages, options);
        let mut log = Vec::new();
        let outcome = seq.run(&mut log).await;
        assert_eq!(outcome.exit_status(), ExitStatus::AutomationError);
        assert_eq!(log.len(), 3);
    }
}
