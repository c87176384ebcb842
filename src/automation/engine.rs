//! The two-stage click state machine.
//!
//! One `Engine` per process, driven by one `tick()` per poll interval from a
//! single thread. The engine never sleeps and never touches the OS: it reads
//! time from a `Clock` and acts through a `Workflow`, so tests drive ticks
//! synchronously with fakes.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::Config;

/// Time source for the state machine.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall clock used by the real binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// The stage operations the engine sequences. Detection or click failures are
/// downgraded inside the implementation and come back as `false`; the engine
/// just retries on a later tick.
pub trait Workflow {
    /// Look for the first-stage dialog button and click it. `true` = clicked.
    fn try_dialog_click(&mut self) -> bool;

    /// Look for the second-stage page button and click it. `true` = clicked.
    fn try_page_click(&mut self) -> bool;

    /// Click the pre-calibrated page fallback position without a detection.
    fn click_page_fallback(&mut self) -> bool;

    /// Post-click side effect: close the download tab.
    fn close_download_tab(&mut self);
}

/// Where the engine is inside the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationState {
    Idle,
    AwaitingDialogClick { clicked_at: Instant },
    /// Transient: the page click landed and post-click effects are running.
    AwaitingPageClick,
}

/// Policy knobs lifted out of `Config` once at startup.
#[derive(Debug, Clone)]
pub struct EnginePolicy {
    pub browser_load_wait: Duration,
    pub stage_timeout: Duration,
    pub cooldown: Duration,
    pub auto_close_tabs: bool,
    pub keep_first_tab_open: bool,
    pub forced_fallback_after_misses: Option<u32>,
}

impl EnginePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            browser_load_wait: Duration::from_millis(config.timing.browser_load_wait_ms),
            stage_timeout: Duration::from_millis(config.timing.stage_timeout_ms),
            cooldown: Duration::from_millis(config.timing.cooldown_ms),
            auto_close_tabs: config.tabs.auto_close,
            keep_first_tab_open: config.tabs.keep_first_tab_open,
            forced_fallback_after_misses: config.tabs.forced_fallback_after_misses,
        }
    }
}

pub struct Engine<C: Clock> {
    clock: C,
    policy: EnginePolicy,
    state: AutomationState,
    first_cycle_completed: bool,
    page_misses: u32,
    cooldown_until: Option<Instant>,
    completed_cycles: u64,
}

impl<C: Clock> Engine<C> {
    pub fn new(policy: EnginePolicy, clock: C) -> Self {
        Self {
            clock,
            policy,
            state: AutomationState::Idle,
            first_cycle_completed: false,
            page_misses: 0,
            cooldown_until: None,
            completed_cycles: 0,
        }
    }

    pub fn state(&self) -> AutomationState {
        self.state
    }

    pub fn completed_cycles(&self) -> u64 {
        self.completed_cycles
    }

    /// One poll iteration. Failures never escape: everything short of the
    /// stop signal is a logged miss and a retry on a later tick.
    pub fn tick<W: Workflow>(&mut self, workflow: &mut W) {
        let now = self.clock.now();

        match self.state {
            AutomationState::Idle => {
                if let Some(until) = self.cooldown_until {
                    if now < until {
                        debug!("cooling down before the next cycle");
                        return;
                    }
                    self.cooldown_until = None;
                }
                if workflow.try_dialog_click() {
                    info!("dialog button clicked, waiting for the download page");
                    self.page_misses = 0;
                    self.state = AutomationState::AwaitingDialogClick { clicked_at: now };
                }
            }

            AutomationState::AwaitingDialogClick { clicked_at } => {
                let elapsed = now.duration_since(clicked_at);

                // The destination needs load time; don't even look yet.
                if elapsed < self.policy.browser_load_wait {
                    debug!("waiting for the page to load ({:?} elapsed)", elapsed);
                    return;
                }

                if elapsed > self.policy.stage_timeout {
                    warn!(
                        "no download page after {:?}; abandoning this cycle",
                        elapsed
                    );
                    self.state = AutomationState::Idle;
                    self.page_misses = 0;
                    return;
                }

                if workflow.try_page_click() {
                    self.finish_cycle(workflow, now);
                    return;
                }

                self.page_misses += 1;
                debug!("download page not detected yet (miss {})", self.page_misses);

                if let Some(limit) = self.policy.forced_fallback_after_misses {
                    if self.page_misses >= limit {
                        warn!(
                            "{} misses; clicking calibrated fallback position",
                            self.page_misses
                        );
                        self.page_misses = 0;
                        if workflow.click_page_fallback() {
                            self.finish_cycle(workflow, now);
                        }
                    }
                }
            }

            // Only observable mid-`finish_cycle`; a tick never starts here.
            AutomationState::AwaitingPageClick => {
                self.state = AutomationState::Idle;
            }
        }
    }

    fn finish_cycle<W: Workflow>(&mut self, workflow: &mut W, now: Instant) {
        self.state = AutomationState::AwaitingPageClick;

        // The first cycle's tab is deliberately left open so the browser
        // window stays around; every later cycle closes its tab.
        let close = self.policy.auto_close_tabs
            && (self.first_cycle_completed || !self.policy.keep_first_tab_open);
        if close {
            workflow.close_download_tab();
        } else if self.policy.auto_close_tabs {
            info!("leaving the first download tab open");
        }

        self.first_cycle_completed = true;
        self.completed_cycles += 1;
        self.page_misses = 0;
        self.cooldown_until = Some(now + self.policy.cooldown);
        self.state = AutomationState::Idle;
        info!(
            "cycle {} complete; idle for {:?}",
            self.completed_cycles, self.policy.cooldown
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone)]
    struct FakeClock(Rc<Cell<Instant>>);

    impl FakeClock {
        fn new() -> Self {
            Self(Rc::new(Cell::new(Instant::now())))
        }

        fn advance(&self, d: Duration) {
            self.0.set(self.0.get() + d);
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.0.get()
        }
    }

    #[derive(Default)]
    struct FakeWorkflow {
        dialog_present: bool,
        page_present: bool,
        dialog_attempts: u32,
        page_attempts: u32,
        fallback_clicks: u32,
        tabs_closed: u32,
    }

    impl Workflow for FakeWorkflow {
        fn try_dialog_click(&mut self) -> bool {
            self.dialog_attempts += 1;
            self.dialog_present
        }

        fn try_page_click(&mut self) -> bool {
            self.page_attempts += 1;
            self.page_present
        }

        fn click_page_fallback(&mut self) -> bool {
            self.fallback_clicks += 1;
            true
        }

        fn close_download_tab(&mut self) {
            self.tabs_closed += 1;
        }
    }

    fn policy() -> EnginePolicy {
        EnginePolicy {
            browser_load_wait: Duration::from_secs(3),
            stage_timeout: Duration::from_secs(30),
            cooldown: Duration::from_secs(10),
            auto_close_tabs: true,
            keep_first_tab_open: true,
            forced_fallback_after_misses: None,
        }
    }

    fn engine(policy: EnginePolicy) -> (Engine<FakeClock>, FakeClock) {
        let clock = FakeClock::new();
        (Engine::new(policy, clock.clone()), clock)
    }

    /// Drive one full successful cycle and leave the cooldown behind.
    fn run_cycle(engine: &mut Engine<FakeClock>, clock: &FakeClock, workflow: &mut FakeWorkflow) {
        workflow.dialog_present = true;
        workflow.page_present = true;
        engine.tick(workflow);
        assert!(matches!(
            engine.state(),
            AutomationState::AwaitingDialogClick { .. }
        ));
        clock.advance(Duration::from_secs(4));
        engine.tick(workflow);
        assert_eq!(engine.state(), AutomationState::Idle);
        clock.advance(Duration::from_secs(11));
    }

    #[test]
    fn dialog_click_enters_awaiting_state() {
        let (mut engine, _clock) = engine(policy());
        let mut workflow = FakeWorkflow {
            dialog_present: true,
            ..Default::default()
        };
        engine.tick(&mut workflow);
        assert_eq!(workflow.dialog_attempts, 1);
        assert!(matches!(
            engine.state(),
            AutomationState::AwaitingDialogClick { .. }
        ));
    }

    #[test]
    fn failed_dialog_click_stays_idle() {
        let (mut engine, _clock) = engine(policy());
        let mut workflow = FakeWorkflow::default();
        engine.tick(&mut workflow);
        engine.tick(&mut workflow);
        assert_eq!(engine.state(), AutomationState::Idle);
        assert_eq!(workflow.dialog_attempts, 2);
    }

    #[test]
    fn page_detection_is_gated_until_load_wait_elapses() {
        let (mut engine, clock) = engine(policy());
        let mut workflow = FakeWorkflow {
            dialog_present: true,
            page_present: true,
            ..Default::default()
        };
        engine.tick(&mut workflow);

        // Under the 3 s load wait: no attempt may happen.
        clock.advance(Duration::from_secs(1));
        engine.tick(&mut workflow);
        clock.advance(Duration::from_secs(1));
        engine.tick(&mut workflow);
        assert_eq!(workflow.page_attempts, 0);

        clock.advance(Duration::from_millis(1500));
        engine.tick(&mut workflow);
        assert_eq!(workflow.page_attempts, 1);
    }

    #[test]
    fn stage_timeout_resets_and_allows_a_fresh_dialog() {
        let (mut engine, clock) = engine(policy());
        let mut workflow = FakeWorkflow {
            dialog_present: true,
            page_present: false,
            ..Default::default()
        };
        engine.tick(&mut workflow);

        clock.advance(Duration::from_secs(31));
        engine.tick(&mut workflow);
        assert_eq!(engine.state(), AutomationState::Idle);
        assert_eq!(workflow.page_attempts, 0);

        // Next tick polls for a fresh first-stage dialog again.
        let dialogs_before = workflow.dialog_attempts;
        engine.tick(&mut workflow);
        assert_eq!(workflow.dialog_attempts, dialogs_before + 1);
        assert!(matches!(
            engine.state(),
            AutomationState::AwaitingDialogClick { .. }
        ));
    }

    #[test]
    fn page_miss_keeps_state_and_retries_next_tick() {
        let (mut engine, clock) = engine(policy());
        let mut workflow = FakeWorkflow {
            dialog_present: true,
            page_present: false,
            ..Default::default()
        };
        engine.tick(&mut workflow);
        clock.advance(Duration::from_secs(4));
        engine.tick(&mut workflow);
        engine.tick(&mut workflow);
        assert_eq!(workflow.page_attempts, 2);
        assert!(matches!(
            engine.state(),
            AutomationState::AwaitingDialogClick { .. }
        ));
    }

    #[test]
    fn first_cycle_keeps_tab_subsequent_cycles_close_it() {
        let (mut engine, clock) = engine(policy());
        let mut workflow = FakeWorkflow::default();

        run_cycle(&mut engine, &clock, &mut workflow);
        assert_eq!(workflow.tabs_closed, 0);

        run_cycle(&mut engine, &clock, &mut workflow);
        assert_eq!(workflow.tabs_closed, 1);

        run_cycle(&mut engine, &clock, &mut workflow);
        assert_eq!(workflow.tabs_closed, 2);
        assert_eq!(engine.completed_cycles(), 3);
    }

    #[test]
    fn keep_first_tab_disabled_closes_from_the_start() {
        let mut p = policy();
        p.keep_first_tab_open = false;
        let (mut engine, clock) = engine(p);
        let mut workflow = FakeWorkflow::default();
        run_cycle(&mut engine, &clock, &mut workflow);
        assert_eq!(workflow.tabs_closed, 1);
    }

    #[test]
    fn auto_close_disabled_never_closes() {
        let mut p = policy();
        p.auto_close_tabs = false;
        let (mut engine, clock) = engine(p);
        let mut workflow = FakeWorkflow::default();
        run_cycle(&mut engine, &clock, &mut workflow);
        run_cycle(&mut engine, &clock, &mut workflow);
        assert_eq!(workflow.tabs_closed, 0);
    }

    #[test]
    fn cooldown_blocks_the_next_dialog_poll() {
        let (mut engine, clock) = engine(policy());
        let mut workflow = FakeWorkflow::default();

        workflow.dialog_present = true;
        workflow.page_present = true;
        engine.tick(&mut workflow);
        clock.advance(Duration::from_secs(4));
        engine.tick(&mut workflow);
        assert_eq!(engine.state(), AutomationState::Idle);

        let dialogs_before = workflow.dialog_attempts;
        clock.advance(Duration::from_secs(5));
        engine.tick(&mut workflow); // still inside the 10 s cooldown
        assert_eq!(workflow.dialog_attempts, dialogs_before);

        clock.advance(Duration::from_secs(6));
        engine.tick(&mut workflow);
        assert_eq!(workflow.dialog_attempts, dialogs_before + 1);
    }

    #[test]
    fn forced_fallback_fires_after_configured_misses() {
        let mut p = policy();
        p.forced_fallback_after_misses = Some(3);
        let (mut engine, clock) = engine(p);
        let mut workflow = FakeWorkflow {
            dialog_present: true,
            page_present: false,
            ..Default::default()
        };
        engine.tick(&mut workflow);
        clock.advance(Duration::from_secs(4));

        engine.tick(&mut workflow);
        engine.tick(&mut workflow);
        assert_eq!(workflow.fallback_clicks, 0);

        engine.tick(&mut workflow);
        assert_eq!(workflow.fallback_clicks, 1);
        // The forced click completes the cycle.
        assert_eq!(engine.state(), AutomationState::Idle);
        assert_eq!(engine.completed_cycles(), 1);
    }
}
