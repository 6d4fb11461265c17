/// Trigger decision engine
///
/// Turns a stream of per-frame loudness values into fire decisions. Two
/// policies share one cooldown timer:
///
/// - `Single`: fire on the first frame louder than the threshold.
/// - `Term`: group frames into fixed windows and fire once enough
///   consecutive windows peaked above the threshold. Single transient
///   spikes (a door slam, a clap) cannot satisfy it; a sustained cue can.
///
/// The engine does no I/O. The caller feeds one value per sampling
/// iteration and acts on the returned [`Step`].

use crate::loudness::Loudness;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("Invalid trigger configuration: {0}")]
    InvalidConfig(String),
}

/// Trigger configuration, fixed for the lifetime of an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Loudness a frame (or window peak) must strictly exceed
    pub threshold: f64,

    /// Sampling iterations to wait after a fire, also the start-up delay
    pub cooldown: u32,

    /// Frames per window for the `Term` policy
    pub window_size: usize,

    /// Consecutive loud windows required by the `Term` policy
    pub streak_required: usize,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            threshold: 300.0,
            cooldown: 10_000, // ~4 minutes at 44.1kHz / 1024
            window_size: 100,
            streak_required: 2,
        }
    }
}

impl TriggerConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), TriggerError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(TriggerError::InvalidConfig(
                "threshold must be a finite, non-negative number".to_string(),
            ));
        }

        if self.window_size == 0 {
            return Err(TriggerError::InvalidConfig(
                "window_size must be greater than 0".to_string(),
            ));
        }

        if self.streak_required == 0 {
            return Err(TriggerError::InvalidConfig(
                "streak_required must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Detection policy, chosen once at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TriggerPolicy {
    /// Fire on any frame above the threshold
    Single,

    /// Fire after a run of loud windows
    Term,
}

impl std::fmt::Display for TriggerPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerPolicy::Single => write!(f, "single"),
            TriggerPolicy::Term => write!(f, "term"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireDecision {
    NoOp,
    Fire,
}

/// Outcome of feeding one loudness value to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub decision: FireDecision,

    /// Set on the single iteration where the cooldown reaches zero
    pub ready: bool,
}

impl Step {
    pub fn is_fire(&self) -> bool {
        self.decision == FireDecision::Fire
    }
}

/// Countdown of sampling iterations. Never negative; zero means ready.
#[derive(Debug, Clone)]
struct Cooldown {
    remaining: u32,
    length: u32,
}

impl Cooldown {
    fn new(length: u32) -> Self {
        Self {
            remaining: length,
            length,
        }
    }

    /// Count down one iteration. Returns true on the tick that reaches zero.
    fn tick(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.remaining == 0
    }

    fn is_ready(&self) -> bool {
        self.remaining == 0
    }

    fn restart(&mut self) {
        self.remaining = self.length;
    }
}

#[derive(Debug, Clone)]
enum PolicyState {
    Single,
    Term {
        run: Vec<Loudness>,
        streak: usize,
    },
}

/// Stateful trigger engine
pub struct TriggerEngine {
    config: TriggerConfig,
    policy: TriggerPolicy,
    cooldown: Cooldown,
    state: PolicyState,
}

impl TriggerEngine {
    /// Create an engine; the cooldown starts fully wound.
    pub fn new(config: TriggerConfig, policy: TriggerPolicy) -> Result<Self, TriggerError> {
        config.validate()?;

        debug!("Initializing {} trigger with config: {:?}", policy, config);

        let state = match policy {
            TriggerPolicy::Single => PolicyState::Single,
            TriggerPolicy::Term => PolicyState::Term {
                run: Vec::with_capacity(config.window_size),
                streak: 0,
            },
        };

        Ok(Self {
            cooldown: Cooldown::new(config.cooldown),
            config,
            policy,
            state,
        })
    }

    /// Feed one loudness value.
    pub fn step(&mut self, loudness: Loudness) -> Step {
        let ready = self.cooldown.tick();
        if ready {
            debug!("Cooldown expired");
        }

        let threshold = self.config.threshold;

        let fire = match &mut self.state {
            PolicyState::Single => loudness > threshold && self.cooldown.is_ready(),

            PolicyState::Term { run, streak } => {
                run.push(loudness);

                if run.len() < self.config.window_size {
                    false
                } else {
                    let peak = run.iter().copied().fold(0.0, f64::max);

                    if peak > threshold {
                        *streak += 1;
                    } else {
                        *streak = 0;
                    }
                    run.clear();

                    trace!("Window complete: peak={:.1}, streak={}", peak, streak);

                    if *streak >= self.config.streak_required && self.cooldown.is_ready() {
                        *streak = 0;
                        true
                    } else {
                        false
                    }
                }
            }
        };

        if fire {
            self.cooldown.restart();
        }

        Step {
            decision: if fire {
                FireDecision::Fire
            } else {
                FireDecision::NoOp
            },
            ready,
        }
    }

    pub fn policy(&self) -> TriggerPolicy {
        self.policy
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// Iterations left before firing is allowed again
    pub fn cooldown_remaining(&self) -> u32 {
        self.cooldown.remaining
    }

    /// Consecutive loud windows so far (always 0 for `Single`)
    pub fn streak(&self) -> usize {
        match &self.state {
            PolicyState::Single => 0,
            PolicyState::Term { streak, .. } => *streak,
        }
    }

    /// Frames collected in the current, incomplete window
    pub fn pending_window_len(&self) -> usize {
        match &self.state {
            PolicyState::Single => 0,
            PolicyState::Term { run, .. } => run.len(),
        }
    }
}
