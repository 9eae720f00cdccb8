//! Run configuration, loadable from TOML and overridable from the command line.
//!
//! Every stage has its own section; missing keys fall back to the defaults
//! below. A configuration file looks like:
//!
//! ```toml
//! max_threads = 4
//! seed = 7
//!
//! [walksat]
//! max_tries = 5
//! random_step = 0.3
//!
//! [mcsat]
//! samples = 500
//!
//! [learn]
//! sampler = "gibbs"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Grounding options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundingConfig {
    /// Predicates treated as closed world in addition to `*`-declared ones.
    pub closed_world: Vec<String>,
    /// Mark every unknown query atom active even if no clause mentions it.
    pub activate_all: bool,
    /// Run unit propagation over hard unit clauses after grounding.
    pub unit_propagate: bool,
    /// Round budget for unit propagation.
    pub unit_prop_max_rounds: usize,
    /// Wall-clock budget for unit propagation in seconds (0 = none).
    pub unit_prop_timeout_secs: f64,
    /// Wall-clock budget for grounding in seconds (0 = none).
    pub timeout_secs: f64,
    /// Maximum candidate bindings enumerated for a single rule.
    pub max_groundings: u64,
    /// Soft evidence with probability below this threshold is ignored.
    pub soft_threshold: f64,
}

impl GroundingConfig {
    /// Grounding deadline, if any.
    pub fn timeout(&self) -> Option<Duration> {
        seconds(self.timeout_secs)
    }

    pub fn unit_prop_timeout(&self) -> Option<Duration> {
        seconds(self.unit_prop_timeout_secs)
    }
}

/// A positive, finite number of seconds as a duration; anything else means no limit.
fn seconds(value: f64) -> Option<Duration> {
    (value > 0.0 && value.is_finite()).then(|| Duration::from_secs_f64(value))
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            closed_world: Vec::new(),
            activate_all: false,
            unit_propagate: false,
            unit_prop_max_rounds: 100,
            unit_prop_timeout_secs: 0.0,
            timeout_secs: 0.0,
            max_groundings: 50_000_000,
            soft_threshold: 0.0,
        }
    }
}

/// MaxWalkSAT options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkSatConfig {
    /// Flips per try; `None` scales with the component (100 × atoms).
    pub max_flips: Option<u64>,
    pub max_tries: u32,
    /// Probability of a random (non-greedy) flip.
    pub random_step: f64,
    /// Forbid flips that would break a satisfied hard clause.
    pub avoid_breaking_hard: bool,
    /// Probability of a simulated-annealing step during MAP search (0 disables).
    pub anneal_prob: f64,
    /// Inverse temperature of MAP annealing steps.
    pub anneal_coef: f64,
}

impl Default for WalkSatConfig {
    fn default() -> Self {
        Self {
            max_flips: None,
            max_tries: 3,
            random_step: 0.5,
            avoid_breaking_hard: false,
            anneal_prob: 0.0,
            anneal_coef: 10.0,
        }
    }
}

impl WalkSatConfig {
    /// Flip budget for a component with `atoms` atoms.
    pub fn flips_for(&self, atoms: usize) -> u64 {
        self.max_flips
            .unwrap_or_else(|| (atoms as u64).saturating_mul(100).max(100))
    }
}

/// MC-SAT options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McSatConfig {
    /// Number of samples per component.
    pub samples: usize,
    /// Retention parameter x: keep a good clause with probability `1 - exp(-|w| x)`.
    pub param: f64,
    /// Probability of a simulated-annealing step inside SampleSAT.
    pub sa_prob: f64,
    /// Inverse temperature of SampleSAT annealing steps.
    pub sa_coef: f64,
    /// Leading samples discarded before counting.
    pub burn_in: usize,
    /// Emit a snapshot every this many samples (0 = never).
    pub dump_interval: usize,
    /// Keep accumulating counts across dumps instead of resetting.
    pub cumulative: bool,
    /// Record snapshots at each dump interval.
    pub snapshot: bool,
    /// SampleSAT steps per sample, per atom of the component.
    pub steps_per_atom: usize,
    /// Keep every sample's assignment in the sample set.
    pub keep_samples: bool,
}

impl Default for McSatConfig {
    fn default() -> Self {
        Self {
            samples: 100,
            param: 1.0,
            sa_prob: 0.5,
            sa_coef: 10.0,
            burn_in: 0,
            dump_interval: 0,
            cumulative: false,
            snapshot: false,
            steps_per_atom: 10,
            keep_samples: false,
        }
    }
}

/// Sampling backend used to estimate expected counts during learning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerKind {
    McSat,
    Gibbs,
    /// Exact variable elimination, only on components of small induced width.
    Exact,
}

/// Weight learning options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnConfig {
    pub max_iterations: usize,
    pub step_size: f64,
    /// Step size multiplier applied after every epoch.
    pub decay: f64,
    /// Samples per component per epoch.
    pub meta_samples: usize,
    /// L2 pull towards zero.
    pub mu: f64,
    pub sampler: SamplerKind,
    /// Gibbs sweeps between recorded samples.
    pub gibbs_thinning: usize,
    /// Largest induced width accepted by the exact backend.
    pub max_exact_width: usize,
    /// Independent chains per component.
    pub inner_para: usize,
    /// Split large components into chunks while sampling.
    pub part_component: bool,
    pub max_chunk_atoms: usize,
    /// Learning stops once the step size decays below this.
    pub min_step: f64,
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            step_size: 0.01,
            decay: 0.9,
            meta_samples: 10,
            mu: 0.001,
            sampler: SamplerKind::McSat,
            gibbs_thinning: 10,
            max_exact_width: 12,
            inner_para: 1,
            part_component: false,
            max_chunk_atoms: 1_000,
            min_step: 1e-9,
        }
    }
}

/// Top-level configuration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads (0 = available parallelism).
    pub max_threads: usize,
    /// Global deadline for grounding and solving in seconds (0 = none).
    pub timeout_secs: f64,
    /// Solver seed (0 = pick one at random).
    pub seed: u64,
    /// Seed of the initial atom truth values (0 = pick one at random).
    pub source_seed: u64,
    /// Split the ground model into connected components.
    pub partition: bool,
    /// Marginals below this probability are not reported.
    pub min_prob: f64,
    pub grounding: GroundingConfig,
    pub walksat: WalkSatConfig,
    pub mcsat: McSatConfig,
    pub learn: LearnConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_threads: 0,
            timeout_secs: 0.0,
            seed: 0,
            source_seed: 0,
            partition: true,
            min_prob: 0.0,
            grounding: GroundingConfig::default(),
            walksat: WalkSatConfig::default(),
            mcsat: McSatConfig::default(),
            learn: LearnConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML (used by `--print-config`).
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            message: format!("cannot serialize configuration: {e}"),
        })
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> ConfigResult<()> {
        let probabilities = [
            ("walksat.random_step", self.walksat.random_step),
            ("walksat.anneal_prob", self.walksat.anneal_prob),
            ("mcsat.sa_prob", self.mcsat.sa_prob),
            ("min_prob", self.min_prob),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    message: format!("`{name}` must be within [0, 1], got {value}"),
                });
            }
        }
        if self.walksat.max_tries == 0 {
            return Err(invalid("`walksat.max_tries` must be at least 1"));
        }
        if self.mcsat.samples == 0 {
            return Err(invalid("`mcsat.samples` must be at least 1"));
        }
        if self.mcsat.param < 0.0 || !self.mcsat.param.is_finite() {
            return Err(invalid("`mcsat.param` must be a finite non-negative number"));
        }
        if self.learn.meta_samples == 0 {
            return Err(invalid("`learn.meta_samples` must be at least 1"));
        }
        if self.learn.inner_para == 0 {
            return Err(invalid("`learn.inner_para` must be at least 1"));
        }
        if !(self.learn.step_size > 0.0) || !(self.learn.decay > 0.0 && self.learn.decay <= 1.0) {
            return Err(invalid(
                "`learn.step_size` must be positive and `learn.decay` within (0, 1]",
            ));
        }
        let timeouts = [
            ("timeout_secs", self.timeout_secs),
            ("grounding.timeout_secs", self.grounding.timeout_secs),
            ("grounding.unit_prop_timeout_secs", self.grounding.unit_prop_timeout_secs),
        ];
        for (name, value) in timeouts {
            if !(value >= 0.0 && value < 1e9) {
                return Err(ConfigError::Invalid {
                    message: format!("`{name}` must be a non-negative number of seconds, got {value}"),
                });
            }
        }
        if self.learn.max_chunk_atoms == 0 {
            return Err(invalid("`learn.max_chunk_atoms` must be at least 1"));
        }
        Ok(())
    }

    /// Global deadline, if any. It covers grounding and solving.
    pub fn timeout(&self) -> Option<Duration> {
        seconds(self.timeout_secs)
    }

    /// Number of worker threads to use.
    pub fn threads(&self) -> usize {
        if self.max_threads > 0 {
            self.max_threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// The solver seed, drawing a random one when unset.
    pub fn resolved_seed(&self) -> u64 {
        resolve_seed(self.seed)
    }

    /// The source seed, drawing a random one when unset.
    pub fn resolved_source_seed(&self) -> u64 {
        resolve_seed(self.source_seed)
    }
}

fn resolve_seed(seed: u64) -> u64 {
    if seed != 0 {
        seed
    } else {
        let picked = rand::random::<u64>().max(1);
        tracing::info!(seed = picked, "no seed given, picked one at random");
        picked
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid {
        message: message.to_string(),
    }
}
