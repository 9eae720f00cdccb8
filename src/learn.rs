//! Discriminative weight learning by stochastic gradient ascent.
//!
//! The ground structure is fixed for the whole run. Every epoch re-weights it
//! from the [`RuleWeights`] table, estimates the expected number of satisfied
//! groundings of each rule with the configured sampler, and moves every soft
//! rule weight along `observed - expected`. Observed counts come from the
//! training truth: evidence on the query predicates, unasserted atoms false.

use std::collections::HashMap;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;

use crate::config::{EngineConfig, SamplerKind};
use crate::error::{LearnError, SolveError};
use crate::evidence::EvidenceSource;
use crate::ground::GroundModel;
use crate::infer::exact::ExactInference;
use crate::infer::gibbs::Gibbs;
use crate::infer::{component_seed, Deadline, McSat};
use crate::mln::Program;
use crate::mrf::Problem;
use crate::partition::{split_component, MrfComponent};
use crate::symbol::{AtomId, RuleId};

/// Result type for learning operations.
pub type LearnResult<T> = std::result::Result<T, LearnError>;

/// The mutable weight of every rule, indexed by rule id.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleWeights {
    weights: Vec<f64>,
    hard: Vec<bool>,
}

impl RuleWeights {
    /// Start from the weights written in the program. Hard rules carry 0.
    pub fn from_program(program: &Program) -> Self {
        Self {
            weights: program
                .rules
                .iter()
                .map(|r| r.weight.soft().unwrap_or(0.0))
                .collect(),
            hard: program.rules.iter().map(|r| r.weight.is_hard()).collect(),
        }
    }

    pub fn get(&self, rule: RuleId) -> f64 {
        self.weights[rule.index()]
    }

    pub fn is_hard(&self, rule: RuleId) -> bool {
        self.hard[rule.index()]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// One regularised gradient step. Nothing is written unless every new
    /// weight is finite.
    fn step(&mut self, gradient: &[f64], step: f64, mu: f64, epoch: usize) -> LearnResult<()> {
        let mut next = self.weights.clone();
        for (rule, w) in next.iter_mut().enumerate() {
            if self.hard[rule] {
                continue;
            }
            let g = gradient[rule];
            if !g.is_finite() {
                return Err(LearnError::NonFinite {
                    epoch,
                    rule,
                    what: "gradient",
                });
            }
            *w += step * (g - mu * *w);
            if !w.is_finite() {
                return Err(LearnError::NonFinite {
                    epoch,
                    rule,
                    what: "weight",
                });
            }
        }
        self.weights = next;
        Ok(())
    }
}

/// Progress of one epoch.
#[derive(Debug, Clone, Serialize)]
pub struct EpochStats {
    pub epoch: usize,
    pub step: f64,
    /// Euclidean norm of the soft-rule gradient.
    pub gradient_norm: f64,
    pub skipped: bool,
    /// Rule weights after the update.
    pub weights: Vec<f64>,
}

/// A learned rule, as written to the output program.
#[derive(Debug, Clone, Serialize)]
pub struct LearnedRule {
    pub rule: usize,
    pub text: String,
    /// `None` for hard rules.
    pub weight: Option<f64>,
}

/// Summary of a learning run.
#[derive(Debug, Clone, Serialize)]
pub struct LearnReport {
    pub epochs: usize,
    pub final_step: f64,
    /// Epochs whose update was skipped for numeric instability.
    pub skipped_epochs: Vec<usize>,
    pub history: Vec<EpochStats>,
    pub rules: Vec<LearnedRule>,
    /// False when the deadline stopped learning early.
    pub complete: bool,
    pub elapsed_ms: u64,
}

impl LearnReport {
    fn rules(program: &Program, weights: &RuleWeights) -> Vec<LearnedRule> {
        program
            .rules
            .iter()
            .map(|r| LearnedRule {
                rule: r.id.index(),
                text: r.text.clone(),
                weight: (!weights.is_hard(r.id)).then(|| weights.get(r.id)),
            })
            .collect()
    }
}

/// Weight learner over a fixed ground model.
pub struct Learner<'a> {
    program: &'a Program,
    model: &'a GroundModel,
    components: &'a [MrfComponent],
    config: &'a EngineConfig,
    /// Training value of every ground atom.
    truth: Vec<bool>,
    seed: u64,
}

impl<'a> Learner<'a> {
    /// Build a learner. `truth` holds the training evidence on the query
    /// predicates; atoms it does not mention are false.
    pub fn new(
        program: &'a Program,
        model: &'a GroundModel,
        components: &'a [MrfComponent],
        truth: &dyn EvidenceSource,
        config: &'a EngineConfig,
        seed: u64,
    ) -> LearnResult<Self> {
        if model.queries.is_empty() {
            return Err(LearnError::NoQueries);
        }
        let truth = model
            .atoms
            .iter()
            .map(|atom| {
                atom.truth
                    .value()
                    .or_else(|| truth.truth(atom.predicate, &atom.args))
                    .unwrap_or(false)
            })
            .collect();
        Ok(Self {
            program,
            model,
            components,
            config,
            truth,
            seed,
        })
    }

    /// Satisfied-grounding counts of every rule in the training world.
    pub fn observed_counts(&self) -> Vec<f64> {
        let mut counts = vec![0.0; self.program.rules.len()];
        for clause in &self.model.clauses {
            if clause.is_satisfied(|a| self.truth[a.index()]) {
                self.credit(clause.id.index(), 1.0, &mut counts);
            }
        }
        counts
    }

    /// Add `amount` satisfied groundings of a clause to its source rules.
    fn credit(&self, clause: usize, amount: f64, counts: &mut [f64]) {
        for rule in &self.model.clauses[clause].origins {
            counts[rule.index()] += amount * self.program.rule(*rule).clause_share();
        }
    }

    /// Run SGD from `weights` until the iteration budget, the step floor or
    /// the deadline is reached.
    pub fn run(&self, weights: &mut RuleWeights, pool: &ThreadPool, deadline: &Deadline) -> LearnReport {
        let started = Instant::now();
        let learn = &self.config.learn;
        let observed = self.observed_counts();
        let mut step = learn.step_size;
        let mut history = Vec::new();
        let mut skipped_epochs = Vec::new();
        let mut complete = true;

        tracing::info!(
            rules = weights.len(),
            components = self.components.len(),
            sampler = ?learn.sampler,
            "weight learning started"
        );

        let mut epoch = 0;
        while epoch < learn.max_iterations {
            if step < learn.min_step {
                tracing::info!(epoch, step, "step size below the floor, stopping");
                break;
            }
            if deadline.expired() {
                tracing::warn!(epoch, "learning stopped at the deadline");
                complete = false;
                break;
            }

            let expected = self.expected_counts(weights, epoch, pool, deadline);
            let gradient: Vec<f64> = observed
                .iter()
                .zip(&expected)
                .enumerate()
                .map(|(rule, (o, e))| if weights.hard[rule] { 0.0 } else { o - e })
                .collect();
            let gradient_norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();

            let skipped = match weights.step(&gradient, step, learn.mu, epoch) {
                Ok(()) => false,
                Err(err) => {
                    tracing::warn!(epoch, error = %err, "skipping weight update");
                    skipped_epochs.push(epoch);
                    true
                }
            };
            tracing::debug!(epoch, step, gradient_norm, "epoch finished");
            history.push(EpochStats {
                epoch,
                step,
                gradient_norm,
                skipped,
                weights: weights.as_slice().to_vec(),
            });
            step *= learn.decay;
            epoch += 1;
        }

        tracing::info!(epochs = epoch, skipped = skipped_epochs.len(), "weight learning finished");
        LearnReport {
            epochs: epoch,
            final_step: step,
            skipped_epochs,
            history,
            rules: LearnReport::rules(self.program, weights),
            complete,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Expected satisfied-grounding counts of every rule under `weights`.
    pub fn expected_counts(
        &self,
        weights: &RuleWeights,
        epoch: usize,
        pool: &ThreadPool,
        deadline: &Deadline,
    ) -> Vec<f64> {
        let clause_weights = self.model.reweight(self.program, weights.as_slice());
        let per_component: Vec<(Vec<f64>, Problem)> = pool.install(|| {
            self.components
                .par_iter()
                .map(|component| {
                    let problem = Problem::build(self.model, component, &clause_weights);
                    let freq = self.clause_frequencies(component, &problem, &clause_weights, epoch, deadline);
                    (freq, problem)
                })
                .collect()
        });

        let mut counts = vec![0.0; self.program.rules.len()];
        for (freq, problem) in &per_component {
            for (clause, p) in problem.clauses.iter().zip(freq) {
                self.credit(clause.source.index(), *p, &mut counts);
            }
        }
        counts
    }

    /// Probability of satisfaction of every clause of `problem`.
    fn clause_frequencies(
        &self,
        component: &MrfComponent,
        problem: &Problem,
        clause_weights: &[f64],
        epoch: usize,
        deadline: &Deadline,
    ) -> Vec<f64> {
        let learn = &self.config.learn;
        if learn.part_component && component.len() > learn.max_chunk_atoms {
            let mut rng = StdRng::seed_from_u64(self.chain_seed(epoch, component.id, 0));
            return self.chunked_frequencies(component, problem, clause_weights, &mut rng, deadline);
        }

        if learn.sampler == SamplerKind::Exact {
            match ExactInference::new(problem, learn.max_exact_width, component.id) {
                Ok(exact) => return exact.clause_satisfaction(),
                Err(SolveError::TooWide { width, .. }) => {
                    tracing::debug!(component = component.id, width, "component too wide, sampling instead");
                }
                Err(err) => {
                    tracing::warn!(component = component.id, error = %err, "exact inference failed, sampling instead");
                }
            }
        }

        let start: Vec<bool> = problem.atoms.iter().map(|a| self.truth[a.index()]).collect();
        let chains: Vec<Vec<f64>> = (0..learn.inner_para)
            .into_par_iter()
            .map(|chain| {
                let mut rng = StdRng::seed_from_u64(self.chain_seed(epoch, component.id, chain));
                let mut satisfied = vec![0u64; problem.clauses.len()];
                let mut visit = |values: &[bool]| {
                    for (count, clause) in satisfied.iter_mut().zip(&problem.clauses) {
                        if clause.is_satisfied(values) {
                            *count += 1;
                        }
                    }
                };
                let set = match learn.sampler {
                    SamplerKind::Gibbs => Gibbs::new(
                        learn.meta_samples,
                        learn.gibbs_thinning,
                        0,
                        self.config.walksat.clone(),
                    )
                    .run_with(problem, Some(&start), learn.meta_samples, &mut rng, deadline, &mut visit),
                    SamplerKind::McSat | SamplerKind::Exact => {
                        McSat::new(self.config.mcsat.clone(), self.config.walksat.clone())
                            .run_with(problem, Some(&start), learn.meta_samples, &mut rng, deadline, &mut visit)
                    }
                };
                let samples = set.samples.max(1) as f64;
                satisfied.iter().map(|&c| c as f64 / samples).collect()
            })
            .collect();

        let mut mean = vec![0.0; problem.clauses.len()];
        for freq in &chains {
            for (m, f) in mean.iter_mut().zip(freq) {
                *m += f / chains.len() as f64;
            }
        }
        mean
    }

    /// Gauss-Seidel sampling over chunks of a large component: each chunk takes
    /// one MC-SAT step with every atom outside it held at its current value.
    /// Counts are taken over the combined assignment after every sweep.
    fn chunked_frequencies(
        &self,
        component: &MrfComponent,
        problem: &Problem,
        clause_weights: &[f64],
        rng: &mut StdRng,
        deadline: &Deadline,
    ) -> Vec<f64> {
        let learn = &self.config.learn;
        let chunks = split_component(self.model, component, learn.max_chunk_atoms);
        let local: HashMap<AtomId, usize> = problem
            .atoms
            .iter()
            .enumerate()
            .map(|(i, a)| (*a, i))
            .collect();
        let mcsat = McSat::new(self.config.mcsat.clone(), self.config.walksat.clone());

        let mut values: Vec<bool> = problem.atoms.iter().map(|a| self.truth[a.index()]).collect();
        let mut satisfied = vec![0u64; problem.clauses.len()];
        let mut sweeps = 0u64;
        for _ in 0..learn.meta_samples {
            if deadline.expired() {
                break;
            }
            for chunk in &chunks {
                let sub = Problem::conditioned(self.model, &chunk.atoms, &chunk.touching, clause_weights, &|a: AtomId| {
                    local.get(&a).is_some_and(|&i| values[i])
                });
                let mut sub_values: Vec<bool> = chunk
                    .atoms
                    .iter()
                    .map(|a| local.get(a).is_some_and(|&i| values[i]))
                    .collect();
                mcsat.transition(&sub, &mut sub_values, rng);
                for (atom, v) in chunk.atoms.iter().zip(sub_values) {
                    if let Some(&i) = local.get(atom) {
                        values[i] = v;
                    }
                }
            }
            for (count, clause) in satisfied.iter_mut().zip(&problem.clauses) {
                if clause.is_satisfied(&values) {
                    *count += 1;
                }
            }
            sweeps += 1;
        }
        tracing::debug!(component = component.id, chunks = chunks.len(), sweeps, "chunked sampling finished");
        let sweeps = sweeps.max(1) as f64;
        satisfied.iter().map(|&c| c as f64 / sweeps).collect()
    }

    fn chain_seed(&self, epoch: usize, component: usize, chain: usize) -> u64 {
        component_seed(component_seed(self.seed, epoch), component.wrapping_mul(1 << 16) + chain)
    }
}
