//! Engine facade: top-level API for mln-forge.
//!
//! The `Engine` owns the parsed program, the evidence, the queries and the
//! worker pool, and runs the pipeline: grounding, partitioning,
//! per-component solving and aggregation.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::aggregate::{Aggregator, ComponentResult, InferenceReport, Mode};
use crate::config::EngineConfig;
use crate::error::{MlnResult, SolveError};
use crate::evidence::{EvidenceDb, EvidenceSource};
use crate::ground::{GroundModel, Grounder};
use crate::infer::{component_seed, ComponentSolver, Deadline, McSat, WalkSat};
use crate::learn::{LearnReport, Learner, RuleWeights};
use crate::mln::parser::{load_program, parse_evidence, parse_queries, read_source};
use crate::mln::{Program, QuerySpec};
use crate::mrf::Problem;
use crate::partition::{partition, MrfComponent, Partitioning};

/// Input files of a run.
#[derive(Debug, Clone, Default)]
pub struct InputFiles {
    pub programs: Vec<PathBuf>,
    pub evidence: Vec<PathBuf>,
    /// Query atoms given inline, e.g. `smokes, cancer(Anna)`.
    pub queries: Option<String>,
    pub query_files: Vec<PathBuf>,
    /// Name of the relational schema the evidence stands for.
    pub schema: Option<String>,
}

/// Result of weight learning.
#[derive(Debug)]
pub struct LearnOutcome {
    pub report: LearnReport,
    pub weights: RuleWeights,
}

/// The mln-forge inference engine.
pub struct Engine {
    config: EngineConfig,
    program: Program,
    evidence: EvidenceDb,
    queries: Vec<QuerySpec>,
    pool: ThreadPool,
    seed: u64,
    source_seed: u64,
}

impl Engine {
    /// Create an engine over an already parsed program and evidence.
    pub fn new(
        config: EngineConfig,
        program: Program,
        evidence: EvidenceDb,
        queries: Vec<QuerySpec>,
    ) -> MlnResult<Self> {
        config.validate()?;

        let threads = config.threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("mln-worker-{i}"))
            .build()
            .map_err(|e| SolveError::Pool {
                message: e.to_string(),
            })?;

        let seed = config.resolved_seed();
        let source_seed = config.resolved_source_seed();
        tracing::info!(
            threads,
            seed,
            source_seed,
            rules = program.rules.len(),
            evidence = evidence.len(),
            queries = queries.len(),
            schema = evidence.schema().unwrap_or("-"),
            "initializing mln-forge engine"
        );

        Ok(Self {
            config,
            program,
            evidence,
            queries,
            pool,
            seed,
            source_seed,
        })
    }

    /// Load program, evidence and query files and create an engine.
    pub fn from_files(config: EngineConfig, inputs: &InputFiles) -> MlnResult<Self> {
        let program = load_program(&inputs.programs)?;

        let mut evidence = EvidenceDb::new();
        for path in &inputs.evidence {
            let text = read_source(path)?;
            for fact in parse_evidence(&program, &path.display().to_string(), &text)? {
                evidence.insert(fact);
            }
        }
        if let Some(schema) = &inputs.schema {
            evidence = evidence.with_schema(schema.clone());
        }
        if evidence.conflicts() > 0 {
            tracing::warn!(conflicts = evidence.conflicts(), "evidence contained contradicting assertions");
        }

        let mut queries = Vec::new();
        if let Some(inline) = &inputs.queries {
            queries.extend(parse_queries(&program, "<command line>", inline)?);
        }
        for path in &inputs.query_files {
            let text = read_source(path)?;
            queries.extend(parse_queries(&program, &path.display().to_string(), &text)?);
        }

        Self::new(config, program, evidence, queries)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn queries(&self) -> &[QuerySpec] {
        &self.queries
    }

    /// The solver seed in effect.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn source_seed(&self) -> u64 {
        self.source_seed
    }

    /// Ground the program against the engine's evidence.
    pub fn ground(&self) -> MlnResult<GroundModel> {
        self.ground_with(&self.evidence)
    }

    fn ground_with(&self, evidence: &EvidenceDb) -> MlnResult<GroundModel> {
        let model = Grounder::new(&self.program, evidence, &self.config.grounding)
            .ground(&self.queries, self.source_seed)?;
        Ok(model)
    }

    /// Most probable state of the query atoms.
    pub fn map(&self) -> MlnResult<InferenceReport> {
        self.infer(Mode::Map)
    }

    /// Marginal probabilities of the query atoms.
    pub fn marginal(&self) -> MlnResult<InferenceReport> {
        self.infer(Mode::Marginal)
    }

    /// MAP state and marginals from a single grounding.
    pub fn dual(&self) -> MlnResult<InferenceReport> {
        self.infer(Mode::Dual)
    }

    /// Ground, partition and solve every component in `mode`.
    pub fn infer(&self, mode: Mode) -> MlnResult<InferenceReport> {
        let deadline = self.deadline();
        let model = self.ground()?;
        Ok(self.solve(&model, mode, &deadline))
    }

    /// The run's global deadline, counted from now. Take it before grounding.
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.config.timeout())
    }

    /// Partition an already grounded model and solve every component before `deadline`.
    pub fn solve(&self, model: &GroundModel, mode: Mode, deadline: &Deadline) -> InferenceReport {
        let started = Instant::now();
        let components = partition(model, Partitioning::from_flag(self.config.partition));
        tracing::info!(?mode, components = components.len(), "solving components");

        let weights: Vec<f64> = model.clauses.iter().map(|c| c.weight).collect();
        let walksat = WalkSat::new(self.config.walksat.clone());
        let mcsat = McSat::new(self.config.mcsat.clone(), self.config.walksat.clone());

        let results: Vec<ComponentResult> = self.pool.install(|| {
            components
                .into_par_iter()
                .map(|component| self.solve_component(model, component, &weights, mode, &walksat, &mcsat, deadline))
                .collect()
        });

        let mut aggregator = Aggregator::new(&self.program, model, mode, self.config.min_prob);
        for result in results {
            aggregator.add(result);
        }
        let report = aggregator.finish(self.seed, self.source_seed, started.elapsed().as_millis() as u64);
        tracing::info!(
            complete = report.complete,
            failed = report.failed_components().count(),
            map = report.map.len(),
            marginals = report.marginals.len(),
            elapsed_ms = report.elapsed_ms,
            "inference finished"
        );
        report
    }

    #[allow(clippy::too_many_arguments)]
    fn solve_component(
        &self,
        model: &GroundModel,
        component: MrfComponent,
        weights: &[f64],
        mode: Mode,
        walksat: &WalkSat,
        mcsat: &McSat,
        deadline: &Deadline,
    ) -> ComponentResult {
        let started = Instant::now();
        let problem = Problem::build(model, &component, weights);
        let mut rng = StdRng::seed_from_u64(component_seed(self.seed, component.id));
        let mut solvers = Vec::new();

        let map = mode.wants_map().then(|| {
            solvers.push(walksat.name());
            walksat.solve(&problem, &mut rng, deadline)
        });
        let samples = mode.wants_marginals().then(|| {
            solvers.push(mcsat.name());
            mcsat.solve(&problem, &mut rng, deadline)
        });

        tracing::debug!(
            component = component.id,
            atoms = component.atoms.len(),
            clauses = problem.clauses.len(),
            "component solved"
        );
        ComponentResult {
            component,
            problem,
            map,
            samples,
            solvers,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Learn rule weights. Evidence on the query predicates is the training
    /// truth and is hidden from the grounder.
    pub fn learn(&self) -> MlnResult<LearnOutcome> {
        let deadline = self.deadline();
        let mut evidence = self.evidence.clone();
        let query_preds: HashSet<_> = self.queries.iter().map(|q| q.predicate).collect();
        let truth = evidence.split_off(&query_preds);
        tracing::info!(training_atoms = truth.len(), "training truth separated from evidence");

        let model = self.ground_with(&evidence)?;
        let components = partition(&model, Partitioning::from_flag(self.config.partition));
        let learner = Learner::new(&self.program, &model, &components, &truth, &self.config, self.seed)?;
        let mut weights = RuleWeights::from_program(&self.program);
        let report = learner.run(&mut weights, &self.pool, &deadline);
        Ok(LearnOutcome { report, weights })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ComponentStatus;
    use crate::error::{GroundError, MlnError};
    use crate::mln::parser::parse_program;

    fn engine(program: &str, evidence: &str, queries: &str, config: EngineConfig) -> MlnResult<Engine> {
        let mut prog = Program::new();
        parse_program(&mut prog, "test.mln", program)?;
        let facts = parse_evidence(&prog, "test.db", evidence)?;
        let queries = parse_queries(&prog, "query", queries)?;
        Engine::new(config, prog, EvidenceDb::from_facts(facts), queries)
    }

    fn seeded() -> EngineConfig {
        EngineConfig {
            seed: 42,
            source_seed: 7,
            max_threads: 2,
            ..EngineConfig::default()
        }
    }

    const PROGRAM: &str = "person = { Anna, Bob }\n\
                           smokes(person)\n\
                           cancer(person)\n\
                           1.5 smokes(x) => cancer(x)\n";

    #[test]
    fn map_run_reports_every_component() {
        let e = engine(PROGRAM, "smokes(Anna)\n", "cancer", seeded()).unwrap();
        let report = e.map().unwrap();
        assert!(report.complete);
        assert!(report.components.iter().all(|c| c.status == ComponentStatus::Ok));
        assert!(report.map.iter().any(|a| a.to_string() == "cancer(Anna)"));
    }

    #[test]
    fn global_deadline_counts_from_before_grounding() {
        let config = EngineConfig {
            timeout_secs: 0.000_001,
            ..seeded()
        };
        let e = engine(PROGRAM, "smokes(Anna)\n", "cancer", config).unwrap();
        let report = e.marginal().unwrap();
        assert!(!report.components.is_empty());
        assert!(!report.complete);
    }

    #[test]
    fn solve_uses_the_deadline_it_is_given() {
        let e = engine(PROGRAM, "smokes(Anna)\n", "cancer", seeded()).unwrap();
        let deadline = Deadline::after(Some(std::time::Duration::ZERO));
        let model = e.ground().unwrap();
        let report = e.solve(&model, Mode::Marginal, &deadline);
        assert!(!report.complete);

        let report = e.solve(&model, Mode::Marginal, &Deadline::none());
        assert!(report.complete);
    }

    #[test]
    fn dual_run_fills_both_answer_sets() {
        let e = engine(PROGRAM, "smokes(Anna)\n", "cancer", seeded()).unwrap();
        let report = e.dual().unwrap();
        assert!(!report.map.is_empty());
        assert_eq!(report.marginals.len(), 2);
    }

    #[test]
    fn closed_world_list_is_applied() {
        let config = EngineConfig {
            grounding: crate::config::GroundingConfig {
                closed_world: vec!["smokes".into()],
                ..Default::default()
            },
            ..seeded()
        };
        let e = engine(PROGRAM, "smokes(Anna)\n", "cancer", config).unwrap();
        let model = e.ground().unwrap();
        // smokes(Bob) is false, so only cancer(Anna) carries a clause.
        assert_eq!(model.clauses.len(), 1);
    }

    #[test]
    fn inconsistent_evidence_aborts() {
        let e = engine(
            "person = { Anna }\nsmokes(person)\ncancer(person)\nsmokes(x) => cancer(x).\n",
            "smokes(Anna)\n!cancer(Anna)\n",
            "cancer",
            seeded(),
        )
        .unwrap();
        let err = e.map().unwrap_err();
        assert!(matches!(err, MlnError::Ground(GroundError::Inconsistent { .. })));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = seeded();
        config.mcsat.samples = 0;
        assert!(matches!(
            engine(PROGRAM, "", "cancer", config),
            Err(MlnError::Config(_))
        ));
    }
}
