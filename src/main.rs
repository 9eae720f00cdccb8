//! mln-forge CLI: Markov logic inference and weight learning.

use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use mln_forge::aggregate::{InferenceReport, Mode};
use mln_forge::config::{EngineConfig, SamplerKind};
use mln_forge::engine::{Engine, InputFiles};
use mln_forge::export::{self, OutputOptions};

#[derive(Parser)]
#[command(name = "mln-forge", version, about = "Markov logic inference and weight learning")]
struct Cli {
    /// Verbosity (-v info, -vv debug, -vvv trace). Ignored when RUST_LOG is set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Debug mode: at least debug logging.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Most probable state of the query atoms (MaxWalkSAT).
    Map(RunArgs),
    /// Marginal probabilities of the query atoms (MC-SAT).
    Marginal(RunArgs),
    /// MAP state and marginals from one grounding; writes `<out>.map` and `<out>.marginal`.
    Dual(RunArgs),
    /// Learn rule weights from the evidence on the query predicates.
    Learn(RunArgs),
    /// Ground only, reporting statistics and optionally dumping the clauses.
    Ground(RunArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum SamplerArg {
    Mcsat,
    Gibbs,
    /// Exact inference on components of small width.
    Exact,
}

impl From<SamplerArg> for SamplerKind {
    fn from(arg: SamplerArg) -> Self {
        match arg {
            SamplerArg::Mcsat => SamplerKind::McSat,
            SamplerArg::Gibbs => SamplerKind::Gibbs,
            SamplerArg::Exact => SamplerKind::Exact,
        }
    }
}

#[derive(Args)]
struct RunArgs {
    /// Program files (comma-separated).
    #[arg(short = 'i', long, required = true, value_delimiter = ',')]
    program: Vec<PathBuf>,

    /// Evidence files (comma-separated).
    #[arg(short = 'e', long, value_delimiter = ',')]
    evidence: Vec<PathBuf>,

    /// Query atoms, e.g. "smokes, cancer(Anna)".
    #[arg(short = 'q', long)]
    query: Option<String>,

    /// Query files (comma-separated).
    #[arg(long, value_delimiter = ',')]
    query_file: Vec<PathBuf>,

    /// Schema name of the evidence store.
    #[arg(long)]
    schema: Option<String>,

    /// Result file; stdout when omitted.
    #[arg(short = 'r', long)]
    output: Option<PathBuf>,

    /// TOML configuration file; flags override its values.
    #[arg(long)]
    conf: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,

    /// Write the JSON run report to this file.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Gzip the result file.
    #[arg(long)]
    gz: bool,

    /// Print answers as Prolog facts.
    #[arg(long)]
    prolog: bool,

    /// Dump the ground clauses to this file.
    #[arg(long)]
    write_clauses: Option<PathBuf>,

    /// Dump the ground model in WCNF to this file.
    #[arg(long)]
    write_wcnf: Option<PathBuf>,

    #[command(flatten)]
    tuning: TuningArgs,
}

/// Flags overriding configuration values.
#[derive(Args)]
struct TuningArgs {
    /// Worker threads (0 = all cores).
    #[arg(long)]
    threads: Option<usize>,
    /// Deadline for grounding and solving, in seconds (fractions allowed).
    #[arg(long)]
    timeout: Option<f64>,
    /// Grounding deadline in seconds (fractions allowed).
    #[arg(long)]
    grounding_timeout: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
    /// Seed of the initial atom truth values.
    #[arg(long)]
    source_seed: Option<u64>,
    #[arg(long)]
    min_prob: Option<f64>,
    /// Solve the ground model as one component.
    #[arg(long)]
    no_part: bool,

    /// Additional closed-world predicates (comma-separated).
    #[arg(long, value_delimiter = ',')]
    closed_world: Vec<String>,
    #[arg(long)]
    activate_all: bool,
    /// Propagate hard unit clauses to a fixpoint after grounding.
    #[arg(long, alias = "iterative-unit-propagate")]
    unit_propagate: bool,
    /// Round budget for unit propagation.
    #[arg(long)]
    unit_prop_max_rounds: Option<usize>,
    /// Ignore soft evidence below this probability.
    #[arg(long)]
    soft_threshold: Option<f64>,

    #[arg(long)]
    max_flips: Option<u64>,
    #[arg(long)]
    max_tries: Option<u32>,
    #[arg(long)]
    random_step: Option<f64>,
    /// Never break a satisfied hard clause during MAP search.
    #[arg(long)]
    dont_break: bool,
    /// Probability of an annealing step during MAP search.
    #[arg(long)]
    anneal_prob: Option<f64>,

    #[arg(long)]
    mcsat_samples: Option<usize>,
    #[arg(long)]
    mcsat_param: Option<f64>,
    /// Probability of an annealing step inside SampleSAT.
    #[arg(long)]
    sa_prob: Option<f64>,
    #[arg(long)]
    sa_coef: Option<f64>,
    #[arg(long)]
    burn_in: Option<usize>,
    #[arg(long)]
    dump_interval: Option<usize>,
    #[arg(long)]
    cumulative: bool,
    /// Record a marginal snapshot at each dump interval.
    #[arg(long)]
    snapshot: bool,

    #[arg(long)]
    max_iter: Option<usize>,
    #[arg(long)]
    step_size: Option<f64>,
    #[arg(long)]
    decay: Option<f64>,
    #[arg(long)]
    meta_samples: Option<usize>,
    #[arg(long)]
    mu: Option<f64>,
    #[arg(long, value_enum)]
    sampler: Option<SamplerArg>,
    #[arg(long)]
    gibbs_thinning: Option<usize>,
    #[arg(long)]
    inner_para: Option<usize>,
    /// Split large components into chunks while learning.
    #[arg(long)]
    part_component: bool,
}

impl TuningArgs {
    fn apply(&self, config: &mut EngineConfig) {
        fn set<T: Copy>(slot: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *slot = v;
            }
        }

        set(&mut config.max_threads, self.threads);
        set(&mut config.timeout_secs, self.timeout);
        set(&mut config.grounding.timeout_secs, self.grounding_timeout);
        set(&mut config.seed, self.seed);
        set(&mut config.source_seed, self.source_seed);
        set(&mut config.min_prob, self.min_prob);
        if self.no_part {
            config.partition = false;
        }

        config.grounding.closed_world.extend(self.closed_world.iter().cloned());
        config.grounding.activate_all |= self.activate_all;
        config.grounding.unit_propagate |= self.unit_propagate;
        set(&mut config.grounding.unit_prop_max_rounds, self.unit_prop_max_rounds);
        set(&mut config.grounding.soft_threshold, self.soft_threshold);

        if self.max_flips.is_some() {
            config.walksat.max_flips = self.max_flips;
        }
        set(&mut config.walksat.max_tries, self.max_tries);
        set(&mut config.walksat.random_step, self.random_step);
        config.walksat.avoid_breaking_hard |= self.dont_break;
        set(&mut config.walksat.anneal_prob, self.anneal_prob);

        set(&mut config.mcsat.samples, self.mcsat_samples);
        set(&mut config.mcsat.param, self.mcsat_param);
        set(&mut config.mcsat.sa_prob, self.sa_prob);
        set(&mut config.mcsat.sa_coef, self.sa_coef);
        set(&mut config.mcsat.burn_in, self.burn_in);
        set(&mut config.mcsat.dump_interval, self.dump_interval);
        config.mcsat.cumulative |= self.cumulative;
        config.mcsat.snapshot |= self.snapshot;

        set(&mut config.learn.max_iterations, self.max_iter);
        set(&mut config.learn.step_size, self.step_size);
        set(&mut config.learn.decay, self.decay);
        set(&mut config.learn.meta_samples, self.meta_samples);
        set(&mut config.learn.mu, self.mu);
        set(&mut config.learn.sampler, self.sampler.map(SamplerKind::from));
        set(&mut config.learn.gibbs_thinning, self.gibbs_thinning);
        set(&mut config.learn.inner_para, self.inner_para);
        config.learn.part_component |= self.part_component;
    }
}

impl RunArgs {
    fn config(&self) -> Result<EngineConfig> {
        let mut config = match &self.conf {
            Some(path) => EngineConfig::from_toml_file(path)?,
            None => EngineConfig::default(),
        };
        self.tuning.apply(&mut config);
        Ok(config)
    }

    fn inputs(&self) -> InputFiles {
        InputFiles {
            programs: self.program.clone(),
            evidence: self.evidence.clone(),
            queries: self.query.clone(),
            query_files: self.query_file.clone(),
            schema: self.schema.clone(),
        }
    }

    fn output_options(&self) -> OutputOptions {
        OutputOptions {
            gzip: self.gz,
            prolog: self.prolog,
        }
    }
}

fn init_tracing(verbose: u8, debug: bool) {
    let level = match verbose {
        0 | 1 if debug => "debug",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.debug);

    let (command, args) = match &cli.command {
        Commands::Map(args) => (Some(Mode::Map), args),
        Commands::Marginal(args) => (Some(Mode::Marginal), args),
        Commands::Dual(args) => (Some(Mode::Dual), args),
        Commands::Learn(args) | Commands::Ground(args) => (None, args),
    };

    let config = args.config()?;
    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }
    let engine = Engine::from_files(config, &args.inputs())?;

    match (&cli.command, command) {
        (Commands::Learn(_), _) => run_learn(&engine, args),
        (_, Some(mode)) => run_inference(&engine, args, mode),
        _ => run_ground(&engine, args),
    }
}

fn dump_model(engine: &Engine, model: &mln_forge::ground::GroundModel, args: &RunArgs) -> Result<()> {
    if let Some(path) = &args.write_clauses {
        let written = export::write_clauses(path, engine.program(), model, args.gz)?;
        tracing::info!(path = %written.display(), clauses = model.clauses.len(), "ground clauses written");
    }
    if let Some(path) = &args.write_wcnf {
        let written = export::write_wcnf(path, model, args.gz)?;
        tracing::info!(path = %written.display(), "WCNF written");
    }
    Ok(())
}

fn run_ground(engine: &Engine, args: &RunArgs) -> Result<()> {
    let model = engine.ground()?;
    dump_model(engine, &model, args)?;
    if let Some(path) = &args.report {
        export::write_report(path, &model.stats)?;
    }
    println!("{}", serde_json::to_string_pretty(&model.stats).into_diagnostic()?);
    Ok(())
}

fn run_inference(engine: &Engine, args: &RunArgs, mode: Mode) -> Result<()> {
    let deadline = engine.deadline();
    let model = engine.ground()?;
    dump_model(engine, &model, args)?;
    let report = engine.solve(&model, mode, &deadline);
    for failed in report.failed_components() {
        tracing::warn!(component = failed.id, status = ?failed.status, "component failed, answers are best effort");
    }

    write_answers(&report, args.output.as_deref(), args.output_options(), mode)?;
    if let Some(path) = &args.report {
        let written = export::write_report(path, &report)?;
        tracing::info!(path = %written.display(), "report written");
    }
    Ok(())
}

fn write_answers(report: &InferenceReport, output: Option<&Path>, options: OutputOptions, mode: Mode) -> Result<()> {
    match (output, mode) {
        (Some(path), Mode::Map) => {
            export::write_map(path, report, options)?;
        }
        (Some(path), Mode::Marginal) => {
            export::write_marginals(path, report, options)?;
        }
        (Some(path), Mode::Dual) => {
            export::write_dual(path, report, options)?;
        }
        (None, _) => {
            if mode.wants_map() {
                print!("{}", export::render_map(report, options.prolog));
            }
            if mode.wants_marginals() {
                print!("{}", export::render_marginals(report, options.prolog));
            }
        }
    }
    Ok(())
}

fn run_learn(engine: &Engine, args: &RunArgs) -> Result<()> {
    let outcome = engine.learn()?;
    let report = &outcome.report;
    tracing::info!(
        epochs = report.epochs,
        skipped = report.skipped_epochs.len(),
        complete = report.complete,
        "weight learning finished"
    );

    match &args.output {
        Some(path) => {
            let written = export::write_learned_program(path, engine.program(), report, args.gz)?;
            tracing::info!(path = %written.display(), "learned program written");
        }
        None => print!("{}", export::render_learned_program(engine.program(), report)),
    }
    if let Some(path) = &args.report {
        export::write_report(path, report)?;
    }
    Ok(())
}
