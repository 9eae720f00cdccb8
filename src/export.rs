//! Result writers.
//!
//! Every writer goes through [`Sink`], which is either a plain buffered file
//! or a gzip stream. Gzip output always ends in `.gz`.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

use crate::aggregate::{AtomLabel, InferenceReport};
use crate::error::OutputError;
use crate::ground::GroundModel;
use crate::learn::LearnReport;
use crate::mln::Program;

pub type OutputResult<T> = std::result::Result<T, OutputError>;

/// WCNF weights are integers: soft weights are scaled by this and rounded.
const WCNF_SCALE: f64 = 1000.0;

/// How result files are written.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    pub gzip: bool,
    /// Print answers as Prolog facts, e.g. `smokes("Bob").`
    pub prolog: bool,
}

/// A buffered output file, optionally gzip-compressed.
pub enum Sink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Sink {
    /// Create the file at `path`, appending `.gz` when compressing.
    pub fn create(path: &Path, gzip: bool) -> OutputResult<(Self, PathBuf)> {
        let path = if gzip && path.extension().is_none_or(|e| e != "gz") {
            let mut name = path.as_os_str().to_owned();
            name.push(".gz");
            PathBuf::from(name)
        } else {
            path.to_path_buf()
        };
        let file = File::create(&path).map_err(|source| io_error(&path, source))?;
        let writer = BufWriter::new(file);
        let sink = if gzip {
            Sink::Gzip(GzEncoder::new(writer, Compression::default()))
        } else {
            Sink::Plain(writer)
        };
        Ok((sink, path))
    }

    /// Flush everything, writing the gzip trailer if any.
    pub fn finish(self) -> std::io::Result<()> {
        match self {
            Sink::Plain(mut w) => w.flush(),
            Sink::Gzip(gz) => gz.finish()?.flush(),
        }
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gzip(w) => w.flush(),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> OutputError {
    OutputError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Write `text` to `path` and return the path actually written.
fn write_text(path: &Path, text: &str, gzip: bool) -> OutputResult<PathBuf> {
    let (mut sink, path) = Sink::create(path, gzip)?;
    sink.write_all(text.as_bytes())
        .and_then(|()| sink.finish())
        .map_err(|source| io_error(&path, source))?;
    tracing::debug!(path = %path.display(), bytes = text.len(), "output written");
    Ok(path)
}

/// Quote a constant unless it already reads as one.
fn render_constant(label: &str) -> String {
    let ident = label.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && label.chars().all(|c| c.is_alphanumeric() || c == '_');
    let number = !label.is_empty() && label.chars().all(|c| c.is_ascii_digit());
    let plain = ident || number;
    if plain {
        label.to_string()
    } else {
        format!("\"{label}\"")
    }
}

fn prolog_fact(atom: &AtomLabel, probability: Option<f64>) -> String {
    let mut args: Vec<String> = atom.args.iter().map(|a| format!("\"{a}\"")).collect();
    if let Some(p) = probability {
        args.push(format!("{p:.4}"));
    }
    format!("{}({}).", atom.predicate, args.join(", "))
}

/// The MAP state: one true query atom per line.
pub fn render_map(report: &InferenceReport, prolog: bool) -> String {
    let mut out = String::new();
    for atom in &report.map {
        if prolog {
            let _ = writeln!(out, "{}", prolog_fact(atom, None));
        } else {
            let _ = writeln!(out, "{atom}");
        }
    }
    out
}

/// Marginals as `<prob>\t<atom>` lines.
pub fn render_marginals(report: &InferenceReport, prolog: bool) -> String {
    let mut out = String::new();
    for answer in &report.marginals {
        if prolog {
            let _ = writeln!(out, "{}", prolog_fact(&answer.atom, Some(answer.probability)));
        } else {
            let _ = writeln!(out, "{:.4}\t{}", answer.probability, answer.atom);
        }
    }
    out
}

pub fn write_map(path: &Path, report: &InferenceReport, options: OutputOptions) -> OutputResult<PathBuf> {
    write_text(path, &render_map(report, options.prolog), options.gzip)
}

pub fn write_marginals(path: &Path, report: &InferenceReport, options: OutputOptions) -> OutputResult<PathBuf> {
    write_text(path, &render_marginals(report, options.prolog), options.gzip)
}

/// Dual mode writes `<out>.map` and `<out>.marginal`.
pub fn write_dual(
    path: &Path,
    report: &InferenceReport,
    options: OutputOptions,
) -> OutputResult<(PathBuf, PathBuf)> {
    let with_suffix = |suffix: &str| {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    };
    let map = write_map(&with_suffix(".map"), report, options)?;
    let marginal = write_marginals(&with_suffix(".marginal"), report, options)?;
    Ok((map, marginal))
}

/// The ground clauses, one per line: `<weight>\t<clause>`, hard clauses
/// marked `hard`.
pub fn render_clauses(program: &Program, model: &GroundModel) -> String {
    let mut out = String::new();
    for clause in &model.clauses {
        let text = model.render_clause(program, clause);
        if clause.hard {
            let _ = writeln!(out, "hard\t{text}");
        } else {
            let _ = writeln!(out, "{:.4}\t{text}", clause.weight);
        }
    }
    out
}

pub fn write_clauses(path: &Path, program: &Program, model: &GroundModel, gzip: bool) -> OutputResult<PathBuf> {
    write_text(path, &render_clauses(program, model), gzip)
}

/// The ground model in weighted CNF (`p wcnf <vars> <clauses> <top>`).
///
/// Atom ids map to variables `id + 1`. A clause with negative weight `-w`
/// becomes an auxiliary variable `y` implied by each of its literals plus a
/// soft unit `!y` of weight `w`.
pub fn render_wcnf(model: &GroundModel) -> String {
    let scaled = |w: f64| (w.abs() * WCNF_SCALE).round() as u64;
    let soft_total: u64 = model
        .clauses
        .iter()
        .filter(|c| !c.hard)
        .map(|c| scaled(c.weight))
        .sum();
    let top = soft_total + 1;

    let mut vars = model.atoms.len() as u64;
    let mut lines: Vec<String> = Vec::new();
    let lit = |atom: u32, positive: bool| {
        let v = atom as i64 + 1;
        if positive { v } else { -v }
    };
    for clause in &model.clauses {
        let lits: Vec<i64> = clause
            .literals
            .iter()
            .map(|l| lit(l.atom.0, l.positive))
            .collect();
        let join = |ls: &[i64]| ls.iter().map(i64::to_string).collect::<Vec<_>>().join(" ");
        if clause.hard {
            lines.push(format!("{top} {} 0", join(&lits)));
            continue;
        }
        let weight = scaled(clause.weight);
        if weight == 0 {
            continue;
        }
        if clause.weight > 0.0 {
            lines.push(format!("{weight} {} 0", join(&lits)));
        } else {
            vars += 1;
            let aux = vars as i64;
            for l in &lits {
                lines.push(format!("{top} {} {aux} 0", -l));
            }
            lines.push(format!("{weight} {} 0", -aux));
        }
    }

    let mut out = format!("c mln-forge ground model\np wcnf {vars} {} {top}\n", lines.len());
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

pub fn write_wcnf(path: &Path, model: &GroundModel, gzip: bool) -> OutputResult<PathBuf> {
    write_text(path, &render_wcnf(model), gzip)
}

/// The program with learned weights: domains, predicate declarations, then
/// one rule per line (`<weight> <rule>` or `<rule>.` for hard rules).
pub fn render_learned_program(program: &Program, report: &LearnReport) -> String {
    let mut out = String::new();
    for (index, ty) in program.types.iter().enumerate() {
        let domain = program.constants.domain(crate::symbol::TypeId(index as u32));
        if domain.is_empty() {
            continue;
        }
        let labels: Vec<String> = domain
            .iter()
            .map(|c| render_constant(&program.constants.resolve_label(*c)))
            .collect();
        let _ = writeln!(out, "{ty} = {{ {} }}", labels.join(", "));
    }
    out.push('\n');
    for pred in &program.predicates {
        let types: Vec<&str> = pred.arg_types.iter().map(|t| program.type_name(*t)).collect();
        let _ = writeln!(
            out,
            "{}{}({})",
            if pred.closed_world { "*" } else { "" },
            pred.name,
            types.join(", ")
        );
    }
    out.push('\n');
    for rule in &report.rules {
        match rule.weight {
            Some(w) => {
                let _ = writeln!(out, "{w:.4} {}", rule.text);
            }
            None => {
                let _ = writeln!(out, "{}.", rule.text);
            }
        }
    }
    out
}

pub fn write_learned_program(
    path: &Path,
    program: &Program,
    report: &LearnReport,
    gzip: bool,
) -> OutputResult<PathBuf> {
    write_text(path, &render_learned_program(program, report), gzip)
}

/// Machine-readable run report.
pub fn write_report(path: &Path, report: &impl Serialize) -> OutputResult<PathBuf> {
    let text = serde_json::to_string_pretty(report).map_err(|e| OutputError::Serialization {
        message: e.to_string(),
    })?;
    write_text(path, &text, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{MarginalAnswer, Mode};
    use crate::ground::{AtomStore, GroundClause, GroundLiteral, GroundingStats};
    use crate::learn::LearnedRule;
    use crate::mln::parser::parse_program;
    use crate::symbol::{AtomId, ClauseId, PredicateId};
    use std::io::Read;

    fn label(pred: &str, args: &[&str]) -> AtomLabel {
        AtomLabel {
            predicate: pred.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn report() -> InferenceReport {
        InferenceReport {
            mode: Mode::Dual,
            seed: 1,
            source_seed: 2,
            grounding: GroundingStats::default(),
            components: Vec::new(),
            map: vec![label("smokes", &["Bob"]), label("friends", &["Anna", "Bob"])],
            marginals: vec![MarginalAnswer {
                atom: label("smokes", &["Bob"]),
                probability: 0.73,
            }],
            hard_violations: 0,
            soft_cost: 0.0,
            complete: true,
            elapsed_ms: 3,
        }
    }

    #[test]
    fn map_and_marginal_lines() {
        let r = report();
        assert_eq!(render_map(&r, false), "smokes(Bob)\nfriends(Anna, Bob)\n");
        assert_eq!(render_marginals(&r, false), "0.7300\tsmokes(Bob)\n");
    }

    #[test]
    fn prolog_facts_quote_constants() {
        let r = report();
        assert_eq!(
            render_map(&r, true),
            "smokes(\"Bob\").\nfriends(\"Anna\", \"Bob\").\n"
        );
        assert_eq!(render_marginals(&r, true), "smokes(\"Bob\", 0.7300).\n");
    }

    #[test]
    fn gzip_output_gets_suffix_and_decompresses() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_map(
            &dir.path().join("out.txt"),
            &report(),
            OutputOptions {
                gzip: true,
                prolog: false,
            },
        )
        .unwrap();
        assert_eq!(written.file_name().unwrap(), "out.txt.gz");

        let mut text = String::new();
        flate2::read::GzDecoder::new(File::open(&written).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "smokes(Bob)\nfriends(Anna, Bob)\n");
    }

    #[test]
    fn dual_writes_two_files() {
        let dir = tempfile::tempdir().unwrap();
        let (map, marginal) = write_dual(&dir.path().join("res"), &report(), OutputOptions::default()).unwrap();
        assert!(map.ends_with("res.map"));
        assert!(marginal.ends_with("res.marginal"));
        assert_eq!(std::fs::read_to_string(marginal).unwrap(), "0.7300\tsmokes(Bob)\n");
    }

    fn two_atom_model() -> GroundModel {
        let mut atoms = AtomStore::new();
        let a = atoms.intern(PredicateId(0), &[]);
        let b = atoms.intern(PredicateId(1), &[]);
        let clause = |id: u32, lits: Vec<GroundLiteral>, weight: f64, hard: bool| GroundClause {
            id: ClauseId(id),
            literals: lits,
            weight,
            hard,
            origins: Vec::new(),
            prior: 0.0,
        };
        GroundModel {
            atoms,
            clauses: vec![
                clause(0, vec![GroundLiteral { atom: a, positive: true }], 1.5, false),
                clause(
                    1,
                    vec![
                        GroundLiteral { atom: a, positive: false },
                        GroundLiteral { atom: b, positive: true },
                    ],
                    -0.25,
                    false,
                ),
                clause(2, vec![GroundLiteral { atom: b, positive: true }], 0.0, true),
            ],
            queries: vec![AtomId(0)],
            stats: GroundingStats::default(),
        }
    }

    #[test]
    fn wcnf_encodes_negative_weights_with_an_auxiliary() {
        let text = render_wcnf(&two_atom_model());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "p wcnf 3 5 1751");
        assert_eq!(lines[2], "1500 1 0");
        // !a v b with weight -0.25: aux 3 implied by !a and by b
        assert_eq!(lines[3], "1751 1 3 0");
        assert_eq!(lines[4], "1751 -2 3 0");
        assert_eq!(lines[5], "250 -3 0");
        assert_eq!(lines[6], "1751 2 0");
    }

    #[test]
    fn learned_program_reparses() {
        let mut program = Program::new();
        parse_program(
            &mut program,
            "in.mln",
            "person = { Anna, \"Carl Jr\" }\n*friends(person, person)\nsmokes(person)\n\
             1 friends(x, y) => smokes(x)\nsmokes(Anna).\n",
        )
        .unwrap();
        let learned = LearnReport {
            epochs: 1,
            final_step: 0.1,
            skipped_epochs: Vec::new(),
            history: Vec::new(),
            rules: vec![
                LearnedRule {
                    rule: 0,
                    text: program.rules[0].text.clone(),
                    weight: Some(0.5),
                },
                LearnedRule {
                    rule: 1,
                    text: program.rules[1].text.clone(),
                    weight: None,
                },
            ],
            complete: true,
            elapsed_ms: 0,
        };
        let text = render_learned_program(&program, &learned);
        assert!(text.contains("person = { Anna, \"Carl Jr\" }"));
        assert!(text.contains("*friends(person, person)"));
        assert!(text.contains("0.5000 friends(x, y) => smokes(x)"));
        assert!(text.contains("smokes(Anna).\n"));

        let mut again = Program::new();
        parse_program(&mut again, "out.mln", &text).unwrap();
        assert_eq!(again.rules.len(), 2);
        assert_eq!(again.rules[0].weight.soft(), Some(0.5));
    }

    #[test]
    fn report_is_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(&dir.path().join("report.json"), &report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["mode"], "dual");
        assert_eq!(value["map"].as_array().unwrap().len(), 2);
    }
}
