//! Rich diagnostic error types for the mln-forge pipeline.
//!
//! Each stage defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the mln-forge pipeline.
///
/// Each variant wraps a stage-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum MlnError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ground(#[from] GroundError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Solve(#[from] SolveError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Learn(#[from] LearnError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Output(#[from] OutputError),
}

// ---------------------------------------------------------------------------
// Input errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("{source_name}:{line}: syntax error: {message}")]
    #[diagnostic(
        code(mln::parse::syntax),
        help(
            "Rules look like `1.5 smokes(x) => cancer(x)` (soft) or \
             `friends(x, y) => friends(y, x).` (hard, trailing period). \
             Evidence lines look like `smokes(Bob)` or `!smokes(Carl)`."
        )
    )]
    Syntax {
        source_name: String,
        line: usize,
        message: String,
    },

    #[error("{source_name}:{line}: unknown predicate `{predicate}`")]
    #[diagnostic(
        code(mln::parse::unknown_predicate),
        help("Declare the predicate in a program file before using it, e.g. `smokes(person)`.")
    )]
    UnknownPredicate {
        source_name: String,
        line: usize,
        predicate: String,
    },

    #[error("{source_name}:{line}: `{predicate}` expects {expected} arguments, got {actual}")]
    #[diagnostic(
        code(mln::parse::arity),
        help("Check the predicate declaration and the number of arguments at this use site.")
    )]
    ArityMismatch {
        source_name: String,
        line: usize,
        predicate: String,
        expected: usize,
        actual: usize,
    },

    #[error("{source_name}:{line}: predicate `{predicate}` declared twice")]
    #[diagnostic(
        code(mln::parse::duplicate_predicate),
        help("Each predicate may only be declared once across all program files.")
    )]
    DuplicatePredicate {
        source_name: String,
        line: usize,
        predicate: String,
    },

    #[error("{source_name}:{line}: variable `{variable}` used in evidence")]
    #[diagnostic(
        code(mln::parse::variable_in_evidence),
        help("Evidence atoms must be fully ground. Constants start with an uppercase letter or digit, or are quoted.")
    )]
    VariableInEvidence {
        source_name: String,
        line: usize,
        variable: String,
    },

    #[error("failed to read {path}")]
    #[diagnostic(
        code(mln::parse::io),
        help("Check that the file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Grounding errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GroundError {
    #[error("evidence contradicts hard rule #{rule}: {clause}")]
    #[diagnostic(
        code(mln::ground::inconsistent),
        help(
            "A hard rule is falsified by the evidence (or by atoms fixed during unit \
             propagation). Remove the contradicting evidence or make the rule soft by \
             giving it a weight."
        )
    )]
    Inconsistent { rule: usize, clause: String },

    #[error("grounding exceeded the time budget of {seconds}s")]
    #[diagnostic(
        code(mln::ground::timeout),
        help(
            "The ground model was not emitted. Increase `grounding.timeout_secs`, declare more \
             predicates closed-world, or restrict type domains."
        )
    )]
    Timeout { seconds: f64 },

    #[error("grounding rule #{rule} exceeded the limit of {limit} candidate groundings")]
    #[diagnostic(
        code(mln::ground::too_many_groundings),
        help(
            "The relational join for this rule exploded. Raise `grounding.max_groundings` or make \
             the rule more selective (closed-world body predicates restrict the join)."
        )
    )]
    TooManyGroundings { rule: usize, limit: u64 },
}

// ---------------------------------------------------------------------------
// Solver errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SolveError {
    #[error("failed to build worker pool: {message}")]
    #[diagnostic(
        code(mln::solve::pool),
        help("Lower `max_threads` or leave it at 0 to use the available parallelism.")
    )]
    Pool { message: String },

    #[error("component {component} is too wide for exact inference (induced width {width} > {max})")]
    #[diagnostic(
        code(mln::solve::too_wide),
        help("Exact inference only runs on components with a small induced width. Use MC-SAT or Gibbs instead.")
    )]
    TooWide {
        component: usize,
        width: usize,
        max: usize,
    },

    #[error("component {component} has no satisfying assignment for its hard clauses")]
    #[diagnostic(
        code(mln::solve::hard_unsat),
        help("The hard clauses of this component are contradictory. Check the hard rules and evidence.")
    )]
    HardUnsatisfiable { component: usize },
}

// ---------------------------------------------------------------------------
// Learning errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LearnError {
    #[error("epoch {epoch}: non-finite {what} for rule #{rule}")]
    #[diagnostic(
        code(mln::learn::non_finite),
        help(
            "The update for this epoch was skipped. Lower `learn.step_size` or increase \
             `learn.meta_samples` to reduce gradient variance."
        )
    )]
    NonFinite {
        epoch: usize,
        rule: usize,
        what: &'static str,
    },

    #[error("no query predicates to learn from")]
    #[diagnostic(
        code(mln::learn::no_queries),
        help("Weight learning needs query predicates whose true values are given in the evidence.")
    )]
    NoQueries,
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(mln::config::invalid),
        help("Check the configuration value. {message}")
    )]
    Invalid { message: String },

    #[error("failed to read configuration file: {path}")]
    #[diagnostic(
        code(mln::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file: {path}: {message}")]
    #[diagnostic(
        code(mln::config::parse),
        help("Check the TOML syntax in the configuration file.")
    )]
    Parse { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Output errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum OutputError {
    #[error("failed to write {path}")]
    #[diagnostic(
        code(mln::output::io),
        help("Ensure the output directory exists and is writable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {message}")]
    #[diagnostic(code(mln::output::serialize))]
    Serialization { message: String },
}

/// Convenience alias for functions returning mln-forge results.
pub type MlnResult<T> = std::result::Result<T, MlnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ground_error_converts_to_mln_error() {
        let err = GroundError::Timeout { seconds: 0.5 };
        let top: MlnError = err.into();
        assert_eq!(top.to_string(), "grounding exceeded the time budget of 0.5s");
        assert!(matches!(top, MlnError::Ground(GroundError::Timeout { .. })));
    }

    #[test]
    fn parse_error_display_carries_location() {
        let err = ParseError::UnknownPredicate {
            source_name: "prog.mln".into(),
            line: 7,
            predicate: "smokes".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("prog.mln:7"));
        assert!(msg.contains("smokes"));
    }

    #[test]
    fn inconsistency_message_names_the_clause() {
        let err = GroundError::Inconsistent {
            rule: 2,
            clause: "!friends(Bob, Alice)".into(),
        };
        assert!(format!("{err}").contains("friends(Bob, Alice)"));
    }
}
