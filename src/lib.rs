// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # mln-forge
//!
//! Grounding, partitioning, inference and weight learning for Markov Logic
//! Networks.
//!
//! ## Architecture
//!
//! - **Program model** (`mln`): typed predicates and weighted rules in clausal form
//! - **Grounding** (`ground`): rules plus evidence into a weighted ground CNF
//! - **Partitioning** (`partition`): connected components solved independently
//! - **Inference** (`infer`): MaxWalkSAT for MAP, MC-SAT and Gibbs for marginals,
//!   variable elimination on narrow components
//! - **Learning** (`learn`): SGD on rule weights from observed vs. expected counts
//!
//! ## Library usage
//!
//! ```no_run
//! use mln_forge::config::EngineConfig;
//! use mln_forge::engine::{Engine, InputFiles};
//!
//! let inputs = InputFiles {
//!     programs: vec!["smokers.mln".into()],
//!     evidence: vec!["smokers.db".into()],
//!     queries: Some("cancer".into()),
//!     ..InputFiles::default()
//! };
//! let engine = Engine::from_files(EngineConfig::default(), &inputs).unwrap();
//! for answer in engine.marginal().unwrap().marginals {
//!     println!("{:.4}\t{}", answer.probability, answer.atom);
//! }
//! ```

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod export;
pub mod ground;
pub mod infer;
pub mod learn;
pub mod mln;
pub mod mrf;
pub mod partition;
pub mod registry;
pub mod symbol;
