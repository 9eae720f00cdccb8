//! End-to-end integration tests for the mln-forge engine.
//!
//! These tests run the full pipeline from parsing through grounding,
//! partitioning, solving and learning via the public `Engine` API.

use mln_forge::aggregate::ComponentStatus;
use mln_forge::config::{EngineConfig, SamplerKind};
use mln_forge::engine::Engine;
use mln_forge::error::{GroundError, MlnError};
use mln_forge::evidence::EvidenceDb;
use mln_forge::mln::parser::{parse_evidence, parse_program, parse_queries};
use mln_forge::mln::Program;
use mln_forge::symbol::RuleId;

const SMOKERS: &str = "\
// friends and smokers
person = { Anna, Bob, Chris, Daniel, Edward, Frank, Gary, Helen }
*friends(person, person)
smokes(person)
cancer(person)

1.5 smokes(x) => cancer(x)
1.1 friends(x, y), smokes(x) => smokes(y)
";

const SMOKERS_DB: &str = "\
friends(Anna, Bob)
friends(Bob, Anna)
friends(Anna, Edward)
friends(Edward, Anna)
friends(Chris, Daniel)
friends(Daniel, Chris)
friends(Gary, Helen)
friends(Helen, Gary)
smokes(Anna)
smokes(Edward)
smokes(Gary)
";

fn engine(program: &str, evidence: &str, queries: &str, config: EngineConfig) -> Engine {
    let mut prog = Program::new();
    parse_program(&mut prog, "test.mln", program).unwrap();
    let facts = parse_evidence(&prog, "test.db", evidence).unwrap();
    let queries = parse_queries(&prog, "query", queries).unwrap();
    Engine::new(config, prog, EvidenceDb::from_facts(facts), queries).unwrap()
}

fn seeded(threads: usize) -> EngineConfig {
    EngineConfig {
        seed: 1234,
        source_seed: 99,
        max_threads: threads,
        ..EngineConfig::default()
    }
}

#[test]
fn smokers_map_marks_smokers_with_cancer() {
    let e = engine(SMOKERS, SMOKERS_DB, "cancer", seeded(2));
    let report = e.map().unwrap();

    assert!(report.complete);
    assert_eq!(report.hard_violations, 0);
    let answers: Vec<String> = report.map.iter().map(ToString::to_string).collect();
    for smoker in ["Anna", "Edward", "Gary"] {
        assert!(answers.contains(&format!("cancer({smoker})")), "{answers:?}");
    }
}

#[test]
fn smokers_marginal_above_one_half() {
    let e = engine(SMOKERS, SMOKERS_DB, "cancer", seeded(2));
    let report = e.marginal().unwrap();

    let anna = report
        .marginals
        .iter()
        .find(|m| m.atom.to_string() == "cancer(Anna)")
        .unwrap();
    assert!(anna.probability > 0.5, "P(cancer(Anna)) = {}", anna.probability);
    assert!(report.marginals.iter().all(|m| (0.0..=1.0).contains(&m.probability)));
    assert!(report.components.iter().all(|c| c.status == ComponentStatus::Ok));
}

const CHAINED: &str = "\
friends(person, person)
smokes(person)
1.0 friends(x, y) => smokes(x) => smokes(y)
";

const CHAINED_DB: &str = "smokes(Bob)\nfriends(Bob, Alice)\n";

#[test]
fn smoking_friend_makes_alice_smoke_in_the_map_state() {
    let report = engine(CHAINED, CHAINED_DB, "smokes(Alice)", seeded(1)).map().unwrap();
    let answers: Vec<String> = report.map.iter().map(ToString::to_string).collect();
    assert_eq!(answers, vec!["smokes(Alice)".to_string()]);
}

#[test]
fn smoking_friend_raises_alice_marginal() {
    let report = engine(CHAINED, CHAINED_DB, "smokes(Alice)", seeded(1)).marginal().unwrap();
    assert_eq!(report.marginals.len(), 1);
    assert!(report.marginals[0].probability > 0.5, "{}", report.marginals[0].probability);
}

#[test]
fn fixed_seeds_reproduce_results_across_thread_counts() {
    let a = engine(SMOKERS, SMOKERS_DB, "cancer, smokes", seeded(1)).dual().unwrap();
    let b = engine(SMOKERS, SMOKERS_DB, "cancer, smokes", seeded(3)).dual().unwrap();

    assert_eq!(a.map, b.map);
    assert_eq!(a.marginals, b.marginals);
    assert_eq!(a.components.len(), b.components.len());
}

#[test]
fn partitioning_does_not_change_the_map_state() {
    let split = engine(SMOKERS, SMOKERS_DB, "cancer", seeded(2)).map().unwrap();
    let whole = engine(
        SMOKERS,
        SMOKERS_DB,
        "cancer",
        EngineConfig {
            partition: false,
            ..seeded(2)
        },
    )
    .map()
    .unwrap();

    assert!(split.components.len() > 1);
    assert_eq!(whole.components.len(), 1);
    assert_eq!(split.soft_cost, 0.0);
    assert_eq!(whole.soft_cost, 0.0);
}

#[test]
fn contradicting_hard_rule_aborts_the_run() {
    let e = engine(
        "person = { Anna }\nsmokes(person)\ncancer(person)\nsmokes(x) => cancer(x).\n",
        "smokes(Anna)\n!cancer(Anna)\n",
        "cancer",
        seeded(1),
    );
    match e.marginal() {
        Err(MlnError::Ground(GroundError::Inconsistent { clause, .. })) => {
            assert!(clause.contains("cancer(Anna)"), "{clause}");
        }
        other => panic!("expected an inconsistency, got {other:?}"),
    }
}

#[test]
fn learning_moves_weights_towards_the_training_data() {
    let mut config = seeded(2);
    config.learn.sampler = SamplerKind::Exact;
    config.learn.max_iterations = 20;
    config.learn.step_size = 0.2;
    config.learn.decay = 1.0;
    config.learn.mu = 0.0;

    let e = engine(
        "person = { A, B, C, D }\n*smokes(person)\ncancer(person)\n\
         0.0 smokes(x) => cancer(x)\n0.0 cancer(x)\n",
        "smokes(A)\nsmokes(B)\ncancer(A)\ncancer(B)\ncancer(C)\ncancer(D)\n",
        "cancer",
        config,
    );
    let outcome = e.learn().unwrap();

    assert_eq!(outcome.report.epochs, 20);
    assert!(outcome.report.complete);
    assert!(outcome.weights.get(RuleId(0)) > 0.5);
    assert!(outcome.weights.get(RuleId(1)) > 0.5);
}
