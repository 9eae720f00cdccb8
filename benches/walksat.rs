//! Benchmarks for grounding and MaxWalkSAT.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use mln_forge::config::GroundingConfig;
use mln_forge::evidence::EvidenceDb;
use mln_forge::ground::Grounder;
use mln_forge::infer::{ComponentSolver, Deadline, WalkSat};
use mln_forge::mln::parser::{parse_evidence, parse_program, parse_queries};
use mln_forge::mln::Program;
use mln_forge::mrf::Problem;
use mln_forge::partition::{partition, Partitioning};

const PEOPLE: usize = 40;

fn smokers() -> (Program, EvidenceDb) {
    let names: Vec<String> = (0..PEOPLE).map(|i| format!("P{i}")).collect();
    let text = format!(
        "person = {{ {} }}\n*friends(person, person)\nsmokes(person)\ncancer(person)\n\
         1.5 smokes(x) => cancer(x)\n1.1 friends(x, y), smokes(x) => smokes(y)\n",
        names.join(", ")
    );
    let mut program = Program::new();
    parse_program(&mut program, "bench.mln", &text).unwrap();

    let mut db = String::new();
    for i in 0..PEOPLE {
        db.push_str(&format!("friends(P{i}, P{})\n", (i + 1) % PEOPLE));
        db.push_str(&format!("friends(P{i}, P{})\n", (i * 7 + 3) % PEOPLE));
        if i % 5 == 0 {
            db.push_str(&format!("smokes(P{i})\n"));
        }
    }
    let facts = parse_evidence(&program, "bench.db", &db).unwrap();
    (program, EvidenceDb::from_facts(facts))
}

fn bench_grounding(c: &mut Criterion) {
    let (program, db) = smokers();
    let queries = parse_queries(&program, "query", "cancer").unwrap();
    let config = GroundingConfig::default();

    c.bench_function("ground_smokers_40", |bench| {
        bench.iter(|| black_box(Grounder::new(&program, &db, &config).ground(&queries, 1).unwrap()))
    });
}

fn bench_walksat(c: &mut Criterion) {
    let (program, db) = smokers();
    let queries = parse_queries(&program, "query", "cancer").unwrap();
    let model = Grounder::new(&program, &db, &GroundingConfig::default())
        .ground(&queries, 1)
        .unwrap();
    let components = partition(&model, Partitioning::Disabled);
    let weights: Vec<f64> = model.clauses.iter().map(|cl| cl.weight).collect();
    let problem = Problem::build(&model, &components[0], &weights);
    let walksat = WalkSat::new(Default::default());

    c.bench_function("walksat_smokers_40", |bench| {
        bench.iter(|| {
            let mut rng = StdRng::seed_from_u64(7);
            black_box(walksat.solve(&problem, &mut rng, &Deadline::none()))
        })
    });
}

criterion_group!(benches, bench_grounding, bench_walksat);
criterion_main!(benches);
