//! Macro benchmark running representative patterns over a synthetic social graph.
#![forbid(unsafe_code)]
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use epgm::{
    logging::init_logging,
    model::{Edge, GraphHead, LogicalGraph, Vertex},
    types::{EdgeId, GraphId, VertexId},
    CanonicalLabeling, CypherPatternMatching, EpgmConfig, ExecutionEnvironment, GraphEquality,
    MatchStrategy,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const PERSON_COUNT: u64 = 2_000;
const TAG_COUNT: u64 = 50;
const KNOWS_PER_PERSON: u64 = 5;

const QUERIES: &[(&str, &str)] = &[
    ("single_edge", "MATCH (a:Person)-[e:knows]->(b:Person)"),
    ("two_hop", "MATCH (a:Person)-[:knows]->(b:Person)-[:knows]->(c:Person)"),
    (
        "triangle",
        "MATCH (a:Person)-[:knows]->(b:Person)-[:knows]->(c:Person)-[:knows]->(a)",
    ),
    (
        "shared_tag",
        "MATCH (a:Person)-[:hasTag]->(t:Tag)<-[:hasTag]-(b:Person) WHERE a.age < b.age",
    ),
    ("paths", "MATCH (a:Person{age=30})-[p:knows*1..2]->(b:Person)"),
];

fn synthetic_graph(seed: u64) -> LogicalGraph {
    let mut rng = StdRng::seed_from_u64(seed);
    let head = GraphHead::new(GraphId(0), "social");
    let mut vertices = Vec::new();
    for id in 0..PERSON_COUNT {
        vertices.push(
            Vertex::new(VertexId(id), "Person")
                .with_property("age", rng.gen_range(18..80i64))
                .in_graph(head.id),
        );
    }
    for id in PERSON_COUNT..PERSON_COUNT + TAG_COUNT {
        vertices.push(
            Vertex::new(VertexId(id), "Tag")
                .with_property("name", format!("tag{id}"))
                .in_graph(head.id),
        );
    }
    let mut edges = Vec::new();
    let mut next = 0;
    let mut edge = |label: &str, source: u64, target: u64| {
        next += 1;
        Edge::new(EdgeId(next), label, VertexId(source), VertexId(target)).in_graph(head.id)
    };
    for person in 0..PERSON_COUNT {
        for _ in 0..KNOWS_PER_PERSON {
            edges.push(edge("knows", person, rng.gen_range(0..PERSON_COUNT)));
        }
        let tag = PERSON_COUNT + rng.gen_range(0..TAG_COUNT);
        edges.push(edge("hasTag", person, tag));
    }
    LogicalGraph::new(head, vertices, edges).expect("synthetic graph")
}

/// Reads `EPGM_BENCH_CONFIG` when set and installs logging once.
fn bench_config() -> EpgmConfig {
    let config = match std::env::var("EPGM_BENCH_CONFIG") {
        Ok(path) => EpgmConfig::load(path).expect("bench config"),
        Err(_) => EpgmConfig::default(),
    };
    // A second benchmark group finds the subscriber already installed.
    let _ = init_logging(&config.log_level);
    config
}

fn macro_queries(c: &mut Criterion) {
    let config = bench_config();
    let graph = synthetic_graph(7);
    let env = ExecutionEnvironment::new(config.execution.parallelism).expect("pool");
    let mut group = c.benchmark_group("macro/queries");
    group.sample_size(10);
    group.throughput(Throughput::Elements(graph.edges().len() as u64));
    for (name, query) in QUERIES {
        for strategy in [MatchStrategy::Homomorphism, MatchStrategy::Isomorphism] {
            let matching = CypherPatternMatching::new(*query, strategy, strategy)
                .with_planner_config(config.planner.clone());
            group.bench_with_input(
                BenchmarkId::new(*name, format!("{strategy:?}")),
                &matching,
                |b, matching| {
                    b.iter(|| black_box(matching.execute(&env, &graph).expect("match").len()));
                },
            );
        }
    }
    group.finish();
}

fn canonical_equality(c: &mut Criterion) {
    let first = synthetic_graph(11);
    let second = synthetic_graph(11);
    let config = bench_config();
    let env = ExecutionEnvironment::new(config.execution.parallelism).expect("pool");
    let mut group = c.benchmark_group("macro/equality");
    group.sample_size(10);
    for (name, labeling) in [
        ("element_ids", CanonicalLabeling::by_element_ids()),
        ("data", CanonicalLabeling::by_data()),
        ("undirected_data", CanonicalLabeling::by_data().undirected()),
    ] {
        let equality = GraphEquality::new(labeling);
        group.bench_function(name, |b| {
            b.iter(|| black_box(equality.execute(&env, &first, &second).expect("equality")));
        });
    }
    group.finish();
}

criterion_group!(benches, macro_queries, canonical_equality);
criterion_main!(benches);
