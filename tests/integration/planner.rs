#![allow(missing_docs)]

use std::sync::Arc;

use epgm::{
    model::ascii::AsciiGraphLoader,
    query::{
        graph::QueryHandler,
        physical::{Dir, PhysicalOp},
        planner::Planner,
        GraphStatistics,
    },
    types::{IdGenerator, Result},
    CypherPatternMatching, EpgmConfig, ExecutionEnvironment, LogicalGraph, MatchStrategy,
    PlannerConfig,
};

const GRAPH: &str = r#"
    g[
        (a1:Person{name="a1"})-[:hasTag]->(t1:Tag{name="rust"});
        (a2:Person{name="a2"})-[:hasTag]->(t1);
        (a2)-[:hasTag]->(t2:Tag{name="graphs"});
        (a1)-[:knows]->(a2)-[:knows]->(a3:Person{name="a3"})-[:knows]->(a1);
        (a3)-[:hasTag]->(t2)
    ]
"#;

fn graph() -> LogicalGraph {
    AsciiGraphLoader::load_with_ids(GRAPH, IdGenerator::starting_at(1))
        .and_then(|loader| loader.logical_graph("g"))
        .expect("graph")
}

fn no_edge_seeds() -> PlannerConfig {
    PlannerConfig {
        edge_scan_seeds: false,
        ..PlannerConfig::default()
    }
}

#[test]
fn most_selective_label_seeds_the_plan() -> Result<()> {
    let statistics = GraphStatistics::new()
        .with_vertex_label_count("Person", 1000)
        .with_vertex_label_count("Tag", 2);
    let planner = Planner::new(no_edge_seeds(), Arc::new(statistics));
    let handler = QueryHandler::new("MATCH (p:Person)-[h:hasTag]->(t:Tag)")?;
    let output = planner.plan(handler.query_graph(), None)?;
    match &output.plan.root.op {
        PhysicalOp::Expand { from, to, dir, .. } => {
            assert_eq!(from, "t");
            assert_eq!(to, "p");
            assert_eq!(*dir, Dir::In);
        }
        other => panic!("unexpected root: {other:?}"),
    }
    let leaf = output.plan.root.walk().into_iter().last().expect("leaf");
    assert!(matches!(&leaf.op, PhysicalOp::VertexScan { var, .. } if var == "t"));
    assert_eq!(output.estimated_cardinality, 20.0);
    Ok(())
}

#[test]
fn results_do_not_depend_on_statistics() -> Result<()> {
    let graph = graph();
    let env = ExecutionEnvironment::new(2)?;
    let skewed = GraphStatistics::new()
        .with_vertex_count(3)
        .with_edge_count(1_000_000)
        .with_vertex_label_count("Person", 1)
        .with_vertex_label_count("Tag", 100_000)
        .with_edge_label_count("knows", 5)
        .with_edge_label_count("hasTag", 1);
    for query in [
        "MATCH (p:Person)-[:hasTag]->(t:Tag)",
        "MATCH (p:Person)-[:hasTag]->(t:Tag)<-[:hasTag]-(q:Person)",
        "MATCH (a)-[:knows]->(b)-[:knows]->(c)-[:knows]->(a)",
        "MATCH (a:Person)-[:knows*1..2]->(b:Person)-[:hasTag]->(t) WHERE t.name = 'rust'",
    ] {
        let mut counts = Vec::new();
        for (statistics, config) in [
            (GraphStatistics::from_graph(&graph), PlannerConfig::default()),
            (GraphStatistics::new(), no_edge_seeds()),
            (skewed.clone(), PlannerConfig::default()),
            (skewed.clone(), no_edge_seeds()),
        ] {
            let result = CypherPatternMatching::new(
                query,
                MatchStrategy::Isomorphism,
                MatchStrategy::Isomorphism,
            )
            .with_statistics(statistics)
            .with_planner_config(config)
            .execute(&env, &graph)?;
            counts.push(result.len());
        }
        assert!(counts.windows(2).all(|w| w[0] == w[1]), "{query}: {counts:?}");
    }
    Ok(())
}

#[test]
fn configuration_toggles_edge_scan_seeds() -> Result<()> {
    let graph = graph();
    let query = "MATCH (a)-[e]->(b)";
    let seeded = CypherPatternMatching::new(
        query,
        MatchStrategy::Homomorphism,
        MatchStrategy::Homomorphism,
    )
    .explain(&graph)?;
    assert_eq!(seeded.explain.root.op, "EdgeScan");

    let config = EpgmConfig::from_toml_str("[planner]\nedge_scan_seeds = false\n")?;
    let unseeded = CypherPatternMatching::new(
        query,
        MatchStrategy::Homomorphism,
        MatchStrategy::Homomorphism,
    )
    .with_planner_config(config.planner)
    .explain(&graph)?;
    assert_eq!(unseeded.explain.root.op, "Expand");
    Ok(())
}

#[test]
fn explain_indents_inputs_below_their_operator() -> Result<()> {
    let graph = graph();
    let output = CypherPatternMatching::new(
        "MATCH (p:Person)-[:hasTag]->(t:Tag) WHERE p.name <> t.name",
        MatchStrategy::Homomorphism,
        MatchStrategy::Homomorphism,
    )
    .with_projection(["t"])
    .with_planner_config(no_edge_seeds())
    .explain(&graph)?;
    let text = output.explain.to_string();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("Projection("), "{text}");
    assert!(lines[1].starts_with("  Filter("), "{text}");
    assert!(lines.last().expect("leaf").trim_start().starts_with("VertexScan("), "{text}");
    for (depth, line) in lines.iter().enumerate() {
        let indent = line.len() - line.trim_start().len();
        assert_eq!(indent, depth * 2, "{text}");
    }
    Ok(())
}

#[test]
fn huge_path_bounds_plan_and_run_on_small_graphs() -> Result<()> {
    let graph = AsciiGraphLoader::load_with_ids("g[(a:A)-[e:x]->(b:B)]", IdGenerator::starting_at(1))?
        .logical_graph("g")?;
    let matching = CypherPatternMatching::new(
        "MATCH (a)-[p*1..4000000000]->(b)",
        MatchStrategy::Homomorphism,
        MatchStrategy::Homomorphism,
    );
    assert!(matching.explain(&graph)?.estimated_cardinality.is_finite());
    let env = ExecutionEnvironment::new(1)?;
    assert_eq!(matching.execute(&env, &graph)?.len(), 1);
    Ok(())
}
