#![allow(missing_docs)]

use std::collections::BTreeSet;

use epgm::{
    model::ascii::AsciiGraphLoader,
    query::embedding::Binding,
    types::{IdGenerator, Result},
    CypherPatternMatching, ExecutionEnvironment, LogicalGraph, MatchStrategy,
};

use MatchStrategy::{Homomorphism, Isomorphism};

const SOCIAL: &str = r#"
    g:Community{area="Leipzig"}[
        (alice:Person{name="Alice", age=30})-[k1:knows{since=2014}]->(bob:Person{name="Bob", age=25});
        (bob)-[k2:knows{since=2015}]->(carol:Person{name="Carol", age=35});
        (carol)-[k3:knows{since=2016}]->(alice);
        (alice)-[s1:studyAt]->(uni:University{name="Uni Leipzig"});
        (bob)-[s2:studyAt]->(uni);
        (dave:Person{name="Dave", age=40})-[k4:knows]->(dave)
    ]
"#;

fn social() -> (AsciiGraphLoader, LogicalGraph) {
    let loader = AsciiGraphLoader::load_with_ids(SOCIAL, IdGenerator::starting_at(1)).expect("load");
    let graph = loader.logical_graph("g").expect("graph");
    (loader, graph)
}

fn env() -> ExecutionEnvironment {
    ExecutionEnvironment::new(4).expect("pool")
}

fn count(query: &str, vertex: MatchStrategy, edge: MatchStrategy) -> usize {
    let (_, graph) = social();
    CypherPatternMatching::new(query, vertex, edge)
        .execute(&env(), &graph)
        .expect("match")
        .len()
}

#[test]
fn single_edge_matches_every_labelled_edge() {
    let query = "MATCH (a:Person)-[e:knows]->(b:Person)";
    assert_eq!(count(query, Homomorphism, Homomorphism), 4);
    assert_eq!(count(query, Isomorphism, Homomorphism), 3, "self loop binds a and b to dave");
}

#[test]
fn undirected_edges_match_both_orientations() {
    let query = "MATCH (a:Person)-[e:knows]-(b:Person)";
    assert_eq!(count(query, Homomorphism, Homomorphism), 7);
    assert_eq!(count(query, Isomorphism, Isomorphism), 6);
}

#[test]
fn repeated_variable_closes_the_cycle() {
    let pair = "MATCH (p1:Person)-[:knows]->(p2:Person)-[:knows]->(p1)";
    assert_eq!(count(pair, Homomorphism, Homomorphism), 1, "only dave's loop returns to p1");
    assert_eq!(count(pair, Isomorphism, Isomorphism), 0);

    let triangle = "MATCH (a:Person)-[:knows]->(b:Person)-[:knows]->(c:Person)-[:knows]->(a)";
    assert_eq!(count(triangle, Isomorphism, Isomorphism), 3);
    assert_eq!(count(triangle, Homomorphism, Homomorphism), 4);
}

#[test]
fn triangle_bindings_are_consistent() -> Result<()> {
    let (loader, graph) = social();
    let result = CypherPatternMatching::new(
        "MATCH (a:Person)-[:knows]->(b:Person)-[:knows]->(c:Person)-[:knows]->(a)",
        Isomorphism,
        Isomorphism,
    )
    .execute(&env(), &graph)?;
    let (a, b, c) = (
        result.column("a").expect("a"),
        result.column("b").expect("b"),
        result.column("c").expect("c"),
    );
    let members: BTreeSet<_> = ["alice", "bob", "carol"]
        .iter()
        .filter_map(|var| loader.vertex_id(var))
        .collect();
    for embedding in result.embeddings() {
        let ids: BTreeSet<_> = [a, b, c]
            .iter()
            .filter_map(|&slot| embedding.vertex(slot))
            .collect();
        assert_eq!(ids, members);
    }
    Ok(())
}

#[test]
fn where_clause_compares_properties_across_variables() {
    let query = "MATCH (a:Person)-[e:knows]->(b:Person) WHERE a.age > b.age";
    assert_eq!(count(query, Homomorphism, Homomorphism), 2);

    let query = "MATCH (a:Person)-[e:knows]->(b) WHERE e.since >= 2015 AND NOT b.name = 'Alice'";
    assert_eq!(count(query, Homomorphism, Homomorphism), 1);

    let query = "MATCH (a:Person)-[e:knows]->(b) WHERE e.since = 2014 OR a.name = \"Dave\"";
    assert_eq!(count(query, Homomorphism, Homomorphism), 2);
}

#[test]
fn missing_properties_never_satisfy_a_comparison() {
    let query = "MATCH (a)-[e]->(b) WHERE e.since < 3000";
    assert_eq!(count(query, Homomorphism, Homomorphism), 3);
    let query = "MATCH (a)-[e]->(b) WHERE NOT e.since < 3000";
    assert_eq!(count(query, Homomorphism, Homomorphism), 0);
}

#[test]
fn property_maps_in_the_pattern_filter_elements() {
    let query = "MATCH (p:Person{name: 'Bob'})-[:studyAt]->(u:University)";
    assert_eq!(count(query, Homomorphism, Homomorphism), 1);
    let query = "MATCH (p:Person)-[:studyAt]->(u:University{name = 'elsewhere'})";
    assert_eq!(count(query, Homomorphism, Homomorphism), 0);
}

#[test]
fn shared_vertex_across_comma_separated_paths() {
    let query = "MATCH (a:Person)-[:studyAt]->(u:University), (b:Person)-[:studyAt]->(u)";
    assert_eq!(count(query, Homomorphism, Homomorphism), 4);
    assert_eq!(count(query, Isomorphism, Isomorphism), 2);
}

#[test]
fn variable_length_paths_bind_intermediate_elements() -> Result<()> {
    let (loader, graph) = social();
    let query = "MATCH (a:Person{name='Alice'})-[p:knows*1..3]->(b)";
    let result = CypherPatternMatching::new(query, Homomorphism, Homomorphism)
        .execute(&env(), &graph)?;
    assert_eq!(result.len(), 3);
    let slot = result.column("p").expect("p");
    let longest = result
        .embeddings()
        .iter()
        .filter_map(|embedding| match embedding.binding(slot) {
            Some(Binding::Path { edges, vertices }) => Some((edges.clone(), vertices.clone())),
            _ => None,
        })
        .max_by_key(|(edges, _)| edges.len())
        .expect("paths");
    let edge = |var: &str| loader.edge_id(var).expect("edge");
    let vertex = |var: &str| loader.vertex_id(var).expect("vertex");
    assert_eq!(longest.0, vec![edge("k1"), edge("k2"), edge("k3")]);
    assert_eq!(longest.1, vec![vertex("bob"), vertex("carol")]);

    assert_eq!(count(query, Isomorphism, Homomorphism), 2, "alice cannot be both endpoints");
    assert_eq!(count("MATCH (a:Person{name='Alice'})-[p:knows*2]->(b)", Homomorphism, Homomorphism), 1);
    Ok(())
}

#[test]
fn projection_narrows_and_orders_columns() -> Result<()> {
    let (loader, graph) = social();
    let result = CypherPatternMatching::new(
        "MATCH (a:Person)-[e:studyAt]->(u:University)",
        Homomorphism,
        Homomorphism,
    )
    .with_projection(["u", "a"])
    .execute(&env(), &graph)?;
    assert_eq!(result.columns(), ["u", "a"]);
    assert_eq!(result.len(), 2);
    for embedding in result.embeddings() {
        assert_eq!(embedding.width(), 2);
        assert_eq!(embedding.vertex(0), loader.vertex_id("uni"));
    }

    let err = CypherPatternMatching::new("MATCH (a)-->(b)", Homomorphism, Homomorphism)
        .with_projection(["z"])
        .execute(&env(), &graph)
        .expect_err("unknown column");
    assert_eq!(err.code(), "UnresolvedVariable");
    Ok(())
}

#[test]
fn matches_materialise_as_graph_collections() -> Result<()> {
    let (loader, graph) = social();
    let collection = CypherPatternMatching::new(
        "MATCH (a:Person)-[e:studyAt]->(u:University)",
        Isomorphism,
        Isomorphism,
    )
    .execute(&env(), &graph)?
    .into_collection_with_ids(&graph, &mut IdGenerator::starting_at(10_000))?;
    assert_eq!(collection.heads().len(), 2);
    for id in collection.graph_ids() {
        let graph = collection.graph(id).expect("graph");
        assert_eq!(graph.vertices().len(), 2);
        assert_eq!(graph.edges().len(), 1);
    }
    let uni = collection
        .vertices()
        .iter()
        .find(|v| Some(v.id) == loader.vertex_id("uni"))
        .expect("uni");
    assert!(collection.heads().iter().all(|h| uni.graph_ids.contains(&h.id)));
    Ok(())
}

#[test]
fn query_errors_are_classified() {
    let (_, graph) = social();
    let code = |query: &str| {
        CypherPatternMatching::new(query, Homomorphism, Homomorphism)
            .execute(&env(), &graph)
            .expect_err("invalid query")
            .code()
    };
    assert_eq!(code("MATCH (a"), "QuerySyntax");
    assert_eq!(code("MATCH (a)-[e*3..1]->(b)"), "QuerySyntax");
    assert_eq!(code("MATCH (a)-[a]->(b)"), "DuplicateVariable");
    assert_eq!(code("MATCH (a)-->(b) WHERE c.x = 1"), "UnresolvedVariable");
    assert_eq!(code("MATCH (a), (b)"), "UnsupportedPattern");
}

#[test]
fn cancelled_environment_yields_no_partial_result() {
    let (_, graph) = social();
    let env = env();
    env.cancel_token().cancel();
    let err = CypherPatternMatching::new("MATCH (a)-[e]->(b)", Homomorphism, Homomorphism)
        .execute(&env, &graph)
        .expect_err("cancelled");
    assert_eq!(err.code(), "Cancelled");
}

#[test]
fn results_do_not_depend_on_parallelism() -> Result<()> {
    let (_, graph) = social();
    let query = "MATCH (a:Person)-[:knows]->(b:Person)-[:knows]->(c:Person)";
    let mut runs = Vec::new();
    for parallelism in [1, 3, 8] {
        let env = ExecutionEnvironment::new(parallelism)?;
        let result = CypherPatternMatching::new(query, Homomorphism, Homomorphism)
            .execute(&env, &graph)?;
        let mut rows: Vec<String> = result
            .embeddings()
            .iter()
            .map(|embedding| {
                embedding
                    .bindings()
                    .map(|binding| binding.map(ToString::to_string).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect();
        rows.sort();
        runs.push(rows);
    }
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);
    Ok(())
}
