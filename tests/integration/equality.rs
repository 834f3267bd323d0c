#![allow(missing_docs)]

use epgm::{
    model::ascii::AsciiGraphLoader,
    types::{IdGenerator, Result},
    CanonicalLabeling, CollectionEquality, CollectionEqualityByGraphIds, CypherPatternMatching,
    ExecutionEnvironment, GraphCollection, GraphEquality, MatchStrategy,
};

fn env() -> ExecutionEnvironment {
    ExecutionEnvironment::new(3).expect("pool")
}

#[test]
fn separately_loaded_graphs_are_equal_by_data_only() -> Result<()> {
    let text = "g:G{k=1}[(a:A{x=1})-[:e{w=2}]->(b:B)<-[:e]-(c:C);(c)-[:f]->(c)]";
    let first = AsciiGraphLoader::load_with_ids(text, IdGenerator::starting_at(1))?.logical_graph("g")?;
    let second = AsciiGraphLoader::load_with_ids(text, IdGenerator::starting_at(500))?.logical_graph("g")?;
    let env = env();
    assert!(GraphEquality::new(CanonicalLabeling::by_data()).execute(&env, &first, &second)?);
    assert!(GraphEquality::new(CanonicalLabeling::by_element_data()).execute(&env, &first, &second)?);
    assert!(!GraphEquality::new(CanonicalLabeling::by_element_ids()).execute(&env, &first, &second)?);
    Ok(())
}

#[test]
fn parallelism_does_not_change_labels() -> Result<()> {
    let loader = AsciiGraphLoader::load(
        "g[(a:A)-[:x]->(b:B)-[:y]->(c:C)-[:z]->(a);(b)-[:x]->(d:D{n=\"q\"})]",
    )?;
    let graph = loader.logical_graph("g")?;
    let labeling = CanonicalLabeling::by_data();
    let expected = labeling.graph_label(&ExecutionEnvironment::new(1)?, &graph)?;
    for parallelism in [2, 5, 16] {
        let env = ExecutionEnvironment::new(parallelism)?;
        assert_eq!(labeling.graph_label(&env, &graph)?, expected);
    }
    Ok(())
}

#[test]
fn match_results_equal_expected_collections() -> Result<()> {
    let data = AsciiGraphLoader::load(
        "g[(a:Person{name=\"a\"})-[:knows]->(b:Person{name=\"b\"})-[:knows]->(c:Person{name=\"c\"})]",
    )?;
    let graph = data.logical_graph("g")?;
    let actual = CypherPatternMatching::new(
        "MATCH (x:Person)-[:knows]->(y:Person)",
        MatchStrategy::Isomorphism,
        MatchStrategy::Isomorphism,
    )
    .execute(&env(), &graph)?
    .into_collection(&graph)?;

    let expected = AsciiGraphLoader::load(
        "m1:match[(a:Person{name=\"a\"})-[:knows]->(b:Person{name=\"b\"})];\
         m2:match[(b)-[:knows]->(c:Person{name=\"c\"})]",
    )?
    .graph_collection(&["m1", "m2"])?;

    let equality = CollectionEquality::new(CanonicalLabeling::by_data());
    assert!(equality.execute(&env(), &actual, &expected)?);
    assert!(!CollectionEqualityByGraphIds::new().execute(&env(), &actual, &expected)?);
    Ok(())
}

#[test]
fn empty_collections_are_equal() -> Result<()> {
    let env = env();
    let empty = GraphCollection::empty();
    assert!(CollectionEquality::new(CanonicalLabeling::by_data()).execute(&env, &empty, &empty)?);
    assert!(CollectionEqualityByGraphIds::new().execute(&env, &empty, &empty)?);
    Ok(())
}
