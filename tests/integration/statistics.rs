#![allow(missing_docs)]

use std::fs;

use epgm::{
    model::ascii::AsciiGraphLoader,
    query::{
        statistics::{
            DISTINCT_SOURCE_COUNT_FILE, EDGE_COUNT_BY_LABEL_FILE, EDGE_COUNT_BY_TRIPLE_FILE,
            EDGE_COUNT_FILE, VERTEX_COUNT_BY_LABEL_FILE, VERTEX_COUNT_FILE,
        },
        GraphStatistics, GraphStatisticsReader,
    },
    types::Result,
    CypherPatternMatching, ExecutionEnvironment, MatchStrategy,
};
use tempfile::tempdir;

#[test]
fn reader_loads_every_present_file() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join(VERTEX_COUNT_FILE), "11\n")?;
    fs::write(dir.path().join(EDGE_COUNT_FILE), "24\n")?;
    fs::write(
        dir.path().join(VERTEX_COUNT_BY_LABEL_FILE),
        "Person, 6\nTag, 3\nForum, 2\n",
    )?;
    fs::write(
        dir.path().join(EDGE_COUNT_BY_LABEL_FILE),
        "knows,10\nhasTag,8\nhasMember,6\n",
    )?;
    fs::write(dir.path().join(DISTINCT_SOURCE_COUNT_FILE), "knows,5\n")?;
    fs::write(
        dir.path().join(EDGE_COUNT_BY_TRIPLE_FILE),
        "Person,knows,Person,10\nForum,hasMember,Person,6\n",
    )?;

    let stats = GraphStatisticsReader::read(dir.path())?;
    assert_eq!(stats.vertex_count(), Some(11));
    assert_eq!(stats.edge_count(), Some(24));
    assert_eq!(stats.vertex_count_by_label("Person"), Some(6));
    assert_eq!(stats.edge_count_by_label("hasMember"), Some(6));
    assert_eq!(stats.distinct_source_count("knows"), Some(5));
    assert_eq!(stats.distinct_target_count("knows"), None, "file absent");
    assert_eq!(stats.edge_count_by_triple("Forum", "hasMember", "Person"), Some(6));
    assert_eq!(
        stats
            .try_distinct_target_count("knows")
            .expect_err("missing")
            .code(),
        "StatisticsUnavailable"
    );
    Ok(())
}

#[test]
fn empty_directory_yields_empty_statistics() -> Result<()> {
    let dir = tempdir()?;
    assert_eq!(GraphStatisticsReader::read(dir.path())?, GraphStatistics::new());
    let missing = dir.path().join("nope");
    assert_eq!(
        GraphStatisticsReader::read(&missing).expect_err("missing dir").code(),
        "Io"
    );
    Ok(())
}

#[test]
fn json_and_csv_statistics_agree_with_computed_ones() -> Result<()> {
    let loader = AsciiGraphLoader::load(
        "g[(a:Person)-[:knows]->(b:Person)-[:knows]->(c:Person);(a)-[:hasTag]->(t:Tag)]",
    )?;
    let graph = loader.logical_graph("g")?;
    let computed = GraphStatistics::from_graph(&graph);
    assert_eq!(computed.vertex_count(), Some(4));
    assert_eq!(computed.edge_count(), Some(3));
    assert_eq!(computed.distinct_source_count("knows"), Some(2));
    assert_eq!(computed.distinct_target_count("knows"), Some(2));
    assert_eq!(computed.edge_count_by_triple("Person", "hasTag", "Tag"), Some(1));

    let restored = GraphStatistics::from_json(&computed.to_json()?)?;
    assert_eq!(restored, computed);

    let dir = tempdir()?;
    fs::write(dir.path().join(VERTEX_COUNT_FILE), "4")?;
    fs::write(dir.path().join(EDGE_COUNT_FILE), "3")?;
    fs::write(dir.path().join(VERTEX_COUNT_BY_LABEL_FILE), "Person,3\nTag,1")?;
    fs::write(dir.path().join(EDGE_COUNT_BY_LABEL_FILE), "knows,2\nhasTag,1")?;
    let from_files = GraphStatisticsReader::read(dir.path())?;

    let env = ExecutionEnvironment::new(2)?;
    let query = "MATCH (a:Person)-[:knows]->(b:Person)";
    let with_files = CypherPatternMatching::new(
        query,
        MatchStrategy::Homomorphism,
        MatchStrategy::Homomorphism,
    )
    .with_statistics(from_files)
    .execute(&env, &graph)?;
    let with_computed = CypherPatternMatching::new(
        query,
        MatchStrategy::Homomorphism,
        MatchStrategy::Homomorphism,
    )
    .with_statistics(restored)
    .execute(&env, &graph)?;
    assert_eq!(with_files.len(), 2);
    assert_eq!(with_computed.len(), 2);
    Ok(())
}

#[test]
fn malformed_counts_are_rejected() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join(EDGE_COUNT_BY_LABEL_FILE), "knows,many\n")?;
    let err = GraphStatisticsReader::read(dir.path()).expect_err("bad count");
    assert_eq!(err.code(), "InvalidGraph");
    Ok(())
}
