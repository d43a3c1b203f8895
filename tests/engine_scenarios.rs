use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use dataset_cleaning::{CleaningEngine, EngineError, EngineOptions, OutputFormat, RuleError, RuleNode};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field as RecordField;
use serde_json::{Value as JsonValue, json};

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn engine() -> CleaningEngine {
    CleaningEngine::new(EngineOptions {
        num_threads: Some(2),
        batch_size: 2,
        chunk_size: 1,
        max_in_flight_chunks: 2,
        ..EngineOptions::default()
    })
}

fn csv_rows(path: &Path) -> Vec<Vec<String>> {
    let mut rdr = csv::Reader::from_path(path).unwrap();
    rdr.records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

fn run_csv(input: &str, rules: JsonValue) -> (dataset_cleaning::ProcessingStats, Vec<Vec<String>>) {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.csv");
    let stats = engine()
        .process(&fixture(input), &out, &rules, OutputFormat::Csv)
        .unwrap();
    let rows = csv_rows(&out);
    (stats, rows)
}

fn ids(input: &str, rules: JsonValue) -> BTreeSet<String> {
    run_csv(input, rules).1.into_iter().map(|r| r[0].clone()).collect()
}

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

#[test]
fn adults_are_kept_with_matching_stats() {
    let (stats, rows) = run_csv(
        "people.csv",
        json!({"field": "age", "operator": "greater_than_or_equal", "value": 18}),
    );
    assert_eq!(stats.input_rows, 3);
    assert_eq!(stats.output_rows, 2);
    assert_eq!(stats.rows_filtered, 1);
    assert_eq!(stats.input_path, fixture("people.csv"));
    assert_eq!(rows, vec![row(&["42", "B"]), row(&["65", "C"])]);
}

#[test]
fn nested_or_group_selects_either_side() {
    let (stats, rows) = run_csv(
        "people.csv",
        json!({"combinator": "or", "rules": [
            {"field": "age", "operator": "less_than", "value": 18},
            {"field": "name", "operator": "equals", "value": "C"}
        ]}),
    );
    assert_eq!(rows, vec![row(&["17", "A"]), row(&["65", "C"])]);
    assert_eq!(stats.output_rows + stats.rows_filtered, stats.input_rows);
}

#[test]
fn and_is_intersection_and_or_is_union() {
    let a = json!({"field": "a", "operator": "equals", "value": true});
    let b = json!({"field": "b", "operator": "equals", "value": true});

    let only_a = ids("ab.csv", a.clone());
    let only_b = ids("ab.csv", b.clone());
    let both = ids("ab.csv", json!({"combinator": "AND", "rules": [a.clone(), b.clone()]}));
    let either = ids("ab.csv", json!({"combinator": "Or", "rules": [a, b]}));

    assert_eq!(both, only_a.intersection(&only_b).cloned().collect());
    assert_eq!(either, only_a.union(&only_b).cloned().collect());
    assert_eq!(both, BTreeSet::from(["1".to_string()]));
    assert_eq!(either.len(), 3);
}

#[test]
fn null_checks_partition_rows_and_ignore_values() {
    let nulls = ids(
        "contacts.csv",
        json!({"field": "email", "operator": "is_null", "value": "ignored"}),
    );
    let present = ids("contacts.csv", json!({"field": "email", "operator": "is_not_null"}));

    assert_eq!(nulls, BTreeSet::from(["2".to_string()]));
    assert!(nulls.is_disjoint(&present));
    assert_eq!(nulls.len() + present.len(), 4);
}

#[test]
fn comparisons_against_null_cells_are_false() {
    // Row 3 has no score; it matches neither side.
    let high = ids("contacts.csv", json!({"field": "score", "operator": "greater_than", "value": 60}));
    let low = ids("contacts.csv", json!({"field": "score", "operator": "less_than_or_equal", "value": 60}));
    assert_eq!(high, BTreeSet::from(["1".to_string(), "2".to_string()]));
    assert_eq!(low, BTreeSet::from(["4".to_string()]));
    assert!(!ids("contacts.csv", json!({"field": "score", "operator": "not_equals", "value": 0}))
        .contains("3"));
}

#[test]
fn string_literal_is_cast_to_integer_column() {
    let (_, rows) = run_csv("codes.csv", json!({"field": "code", "operator": "equals", "value": "42"}));
    assert_eq!(rows, vec![row(&["42", "mid"])]);

    let above = ids("codes.csv", json!({"field": "code", "operator": "greater_than", "value": "42"}));
    assert_eq!(above, BTreeSet::from(["43".to_string()]));
}

#[test]
fn text_operators_are_literal_substring_matches() {
    let org = ids("contacts.csv", json!({"field": "email", "operator": "ends_with", "value": ".org"}));
    assert_eq!(org, BTreeSet::from(["3".to_string()]));

    // A regex metacharacter is matched literally.
    let dotted = ids("contacts.csv", json!({"field": "email", "operator": "contains", "value": "a.e"}));
    assert!(dotted.is_empty());

    let not_example = ids(
        "contacts.csv",
        json!({"field": "email", "operator": "not_contains", "value": "example"}),
    );
    assert!(not_example.is_empty());
}

#[test]
fn columnar_output_is_readable_and_counted() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested/dir/adults.parquet");
    let stats = engine()
        .process(
            &fixture("people.csv"),
            &out,
            &json!({"field": "age", "operator": "greater_than", "value": 17}),
            OutputFormat::Columnar,
        )
        .unwrap();
    assert_eq!((stats.input_rows, stats.output_rows), (3, 2));
    assert_eq!(stats.output_path, out);

    let reader = SerializedFileReader::new(File::open(&out).unwrap()).unwrap();
    assert_eq!(reader.metadata().file_metadata().num_rows(), 2);
    let names: Vec<RecordField> = reader
        .get_row_iter(None)
        .unwrap()
        .map(|r| r.unwrap().get_column_iter().nth(1).unwrap().1.clone())
        .collect();
    assert_eq!(
        names,
        vec![RecordField::Str("B".to_string()), RecordField::Str("C".to_string())]
    );
}

#[test]
fn repeated_runs_give_identical_counts() {
    let rules = json!({"combinator": "and", "rules": [
        {"field": "score", "operator": "is_not_null"},
        {"field": "name", "operator": "starts_with", "value": "A"}
    ]});
    let (first, _) = run_csv("contacts.csv", rules.clone());
    let (second, _) = run_csv("contacts.csv", rules);
    assert_eq!(first.input_rows, second.input_rows);
    assert_eq!(first.output_rows, second.output_rows);
    assert_eq!(first.output_rows, 1);
}

#[test]
fn parsed_rule_nodes_run_like_json() {
    let node = RuleNode::group(
        "and",
        vec![RuleNode::comparison("age", "less_than", Some(json!(50)))],
    );
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("young.csv");
    let stats = engine()
        .process_node(&fixture("people.csv"), &out, &node, OutputFormat::Csv)
        .unwrap();
    assert_eq!(stats.output_rows, 2);
}

#[test]
fn rule_errors_are_wrapped_and_nothing_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let out: PathBuf = dir.path().join("never.csv");
    let cases = [
        (json!({"combinator": "and", "rules": []}), RuleError::EmptyGroup),
        (
            json!({"field": "age", "operator": "regex", "value": ".*"}),
            RuleError::UnknownOperator {
                operator: "regex".to_string(),
            },
        ),
        (
            json!({"combinator": "xor", "rules": [{"field": "age", "operator": "is_null"}]}),
            RuleError::UnknownCombinator {
                combinator: "xor".to_string(),
            },
        ),
    ];

    for (rules, expected) in cases {
        let err = engine()
            .process(&fixture("people.csv"), &out, &rules, OutputFormat::Csv)
            .unwrap_err();
        assert!(matches!(&err, EngineError::ProcessingFailed(_)), "{err}");
        assert_eq!(err.rule_error(), Some(&expected));
        assert!(err.to_string().starts_with("processing failed: invalid rules:"));
        assert!(!out.exists());
    }
}

#[test]
fn uncastable_literal_fails_compilation() {
    let dir = tempfile::tempdir().unwrap();
    let err = engine()
        .process(
            &fixture("people.csv"),
            dir.path().join("x.csv"),
            &json!({"field": "age", "operator": "equals", "value": "forty"}),
            OutputFormat::Csv,
        )
        .unwrap_err();
    assert!(matches!(
        err.rule_error(),
        Some(RuleError::TypeCastError { field, .. }) if field == "age"
    ));
}

#[test]
fn missing_local_input_is_source_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let err = engine()
        .process(
            &fixture("does_not_exist.csv"),
            dir.path().join("x.csv"),
            &json!({"field": "age", "operator": "is_null"}),
            OutputFormat::Csv,
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::SourceUnavailable { .. }), "{err}");
}

#[test]
fn repeated_header_names_keep_their_own_columns() {
    let (stats, rows) = run_csv(
        "repeated_header.csv",
        json!({"field": "a", "operator": "is_not_null"}),
    );
    assert_eq!((stats.input_rows, stats.output_rows), (2, 2));
    assert_eq!(rows, vec![row(&["1", "x"]), row(&["2", "y"])]);

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("repeated.parquet");
    let err = engine()
        .process(
            &fixture("repeated_header.csv"),
            &out,
            &json!({"field": "a", "operator": "is_not_null"}),
            OutputFormat::Columnar,
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::SinkFailure { .. }), "{err}");
    assert!(!out.exists());
}

#[test]
fn text_cells_are_written_back_verbatim() {
    let (_, rows) = run_csv("padded.csv", json!({"field": "id", "operator": "is_not_null"}));
    assert_eq!(
        rows,
        vec![row(&["1", "  Ada  "]), row(&["2", "   "]), row(&["3", ""])]
    );

    let nulls = ids("padded.csv", json!({"field": "name", "operator": "is_null"}));
    assert_eq!(nulls, BTreeSet::from(["3".to_string()]));
    assert!(ids("padded.csv", json!({"field": "name", "operator": "equals", "value": "Ada"})).is_empty());
    let padded = ids(
        "padded.csv",
        json!({"field": "name", "operator": "equals", "value": "  Ada  "}),
    );
    assert_eq!(padded, BTreeSet::from(["1".to_string()]));
}

#[test]
fn selective_filter_fills_whole_row_groups() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("sparse.parquet");
    // Batches of two rows each keep one survivor.
    let stats = engine()
        .process(
            &fixture("sparse.csv"),
            &out,
            &json!({"field": "keep", "operator": "equals", "value": "yes"}),
            OutputFormat::Columnar,
        )
        .unwrap();
    assert_eq!((stats.input_rows, stats.output_rows), (8, 4));

    let reader = SerializedFileReader::new(File::open(&out).unwrap()).unwrap();
    let sizes: Vec<i64> = reader
        .metadata()
        .row_groups()
        .iter()
        .map(|rg| rg.num_rows())
        .collect();
    assert_eq!(sizes, vec![2, 2]);
    let ids: Vec<RecordField> = reader
        .get_row_iter(None)
        .unwrap()
        .map(|r| r.unwrap().get_column_iter().next().unwrap().1.clone())
        .collect();
    assert_eq!(ids, [2, 4, 6, 8].map(RecordField::Long).to_vec());
}
