//! Parameter binding observed through query results.

use rowql_core::{record, BindErrorKind, Error, EvalErrorKind, Value};
use rowql_query::{bind, execute, parse_query, InMemoryDataSource, Params, PreparedQuery};

fn sources() -> InMemoryDataSource {
    InMemoryDataSource::new().with_table(
        "items",
        vec![
            record! { "id" => 1, "name" => "bolt", "price" => 2.5, "active" => true },
            record! { "id" => 2, "name" => "nut", "price" => 0.5, "active" => false },
            record! { "id" => 3, "name" => "gear", "price" => 12.0, "active" => true },
        ],
    )
}

fn ids(sql: &str, params: &Params) -> Result<Vec<i64>, Error> {
    let result = PreparedQuery::new(sql)?.execute(params, &sources())?;
    Ok(result
        .rows
        .iter()
        .map(|r| match r.values()[0] {
            Value::Int64(i) => i,
            ref other => panic!("not an integer: {:?}", other),
        })
        .collect())
}

fn bind_error(sql: &str, params: &Params) -> BindErrorKind {
    match ids(sql, params) {
        Err(Error::Bind(e)) => e.kind,
        other => panic!("expected a bind error, got {:?}", other),
    }
}

#[test]
fn test_named_and_positional_together() {
    let params = Params::positional([Value::from(1.0)]).with("name", "gear");
    assert_eq!(
        ids("SELECT id FROM items WHERE price > ? AND name = :name", &params).unwrap(),
        vec![3]
    );
}

#[test]
fn test_string_coerced_to_number_by_arithmetic() {
    let params = Params::new().with("min", "2");
    assert_eq!(
        ids("SELECT id FROM items WHERE id >= :min + 0", &params).unwrap(),
        vec![2, 3]
    );
}

#[test]
fn test_numeric_string_next_to_a_column() {
    // The column's type is unknown while binding, so the string stays a
    // string and is compared as a number.
    let params = Params::new().with("x", "2");
    assert_eq!(ids("SELECT id FROM items WHERE id = :x", &params).unwrap(), vec![2]);
    assert_eq!(ids("SELECT id FROM items WHERE id = '3'", &Params::new()).unwrap(), vec![3]);

    let err = ids("SELECT id FROM items WHERE id = :x", &Params::new().with("x", "two")).unwrap_err();
    assert!(matches!(err, Error::Eval(ref e) if e.kind == EvalErrorKind::TypeMismatch));
}

#[test]
fn test_number_parameter_in_like_pattern() {
    let sources = InMemoryDataSource::new().with_table(
        "codes",
        vec![record! { "id" => 1, "code" => "A12" }, record! { "id" => 2, "code" => "B7" }],
    );
    let query = parse_query("SELECT id FROM codes WHERE code LIKE '%' || :digits").unwrap();
    let bound = bind(&query, &Params::new().with("digits", 12)).unwrap();
    let result = execute(&bound, &sources).unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].values(), &[Value::Int64(1)]);
}

#[test]
fn test_missing_binding() {
    assert_eq!(
        bind_error("SELECT id FROM items WHERE id = :id", &Params::new()),
        BindErrorKind::MissingBinding
    );
    assert_eq!(
        bind_error("SELECT id FROM items WHERE id = ? OR id = ?", &Params::positional([1])),
        BindErrorKind::MissingBinding
    );
}

#[test]
fn test_incompatible_type() {
    let params = Params::new().with("n", "not a number");
    assert_eq!(
        bind_error("SELECT id FROM items WHERE id = 1 + :n", &params),
        BindErrorKind::IncompatibleType
    );
    let params = Params::new().with("flag", "yes");
    assert_eq!(
        bind_error("SELECT id FROM items WHERE active = :flag AND true = :flag", &params),
        BindErrorKind::IncompatibleType
    );
}

#[test]
fn test_null_binding_follows_three_valued_logic() {
    let params = Params::new().with("id", Value::Null);
    assert!(ids("SELECT id FROM items WHERE id = :id", &params).unwrap().is_empty());
    assert_eq!(
        ids("SELECT id FROM items WHERE :id IS NULL", &params).unwrap(),
        vec![1, 2, 3]
    );
}

#[test]
fn test_limit_and_offset_parameters() {
    let params = Params::new().with("n", 1).with("skip", "1");
    assert_eq!(
        ids("SELECT id FROM items ORDER BY id LIMIT :n OFFSET :skip", &params).unwrap(),
        vec![2]
    );
    let params = Params::new().with("n", -1);
    assert_eq!(
        bind_error("SELECT id FROM items LIMIT :n", &params),
        BindErrorKind::IncompatibleType
    );
}

#[test]
fn test_parameters_inside_subqueries() {
    let params = Params::new().with("floor", 1.0);
    assert_eq!(
        ids(
            "SELECT id FROM items WHERE id IN (SELECT id FROM items WHERE price > :floor) \
             AND EXISTS (SELECT 1 FROM items WHERE price > :floor)",
            &params
        )
        .unwrap(),
        vec![1, 3]
    );
}

#[test]
fn test_binding_leaves_parsed_query_untouched() {
    let query = parse_query("SELECT id FROM items WHERE id = :id").unwrap();
    let snapshot = query.clone();
    let bound = bind(&query, &Params::new().with("id", 2)).unwrap();
    assert_eq!(query, snapshot);
    assert_ne!(bound.query(), &snapshot);
    assert_eq!(execute(&bound, &sources()).unwrap().len(), 1);
}
