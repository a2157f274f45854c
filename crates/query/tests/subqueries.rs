//! Integration tests for subqueries in expressions, correlated or not.

use rowql_core::{record, Error, EvalErrorKind, Value};
use rowql_query::{bind, execute, parse_query, InMemoryDataSource, Params, ResultSet};

fn sources() -> InMemoryDataSource {
    InMemoryDataSource::new()
        .with_table(
            "users",
            vec![
                record! { "id" => 1, "name" => "ann" },
                record! { "id" => 2, "name" => "ben" },
                record! { "id" => 3, "name" => "cy" },
            ],
        )
        .with_table(
            "orders",
            vec![
                record! { "id" => 10, "uid" => 1, "total" => 5 },
                record! { "id" => 11, "uid" => 1, "total" => 7 },
                record! { "id" => 12, "uid" => 3, "total" => 40 },
            ],
        )
}

fn try_run(sql: &str) -> Result<ResultSet, Error> {
    let bound = bind(&parse_query(sql)?, &Params::new())?;
    Ok(execute(&bound, &sources())?)
}

fn column(sql: &str) -> Vec<Value> {
    try_run(sql)
        .unwrap()
        .rows
        .iter()
        .map(|r| r.values()[0].clone())
        .collect()
}

fn ids(sql: &str) -> Vec<i64> {
    column(sql)
        .into_iter()
        .map(|v| match v {
            Value::Int64(i) => i,
            other => panic!("not an integer: {:?}", other),
        })
        .collect()
}

#[test]
fn test_correlated_exists() {
    let sql = "SELECT id FROM users u WHERE EXISTS (SELECT 1 FROM orders o WHERE o.uid = u.id)";
    assert_eq!(ids(sql), vec![1, 3]);

    let sql = "SELECT id FROM users u WHERE NOT EXISTS (SELECT 1 FROM orders o WHERE o.uid = u.id)";
    assert_eq!(ids(sql), vec![2]);
}

#[test]
fn test_correlated_subquery_runs_per_row() {
    let result = try_run("SELECT id FROM users u WHERE EXISTS (SELECT 1 FROM orders o WHERE o.uid = u.id)")
        .unwrap();
    // users once, orders once while compiling and once per user.
    assert_eq!(result.stats.scanned_rows, 3 + 3 + 3 * 3);
}

#[test]
fn test_outer_source_name_without_alias() {
    let sql = "SELECT id FROM users WHERE EXISTS (SELECT 1 FROM orders WHERE uid = users.id AND total > 6)";
    assert_eq!(ids(sql), vec![1, 3]);
}

#[test]
fn test_inner_column_shadows_outer_column() {
    // `id` is the order id here, so the subquery is the same for every user.
    let result = try_run("SELECT id FROM users WHERE EXISTS (SELECT 1 FROM orders WHERE id = 12)").unwrap();
    assert_eq!(result.len(), 3);
    assert_eq!(result.stats.scanned_rows, 3 + 3);

    // Only `uid` reaches outside; `id` still names the order.
    let sql = "SELECT name FROM users u WHERE EXISTS (SELECT 1 FROM orders WHERE uid = u.id AND id = 11)";
    assert_eq!(column(sql), vec![Value::from("ann")]);
}

#[test]
fn test_correlated_in() {
    let sql = "SELECT name FROM users u WHERE 7 IN (SELECT total FROM orders WHERE uid = u.id)";
    assert_eq!(column(sql), vec![Value::from("ann")]);

    // An empty subquery makes NOT IN true.
    let sql = "SELECT id FROM users u WHERE 5 NOT IN (SELECT total FROM orders WHERE uid = u.id)";
    assert_eq!(ids(sql), vec![2, 3]);
}

#[test]
fn test_correlated_subquery_in_select_list() {
    let result = try_run(
        "SELECT id, EXISTS (SELECT 1 FROM orders WHERE uid = users.id) AS buyer FROM users ORDER BY id",
    )
    .unwrap();
    assert_eq!(result.columns, vec!["id", "buyer"]);
    let buyers: Vec<Value> = result.rows.iter().map(|r| r.values()[1].clone()).collect();
    assert_eq!(
        buyers,
        vec![Value::Boolean(true), Value::Boolean(false), Value::Boolean(true)]
    );
}

#[test]
fn test_correlated_subquery_in_order_by() {
    let sql = "SELECT id FROM users u \
               ORDER BY EXISTS (SELECT 1 FROM orders WHERE uid = u.id) DESC, id DESC";
    assert_eq!(ids(sql), vec![3, 1, 2]);
}

#[test]
fn test_correlated_subquery_in_having() {
    let sql = "SELECT uid, COUNT(*) FROM orders o GROUP BY uid \
               HAVING EXISTS (SELECT 1 FROM users WHERE users.id = o.uid AND name = 'cy')";
    assert_eq!(ids(sql), vec![3]);
}

#[test]
fn test_reference_two_scopes_out() {
    let sql = "SELECT id FROM users u WHERE EXISTS (\
                   SELECT 1 FROM orders o WHERE o.uid = u.id AND EXISTS (\
                       SELECT 1 FROM users x WHERE x.id = o.uid AND x.name = u.name))";
    assert_eq!(ids(sql), vec![1, 3]);
}

#[test]
fn test_correlated_subquery_in_on_is_rejected() {
    let err = try_run(
        "SELECT u.id FROM users u JOIN orders o \
         ON EXISTS (SELECT 1 FROM users x WHERE x.id = o.uid)",
    )
    .unwrap_err();
    assert!(matches!(err, Error::Eval(ref e) if e.kind == EvalErrorKind::InvalidArgument));
}

#[test]
fn test_unknown_column_in_subquery() {
    let err = try_run("SELECT id FROM users u WHERE EXISTS (SELECT 1 FROM orders o WHERE o.uid = u.nope)")
        .unwrap_err();
    assert!(matches!(err, Error::Eval(ref e) if e.kind == EvalErrorKind::UnknownColumn));
}
