//! Counting base records and loading Stat relations

mod common;

use active_finder::{
    ActiveFinder, Criteria, FinderError, LazyLoader, Record, RelationOptions, RelationSpec, Row,
    Selection,
};
use common::*;
use sea_query::Value;

#[test]
fn test_count_without_fan_out_counts_rows() {
    let registry = registry();
    let mut finder = ActiveFinder::new(&registry, "Order", &["customer".into()]).unwrap();

    let statement = finder.build_count(&Criteria::new()).unwrap();
    assert_eq!(
        statement.sql,
        "SELECT COUNT(*) FROM \"orders\" \"t\" \
         LEFT OUTER JOIN \"customers\" \"customer\" ON (\"t\".\"customer_id\"=\"customer\".\"id\")"
    );
}

#[test]
fn test_count_with_plural_join_counts_distinct_keys() {
    let registry = registry();
    let executor = ScriptedExecutor::new().respond(vec![Row::new().with("count", 7i64)]);
    let mut finder = ActiveFinder::new(&registry, "Order", &["items".into()]).unwrap();

    let count = finder
        .count(&executor, &Criteria::new().order("t.id").limit(10).offset(20))
        .unwrap();

    assert_eq!(count, "7");
    assert_eq!(
        executor.sql(0),
        "SELECT COUNT(DISTINCT \"t\".\"id\") FROM \"orders\" \"t\" \
         LEFT OUTER JOIN \"items\" \"items\" ON (\"items\".\"order_id\"=\"t\".\"id\")"
    );
}

#[test]
fn test_count_of_composite_key_uses_row_constructor() {
    let registry = registry();
    let mut finder = ActiveFinder::new(&registry, "OrderLine", &["notes".into()]).unwrap();

    let statement = finder.build_count(&Criteria::new()).unwrap();
    assert!(statement
        .sql
        .starts_with("SELECT COUNT(DISTINCT (\"t\".\"order_id\", \"t\".\"line_no\")) FROM"));
}

#[test]
fn test_grouped_count_wraps_subquery() {
    let registry = registry();
    let mut finder = ActiveFinder::new(&registry, "Order", &[]).unwrap();

    let statement = finder
        .build_count(&Criteria::new().group("t.status").order("t.status"))
        .unwrap();
    assert_eq!(
        statement.sql,
        "SELECT COUNT(*) FROM (SELECT \"t\".\"id\" AS \"t0_c0\", \"t\".\"customer_id\" AS \"t0_c1\", \
         \"t\".\"status\" AS \"t0_c2\" FROM \"orders\" \"t\" GROUP BY t.status) sq"
    );
}

#[test]
fn test_count_keeps_condition_parameters() {
    let registry = registry();
    let executor = ScriptedExecutor::new().respond(vec![Row::new().with("count", 2i64)]);
    let mut finder = ActiveFinder::new(&registry, "Order", &[]).unwrap();
    let criteria = Criteria::new()
        .condition("t.status = :status")
        .param("status", "paid");

    let statement = finder.build_count(&criteria).unwrap();
    assert_eq!(
        statement.sql,
        "SELECT COUNT(*) FROM \"orders\" \"t\" WHERE (t.status = :status)"
    );
    assert_eq!(statement.param(":status"), Some(&Value::from("paid")));

    assert_eq!(finder.count(&executor, &criteria).unwrap(), "2");
    assert_eq!(
        executor.sql(0),
        "SELECT COUNT(*) FROM \"orders\" \"t\" WHERE (t.status = $1)"
    );
    assert_eq!(executor.params(0), vec![Value::from("paid")]);
}

#[test]
fn test_explicit_count_select_is_kept() {
    let registry = registry();
    let mut finder = ActiveFinder::new(&registry, "Order", &[]).unwrap();

    let statement = finder
        .build_count(&Criteria::new().select(Selection::columns(&["count(DISTINCT t.status)"])))
        .unwrap();
    assert_eq!(
        statement.sql,
        "SELECT count(DISTINCT t.status) FROM \"orders\" \"t\""
    );
}

#[test]
fn test_count_of_empty_result_fails() {
    let registry = registry();
    let mut finder = ActiveFinder::new(&registry, "Order", &[]).unwrap();
    let err = finder
        .count(&ScriptedExecutor::new(), &Criteria::new())
        .unwrap_err();
    assert!(matches!(err, FinderError::Execution(_)));
}

#[test]
fn test_stat_relation_is_one_grouped_query() {
    let registry = registry();
    let executor = ScriptedExecutor::new()
        .respond(vec![order_row(1, 3), order_row(2, 4)])
        .respond(vec![Row::new().with("c0", 1).with("s", 3i64)]);

    let mut finder = ActiveFinder::new(&registry, "Order", &["itemCount".into()]).unwrap();
    let orders = finder.find_all(&executor, &Criteria::new()).unwrap();

    assert_eq!(executor.statements().len(), 2);
    assert_eq!(
        executor.sql(0),
        "SELECT \"t\".\"id\" AS \"t0_c0\", \"t\".\"customer_id\" AS \"t0_c1\", \"t\".\"status\" AS \"t0_c2\" \
         FROM \"orders\" \"t\""
    );
    assert_eq!(
        executor.sql(1),
        "SELECT \"itemCount\".\"order_id\" AS \"c0\", COUNT(*) AS \"s\" FROM \"items\" \"itemCount\" \
         WHERE (\"itemCount\".\"order_id\" IN ($1, $2)) GROUP BY \"itemCount\".\"order_id\""
    );
    assert_eq!(executor.params(1), vec![int(1), int(2)]);

    assert_eq!(orders[0].borrow().stat("itemCount"), Some(&Value::BigInt(Some(3))));
    assert_eq!(orders[1].borrow().stat("itemCount"), Some(&int(0)));
}

#[test]
fn test_stat_skipped_without_parent_records() {
    let registry = registry();
    let executor = ScriptedExecutor::new();
    let mut finder = ActiveFinder::new(&registry, "Order", &["itemCount".into()]).unwrap();

    let orders = finder.find_all(&executor, &Criteria::new()).unwrap();
    assert!(orders.is_empty());
    assert_eq!(executor.statements().len(), 1);
}

#[test]
fn test_lazy_stat_uses_declared_default() {
    let registry = registry();
    let executor = ScriptedExecutor::new();
    let record = Record::new("Order", Row::new().with("id", 9), None).into_ref();

    LazyLoader::new(&registry, &executor)
        .load(&record, "itemCount")
        .unwrap();

    assert_eq!(
        executor.sql(0),
        "SELECT \"itemCount\".\"order_id\" AS \"c0\", COUNT(*) AS \"s\" FROM \"items\" \"itemCount\" \
         WHERE (\"itemCount\".\"order_id\" IN ($1)) GROUP BY \"itemCount\".\"order_id\""
    );
    assert_eq!(record.borrow().stat("itemCount"), Some(&int(0)));
}

#[test]
fn test_stat_cannot_have_children() {
    let registry = registry();
    let err = ActiveFinder::new(&registry, "Order", &["itemCount.order".into()]).unwrap_err();
    assert!(matches!(
        err,
        FinderError::InvalidNesting { ref relation } if relation == "itemCount"
    ));
}

#[test]
fn test_stat_select_and_condition_from_options() {
    let registry = registry();
    let executor = ScriptedExecutor::new()
        .respond(vec![order_row(1, 3)])
        .respond(vec![Row::new().with("c0", 1).with("s", 12i64)]);
    let spec = RelationSpec::nested(
        "itemCount",
        RelationOptions::new()
            .select(Selection::columns(&["SUM(\"itemCount\".\"qty\")"]))
            .condition("\"itemCount\".\"qty\" > :min")
            .param("min", 1),
    );

    let mut finder = ActiveFinder::new(&registry, "Order", &[spec]).unwrap();
    let orders = finder.find_all(&executor, &Criteria::new()).unwrap();

    assert_eq!(
        executor.sql(1),
        "SELECT \"itemCount\".\"order_id\" AS \"c0\", SUM(\"itemCount\".\"qty\") AS \"s\" FROM \"items\" \"itemCount\" \
         WHERE (\"itemCount\".\"qty\" > $1) AND (\"itemCount\".\"order_id\" IN ($2)) GROUP BY \"itemCount\".\"order_id\""
    );
    assert_eq!(executor.params(1), vec![int(1), int(1)]);
    assert_eq!(orders[0].borrow().stat("itemCount"), Some(&Value::BigInt(Some(12))));
}
