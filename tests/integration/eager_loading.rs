//! Eager loading through `ActiveFinder::find_all` and friends

mod common;

use active_finder::{
    ActiveFinder, Criteria, FinderError, Record, Related, RelationOptions, RelationSpec, Row,
    Selection,
};
use common::*;
use sea_query::Value;
use std::rc::Rc;

const ORDER_COLUMNS: &str = "\"t\".\"id\" AS \"t0_c0\", \"t\".\"customer_id\" AS \"t0_c1\", \"t\".\"status\" AS \"t0_c2\"";

fn item_columns(alias: &str, node: usize) -> String {
    ["id", "order_id", "product_id", "qty"]
        .iter()
        .enumerate()
        .map(|(i, c)| format!("\"{alias}\".\"{c}\" AS \"t{node}_c{i}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

#[test]
fn test_items_and_products_in_one_statement() {
    let registry = registry();
    let executor = ScriptedExecutor::new().respond(vec![
        product_cols(item_cols(order_row(1, 3), 1, 10, 1, 100), 2, 100),
        product_cols(item_cols(order_row(1, 3), 1, 11, 1, 100), 2, 100),
        null_cols(null_cols(order_row(2, 4), 1, 4), 2, 2),
    ]);

    let mut finder = ActiveFinder::new(&registry, "Order", &["items.product".into()]).unwrap();
    let orders = finder.find_all(&executor, &Criteria::new()).unwrap();

    assert_eq!(executor.statements().len(), 1);
    assert_eq!(
        executor.sql(0),
        format!(
            "SELECT {ORDER_COLUMNS}, {}, \"product\".\"id\" AS \"t2_c0\", \"product\".\"title\" AS \"t2_c1\" \
             FROM \"orders\" \"t\" \
             LEFT OUTER JOIN \"items\" \"items\" ON (\"items\".\"order_id\"=\"t\".\"id\") \
             LEFT OUTER JOIN \"products\" \"product\" ON (\"items\".\"product_id\"=\"product\".\"id\")",
            item_columns("items", 1)
        )
    );

    assert_eq!(orders.len(), 2);
    let first = orders[0].borrow();
    assert_eq!(first.get("id"), Some(&int(1)));
    let items = first.many("items");
    assert_eq!(items.len(), 2);
    let a = items[0].borrow().one("product").unwrap();
    let b = items[1].borrow().one("product").unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(a.borrow().get("id"), Some(&int(100)));

    let second = orders[1].borrow();
    assert!(matches!(second.related("items"), Some(Related::Many(v)) if v.is_empty()));
}

#[test]
fn test_repeated_path_segments_get_unique_aliases() {
    let registry = registry();
    let mut finder = ActiveFinder::new(
        &registry,
        "Order",
        &["customer".into(), "items.order.customer".into()],
    )
    .unwrap();

    let tree = finder.tree();
    assert_eq!(tree.find("customer").map(|id| tree.node(id).table_alias()), Some("customer"));
    let nested = tree.find("items.order.customer").unwrap();
    assert_eq!(tree.node(nested).table_alias(), format!("customer_{nested}"));

    let sql = finder.build_query(&Criteria::new()).unwrap().sql;
    assert!(sql.contains("\"customers\" \"customer\" ON"));
    assert!(sql.contains(&format!("\"customers\" \"customer_{nested}\" ON")));
    assert!(sql.contains("\"orders\" \"order\" ON (\"items\".\"order_id\"=\"order\".\"id\")"));
}

#[test]
fn test_cross_product_rows_are_deduplicated() {
    let registry = registry();
    let mut rows = Vec::new();
    for item in [10, 11] {
        for (tag, label) in [(1, "rush"), (2, "gift")] {
            rows.push(tag_cols(item_cols(order_row(1, 3), 1, item, 1, 100), 2, tag, label));
        }
    }
    let executor = ScriptedExecutor::new().respond(rows);

    let mut finder = ActiveFinder::new(&registry, "Order", &["items".into(), "tags".into()]).unwrap();
    let orders = finder.find_all(&executor, &Criteria::new()).unwrap();

    assert!(executor.sql(0).contains(
        "LEFT OUTER JOIN \"order_tags\" \"tags_tags\" ON (\"t\".\"id\"=\"tags_tags\".\"order_id\") \
         LEFT OUTER JOIN \"tags\" \"tags\" ON (\"tags\".\"id\"=\"tags_tags\".\"tag_id\")"
    ));
    assert_eq!(orders.len(), 1);
    let order = orders[0].borrow();
    assert_eq!(order.many("items").len(), 2);
    let labels: Vec<Value> = order
        .many("tags")
        .iter()
        .filter_map(|t| t.borrow().get("label").cloned())
        .collect();
    assert_eq!(labels, vec![Value::from("rush"), Value::from("gift")]);
}

#[test]
fn test_limit_defers_plural_relation_to_key_range_query() {
    let registry = registry();
    let executor = ScriptedExecutor::new()
        .respond(vec![order_row(1, 3), order_row(2, 4)])
        .respond(vec![
            item_cols(Row::new().with("t0_c0", 1), 1, 10, 1, 100),
            item_cols(Row::new().with("t0_c0", 1), 1, 11, 1, 101),
        ]);

    let mut finder = ActiveFinder::new(&registry, "Order", &["items".into()]).unwrap();
    let orders = finder
        .find_all(&executor, &Criteria::new().order("t.id").limit(2))
        .unwrap();

    assert_eq!(executor.statements().len(), 2);
    assert_eq!(
        executor.sql(0),
        format!("SELECT {ORDER_COLUMNS} FROM \"orders\" \"t\" ORDER BY t.id LIMIT 2")
    );
    assert_eq!(
        executor.sql(1),
        format!(
            "SELECT \"t\".\"id\" AS \"t0_c0\", {} FROM \"orders\" \"t\" \
             LEFT OUTER JOIN \"items\" \"items\" ON (\"items\".\"order_id\"=\"t\".\"id\") \
             WHERE (\"t\".\"id\" IN ($1, $2))",
            item_columns("items", 1)
        )
    );
    assert_eq!(executor.params(1), vec![int(1), int(2)]);

    assert_eq!(orders[0].borrow().many("items").len(), 2);
    assert!(orders[1].borrow().has_related("items"));
    assert!(orders[1].borrow().many("items").is_empty());
}

#[test]
fn test_together_keeps_plural_relation_in_limited_statement() {
    let registry = registry();
    let executor = ScriptedExecutor::new();
    let mut finder = ActiveFinder::new(&registry, "Order", &["items".into()]).unwrap();
    finder
        .find_all(&executor, &Criteria::new().limit(2).together(true))
        .unwrap();

    assert_eq!(executor.statements().len(), 1);
    assert!(executor.sql(0).contains("LEFT OUTER JOIN \"items\" \"items\""));
    assert!(executor.sql(0).ends_with("LIMIT 2"));
}

#[test]
fn test_single_sided_junction_fails_before_executing() {
    let registry = registry();
    let executor = ScriptedExecutor::new();
    let mut finder = ActiveFinder::new(&registry, "Order", &["badTags".into()]).unwrap();

    let err = finder.find_all(&executor, &Criteria::new()).unwrap_err();
    assert!(matches!(
        err,
        FinderError::IncompleteForeignKey { ref entity, ref relation } if entity == "Order" && relation == "badTags"
    ));
    assert!(executor.statements().is_empty());
}

#[test]
fn test_unknown_relation_is_rejected_at_construction() {
    let registry = registry();
    let err = ActiveFinder::new(&registry, "Order", &["items.supplier".into()]).unwrap_err();
    assert!(matches!(
        err,
        FinderError::UnknownRelation { ref entity, ref relation } if entity == "Item" && relation == "supplier"
    ));
    assert_eq!(
        err.to_string(),
        "Relation \"supplier\" is not defined in entity \"Item\""
    );
}

#[test]
fn test_executor_failure_is_propagated() {
    let registry = registry();
    let mut finder = ActiveFinder::new(&registry, "Order", &["items".into()]).unwrap();
    let err = finder.find_all(&FailingExecutor, &Criteria::new()).unwrap_err();
    assert!(matches!(err, FinderError::Execution(_)));
}

#[test]
fn test_find_with_base_loads_relations_for_given_records() {
    let registry = registry();
    let base: Vec<_> = [(1, 3), (2, 4)]
        .iter()
        .map(|&(id, customer)| {
            Record::new(
                "Order",
                Row::new().with("id", id).with("customer_id", customer),
                None,
            )
            .into_ref()
        })
        .collect();
    let executor = ScriptedExecutor::new().respond(vec![
        item_cols(customer_cols(Row::new().with("t0_c0", 1), 1, 3), 2, 10, 1, 100),
        null_cols(customer_cols(Row::new().with("t0_c0", 2), 1, 4), 2, 4),
    ]);

    let mut finder =
        ActiveFinder::new(&registry, "Order", &["customer".into(), "items".into()]).unwrap();
    finder.find_with_base(&executor, &base).unwrap();

    assert_eq!(executor.statements().len(), 1);
    assert_eq!(
        executor.sql(0),
        format!(
            "SELECT \"t\".\"id\" AS \"t0_c0\", \"customer\".\"id\" AS \"t1_c0\", \"customer\".\"name\" AS \"t1_c1\", {} \
             FROM \"orders\" \"t\" \
             LEFT OUTER JOIN \"customers\" \"customer\" ON (\"t\".\"customer_id\"=\"customer\".\"id\") \
             LEFT OUTER JOIN \"items\" \"items\" ON (\"items\".\"order_id\"=\"t\".\"id\") \
             WHERE (\"t\".\"id\" IN ($1, $2))",
            item_columns("items", 2)
        )
    );

    let first = base[0].borrow();
    assert_eq!(first.one("customer").unwrap().borrow().get("id"), Some(&int(3)));
    assert_eq!(first.many("items").len(), 1);
    assert!(base[1].borrow().many("items").is_empty());
}

#[test]
fn test_find_with_base_requires_primary_key() {
    let registry = registry();
    let record = Record::new("Order", Row::new().with("status", "open"), None).into_ref();
    let mut finder = ActiveFinder::new(&registry, "Order", &["items".into()]).unwrap();

    let err = finder
        .find_with_base(&ScriptedExecutor::new(), &[record])
        .unwrap_err();
    assert!(matches!(
        err,
        FinderError::MissingAttribute { ref attribute, .. } if attribute == "id"
    ));
}

#[test]
fn test_for_each_row_delivers_one_record_per_row() {
    let registry = registry();
    let executor = ScriptedExecutor::new().respond(vec![
        item_cols(order_row(1, 3), 1, 10, 1, 100),
        item_cols(order_row(1, 3), 1, 11, 1, 101),
        null_cols(order_row(2, 4), 1, 4),
    ]);

    let mut finder = ActiveFinder::new(&registry, "Order", &["items".into()]).unwrap();
    let mut seen = Vec::new();
    let delivered = finder
        .for_each_row(&executor, &Criteria::new(), |order| {
            seen.push(order);
            true
        })
        .unwrap();

    assert_eq!(delivered, 3);
    assert_eq!(seen[0].borrow().many("items").len(), 1);
    assert_eq!(seen[1].borrow().many("items").len(), 1);
    assert!(!Rc::ptr_eq(&seen[0], &seen[1]));
    assert!(seen[2].borrow().many("items").is_empty());
}

#[test]
fn test_for_each_row_stops_when_callback_declines() {
    let registry = registry();
    let executor = ScriptedExecutor::new().respond(vec![order_row(1, 3), order_row(2, 4)]);
    let mut finder = ActiveFinder::new(&registry, "Order", &[]).unwrap();

    let delivered = finder
        .for_each_row(&executor, &Criteria::new(), |_| false)
        .unwrap();
    assert_eq!(delivered, 1);
}

#[test]
fn test_for_each_row_joins_plural_relations_under_limit() {
    let registry = registry();
    let executor = ScriptedExecutor::new()
        .respond(vec![
            item_cols(order_row(1, 3), 1, 10, 1, 100),
            null_cols(order_row(2, 4), 1, 4),
        ])
        .respond(vec![Row::new().with("c0", 1).with("s", 3i64)])
        .respond(vec![]);

    let mut finder =
        ActiveFinder::new(&registry, "Order", &["items".into(), "itemCount".into()]).unwrap();
    let mut seen = Vec::new();
    let delivered = finder
        .for_each_row(&executor, &Criteria::new().limit(10), |order| {
            seen.push(order);
            true
        })
        .unwrap();

    assert_eq!(delivered, 2);
    assert_eq!(executor.statements().len(), 3);
    assert_eq!(
        executor.sql(0),
        format!(
            "SELECT {ORDER_COLUMNS}, {} FROM \"orders\" \"t\" \
             LEFT OUTER JOIN \"items\" \"items\" ON (\"items\".\"order_id\"=\"t\".\"id\") LIMIT 10",
            item_columns("items", 1)
        )
    );
    assert_eq!(
        executor.sql(1),
        "SELECT \"itemCount\".\"order_id\" AS \"c0\", COUNT(*) AS \"s\" FROM \"items\" \"itemCount\" \
         WHERE (\"itemCount\".\"order_id\" IN ($1)) GROUP BY \"itemCount\".\"order_id\""
    );
    assert_eq!(executor.params(1), vec![int(1)]);
    assert_eq!(executor.params(2), vec![int(2)]);

    assert_eq!(seen[0].borrow().many("items").len(), 1);
    assert_eq!(seen[0].borrow().stat("itemCount"), Some(&Value::BigInt(Some(3))));
    assert!(seen[1].borrow().many("items").is_empty());
    assert_eq!(seen[1].borrow().stat("itemCount"), Some(&int(0)));
}

#[test]
fn test_for_each_row_ignores_together_false() {
    let registry = registry();
    let executor = ScriptedExecutor::new().respond(vec![item_cols(order_row(1, 3), 1, 10, 1, 100)]);
    let spec = RelationSpec::nested("items", RelationOptions::new().together(false));

    let mut finder = ActiveFinder::new(&registry, "Order", &[spec]).unwrap();
    let mut items = 0;
    finder
        .for_each_row(&executor, &Criteria::new().offset(5), |order| {
            items += order.borrow().many("items").len();
            true
        })
        .unwrap();

    assert_eq!(executor.statements().len(), 1);
    assert!(executor.sql(0).contains("LEFT OUTER JOIN \"items\" \"items\""));
    assert_eq!(items, 1);
}

#[test]
fn test_for_each_row_reports_failed_stat_query() {
    let registry = registry();
    let mut finder = ActiveFinder::new(&registry, "Order", &["itemCount".into()]).unwrap();
    let mut delivered = 0;
    let err = finder
        .for_each_row(&StatFailingExecutor, &Criteria::new(), |_| {
            delivered += 1;
            true
        })
        .unwrap_err();

    assert!(matches!(err, FinderError::Execution(_)));
    assert_eq!(delivered, 0);
}

#[test]
fn test_repeated_find_all_keeps_custom_select() {
    let registry = registry();
    let tagged = || Row::new().with("t0_c0", 1).with("tagged", "paidx");
    let executor = ScriptedExecutor::new()
        .respond(vec![tagged()])
        .respond(vec![Row::new().with("count", 1i64)])
        .respond(vec![tagged()]);
    let criteria = Criteria::new().select(Selection::columns(&["id", "t.status || 'x' AS tagged"]));

    let mut finder = ActiveFinder::new(&registry, "Order", &[]).unwrap();
    finder.find_all(&executor, &criteria).unwrap();
    finder.count(&executor, &criteria).unwrap();
    let orders = finder.find_all(&executor, &criteria).unwrap();

    let expected = "SELECT \"t\".\"id\" AS \"t0_c0\", t.status || 'x' AS tagged FROM \"orders\" \"t\"";
    assert_eq!(executor.sql(0), expected);
    assert_eq!(executor.sql(2), expected);
    assert_eq!(orders[0].borrow().get("tagged"), Some(&Value::from("paidx")));
}

#[test]
fn test_composite_key_range_query() {
    let registry = registry();
    let line = |line_no: i32| {
        Row::new()
            .with("t0_c0", 1)
            .with("t0_c1", line_no)
            .with("t0_c2", format!("SKU-{line_no}"))
    };
    let note = |line_no: i32, id: i32| {
        Row::new()
            .with("t0_c0", 1)
            .with("t0_c1", line_no)
            .with("t1_c0", id)
            .with("t1_c1", 1)
            .with("t1_c2", line_no)
            .with("t1_c3", "fragile")
    };
    let executor = ScriptedExecutor::new()
        .respond(vec![line(1), line(2)])
        .respond(vec![note(2, 50), note(2, 51)]);

    let mut finder = ActiveFinder::new(&registry, "OrderLine", &["notes".into()]).unwrap();
    let lines = finder.find_all(&executor, &Criteria::new().limit(2)).unwrap();

    assert_eq!(
        executor.sql(1),
        "SELECT \"t\".\"order_id\" AS \"t0_c0\", \"t\".\"line_no\" AS \"t0_c1\", \
         \"notes\".\"id\" AS \"t1_c0\", \"notes\".\"order_id\" AS \"t1_c1\", \
         \"notes\".\"line_no\" AS \"t1_c2\", \"notes\".\"body\" AS \"t1_c3\" \
         FROM \"order_lines\" \"t\" \
         LEFT OUTER JOIN \"line_notes\" \"notes\" ON (\"notes\".\"order_id\"=\"t\".\"order_id\") AND (\"notes\".\"line_no\"=\"t\".\"line_no\") \
         WHERE ((\"t\".\"order_id\"=$1 AND \"t\".\"line_no\"=$2) OR (\"t\".\"order_id\"=$3 AND \"t\".\"line_no\"=$4))"
    );
    assert_eq!(executor.params(1), vec![int(1), int(1), int(1), int(2)]);
    assert!(lines[0].borrow().many("notes").is_empty());
    assert_eq!(lines[1].borrow().many("notes").len(), 2);
}

#[test]
fn test_clear_records_forgets_decoded_rows() {
    let registry = registry();
    let executor = ScriptedExecutor::new()
        .respond(vec![order_row(1, 3)])
        .respond(vec![order_row(1, 3)]);
    let mut finder = ActiveFinder::new(&registry, "Order", &[]).unwrap();

    let first = finder.find_all(&executor, &Criteria::new()).unwrap();
    let second = finder.find_all(&executor, &Criteria::new()).unwrap();
    assert!(!Rc::ptr_eq(&first[0], &second[0]));
    finder.destroy();
}
