//! Lazy loading of single relations through `LazyLoader`

mod common;

use active_finder::{FinderError, LazyLoader, Record, RecordRef, Related, Row};
use common::*;
use fake::Fake;

fn order(id: i32, customer_id: i32) -> RecordRef {
    Record::new(
        "Order",
        Row::new()
            .with("id", id)
            .with("customer_id", customer_id)
            .with("status", "paid"),
        None,
    )
    .into_ref()
}

fn item(id: i32, order_id: i32, product_id: i32) -> RecordRef {
    let qty: i32 = (1..10).fake();
    Record::new(
        "Item",
        Row::new()
            .with("id", id)
            .with("order_id", order_id)
            .with("product_id", product_id)
            .with("qty", qty),
        None,
    )
    .into_ref()
}

#[test]
fn test_has_many_pins_foreign_key_to_record() {
    let registry = registry();
    let executor = ScriptedExecutor::new().respond(vec![
        item_cols(Row::new(), 1, 10, 7, 100),
        item_cols(Row::new(), 1, 11, 7, 101),
    ]);
    let record = order(7, 3);

    LazyLoader::new(&registry, &executor).load(&record, "items").unwrap();

    assert_eq!(executor.statements().len(), 1);
    assert_eq!(
        executor.sql(0),
        "SELECT \"items\".\"id\" AS \"t1_c0\", \"items\".\"order_id\" AS \"t1_c1\", \
         \"items\".\"product_id\" AS \"t1_c2\", \"items\".\"qty\" AS \"t1_c3\" \
         FROM \"items\" \"items\" WHERE (\"items\".\"order_id\"=$1)"
    );
    assert_eq!(executor.params(0), vec![int(7)]);
    assert_eq!(record.borrow().many("items").len(), 2);
}

#[test]
fn test_belongs_to_pins_primary_key_to_record_attribute() {
    let registry = registry();
    let executor = ScriptedExecutor::new().respond(vec![product_cols(Row::new(), 1, 100)]);
    let record = item(10, 7, 100);

    LazyLoader::new(&registry, &executor).load(&record, "product").unwrap();

    assert_eq!(
        executor.sql(0),
        "SELECT \"product\".\"id\" AS \"t1_c0\", \"product\".\"title\" AS \"t1_c1\" \
         FROM \"products\" \"product\" WHERE (\"product\".\"id\"=$1)"
    );
    assert_eq!(executor.params(0), vec![int(100)]);
    let product = record.borrow().one("product").unwrap();
    assert_eq!(product.borrow().get("id"), Some(&int(100)));
}

#[test]
fn test_singular_without_match_is_none() {
    let registry = registry();
    let executor = ScriptedExecutor::new();
    let record = item(10, 7, 100);

    LazyLoader::new(&registry, &executor).load(&record, "product").unwrap();

    assert!(matches!(record.borrow().related("product"), Some(Related::One(None))));
}

#[test]
fn test_plural_without_match_is_empty_collection() {
    let registry = registry();
    let executor = ScriptedExecutor::new();
    let record = order(7, 3);

    LazyLoader::new(&registry, &executor).load(&record, "items").unwrap();

    assert!(matches!(record.borrow().related("items"), Some(Related::Many(v)) if v.is_empty()));
}

#[test]
fn test_many_many_inner_joins_pinned_junction() {
    let registry = registry();
    let executor = ScriptedExecutor::new().respond(vec![
        tag_cols(Row::new(), 1, 1, "rush"),
        tag_cols(Row::new(), 1, 2, "gift"),
    ]);
    let record = order(7, 3);

    LazyLoader::new(&registry, &executor).load(&record, "tags").unwrap();

    assert_eq!(
        executor.sql(0),
        "SELECT \"tags\".\"id\" AS \"t1_c0\", \"tags\".\"label\" AS \"t1_c1\" FROM \"tags\" \"tags\" \
         INNER JOIN \"order_tags\" \"tags_tags\" ON (\"tags_tags\".\"order_id\"=$1) AND (\"tags\".\"id\"=\"tags_tags\".\"tag_id\")"
    );
    assert_eq!(executor.params(0), vec![int(7)]);
    assert_eq!(record.borrow().many("tags").len(), 2);
}

#[test]
fn test_missing_key_attribute_is_reported() {
    let registry = registry();
    let executor = ScriptedExecutor::new();
    let record = Record::new("Order", Row::new().with("id", 7), None).into_ref();

    let err = LazyLoader::new(&registry, &executor)
        .load(&record, "customer")
        .unwrap_err();

    assert!(matches!(
        err,
        FinderError::MissingAttribute { ref entity, ref attribute } if entity == "Order" && attribute == "customer_id"
    ));
    assert!(executor.statements().is_empty());
}

#[test]
fn test_through_relation_joins_intermediate_table() {
    let registry = registry();
    let executor = ScriptedExecutor::new().respond(vec![product_cols(Row::new(), 1, 100)]);
    let record = order(7, 3);

    LazyLoader::new(&registry, &executor).load(&record, "products").unwrap();

    assert_eq!(
        executor.sql(0),
        "SELECT \"products\".\"id\" AS \"t1_c0\", \"products\".\"title\" AS \"t1_c1\" \
         FROM \"products\" \"products\" \
         LEFT OUTER JOIN \"items\" \"items\" ON (\"items\".\"product_id\"=\"products\".\"id\") \
         WHERE (\"items\".\"order_id\"=$1)"
    );
    assert_eq!(record.borrow().many("products").len(), 1);
    assert!(!record.borrow().has_related("items"));
}

#[test]
fn test_unknown_relation_is_rejected() {
    let registry = registry();
    let executor = ScriptedExecutor::new();
    let record = order(7, 3);

    let err = LazyLoader::new(&registry, &executor)
        .load(&record, "invoices")
        .unwrap_err();
    assert!(matches!(
        err,
        FinderError::UnknownRelation { ref relation, .. } if relation == "invoices"
    ));
}

#[test]
fn test_nested_relation_is_joined_into_lazy_statement() {
    let registry = registry();
    let executor = ScriptedExecutor::new().respond(vec![
        product_cols(item_cols(Row::new(), 1, 10, 7, 100), 2, 100),
        product_cols(item_cols(Row::new(), 1, 11, 7, 100), 2, 100),
    ]);
    let record = order(7, 3);

    LazyLoader::new(&registry, &executor)
        .load(&record, "items.product")
        .unwrap();

    assert_eq!(executor.statements().len(), 1);
    let sql = executor.sql(0);
    assert!(sql.starts_with("SELECT \"items\".\"id\" AS \"t1_c0\""));
    assert!(sql.contains(
        "FROM \"items\" \"items\" LEFT OUTER JOIN \"products\" \"product\" ON (\"items\".\"product_id\"=\"product\".\"id\")"
    ));
    assert!(sql.ends_with("WHERE (\"items\".\"order_id\"=$1)"));

    let items = record.borrow().many("items");
    assert_eq!(items.len(), 2);
    let a = items[0].borrow().one("product").unwrap();
    let b = items[1].borrow().one("product").unwrap();
    assert!(std::rc::Rc::ptr_eq(&a, &b));
}

#[test]
fn test_reload_replaces_previous_collection() {
    let registry = registry();
    let executor = ScriptedExecutor::new()
        .respond(vec![item_cols(Row::new(), 1, 10, 7, 100)])
        .respond(vec![]);
    let record = order(7, 3);
    let loader = LazyLoader::new(&registry, &executor);

    loader.load(&record, "items").unwrap();
    assert_eq!(record.borrow().many("items").len(), 1);
    loader.load(&record, "items").unwrap();
    assert!(record.borrow().many("items").is_empty());
}
