//! Tests for dbarchive-source catalog module

use dbarchive_source::prelude::*;
use dbarchive_source::testing::MockConnection;

fn catalog() -> MockConnection {
    MockConnection::new()
        .with_names(
            "SHOW DATABASES",
            ["information_schema", "inventory", "mysql", "sales_eu", "sales_us"],
        )
        .with_names("SHOW TABLES FROM `sales_eu`", ["orders"])
        .with_names("SHOW TABLES FROM `sales_us`", ["orders"])
        .with_names("SHOW TABLES FROM `inventory`", ["widgets", "widgets_old"])
        .with_names("SHOW TABLES FROM `mysql`", ["user", "db"])
}

// ==================== Resolution Tests ====================

#[tokio::test]
async fn test_resolve_sales_and_inventory() {
    let conn = catalog();
    let selectors = TableSelector::parse_all(["^sales@.*", "^inventory@widgets$"]).unwrap();

    let tables = CatalogResolver::new(&conn, &MySqlDialect)
        .resolve(&selectors, None)
        .await
        .unwrap();

    assert_eq!(tables.len(), 3);
    assert!(tables.contains("sales_eu", "orders"));
    assert!(tables.contains("sales_us", "orders"));
    assert!(tables.contains("inventory", "widgets"));
    assert!(!tables.contains("inventory", "widgets_old"));
    assert_eq!(
        tables.databases().collect::<Vec<_>>(),
        vec!["inventory", "sales_eu", "sales_us"]
    );
}

#[tokio::test]
async fn test_databases_listed_once_and_tables_cached() {
    let conn = catalog();
    let selectors = TableSelector::parse_all(["^sales_eu@ord", "sales@.*", "^inventory@w"]).unwrap();

    let tables = CatalogResolver::new(&conn, &MySqlDialect)
        .resolve(&selectors, None)
        .await
        .unwrap();

    assert_eq!(tables.len(), 4);
    assert_eq!(conn.count_prefix("SHOW DATABASES"), 1);
    assert_eq!(conn.count_prefix("SHOW TABLES FROM `sales_eu`"), 1);
    assert_eq!(conn.count_prefix("SHOW TABLES FROM `mysql`"), 0);
}

#[tokio::test]
async fn test_explicit_table_bypasses_matching() {
    let conn = catalog();
    let explicit = TableIdentifier::new("archive", "not_in_catalog");

    let tables = CatalogResolver::new(&conn, &MySqlDialect)
        .resolve(&[], Some(&explicit))
        .await
        .unwrap();

    assert_eq!(tables.iter().collect::<Vec<_>>(), vec![explicit]);
    assert!(conn.executed().is_empty());
}

#[tokio::test]
async fn test_no_match_is_empty_not_error() {
    let conn = catalog();
    let selectors = TableSelector::parse_all(["^nothing@.*"]).unwrap();

    let tables = CatalogResolver::new(&conn, &MySqlDialect)
        .resolve(&selectors, None)
        .await
        .unwrap();
    assert!(tables.is_empty());
}

#[tokio::test]
async fn test_list_failure_aborts_resolution() {
    let conn = MockConnection::new()
        .with_names("SHOW DATABASES", ["sales_eu", "sales_us"])
        .with_names("SHOW TABLES FROM `sales_eu`", ["orders"])
        .fail_on("SHOW TABLES FROM `sales_us`", "access denied");
    let selectors = TableSelector::parse_all(["^sales@.*"]).unwrap();

    let err = CatalogResolver::new(&conn, &MySqlDialect)
        .resolve(&selectors, None)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Query);
    assert_eq!(err.sql(), Some("SHOW TABLES FROM `sales_us`"));
    assert_eq!(
        err.to_string(),
        "list tables failed for sales_us.*: query error: access denied"
    );
}

#[tokio::test]
async fn test_database_list_failure_names_operation() {
    let conn = MockConnection::new().fail_on("SHOW DATABASES", "server has gone away");
    let selectors = TableSelector::parse_all(["^sales@.*"]).unwrap();

    let err = CatalogResolver::new(&conn, &MySqlDialect)
        .resolve(&selectors, None)
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("list databases failed"));
    assert_eq!(err.sql(), Some("SHOW DATABASES"));
}

#[tokio::test]
async fn test_explicit_table_overlapping_selector_appears_once() {
    let conn = catalog();
    let selectors = TableSelector::parse_all(["^sales@orders$"]).unwrap();
    let explicit = TableIdentifier::new("sales_eu", "orders");

    let tables = CatalogResolver::new(&conn, &MySqlDialect)
        .resolve(&selectors, Some(&explicit))
        .await
        .unwrap();

    assert_eq!(tables.len(), 2);
    let names: Vec<String> = tables.iter().map(|t| t.to_string()).collect();
    assert_eq!(names, vec!["sales_eu.orders", "sales_us.orders"]);
}

#[tokio::test]
async fn test_explicit_table_added_to_selector_matches() {
    let conn = catalog();
    let selectors = TableSelector::parse_all(["^inventory@widgets$"]).unwrap();
    let explicit = TableIdentifier::new("archive", "not_in_catalog");

    let tables = CatalogResolver::new(&conn, &MySqlDialect)
        .resolve(&selectors, Some(&explicit))
        .await
        .unwrap();

    assert_eq!(tables.len(), 2);
    assert!(tables.contains("inventory", "widgets"));
    assert!(tables.contains("archive", "not_in_catalog"));
}

#[tokio::test]
async fn test_list_helpers() {
    let conn = catalog();
    let resolver = CatalogResolver::new(&conn, &MySqlDialect);
    let selector = TableSelector::parse("^sales@^o").unwrap();

    assert_eq!(
        resolver.list_databases(&selector).await.unwrap(),
        vec!["sales_eu", "sales_us"]
    );
    assert_eq!(
        resolver.list_tables(&selector, "inventory").await.unwrap(),
        Vec::<String>::new()
    );
}

// ==================== Selector Tests ====================

#[test]
fn test_selector_requires_delimiter() {
    let err = TableSelector::parse("sales.orders").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert!(err.to_string().contains("sales.orders"));
}

#[test]
fn test_selector_regex_metacharacters() {
    let selector = TableSelector::parse("^sales_(eu|us)$@^orders_\\d{4}$").unwrap();
    assert!(selector.matches_database("sales_us"));
    assert!(!selector.matches_database("sales_apac"));
    assert!(selector.matches_table("orders_2024"));
    assert!(!selector.matches_table("orders_latest"));
}
