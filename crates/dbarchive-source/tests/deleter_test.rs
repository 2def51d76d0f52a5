//! Tests for dbarchive-source deleter module

use dbarchive_source::prelude::*;
use dbarchive_source::testing::MockConnection;
use std::time::{Duration, Instant};

/// Affected rows equal to the statement's LIMIT
fn limit_of(sql: &str) -> u64 {
    sql.rsplit("LIMIT ")
        .next()
        .and_then(|n| n.trim().parse().ok())
        .unwrap_or(0)
}

fn count(rows: u64) -> Vec<Vec<RawValue>> {
    vec![vec![RawValue::text(rows.to_string())]]
}

fn tables() -> TableSet {
    [
        TableIdentifier::new("inventory", "widgets"),
        TableIdentifier::new("sales", "orders"),
    ]
    .into_iter()
    .collect()
}

// ==================== Single Table Tests ====================

#[tokio::test]
async fn test_ceil_statements_and_all_rows_removed() {
    for (rows, batch, statements) in [(1000, 300, 4), (1000, 1000, 1), (1000, 1, 1000), (999, 1000, 1)] {
        let conn = MockConnection::new()
            .with_prefix_rows("SELECT COUNT(*)", count(rows))
            .with_affected_rows(limit_of);
        let deleter = ThrottledDeleter::new(&conn, &MySqlDialect, batch, Duration::ZERO).unwrap();

        let outcome = deleter
            .delete_table(&TableIdentifier::new("sales", "orders"), &Predicate::always())
            .await
            .unwrap();

        assert_eq!(outcome.statements, statements, "rows={rows} batch={batch}");
        assert_eq!(outcome.rows_deleted, rows);
        assert_eq!(conn.count_prefix("DELETE FROM `sales`.`orders`"), statements as usize);
    }
}

#[tokio::test]
async fn test_pauses_between_statements() {
    let conn = MockConnection::new()
        .with_prefix_rows("SELECT COUNT(*)", count(30))
        .with_affected_rows(limit_of);
    let interval = Duration::from_millis(40);
    let deleter = ThrottledDeleter::new(&conn, &MySqlDialect, 10, interval).unwrap();

    let started = Instant::now();
    let outcome = deleter
        .delete_table(&TableIdentifier::new("sales", "orders"), &Predicate::always())
        .await
        .unwrap();

    assert_eq!(outcome.statements, 3);
    // two pauses between three statements, none after the last
    assert!(started.elapsed() >= interval * 2);
}

#[tokio::test]
async fn test_predicate_scopes_count_and_delete() {
    let conn = MockConnection::new()
        .with_prefix_rows("SELECT COUNT(*)", count(5))
        .with_affected_rows(limit_of);
    let deleter = ThrottledDeleter::new(&conn, &MySqlDialect, 100, Duration::ZERO).unwrap();
    let predicate = Predicate::parse("created_at < '2023-01-01'").unwrap();

    deleter
        .delete_table(&TableIdentifier::new("sales", "orders"), &predicate)
        .await
        .unwrap();

    let executed = conn.executed();
    assert_eq!(executed.len(), 2);
    assert!(executed.iter().all(|sql| sql.contains("created_at < '2023-01-01'")));
    assert!(executed[1].ends_with("LIMIT 5"));
}

#[tokio::test]
async fn test_delete_failure_stops_table() {
    let conn = MockConnection::new()
        .with_prefix_rows("SELECT COUNT(*)", count(50))
        .fail_on_prefix("DELETE", "Lock wait timeout exceeded");
    let deleter = ThrottledDeleter::new(&conn, &MySqlDialect, 10, Duration::ZERO).unwrap();

    let err = deleter
        .delete_table(&TableIdentifier::new("sales", "orders"), &Predicate::always())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("delete failed for sales.orders"));
    assert_eq!(conn.count_prefix("DELETE"), 1);
}

// ==================== Multi Table Tests ====================

#[tokio::test]
async fn test_failure_continues_with_next_table() {
    let conn = MockConnection::new()
        .with_prefix_rows("SELECT COUNT(*)", count(20))
        .fail_on_prefix("DELETE FROM `inventory`.`widgets`", "Lock wait timeout exceeded")
        .with_affected_rows(limit_of);
    let deleter = ThrottledDeleter::new(&conn, &MySqlDialect, 10, Duration::ZERO).unwrap();

    let report = deleter.delete_all(&tables(), &Predicate::always()).await;

    assert!(!report.is_success());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].table(), &TableIdentifier::new("inventory", "widgets"));
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].table, TableIdentifier::new("sales", "orders"));
    assert_eq!(report.rows_deleted(), 20);
    assert_eq!(report.statements(), 2);
}

#[tokio::test]
async fn test_failure_keeps_partial_progress() {
    let orders = TableIdentifier::new("sales", "orders");
    let last = MySqlDialect.delete_limit_sql(&orders, &Predicate::always(), 5);
    let conn = MockConnection::new()
        .with_prefix_rows("SELECT COUNT(*)", count(25))
        .fail_on(last, "Lock wait timeout exceeded")
        .with_affected_rows(limit_of);
    let deleter = ThrottledDeleter::new(&conn, &MySqlDialect, 10, Duration::ZERO).unwrap();
    let only_orders: TableSet = [orders.clone()].into_iter().collect();

    let report = deleter.delete_all(&only_orders, &Predicate::always()).await;

    assert!(report.completed.is_empty());
    let failure = &report.failed[0];
    assert_eq!(failure.table(), &orders);
    assert_eq!(failure.progress.rows_counted, 25);
    assert_eq!(failure.progress.statements, 2);
    assert_eq!(failure.progress.rows_deleted, 20);
    assert!(failure.error.to_string().contains("delete failed for sales.orders"));

    // rows already removed still count toward the run
    assert_eq!(report.rows_deleted(), 20);
    assert_eq!(report.statements(), 2);
}

#[tokio::test]
async fn test_count_failure_is_reported_not_raised() {
    let conn = MockConnection::new()
        .fail_on_prefix("SELECT COUNT(*) FROM `inventory`", "table is marked as crashed")
        .with_prefix_rows("SELECT COUNT(*)", count(0));
    let deleter = ThrottledDeleter::new(&conn, &MySqlDialect, 10, Duration::ZERO).unwrap();

    let report = deleter.delete_all(&tables(), &Predicate::always()).await;
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.statements(), 0);
}

// ==================== Facade Tests ====================

#[tokio::test]
async fn test_delete_after_sync_uses_config() {
    let conn = MockConnection::new()
        .with_prefix_rows("SELECT COUNT(*)", count(7))
        .with_affected_rows(limit_of);

    let mut config = SourceConfig::new("localhost", "root");
    config.db_tables = vec!["^sales@orders$".into()];
    config.batch_size = 3;
    config.delete_after_sync = true;
    config.delete_interval_secs = 0;

    let source = ArchiveSource::new(config, Box::new(conn.clone())).unwrap();
    let only_orders: TableSet = [TableIdentifier::new("sales", "orders")].into_iter().collect();

    let report = source.delete_after_sync(&only_orders).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.statements(), 3);
    assert_eq!(report.rows_deleted(), 7);
}
