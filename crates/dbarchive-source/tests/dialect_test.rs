//! Tests for dbarchive-source dialect module

use dbarchive_source::prelude::*;

fn widgets() -> TableIdentifier {
    TableIdentifier::new("inventory", "widgets")
}

// ==================== Statement Tests ====================

#[test]
fn test_statements_are_fully_qualified() {
    let d = MySqlDialect;
    let pred = Predicate::always();

    for sql in [
        d.count_sql(&widgets(), &pred),
        d.min_max_sql(&widgets(), "id", &pred),
        d.select_sql(&widgets(), "", &pred),
        d.delete_limit_sql(&widgets(), &pred, 10),
    ] {
        assert!(sql.contains("`inventory`.`widgets`"), "{sql}");
        assert!(!sql.contains("WHERE"), "{sql}");
    }
}

#[test]
fn test_identifiers_with_backticks_are_escaped() {
    let table = TableIdentifier::new("odd`db", "t");
    assert_eq!(MySqlDialect.qualified_table(&table), "`odd``db`.`t`");
    assert_eq!(MySqlDialect.list_tables_sql("odd`db"), "SHOW TABLES FROM `odd``db`");
}

#[test]
fn test_predicate_is_parenthesised() {
    let pred = Predicate::parse("a = 1 OR b = 2").unwrap();
    let sql = MySqlDialect.select_sql(&widgets(), "`id` >= 1 AND `id` <= 5", &pred);

    // the OR must not escape the bound
    assert!(sql.contains("(a = 1 OR b = 2)"));
    assert!(sql.contains("`id` >= 1 AND `id` <= 5"));
}

#[test]
fn test_delete_limit_follows_predicate() {
    let pred = Predicate::parse("qty = 0").unwrap();
    let sql = MySqlDialect.delete_limit_sql(&widgets(), &pred, 250);
    let where_at = sql.find("WHERE").unwrap();
    let limit_at = sql.find("LIMIT 250").unwrap();
    assert!(where_at < limit_at);
}

// ==================== Predicate Tests ====================

#[test]
fn test_predicate_validation() {
    for ok in [
        "",
        "id > 10",
        "name = 'O''Brien'",
        "note LIKE 'a\\'b%'",
        "`weird;col` = 1",
        "(a = 1) AND (b IN (1, 2))",
        "note = '-- not a comment'",
        "qty - 1 > 0",
    ] {
        assert!(Predicate::parse(ok).is_ok(), "{ok}");
    }

    for bad in [
        "id > 1;",
        "((a = 1)",
        "a = 1)",
        "name = \"x",
        "`col = 1",
        "archived = 1 -- keep",
        "archived = 1 #keep",
        "archived = 1 /* keep */",
    ] {
        let err = Predicate::parse(bad).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration, "{bad}");
    }
}

#[test]
fn test_predicate_display() {
    assert_eq!(Predicate::always().to_string(), "TRUE");
    assert_eq!(Predicate::parse(" x = 1 ").unwrap().as_str(), "x = 1");
}
