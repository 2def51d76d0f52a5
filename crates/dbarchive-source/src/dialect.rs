//! SQL dialect abstraction for dbarchive-source
//!
//! Builds every statement the engine issues against the source:
//! - catalog listing (`SHOW DATABASES`, `SHOW TABLES FROM`)
//! - cardinality and range aggregates (`COUNT(*)`, `MIN()`/`MAX()`)
//! - bounded extraction (`SELECT *`) and throttled cleanup (`DELETE ... LIMIT`)
//!
//! SELECT and DELETE statements go through sea-query; the user-supplied
//! filter predicate is spliced in verbatim after validation by [`Predicate`].

use sea_query::{Alias, Asterisk, Expr, Func, IntoIden, MysqlQueryBuilder, Query, TableRef};

use crate::catalog::TableIdentifier;
use crate::error::{Error, Result};

fn sea_table_ref(table: &TableIdentifier) -> TableRef {
    TableRef::SchemaTable(
        Alias::new(table.database.as_str()).into_iden(),
        Alias::new(table.table.as_str()).into_iden(),
    )
}

/// SQL dialect for vendor-specific SQL generation
pub trait SqlDialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Quote an identifier (database, table, column name)
    fn quote_identifier(&self, name: &str) -> String;

    /// Fully qualified, quoted table name
    fn qualified_table(&self, table: &TableIdentifier) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(&table.database),
            self.quote_identifier(&table.table)
        )
    }

    /// Statement listing every database visible to the session
    fn list_databases_sql(&self) -> String;

    /// Statement listing every table in `database`
    fn list_tables_sql(&self, database: &str) -> String;

    /// `COUNT(*)` of rows matching `predicate`
    fn count_sql(&self, table: &TableIdentifier, predicate: &Predicate) -> String;

    /// `MIN(column), MAX(column)` over rows matching `predicate`
    fn min_max_sql(&self, table: &TableIdentifier, column: &str, predicate: &Predicate) -> String;

    /// `SELECT *` restricted by a caller-built bound and the outer filter
    fn select_sql(&self, table: &TableIdentifier, bound: &str, filter: &Predicate) -> String;

    /// `DELETE` of at most `limit` rows matching `predicate`
    fn delete_limit_sql(&self, table: &TableIdentifier, predicate: &Predicate, limit: u64)
        -> String;

    /// Inclusive key-range bound `column >= start AND column <= end`
    fn key_range_condition(&self, column: &str, start: u64, end: u64) -> String {
        let col = self.quote_identifier(column);
        format!("{col} >= {start} AND {col} <= {end}")
    }
}

/// MySQL dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn list_databases_sql(&self) -> String {
        "SHOW DATABASES".to_string()
    }

    fn list_tables_sql(&self, database: &str) -> String {
        format!("SHOW TABLES FROM {}", self.quote_identifier(database))
    }

    fn count_sql(&self, table: &TableIdentifier, predicate: &Predicate) -> String {
        let mut stmt = Query::select();
        stmt.expr(Func::count(Expr::col(Asterisk)))
            .from(sea_table_ref(table));
        if let Some(cond) = predicate.as_condition() {
            stmt.and_where(Expr::cust(cond));
        }
        stmt.to_string(MysqlQueryBuilder)
    }

    fn min_max_sql(&self, table: &TableIdentifier, column: &str, predicate: &Predicate) -> String {
        let mut stmt = Query::select();
        stmt.expr(Func::min(Expr::col(Alias::new(column))))
            .expr(Func::max(Expr::col(Alias::new(column))))
            .from(sea_table_ref(table));
        if let Some(cond) = predicate.as_condition() {
            stmt.and_where(Expr::cust(cond));
        }
        stmt.to_string(MysqlQueryBuilder)
    }

    fn select_sql(&self, table: &TableIdentifier, bound: &str, filter: &Predicate) -> String {
        let mut stmt = Query::select();
        stmt.column(Asterisk).from(sea_table_ref(table));
        if !bound.trim().is_empty() {
            stmt.and_where(Expr::cust(format!("({})", bound.trim())));
        }
        if let Some(cond) = filter.as_condition() {
            stmt.and_where(Expr::cust(cond));
        }
        stmt.to_string(MysqlQueryBuilder)
    }

    fn delete_limit_sql(
        &self,
        table: &TableIdentifier,
        predicate: &Predicate,
        limit: u64,
    ) -> String {
        let mut stmt = Query::delete();
        stmt.from_table(sea_table_ref(table));
        if let Some(cond) = predicate.as_condition() {
            stmt.and_where(Expr::cust(cond));
        }
        stmt.limit(limit);
        stmt.to_string(MysqlQueryBuilder)
    }
}

/// A validated boolean SQL condition used as a filter
///
/// An empty condition means "every row" and produces no WHERE clause.
/// Validation is lexical only: it rejects statement terminators and comment
/// openers (`--`, `#`, `/*`) outside literals, unterminated quotes and
/// unbalanced parentheses, which is enough
/// to fail fast before any statement is sent. Semantic errors still surface
/// from the source as query errors.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Predicate {
    sql: String,
}

impl Predicate {
    /// Predicate matching every row
    pub fn always() -> Self {
        Self::default()
    }

    /// Validate and wrap a raw condition
    pub fn parse(raw: &str) -> Result<Self> {
        let sql = raw.trim();
        if sql.is_empty() {
            return Ok(Self::always());
        }
        check_condition(sql)?;
        Ok(Self {
            sql: sql.to_string(),
        })
    }

    /// Whether this predicate matches every row
    #[inline]
    pub fn is_always(&self) -> bool {
        self.sql.is_empty()
    }

    /// The raw condition text (empty for [`Predicate::always`])
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.sql
    }

    /// Parenthesised condition ready to be AND-ed, or `None` when it matches
    /// every row
    pub fn as_condition(&self) -> Option<String> {
        if self.is_always() {
            None
        } else {
            Some(format!("({})", self.sql))
        }
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_always() {
            write!(f, "TRUE")
        } else {
            write!(f, "{}", self.sql)
        }
    }
}

fn comment_error(sql: &str, opener: &str) -> Error {
    Error::config(format!(
        "invalid predicate '{sql}': comment '{opener}' not allowed"
    ))
}

fn check_condition(sql: &str) -> Result<()> {
    let mut depth: usize = 0;
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == '\\' && q != '`' {
                chars.next();
            } else if c == q {
                // doubled quote is an escaped quote
                if chars.peek() == Some(&q) {
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    Error::config(format!("invalid predicate '{sql}': unbalanced ')'"))
                })?;
            }
            ';' => {
                return Err(Error::config(format!(
                    "invalid predicate '{sql}': statement terminator not allowed"
                )));
            }
            '#' => return Err(comment_error(sql, "#")),
            '-' if chars.peek() == Some(&'-') => return Err(comment_error(sql, "--")),
            '/' if chars.peek() == Some(&'*') => return Err(comment_error(sql, "/*")),
            _ => {}
        }
    }

    if let Some(q) = quote {
        return Err(Error::config(format!(
            "invalid predicate '{sql}': unterminated {q} literal"
        )));
    }
    if depth != 0 {
        return Err(Error::config(format!(
            "invalid predicate '{sql}': unbalanced '('"
        )));
    }
    Ok(())
}
