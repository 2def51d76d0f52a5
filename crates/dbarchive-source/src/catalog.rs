//! Catalog resolution: turning selectors into concrete tables
//!
//! A selector is `<database-regex>@<table-regex>`. `@` separates the two
//! halves because `.` already means "any character" inside a regex.
//!
//! ```rust,ignore
//! use dbarchive_source::prelude::*;
//!
//! let selectors = TableSelector::parse_all(["^sales@.*", "^inventory@widgets$"])?;
//! let tables = CatalogResolver::new(&conn, &MySqlDialect)
//!     .resolve(&selectors, None)
//!     .await?;
//! for table in tables.iter() {
//!     println!("{table}");
//! }
//! ```

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::connection::Connection;
use crate::dialect::SqlDialect;
use crate::error::{Error, Result};
use crate::types::{RawValue, ResultSet};

/// Delimiter between the database and table halves of a selector
pub const SELECTOR_DELIMITER: char = '@';

/// A resolved (database, table) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableIdentifier {
    /// Database (schema) name
    pub database: String,
    /// Table name
    pub table: String,
}

impl TableIdentifier {
    /// Create a table identifier
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// Database/table regex pair
#[derive(Debug, Clone)]
pub struct TableSelector {
    raw: String,
    database: Regex,
    table: Regex,
}

impl TableSelector {
    /// Parse a `<database-regex>@<table-regex>` selector
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(SELECTOR_DELIMITER).collect();
        let [db_pattern, table_pattern] = parts.as_slice() else {
            return Err(Error::config(format!(
                "invalid table selector '{raw}': expected <database-regex>{SELECTOR_DELIMITER}<table-regex>"
            )));
        };
        if db_pattern.is_empty() || table_pattern.is_empty() {
            return Err(Error::config(format!(
                "invalid table selector '{raw}': both database and table patterns are required"
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
            database: compile(db_pattern)?,
            table: compile(table_pattern)?,
        })
    }

    /// Parse every selector, failing on the first malformed one
    pub fn parse_all<I, S>(raw: I) -> Result<Vec<Self>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter().map(|s| Self::parse(s.as_ref())).collect()
    }

    /// Original selector text
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether `database` matches the database pattern
    #[inline]
    pub fn matches_database(&self, database: &str) -> bool {
        self.database.is_match(database)
    }

    /// Whether `table` matches the table pattern
    #[inline]
    pub fn matches_table(&self, table: &str) -> bool {
        self.table.is_match(table)
    }
}

impl FromStr for TableSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TableSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Database name → set of table names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSet {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl TableSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table; returns false if it was already present
    pub fn insert(&mut self, database: impl Into<String>, table: impl Into<String>) -> bool {
        self.tables
            .entry(database.into())
            .or_default()
            .insert(table.into())
    }

    /// Add a resolved identifier
    pub fn insert_identifier(&mut self, table: TableIdentifier) -> bool {
        self.insert(table.database, table.table)
    }

    /// Check membership
    pub fn contains(&self, database: &str, table: &str) -> bool {
        self.tables
            .get(database)
            .is_some_and(|tables| tables.contains(table))
    }

    /// Tables resolved for `database`
    pub fn tables(&self, database: &str) -> Option<&BTreeSet<String>> {
        self.tables.get(database)
    }

    /// Databases with at least one resolved table
    pub fn databases(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Iterate over every resolved table
    pub fn iter(&self) -> impl Iterator<Item = TableIdentifier> + '_ {
        self.tables.iter().flat_map(|(db, tables)| {
            tables
                .iter()
                .map(move |table| TableIdentifier::new(db.as_str(), table.as_str()))
        })
    }

    /// Total number of tables
    pub fn len(&self) -> usize {
        self.tables.values().map(BTreeSet::len).sum()
    }

    /// Check if nothing was resolved
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow as a plain map
    pub fn as_map(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.tables
    }
}

impl FromIterator<TableIdentifier> for TableSet {
    fn from_iter<I: IntoIterator<Item = TableIdentifier>>(iter: I) -> Self {
        let mut set = Self::new();
        for table in iter {
            set.insert_identifier(table);
        }
        set
    }
}

/// Expands selectors into the tables they name
pub struct CatalogResolver<'a> {
    conn: &'a dyn Connection,
    dialect: &'a dyn SqlDialect,
}

impl<'a> CatalogResolver<'a> {
    /// Create a resolver over one connection
    pub fn new(conn: &'a dyn Connection, dialect: &'a dyn SqlDialect) -> Self {
        Self { conn, dialect }
    }

    /// Databases whose name matches `selector`'s database pattern
    pub async fn list_databases(&self, selector: &TableSelector) -> Result<Vec<String>> {
        let all = self.all_databases().await?;
        Ok(all
            .into_iter()
            .filter(|db| selector.matches_database(db))
            .collect())
    }

    /// Tables of `database` whose name matches `selector`'s table pattern
    pub async fn list_tables(&self, selector: &TableSelector, database: &str) -> Result<Vec<String>> {
        let all = self.all_tables(database).await?;
        Ok(all
            .into_iter()
            .filter(|table| selector.matches_table(table))
            .collect())
    }

    /// Resolve selectors (and an optional explicit table) into a [`TableSet`]
    ///
    /// The explicit table is added as-is, without consulting the catalog.
    /// Any failure aborts the whole resolution.
    pub async fn resolve(
        &self,
        selectors: &[TableSelector],
        explicit: Option<&TableIdentifier>,
    ) -> Result<TableSet> {
        let mut resolved = TableSet::new();

        if !selectors.is_empty() {
            let databases = self.all_databases().await?;
            let mut table_cache: HashMap<String, Vec<String>> = HashMap::new();

            for selector in selectors {
                for database in databases.iter().filter(|db| selector.matches_database(db)) {
                    if !table_cache.contains_key(database) {
                        let tables = self.all_tables(database).await?;
                        debug!(database = %database, tables = tables.len(), "listed tables");
                        table_cache.insert(database.clone(), tables);
                    }
                    let tables = table_cache.get(database).map(Vec::as_slice).unwrap_or_default();
                    for table in tables.iter().filter(|t| selector.matches_table(t)) {
                        resolved.insert(database.as_str(), table.as_str());
                    }
                }
            }
        }

        if let Some(table) = explicit {
            resolved.insert_identifier(table.clone());
        }

        info!(
            selectors = selectors.len(),
            databases = resolved.as_map().len(),
            tables = resolved.len(),
            "resolved source tables"
        );
        Ok(resolved)
    }

    async fn all_databases(&self) -> Result<Vec<String>> {
        let sql = self.dialect.list_databases_sql();
        self.conn
            .query(&sql)
            .await
            .and_then(|rows| first_column_names(rows, &sql))
            .map_err(|e| e.in_table("*", "*", "list databases"))
    }

    async fn all_tables(&self, database: &str) -> Result<Vec<String>> {
        let sql = self.dialect.list_tables_sql(database);
        self.conn
            .query(&sql)
            .await
            .and_then(|rows| first_column_names(rows, &sql))
            .map_err(|e| e.in_table(database, "*", "list tables"))
    }
}

fn first_column_names(rows: ResultSet, sql: &str) -> Result<Vec<String>> {
    rows.rows
        .into_iter()
        .filter_map(|row| row.into_iter().next())
        .map(|value| match value {
            RawValue::Bytes(bytes) => String::from_utf8(bytes).map_err(|e| {
                Error::type_conversion(format!("non UTF-8 name returned by '{sql}': {e}"))
            }),
            other => Err(Error::type_conversion(format!(
                "unexpected name value {other:?} returned by '{sql}'"
            ))),
        })
        .collect()
}
