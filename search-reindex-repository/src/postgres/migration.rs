//! Statements moving staged rows into the canonical tables.

use std::fmt;
use std::str::FromStr;

use super::tables::{TableKind, TableSpec, DICTIONARY_LINKS, MIGRATION_ORDER};
use crate::errors::RepositoryError;
use crate::types::SqlStatement;
use search_reindex_shared::SchemaName;

pub const UPSERT_PREFIX: &str = "upsert:";

/// Conflict policy of a staging run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Incoming rows overwrite canonical rows everywhere.
    #[default]
    Deduplicate,
    /// Records are overwritten; relationship and dictionary rows only fill
    /// gaps, and dictionaries that gained links get a fresh
    /// `last_updated_date`.
    Migrate,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deduplicate => "deduplicate",
            Self::Migrate => "migrate",
        }
    }

    fn overwrites(&self, table: &TableSpec) -> bool {
        match self {
            Self::Deduplicate => true,
            Self::Migrate => table.kind == TableKind::Record,
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deduplicate" => Ok(Self::Deduplicate),
            "migrate" => Ok(Self::Migrate),
            other => Err(RepositoryError::invalid_value(format!(
                "Unknown merge strategy '{}'",
                other
            ))),
        }
    }
}

/// The ordered statements of one staging run for a schema.
#[derive(Debug, Clone)]
pub struct MigrationPlan<'a> {
    schema: &'a SchemaName,
    strategy: MergeStrategy,
    target_tenant_id: Option<&'a str>,
}

impl<'a> MigrationPlan<'a> {
    pub fn new(schema: &'a SchemaName, strategy: MergeStrategy) -> Self {
        Self {
            schema,
            strategy,
            target_tenant_id: None,
        }
    }

    /// Delete the canonical rows of `tenant_id` before upserting.
    pub fn for_target_tenant(mut self, tenant_id: Option<&'a str>) -> Self {
        self.target_tenant_id = tenant_id;
        self
    }

    /// Every statement of the run, in execution order.
    pub fn statements(&self) -> Vec<SqlStatement> {
        let mut statements = Vec::new();

        if let Some(tenant_id) = self.target_tenant_id {
            for table in MIGRATION_ORDER.iter().rev().filter(|t| t.has_tenant_column()) {
                statements.push(
                    SqlStatement::new(
                        format!("delete:{}", table.name),
                        format!("DELETE FROM {} WHERE tenant_id = $1", self.schema.table(table.name)),
                    )
                    .with_tenant(tenant_id),
                );
            }
        }

        for table in MIGRATION_ORDER.iter() {
            statements.push(SqlStatement::new(
                format!("analyze:{}", table.staging_name()),
                format!("ANALYZE {}", self.schema.table(&table.staging_name())),
            ));
        }

        for table in MIGRATION_ORDER.iter() {
            statements.push(SqlStatement::new(
                format!("{}{}", UPSERT_PREFIX, table.name),
                self.upsert_sql(table),
            ));
        }

        if self.strategy == MergeStrategy::Migrate {
            for (dictionary, link, column) in DICTIONARY_LINKS.iter() {
                statements.push(SqlStatement::new(
                    format!("touch:{}", dictionary.name),
                    format!(
                        "UPDATE {} SET last_updated_date = now() WHERE id IN (SELECT {} FROM {})",
                        self.schema.table(dictionary.name),
                        column,
                        self.schema.table(&link.staging_name())
                    ),
                ));
            }
        }

        statements.push(truncate_staging(self.schema));
        statements
    }

    /// Upsert of the latest staged row per natural key.
    ///
    /// `DISTINCT ON` keeps one row per key, so the statement never touches
    /// the same canonical row twice.
    fn upsert_sql(&self, table: &TableSpec) -> String {
        let columns = table.all_columns().join(", ");
        let key = table.key.join(", ");

        format!(
            "{}SELECT DISTINCT ON ({key}) {columns} FROM {staging} ORDER BY {key}, inserted_at DESC{conflict}",
            table.insert_prefix(&self.schema.table(table.name)),
            key = key,
            columns = columns,
            staging = self.schema.table(&table.staging_name()),
            conflict = table.conflict_clause(self.strategy.overwrites(table)),
        )
    }
}

/// Empty every staging table.
pub fn truncate_staging(schema: &SchemaName) -> SqlStatement {
    let tables = MIGRATION_ORDER
        .iter()
        .map(|table| schema.table(&table.staging_name()))
        .collect::<Vec<_>>()
        .join(", ");

    SqlStatement::new("truncate:staging", format!("TRUNCATE TABLE {}", tables))
}

/// Empty every canonical table, the start of a full cycle.
pub fn truncate_canonical(schema: &SchemaName) -> SqlStatement {
    let tables = MIGRATION_ORDER
        .iter()
        .map(|table| schema.table(table.name))
        .collect::<Vec<_>>()
        .join(", ");

    SqlStatement::new("truncate:canonical", format!("TRUNCATE TABLE {}", tables))
}
