//! Catalog of the per-tenant record tables.
//!
//! Every canonical table has a `staging_` twin with the same columns plus an
//! `inserted_at` timestamp. Dictionary tables also carry `last_updated_date`.

use search_reindex_shared::ReindexContext;

/// Role of a table in the record model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Instances, holdings and items.
    Record,
    /// Instance to dictionary links.
    Relationship,
    /// Subjects, contributors, classifications and call numbers.
    Dictionary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub kind: TableKind,
    /// Natural key, the conflict target of upserts.
    pub key: &'static [&'static str],
    /// Remaining columns.
    pub columns: &'static [&'static str],
}

pub const INSTANCE: TableSpec = TableSpec {
    name: "instance",
    kind: TableKind::Record,
    key: &["id"],
    columns: &["tenant_id", "shared", "is_bound_with", "json"],
};

pub const HOLDING: TableSpec = TableSpec {
    name: "holding",
    kind: TableKind::Record,
    key: &["id"],
    columns: &["tenant_id", "instance_id", "json"],
};

pub const ITEM: TableSpec = TableSpec {
    name: "item",
    kind: TableKind::Record,
    key: &["id"],
    columns: &["tenant_id", "instance_id", "holding_id", "json"],
};

pub const INSTANCE_SUBJECT: TableSpec = TableSpec {
    name: "instance_subject",
    kind: TableKind::Relationship,
    key: &["subject_id", "instance_id", "tenant_id"],
    columns: &["shared"],
};

pub const INSTANCE_CONTRIBUTOR: TableSpec = TableSpec {
    name: "instance_contributor",
    kind: TableKind::Relationship,
    key: &["contributor_id", "instance_id", "type_id", "tenant_id"],
    columns: &["shared"],
};

pub const INSTANCE_CLASSIFICATION: TableSpec = TableSpec {
    name: "instance_classification",
    kind: TableKind::Relationship,
    key: &["classification_id", "instance_id", "tenant_id"],
    columns: &["shared"],
};

pub const INSTANCE_CALL_NUMBER: TableSpec = TableSpec {
    name: "instance_call_number",
    kind: TableKind::Relationship,
    key: &["call_number_id", "item_id", "instance_id", "tenant_id"],
    columns: &["location_id"],
};

pub const SUBJECT: TableSpec = TableSpec {
    name: "subject",
    kind: TableKind::Dictionary,
    key: &["id"],
    columns: &["value", "authority_id", "source_id", "type_id"],
};

pub const CONTRIBUTOR: TableSpec = TableSpec {
    name: "contributor",
    kind: TableKind::Dictionary,
    key: &["id"],
    columns: &["name", "name_type_id", "authority_id"],
};

pub const CLASSIFICATION: TableSpec = TableSpec {
    name: "classification",
    kind: TableKind::Dictionary,
    key: &["id"],
    columns: &["number", "type_id"],
};

pub const CALL_NUMBER: TableSpec = TableSpec {
    name: "call_number",
    kind: TableKind::Dictionary,
    key: &["id"],
    columns: &[
        "call_number",
        "call_number_prefix",
        "call_number_suffix",
        "call_number_type_id",
    ],
};

/// Tables in the order staged rows are moved into the canonical tables:
/// parents first, then the relationship rows, items, and dictionaries last.
pub const MIGRATION_ORDER: [TableSpec; 11] = [
    INSTANCE,
    HOLDING,
    INSTANCE_SUBJECT,
    INSTANCE_CONTRIBUTOR,
    INSTANCE_CLASSIFICATION,
    INSTANCE_CALL_NUMBER,
    ITEM,
    SUBJECT,
    CONTRIBUTOR,
    CLASSIFICATION,
    CALL_NUMBER,
];

/// Dictionary tables with the relationship table and column referencing them.
pub const DICTIONARY_LINKS: [(TableSpec, TableSpec, &str); 4] = [
    (SUBJECT, INSTANCE_SUBJECT, "subject_id"),
    (CONTRIBUTOR, INSTANCE_CONTRIBUTOR, "contributor_id"),
    (CLASSIFICATION, INSTANCE_CLASSIFICATION, "classification_id"),
    (CALL_NUMBER, INSTANCE_CALL_NUMBER, "call_number_id"),
];

pub const MERGE_RANGE_TABLE: &str = "merge_range";
pub const UPLOAD_RANGE_TABLE: &str = "upload_range";
pub const REINDEX_STATUS_TABLE: &str = "reindex_status";

impl TableSpec {
    pub fn staging_name(&self) -> String {
        format!("staging_{}", self.name)
    }

    /// Key columns followed by the remaining columns.
    pub fn all_columns(&self) -> Vec<&'static str> {
        self.key.iter().chain(self.columns.iter()).copied().collect()
    }

    /// Whether rows are owned by a tenant through a `tenant_id` column.
    pub fn has_tenant_column(&self) -> bool {
        self.kind != TableKind::Dictionary
    }

    /// Schema-qualified name of the table `ctx` writes records to.
    pub fn target(&self, ctx: &ReindexContext) -> String {
        if ctx.is_reindex() {
            ctx.schema().table(&self.staging_name())
        } else {
            ctx.schema().table(self.name)
        }
    }

    /// `INSERT INTO <table> (<columns>) ` prefix for a values list.
    pub fn insert_prefix(&self, table: &str) -> String {
        format!("INSERT INTO {} ({}) ", table, self.all_columns().join(", "))
    }

    /// Conflict clause used when writing straight to the canonical table.
    ///
    /// Records and dictionaries take the incoming values; relationship rows
    /// are left as they are.
    pub fn conflict_clause(&self, overwrite: bool) -> String {
        let target = self.key.join(", ");
        if !overwrite || self.columns.is_empty() {
            return format!(" ON CONFLICT ({}) DO NOTHING", target);
        }

        let mut assignments: Vec<String> = self
            .columns
            .iter()
            .map(|column| format!("{column} = EXCLUDED.{column}"))
            .collect();
        if self.kind == TableKind::Dictionary {
            assignments.push("last_updated_date = now()".to_string());
        }

        format!(" ON CONFLICT ({}) DO UPDATE SET {}", target, assignments.join(", "))
    }
}
