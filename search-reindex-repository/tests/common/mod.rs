//! Database fixtures for the PostgreSQL integration tests.
//!
//! Tests need `DATABASE_URL` pointing at a disposable database; each test
//! owns a schema that is dropped and created again on setup.

use search_reindex_repository::postgres::tables::MIGRATION_ORDER;
use search_reindex_shared::{ReindexContext, SchemaName};
use sqlx::PgPool;

pub async fn setup(tenant_id: &str) -> (PgPool, ReindexContext) {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPool::connect(&url).await.expect("connect to test database");

    let schema = SchemaName::for_tenant(tenant_id, "search").unwrap();
    sqlx::raw_sql(&schema_ddl(&schema))
        .execute(&pool)
        .await
        .expect("create test schema");

    (pool, ReindexContext::new(tenant_id, schema))
}

fn schema_ddl(schema: &SchemaName) -> String {
    let s = schema.as_str();
    let mut ddl = format!(
        "DROP SCHEMA IF EXISTS {s} CASCADE;
        CREATE SCHEMA {s};
        CREATE TABLE {s}.merge_range (
            id uuid PRIMARY KEY, entity_type text NOT NULL, tenant_id text NOT NULL,
            lower_bound text NOT NULL, upper_bound text NOT NULL,
            created_at timestamptz NOT NULL, finished_at timestamptz, fail_cause text);
        CREATE TABLE {s}.upload_range (
            id uuid PRIMARY KEY, entity_type text NOT NULL, lower_bound text, upper_bound text,
            range_offset bigint, range_limit bigint,
            created_at timestamptz NOT NULL, finished_at timestamptz);
        CREATE TABLE {s}.reindex_status (
            entity_type text PRIMARY KEY, status text NOT NULL,
            total_merge_ranges int NOT NULL DEFAULT 0, processed_merge_ranges int NOT NULL DEFAULT 0,
            total_upload_ranges int NOT NULL DEFAULT 0, processed_upload_ranges int NOT NULL DEFAULT 0,
            start_time_merge timestamptz, end_time_merge timestamptz,
            start_time_upload timestamptz, end_time_upload timestamptz, target_tenant_id text);
        CREATE TABLE {s}.instance (
            id uuid PRIMARY KEY, tenant_id text NOT NULL, shared boolean NOT NULL DEFAULT false,
            is_bound_with boolean NOT NULL DEFAULT false, json jsonb NOT NULL);
        CREATE TABLE {s}.holding (
            id uuid PRIMARY KEY, tenant_id text NOT NULL, instance_id uuid NOT NULL, json jsonb NOT NULL);
        CREATE TABLE {s}.item (
            id uuid PRIMARY KEY, tenant_id text NOT NULL, instance_id uuid NOT NULL,
            holding_id uuid NOT NULL, json jsonb NOT NULL);
        CREATE TABLE {s}.instance_subject (
            subject_id text, instance_id uuid, tenant_id text, shared boolean NOT NULL DEFAULT false,
            PRIMARY KEY (subject_id, instance_id, tenant_id));
        CREATE TABLE {s}.instance_contributor (
            contributor_id text, instance_id uuid, type_id text, tenant_id text,
            shared boolean NOT NULL DEFAULT false,
            PRIMARY KEY (contributor_id, instance_id, type_id, tenant_id));
        CREATE TABLE {s}.instance_classification (
            classification_id text, instance_id uuid, tenant_id text, shared boolean NOT NULL DEFAULT false,
            PRIMARY KEY (classification_id, instance_id, tenant_id));
        CREATE TABLE {s}.instance_call_number (
            call_number_id text, item_id uuid, instance_id uuid, tenant_id text, location_id text,
            PRIMARY KEY (call_number_id, item_id, instance_id, tenant_id));
        CREATE TABLE {s}.subject (
            id text PRIMARY KEY, value text NOT NULL, authority_id text, source_id text, type_id text,
            last_updated_date timestamptz NOT NULL DEFAULT now());
        CREATE TABLE {s}.contributor (
            id text PRIMARY KEY, name text NOT NULL, name_type_id text, authority_id text,
            last_updated_date timestamptz NOT NULL DEFAULT now());
        CREATE TABLE {s}.classification (
            id text PRIMARY KEY, number text NOT NULL, type_id text,
            last_updated_date timestamptz NOT NULL DEFAULT now());
        CREATE TABLE {s}.call_number (
            id text PRIMARY KEY, call_number text NOT NULL, call_number_prefix text,
            call_number_suffix text, call_number_type_id text,
            last_updated_date timestamptz NOT NULL DEFAULT now());
        "
    );

    for table in MIGRATION_ORDER.iter() {
        ddl.push_str(&format!(
            "CREATE TABLE {s}.{staging} (LIKE {s}.{name} INCLUDING DEFAULTS);
            ALTER TABLE {s}.{staging} ADD COLUMN inserted_at timestamptz NOT NULL DEFAULT clock_timestamp();
            ",
            staging = table.staging_name(),
            name = table.name,
        ));
    }

    ddl
}

pub async fn count(pool: &PgPool, ctx: &ReindexContext, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT count(*) FROM {}", ctx.schema().table(table)))
        .fetch_one(pool)
        .await
        .unwrap()
}
