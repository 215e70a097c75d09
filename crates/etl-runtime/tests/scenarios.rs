//! End-to-end pipeline scenarios (spec §8) run against an in-memory
//! object store and fake `DbControl`/`StreamLoadClient` doubles, so no
//! real object storage or database is needed to exercise the full
//! Discover → Download → Convert → Transform → Validate+Load chain.

use async_trait::async_trait;
use bytes::Bytes;
use etl_core::tenant::{ConstantsBackendKind, DbConnectionParams, StorageCredentials, StorageProvider, Tenant, TenantPaths};
use etl_core::{
    CastPolicy, ColumnMapping, ColumnMappingEntry, DbControl, LiveColumn, LoadError, LoadResult, LoadStatus,
    StreamLoadClient, StreamLoadRequest, TableKind, TableSchema, TenantContext,
};
use etl_runtime::{run_job, run_table, JobSpec, PipelineDeps, RunMode, TableRunSpec};
use etl_store::BlobFetcher;
use object_store::memory::InMemory;
use object_store::path::Path as ObjPath;
use object_store::ObjectStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct FakeDb {
    columns: Mutex<Vec<LiveColumn>>,
    truncated: Mutex<Vec<String>>,
    widen_calls: Mutex<Vec<(String, u32)>>,
}

impl FakeDb {
    fn new(columns: Vec<LiveColumn>) -> Self {
        Self {
            columns: Mutex::new(columns),
            truncated: Mutex::new(Vec::new()),
            widen_calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DbControl for FakeDb {
    async fn show_databases(&self) -> Result<Vec<String>, LoadError> {
        Ok(vec![])
    }
    async fn describe_table(&self, _db: &str, _table: &str) -> Result<Vec<LiveColumn>, LoadError> {
        Ok(self.columns.lock().unwrap().clone())
    }
    async fn truncate_table(&self, _db: &str, table: &str) -> Result<(), LoadError> {
        self.truncated.lock().unwrap().push(table.to_string());
        Ok(())
    }
    async fn execute_ddl(&self, _ddl: &str) -> Result<(), LoadError> {
        Ok(())
    }
    async fn alter_widen_column(&self, _db: &str, _table: &str, column: &str, new_width: u32) -> Result<(), LoadError> {
        self.widen_calls.lock().unwrap().push((column.to_string(), new_width));
        let mut cols = self.columns.lock().unwrap();
        if let Some(c) = cols.iter_mut().find(|c| c.column_name == column) {
            c.character_maximum_length = Some(new_width);
        }
        Ok(())
    }
    async fn insert_rows(&self, _db: &str, _table: &str, _sql: &str) -> Result<u64, LoadError> {
        Ok(0)
    }
    async fn count_rows(&self, _db: &str, _table: &str) -> Result<u64, LoadError> {
        Ok(0)
    }
}

struct RecordingStreamClient {
    requests: Mutex<Vec<(StreamLoadRequest, Bytes)>>,
}

impl RecordingStreamClient {
    fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl StreamLoadClient for RecordingStreamClient {
    async fn load_chunk(&self, request: &StreamLoadRequest, payload: Bytes) -> Result<LoadResult, LoadError> {
        let rows = payload.iter().filter(|b| **b == b'\n').count() as u64;
        self.requests.lock().unwrap().push((request.clone(), payload));
        Ok(LoadResult {
            status: LoadStatus::Success,
            rows_loaded: rows,
            rows_filtered: 0,
            rows_unselected: 0,
            error_url: None,
            message: String::new(),
        })
    }
}

fn dealer_mapping(source_order: &[&str]) -> ColumnMapping {
    let target_type = |name: &str| match name {
        "active_flag" => "int",
        _ => "string",
    };
    ColumnMapping {
        table: "dim_dealer_master".to_string(),
        entries: source_order
            .iter()
            .map(|name| ColumnMappingEntry {
                source_name: name.to_string(),
                target_name: name.to_string(),
                target_type: target_type(name).to_string(),
                nullable: true,
                default: None,
                cast_policy: CastPolicy::Null,
                is_code_column: false,
                date_format: None,
                decimal_precision: None,
                trim: false,
            })
            .collect(),
    }
}

fn base_tenant_context(tmp: &std::path::Path, table: &str, mapping: ColumnMapping) -> TenantContext {
    let tenant = Tenant {
        tenant_id: Uuid::parse_str("3607d64c-0000-0000-0000-000000000000").unwrap(),
        tenant_slug: "t-demo".to_string(),
        enabled: true,
        database_name: "t_demo".to_string(),
        provider: StorageProvider::Local,
        constants_backend: ConstantsBackendKind::SameDatabase,
        schedule_priority: 0,
    };
    let paths = TenantPaths::under(tmp, &tenant.tenant_slug);
    let mut column_mappings = HashMap::new();
    column_mappings.insert(table.to_string(), mapping);
    let mut blob_prefixes = HashMap::new();
    blob_prefixes.insert(table.to_string(), "DimDealer_MS".to_string());

    TenantContext {
        tenant,
        paths,
        db: DbConnectionParams {
            host: "localhost".to_string(),
            query_port: 9030,
            http_port: 8040,
            user: "root".to_string(),
            password: String::new(),
            database: "t_demo".to_string(),
            pool_min: 1,
            pool_max: 4,
            pool_recycle_secs: 1800,
        },
        storage: StorageCredentials {
            provider: StorageProvider::Local,
            container_or_bucket: String::new(),
            endpoint: None,
            account: None,
            connection_string: None,
            sas_token: None,
            access_key: None,
            secret_key: None,
            region: None,
        },
        schemas: vec![TableSchema {
            name: table.to_string(),
            kind: TableKind::Table,
            ordinal: 0,
            ddl: String::new(),
            column_comments: HashMap::new(),
        }],
        column_mappings,
        computed_columns: HashMap::new(),
        row_filters: HashMap::new(),
        seeds_dir: tmp.join("seeds"),
        blob_prefixes,
        env: HashMap::new(),
        chunk_rows: 1000,
        max_filter_ratio: 0.1,
        stream_load_timeout_secs: 900,
        fail_fast: false,
        max_widen_cap: 65533,
        allow_widen: true,
    }
}

fn csv_rows(start: usize, count: usize, columns: &[&str]) -> String {
    let mut out = columns.join(",");
    out.push('\n');
    for i in start..start + count {
        let active = i % 2;
        let row = columns
            .iter()
            .map(|c| match *c {
                "active_flag" => active.to_string(),
                "dealer_code" => format!("D{i:04}"),
                "dealer_name" => format!("Dealer {i}"),
                _ => String::new(),
            })
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&row);
        out.push('\n');
    }
    out
}

async fn put_blob(store: &InMemory, key: &str, body: String) {
    store.put(&ObjPath::from(key), Bytes::from(body).into()).await.unwrap();
}

#[tokio::test]
async fn dimension_full_refresh_happy_path() {
    let store = InMemory::new();
    put_blob(&store, "DimDealer_MS/part-0.csv", csv_rows(0, 100, &["active_flag", "dealer_code", "dealer_name"])).await;
    put_blob(&store, "DimDealer_MS/part-1.csv", csv_rows(100, 50, &["active_flag", "dealer_code", "dealer_name"])).await;

    let provider = BlobFetcher::new(Arc::new(store));
    let db = FakeDb::new(vec![
        LiveColumn { ordinal_position: 1, column_name: "active_flag".into(), data_type: "int".into(), is_nullable: true, character_maximum_length: None },
        LiveColumn { ordinal_position: 2, column_name: "dealer_code".into(), data_type: "varchar".into(), is_nullable: true, character_maximum_length: Some(32) },
        LiveColumn { ordinal_position: 3, column_name: "dealer_name".into(), data_type: "varchar".into(), is_nullable: true, character_maximum_length: Some(255) },
    ]);
    let stream_client = RecordingStreamClient::new();
    let deps = PipelineDeps { blob_provider: &provider, db: &db, stream_client: &stream_client };

    let tmp = tempfile::tempdir().unwrap();
    let mapping = dealer_mapping(&["active_flag", "dealer_code", "dealer_name"]);
    let ctx = base_tenant_context(tmp.path(), "dim_dealer_master", mapping);

    let outcome = run_table(&ctx, &deps, "dim_dealer_master", RunMode::Historical, true, &CancellationToken::new()).await;

    assert_eq!(outcome.status, "Success");
    assert_eq!(outcome.rows_loaded, 150);
    assert_eq!(db.truncated.lock().unwrap().as_slice(), ["dim_dealer_master"]);
}

#[tokio::test]
async fn column_order_defense_reprojects_before_serialization() {
    let store = InMemory::new();
    put_blob(&store, "DimDealer_MS/part-0.csv", csv_rows(0, 10, &["dealer_name", "active_flag", "dealer_code"])).await;

    let provider = BlobFetcher::new(Arc::new(store));
    let db = FakeDb::new(vec![
        LiveColumn { ordinal_position: 1, column_name: "active_flag".into(), data_type: "int".into(), is_nullable: true, character_maximum_length: None },
        LiveColumn { ordinal_position: 2, column_name: "dealer_code".into(), data_type: "varchar".into(), is_nullable: true, character_maximum_length: Some(32) },
        LiveColumn { ordinal_position: 3, column_name: "dealer_name".into(), data_type: "varchar".into(), is_nullable: true, character_maximum_length: Some(255) },
    ]);
    let stream_client = RecordingStreamClient::new();
    let deps = PipelineDeps { blob_provider: &provider, db: &db, stream_client: &stream_client };

    let tmp = tempfile::tempdir().unwrap();
    // Transformer-declared mapping order deliberately mismatches live column order.
    let mapping = dealer_mapping(&["dealer_name", "active_flag", "dealer_code"]);
    let ctx = base_tenant_context(tmp.path(), "dim_dealer_master", mapping);

    let outcome = run_table(&ctx, &deps, "dim_dealer_master", RunMode::Historical, false, &CancellationToken::new()).await;
    assert_eq!(outcome.status, "Success");

    let requests = stream_client.requests.lock().unwrap();
    let (request, _payload) = &requests[0];
    assert_eq!(request.columns, vec!["active_flag", "dealer_code", "dealer_name"]);
}

#[tokio::test]
async fn auto_widening_string_column_widens_exactly_once() {
    let store = InMemory::new();
    let long_name = "x".repeat(73);
    let body = format!("active_flag,dealer_code,dealer_name\n1,D0001,{long_name}\n");
    put_blob(&store, "DimDealer_MS/part-0.csv", body).await;

    let provider = BlobFetcher::new(Arc::new(store));
    let db = FakeDb::new(vec![
        LiveColumn { ordinal_position: 1, column_name: "active_flag".into(), data_type: "int".into(), is_nullable: true, character_maximum_length: None },
        LiveColumn { ordinal_position: 2, column_name: "dealer_code".into(), data_type: "varchar".into(), is_nullable: true, character_maximum_length: Some(32) },
        LiveColumn { ordinal_position: 3, column_name: "dealer_name".into(), data_type: "varchar".into(), is_nullable: true, character_maximum_length: Some(50) },
    ]);
    let stream_client = RecordingStreamClient::new();
    let deps = PipelineDeps { blob_provider: &provider, db: &db, stream_client: &stream_client };

    let tmp = tempfile::tempdir().unwrap();
    let mapping = dealer_mapping(&["active_flag", "dealer_code", "dealer_name"]);
    let ctx = base_tenant_context(tmp.path(), "dim_dealer_master", mapping);

    let outcome = run_table(&ctx, &deps, "dim_dealer_master", RunMode::Historical, false, &CancellationToken::new()).await;

    assert_eq!(outcome.status, "Success");
    let widen_calls = db.widen_calls.lock().unwrap();
    assert_eq!(widen_calls.len(), 1);
    assert_eq!(widen_calls[0].0, "dealer_name");
    assert!(widen_calls[0].1 as usize >= 73);
}

#[tokio::test]
async fn partial_failure_in_one_table_isolates_the_others() {
    let store = InMemory::new();
    put_blob(&store, "DimDealer_MS/part-0.csv", csv_rows(0, 5, &["active_flag", "dealer_code", "dealer_name"])).await;
    put_blob(&store, "FactInvoice_MS/part-0.csv", "not,a,header\nonly one column\n".to_string()).await;
    put_blob(&store, "DimOther_MS/part-0.csv", csv_rows(0, 5, &["active_flag", "dealer_code", "dealer_name"])).await;

    let provider = BlobFetcher::new(Arc::new(store));
    let db = FakeDb::new(vec![
        LiveColumn { ordinal_position: 1, column_name: "active_flag".into(), data_type: "int".into(), is_nullable: true, character_maximum_length: None },
        LiveColumn { ordinal_position: 2, column_name: "dealer_code".into(), data_type: "varchar".into(), is_nullable: true, character_maximum_length: Some(32) },
        LiveColumn { ordinal_position: 3, column_name: "dealer_name".into(), data_type: "varchar".into(), is_nullable: true, character_maximum_length: Some(255) },
    ]);
    let stream_client = RecordingStreamClient::new();
    let deps = PipelineDeps { blob_provider: &provider, db: &db, stream_client: &stream_client };

    let tmp = tempfile::tempdir().unwrap();
    let mapping = dealer_mapping(&["active_flag", "dealer_code", "dealer_name"]);
    let mut ctx = base_tenant_context(tmp.path(), "dim_dealer_master", mapping.clone());
    ctx.schemas.push(TableSchema {
        name: "fact_invoice_secondary".to_string(),
        kind: TableKind::Table,
        ordinal: 1,
        ddl: String::new(),
        column_comments: HashMap::new(),
    });
    ctx.schemas.push(TableSchema {
        name: "dim_other".to_string(),
        kind: TableKind::Table,
        ordinal: 2,
        ddl: String::new(),
        column_comments: HashMap::new(),
    });
    ctx.column_mappings.insert("fact_invoice_secondary".to_string(), mapping.clone());
    ctx.column_mappings.insert("dim_other".to_string(), mapping);
    ctx.blob_prefixes.insert("fact_invoice_secondary".to_string(), "FactInvoice_MS".to_string());
    ctx.blob_prefixes.insert("dim_other".to_string(), "DimOther_MS".to_string());

    let spec = JobSpec(vec![
        TableRunSpec { table: "dim_dealer_master".to_string(), mode: RunMode::Historical, truncate: false },
        TableRunSpec { table: "fact_invoice_secondary".to_string(), mode: RunMode::Incremental, truncate: false },
        TableRunSpec { table: "dim_other".to_string(), mode: RunMode::Historical, truncate: false },
    ]);

    let outcome = run_job(&ctx, &deps, &spec, &CancellationToken::new()).await;

    assert_eq!(outcome.per_table.len(), 3);
    let failures: Vec<_> = outcome
        .per_table
        .iter()
        .filter(|(_, o)| o.error.is_some())
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "fact_invoice_secondary");
    assert!(outcome.is_partial());
}

/// `DbControl` double whose `describe_table`/`truncate_table` responses
/// vary per table, to distinguish a genuine truncate failure from an
/// ordinary Load-stage failure (missing non-nullable column) within the
/// same job.
struct MultiTableDb {
    truncated: Mutex<Vec<String>>,
    fail_truncate_table: Option<String>,
}

#[async_trait]
impl DbControl for MultiTableDb {
    async fn show_databases(&self) -> Result<Vec<String>, LoadError> {
        Ok(vec![])
    }
    async fn describe_table(&self, _db: &str, table: &str) -> Result<Vec<LiveColumn>, LoadError> {
        let mut columns = vec![
            LiveColumn { ordinal_position: 1, column_name: "active_flag".into(), data_type: "int".into(), is_nullable: true, character_maximum_length: None },
            LiveColumn { ordinal_position: 2, column_name: "dealer_code".into(), data_type: "varchar".into(), is_nullable: true, character_maximum_length: Some(32) },
            LiveColumn { ordinal_position: 3, column_name: "dealer_name".into(), data_type: "varchar".into(), is_nullable: true, character_maximum_length: Some(255) },
        ];
        if table == "dim_missing_column" {
            columns.push(LiveColumn {
                ordinal_position: 4,
                column_name: "required_extra".into(),
                data_type: "varchar".into(),
                is_nullable: false,
                character_maximum_length: Some(32),
            });
        }
        Ok(columns)
    }
    async fn truncate_table(&self, _db: &str, table: &str) -> Result<(), LoadError> {
        if self.fail_truncate_table.as_deref() == Some(table) {
            return Err(LoadError::TruncateFailed(table.to_string()));
        }
        self.truncated.lock().unwrap().push(table.to_string());
        Ok(())
    }
    async fn execute_ddl(&self, _ddl: &str) -> Result<(), LoadError> {
        Ok(())
    }
    async fn alter_widen_column(&self, _db: &str, _table: &str, _column: &str, _new_width: u32) -> Result<(), LoadError> {
        Ok(())
    }
    async fn insert_rows(&self, _db: &str, _table: &str, _sql: &str) -> Result<u64, LoadError> {
        Ok(0)
    }
    async fn count_rows(&self, _db: &str, _table: &str) -> Result<u64, LoadError> {
        Ok(0)
    }
}

fn two_dimension_ctx(tmp: &std::path::Path, second_table: &str) -> TenantContext {
    let mapping = dealer_mapping(&["active_flag", "dealer_code", "dealer_name"]);
    let mut ctx = base_tenant_context(tmp, "dim_dealer_master", mapping.clone());
    ctx.schemas.push(TableSchema {
        name: second_table.to_string(),
        kind: TableKind::Table,
        ordinal: 1,
        ddl: String::new(),
        column_comments: HashMap::new(),
    });
    ctx.column_mappings.insert(second_table.to_string(), mapping);
    ctx.blob_prefixes.insert(second_table.to_string(), "Second_MS".to_string());
    ctx
}

/// Spec §7: a failed truncate on a full-refresh table aborts the
/// remaining tables of the job. Spec §5: a Load-stage failure that is
/// *not* a truncate failure (e.g. a missing required column) must not
/// take down sibling tables, even though both fail at the same `Load`
/// stage and share an identical `status` string.
#[tokio::test]
async fn truncate_failure_aborts_remaining_tables_in_the_job() {
    let store = InMemory::new();
    put_blob(&store, "DimDealer_MS/part-0.csv", csv_rows(0, 5, &["active_flag", "dealer_code", "dealer_name"])).await;
    put_blob(&store, "Second_MS/part-0.csv", csv_rows(0, 5, &["active_flag", "dealer_code", "dealer_name"])).await;

    let provider = BlobFetcher::new(Arc::new(store));
    let db = MultiTableDb {
        truncated: Mutex::new(Vec::new()),
        fail_truncate_table: Some("dim_dealer_master".to_string()),
    };
    let stream_client = RecordingStreamClient::new();
    let deps = PipelineDeps { blob_provider: &provider, db: &db, stream_client: &stream_client };

    let tmp = tempfile::tempdir().unwrap();
    let ctx = two_dimension_ctx(tmp.path(), "dim_second");

    let spec = JobSpec(vec![
        TableRunSpec { table: "dim_dealer_master".to_string(), mode: RunMode::Historical, truncate: true },
        TableRunSpec { table: "dim_second".to_string(), mode: RunMode::Historical, truncate: true },
    ]);
    let outcome = run_job(&ctx, &deps, &spec, &CancellationToken::new()).await;

    assert_eq!(outcome.per_table.len(), 1, "job must abort before running dim_second");
    let failed = &outcome.per_table["dim_dealer_master"];
    assert_eq!(failed.error_kind.as_deref(), Some("TruncateFailed"));
    assert!(!outcome.is_success());
}

#[tokio::test]
async fn non_truncate_load_failure_does_not_abort_remaining_tables() {
    let store = InMemory::new();
    put_blob(&store, "DimDealer_MS/part-0.csv", csv_rows(0, 5, &["active_flag", "dealer_code", "dealer_name"])).await;
    put_blob(&store, "Second_MS/part-0.csv", csv_rows(0, 5, &["active_flag", "dealer_code", "dealer_name"])).await;

    let provider = BlobFetcher::new(Arc::new(store));
    let db = MultiTableDb {
        truncated: Mutex::new(Vec::new()),
        fail_truncate_table: None,
    };
    let stream_client = RecordingStreamClient::new();
    let deps = PipelineDeps { blob_provider: &provider, db: &db, stream_client: &stream_client };

    // The first table's live schema declares a required column the silver
    // frame never produces, so it fails at the Load stage via
    // `MissingColumn` rather than via `truncate_table`.
    let tmp = tempfile::tempdir().unwrap();
    let mut ctx = two_dimension_ctx(tmp.path(), "dim_second");
    ctx.schemas.push(TableSchema {
        name: "dim_missing_column".to_string(),
        kind: TableKind::Table,
        ordinal: 2,
        ddl: String::new(),
        column_comments: HashMap::new(),
    });
    ctx.column_mappings.insert(
        "dim_missing_column".to_string(),
        dealer_mapping(&["active_flag", "dealer_code", "dealer_name"]),
    );
    ctx.blob_prefixes.insert("dim_missing_column".to_string(), "DimDealer_MS".to_string());

    let spec = JobSpec(vec![
        TableRunSpec { table: "dim_missing_column".to_string(), mode: RunMode::Historical, truncate: true },
        TableRunSpec { table: "dim_second".to_string(), mode: RunMode::Historical, truncate: true },
    ]);
    let outcome = run_job(&ctx, &deps, &spec, &CancellationToken::new()).await;

    assert_eq!(outcome.per_table.len(), 2, "dim_second must still run after dim_missing_column's Load failure");
    let failed = &outcome.per_table["dim_missing_column"];
    assert!(failed.error.is_some());
    assert_ne!(failed.error_kind.as_deref(), Some("TruncateFailed"));
    let succeeded = &outcome.per_table["dim_second"];
    assert_eq!(succeeded.status, "Success");
}
