//! `seed_load`: the one operator-facing entry point that bypasses Stream
//! Load entirely. Seed data is small reference data (lookup tables,
//! material codes) that ships as `seeds/<table>.csv` next to a
//! `SEED_MAPPING.<table>.yaml` column mapping, loaded with plain `INSERT`
//! statements over the control-plane connection (spec §6.1, §6.6).

use datafusion::arrow::util::display::array_value_to_string;
use etl_core::{ColumnMapping, DbControl, LoadError, SeedOutcome, StageOutcome, TenantContext};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

fn seed_files(seeds_dir: &Path, table_filter: Option<&str>) -> std::io::Result<Vec<(String, std::path::PathBuf)>> {
    let mut out = Vec::new();
    if !seeds_dir.is_dir() {
        return Ok(out);
    }
    for entry in std::fs::read_dir(seeds_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let table = match path.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s.to_string(),
            None => continue,
        };
        if let Some(filter) = table_filter {
            if table != filter {
                continue;
            }
        }
        out.push((table, path));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

fn load_seed_mapping(seeds_dir: &Path, table: &str) -> Result<Option<ColumnMapping>, LoadError> {
    let mapping_path = seeds_dir.join(format!("SEED_MAPPING.{table}.yaml"));
    if !mapping_path.is_file() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&mapping_path)
        .map_err(|e| LoadError::TruncateFailed(format!("{}: {e}", mapping_path.display())))?;
    let mapping: ColumnMapping = serde_yaml::from_str(&raw)
        .map_err(|e| LoadError::TruncateFailed(format!("{}: {e}", mapping_path.display())))?;
    Ok(Some(mapping))
}

fn sql_literal(column: &datafusion::arrow::array::ArrayRef, row: usize) -> String {
    if column.is_null(row) {
        return "NULL".to_string();
    }
    let value = array_value_to_string(column, row).unwrap_or_default();
    if column.data_type().is_numeric() {
        value
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

async fn insert_one_file(
    db: &dyn DbControl,
    database: &str,
    table: &str,
    path: &Path,
    mapping: Option<&ColumnMapping>,
) -> Result<StageOutcome, LoadError> {
    let started = Instant::now();
    let batch = etl_convert::csv::convert_csv(path, true)
        .map_err(|e| LoadError::TruncateFailed(format!("{table}: {e}")))?;

    let batch = match mapping {
        Some(mapping) => etl_transform::mapping::apply_mapping(&batch, mapping)
            .map_err(|e| LoadError::TruncateFailed(format!("{table}: {e}")))?,
        None => batch,
    };

    if batch.num_rows() == 0 {
        return Ok(StageOutcome {
            status: "Success".to_string(),
            rows_loaded: 0,
            rows_filtered: 0,
            elapsed_ms: started.elapsed().as_millis() as u64,
            error: None,
            error_kind: None,
        });
    }

    let column_names: Vec<String> = batch.schema().fields().iter().map(|f| f.name().clone()).collect();
    let columns_clause = column_names.join(", ");

    let mut values_rows = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let values: Vec<String> = batch.columns().iter().map(|c| sql_literal(c, row)).collect();
        values_rows.push(format!("({})", values.join(", ")));
    }
    let sql = format!("({columns_clause}) VALUES {}", values_rows.join(", "));

    let rows_loaded = db.insert_rows(database, table, &sql).await?;
    info!(table, rows_loaded, "seed table loaded");

    Ok(StageOutcome {
        status: "Success".to_string(),
        rows_loaded,
        rows_filtered: 0,
        elapsed_ms: started.elapsed().as_millis() as u64,
        error: None,
        error_kind: None,
    })
}

/// Load one reference CSV (`table_filter = Some(table)`) or every CSV
/// under `seeds/` (`table_filter = None`), each via plain `INSERT`
/// rather than Stream Load (spec §4.5, "INSERT for small seed loads").
pub async fn seed_load(ctx: &TenantContext, db: &dyn DbControl, table_filter: Option<&str>) -> SeedOutcome {
    let mut per_file = std::collections::HashMap::new();

    let files = match seed_files(&ctx.seeds_dir, table_filter) {
        Ok(files) => files,
        Err(e) => {
            warn!(tenant = ctx.slug(), error = %e, "failed to list seeds directory");
            return SeedOutcome { per_file };
        }
    };

    for (table, path) in files {
        let mapping = match load_seed_mapping(&ctx.seeds_dir, &table) {
            Ok(m) => m,
            Err(e) => {
                per_file.insert(
                    table.clone(),
                    StageOutcome {
                        status: "Failed(Load)".to_string(),
                        rows_loaded: 0,
                        rows_filtered: 0,
                        elapsed_ms: 0,
                        error: Some(e.to_string()),
                        error_kind: None,
                    },
                );
                continue;
            }
        };

        let outcome = match insert_one_file(db, &ctx.db.database, &table, &path, mapping.as_ref()).await {
            Ok(outcome) => outcome,
            Err(e) => StageOutcome {
                status: "Failed(Load)".to_string(),
                rows_loaded: 0,
                rows_filtered: 0,
                elapsed_ms: 0,
                error: Some(e.to_string()),
                error_kind: None,
            },
        };
        per_file.insert(table, outcome);
    }

    SeedOutcome { per_file }
}
