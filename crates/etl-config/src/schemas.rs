//! Loading one tenant's `schemas/`, `column_mappings/`, and
//! `computed_columns.yaml` from disk (spec §6.1 layout).

use etl_core::{
    CastPolicy, ColumnMapping, ColumnMappingEntry, ComputedColumnKind, ComputedColumnRule,
    ConfigError, RowFilterRule, TableKind, TableSchema,
};
use petgraph::graph::DiGraph;
use petgraph::algo::toposort;
use std::collections::HashMap;
use std::path::Path;

/// Parse a `NN_<Name>` stem into its ordinal and table name.
fn split_ordinal_name(stem: &str) -> Option<(u32, String)> {
    let (ord, name) = stem.split_once('_')?;
    let ordinal: u32 = ord.parse().ok()?;
    Some((ordinal, name.to_string()))
}

fn table_name_from_pascal(name: &str) -> String {
    let mut out = String::new();
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() && i != 0 {
            out.push('_');
        }
        out.extend(c.to_lowercase());
    }
    out
}

fn load_schema_dir(dir: &Path, kind: TableKind) -> Result<Vec<TableSchema>, ConfigError> {
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("yaml"))
        .collect();
    entries.sort();

    for path in entries {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let (ordinal, raw_name) = split_ordinal_name(stem).ok_or_else(|| ConfigError::ParseError {
            path: path.display().to_string(),
            message: "schema file must be named NN_<Name>.yaml".to_string(),
        })?;
        let table_name = table_name_from_pascal(&raw_name);

        let yaml_text = std::fs::read_to_string(&path)?;
        let comments: HashMap<String, String> = if yaml_text.trim().is_empty() {
            HashMap::new()
        } else {
            serde_yaml::from_str(&yaml_text).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?
        };

        let ddl_path = path.with_extension("ddl");
        let ddl = std::fs::read_to_string(&ddl_path).map_err(|e| ConfigError::ParseError {
            path: ddl_path.display().to_string(),
            message: e.to_string(),
        })?;

        out.push(TableSchema {
            name: table_name,
            kind,
            ordinal,
            ddl,
            column_comments: comments,
        });
    }

    Ok(out)
}

/// Load `schemas/{tables,views,matviews}/NN_<Name>.{yaml,ddl}`, ordered by
/// ordinal within each kind for deterministic creation order.
pub fn load_schemas(tenant_dir: &Path, schemas_dir: &str) -> Result<Vec<TableSchema>, ConfigError> {
    let root = tenant_dir.join(schemas_dir);
    let mut all = load_schema_dir(&root.join("tables"), TableKind::Table)?;
    all.extend(load_schema_dir(&root.join("views"), TableKind::View)?);
    all.extend(load_schema_dir(&root.join("matviews"), TableKind::Matview)?);
    all.sort_by_key(|s| (kind_rank(s.kind), s.ordinal));
    Ok(all)
}

fn kind_rank(kind: TableKind) -> u8 {
    match kind {
        TableKind::Table => 0,
        TableKind::View => 1,
        TableKind::Matview => 2,
    }
}

#[derive(serde::Deserialize)]
struct MappingFile {
    #[serde(default)]
    entries: Vec<ColumnMappingEntry>,
}

/// Load `column_mappings/NN_<Name>.yaml` for every table declared.
pub fn load_column_mappings(
    tenant_dir: &Path,
    mappings_dir: &str,
) -> Result<HashMap<String, ColumnMapping>, ConfigError> {
    let root = tenant_dir.join(mappings_dir);
    let mut out = HashMap::new();
    if !root.is_dir() {
        return Ok(out);
    }
    let mut entries: Vec<_> = std::fs::read_dir(&root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("yaml"))
        .collect();
    entries.sort();

    for path in entries {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let (_, raw_name) = split_ordinal_name(stem).ok_or_else(|| ConfigError::ParseError {
            path: path.display().to_string(),
            message: "mapping file must be named NN_<Name>.yaml".to_string(),
        })?;
        let table_name = table_name_from_pascal(&raw_name);

        let text = std::fs::read_to_string(&path)?;
        let parsed: MappingFile = serde_yaml::from_str(&text).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        out.insert(
            table_name.clone(),
            ColumnMapping {
                table: table_name,
                entries: parsed.entries,
            },
        );
    }

    Ok(out)
}

/// Load `computed_columns.yaml`: `{ table_name: [rule, ...] }`. Validates
/// every table's dependency graph is acyclic before returning (spec §8).
pub fn load_computed_columns(
    tenant_dir: &Path,
    file_name: &str,
) -> Result<HashMap<String, Vec<ComputedColumnRule>>, ConfigError> {
    let path = tenant_dir.join(file_name);
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let text = std::fs::read_to_string(&path)?;
    let parsed: HashMap<String, Vec<ComputedColumnRule>> =
        serde_yaml::from_str(&text).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    for (table, rules) in &parsed {
        validate_acyclic(table, rules)?;
    }

    Ok(parsed)
}

/// Load `row_filters.yaml`: `{ table_name: ["predicate", ...] }` (spec
/// §4.4 step 4).
pub fn load_row_filters(
    tenant_dir: &Path,
    file_name: &str,
) -> Result<HashMap<String, Vec<RowFilterRule>>, ConfigError> {
    let path = tenant_dir.join(file_name);
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let text = std::fs::read_to_string(&path)?;
    let parsed: HashMap<String, Vec<String>> =
        serde_yaml::from_str(&text).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    Ok(parsed
        .into_iter()
        .map(|(table, exprs)| {
            (
                table,
                exprs.into_iter().map(|expression| RowFilterRule { expression }).collect(),
            )
        })
        .collect())
}

fn rule_dependencies<'a>(rule: &'a ComputedColumnRule, all_targets: &[&'a str]) -> Vec<&'a str> {
    let mut deps = Vec::new();
    let candidates: Vec<&str> = all_targets
        .iter()
        .copied()
        .filter(|t| *t != rule.target_column)
        .collect();

    match &rule.kind {
        ComputedColumnKind::Concatenation { source_columns, .. } => {
            for c in source_columns {
                if let Some(t) = candidates.iter().find(|t| *t == c) {
                    deps.push(*t);
                }
            }
        }
        ComputedColumnKind::Arithmetic { expression } => {
            for t in &candidates {
                if expression.contains(t) {
                    deps.push(t);
                }
            }
        }
        ComputedColumnKind::Lookup { source_column, .. } => {
            if let Some(t) = candidates.iter().find(|t| *t == source_column) {
                deps.push(*t);
            }
        }
        ComputedColumnKind::Transformation { source_columns, .. } => {
            for c in source_columns {
                if let Some(t) = candidates.iter().find(|t| *t == c) {
                    deps.push(*t);
                }
            }
        }
    }
    deps
}

fn validate_acyclic(table: &str, rules: &[ComputedColumnRule]) -> Result<(), ConfigError> {
    let targets: Vec<&str> = rules.iter().map(|r| r.target_column.as_str()).collect();
    let mut graph = DiGraph::<&str, ()>::new();
    let mut nodes = HashMap::new();
    for t in &targets {
        nodes.insert(*t, graph.add_node(*t));
    }
    for rule in rules {
        let from = nodes[rule.target_column.as_str()];
        for dep in rule_dependencies(rule, &targets) {
            let to = nodes[dep];
            // dependency edge: `to` must be computed before `from`
            graph.add_edge(to, from, ());
        }
    }
    if toposort(&graph, None).is_err() {
        return Err(ConfigError::ComputedRuleCycle {
            table: table.to_string(),
            columns: targets.into_iter().map(String::from).collect(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use etl_core::ComputedColumnKind;

    fn rule(target: &str, kind: ComputedColumnKind) -> ComputedColumnRule {
        ComputedColumnRule {
            target_column: target.to_string(),
            output_type: "string".to_string(),
            kind,
        }
    }

    #[test]
    fn detects_direct_cycle() {
        let rules = vec![
            rule(
                "a",
                ComputedColumnKind::Concatenation {
                    source_columns: vec!["b".to_string()],
                    separator: "_".to_string(),
                },
            ),
            rule(
                "b",
                ComputedColumnKind::Concatenation {
                    source_columns: vec!["a".to_string()],
                    separator: "_".to_string(),
                },
            ),
        ];
        assert!(validate_acyclic("t", &rules).is_err());
    }

    #[test]
    fn allows_acyclic_dependency_chain() {
        let rules = vec![
            rule(
                "full_name",
                ComputedColumnKind::Concatenation {
                    source_columns: vec!["first".to_string(), "last".to_string()],
                    separator: " ".to_string(),
                },
            ),
            rule(
                "greeting",
                ComputedColumnKind::Concatenation {
                    source_columns: vec!["full_name".to_string()],
                    separator: "".to_string(),
                },
            ),
        ];
        assert!(validate_acyclic("t", &rules).is_ok());
    }

    #[test]
    fn pascal_case_table_names_convert_to_snake_case() {
        assert_eq!(table_name_from_pascal("DimDealerMaster"), "dim_dealer_master");
    }
}
