//! Cluster Gateway (C1): one typed operation per REST endpoint, owning
//! TLS/auth and retry-with-backoff (§4.1).

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::time::Duration;

use crate::classify;
use crate::config::tenant::{Connection, TenantConfig};

use super::error::{ClusterError, ClusterResult};
use super::retry::{retry_transport, RetryPolicy};
use super::types::{AliasMember, ClusterStats, DataStream, HealthColor, IndexRecord, NodeJvmStats, SnapshotInfo};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ClusterGateway {
    client: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
    retry_policy: RetryPolicy,
}

impl ClusterGateway {
    pub fn new(tenant: &TenantConfig) -> ClusterResult<Self> {
        Self::with_retry_policy(&tenant.connection, RetryPolicy::default())
    }

    pub fn with_retry_policy(conn: &Connection, retry_policy: RetryPolicy) -> ClusterResult<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .pool_max_idle_per_host(10);

        if conn.ssl_enabled {
            use crate::config::tenant::CertVerifyMode;
            match conn.cert_verify {
                CertVerifyMode::Required => {}
                CertVerifyMode::Optional => {
                    builder = builder.danger_accept_invalid_certs(true);
                }
                CertVerifyMode::None => {
                    builder = builder
                        .danger_accept_invalid_certs(true)
                        .danger_accept_invalid_hostnames(true);
                }
            }
            if !conn.check_hostname {
                builder = builder.danger_accept_invalid_hostnames(true);
            }
            if let Some(ca_path) = &conn.ca_file {
                if let Ok(pem) = std::fs::read(ca_path) {
                    if let Ok(cert) = reqwest::Certificate::from_pem(&pem) {
                        builder = builder.add_root_certificate(cert);
                    }
                }
            }
        }

        let client = builder
            .build()
            .map_err(|e| ClusterError::Transport(e.to_string()))?;

        Ok(ClusterGateway {
            client,
            base_url: conn.base_url(),
            user: conn.user.clone(),
            password: conn.password.clone(),
            retry_policy,
        })
    }

    fn req(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .basic_auth(&self.user, Some(&self.password))
    }

    // --- Indices -----------------------------------------------------

    /// `cat/indices` with byte-precise size fields (§4.1: "size fields
    /// always requested in bytes to avoid unit parsing").
    pub async fn list_indices(&self) -> ClusterResult<Vec<IndexRecord>> {
        let body: Value = retry_transport(self.retry_policy, || async {
            self.req(reqwest::Method::GET, "/_cat/indices?format=json&bytes=b")
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
                .map_err(ClusterError::from)
        })
        .await?;

        let rows = body
            .as_array()
            .ok_or_else(|| ClusterError::malformed("_cat/indices", "expected a JSON array"))?;

        rows.iter().map(parse_index_row).collect()
    }

    pub async fn get_index_stats(&self, name: &str) -> ClusterResult<IndexRecord> {
        let indices = self.list_indices().await?;
        indices
            .into_iter()
            .find(|i| i.name == name)
            .ok_or_else(|| ClusterError::malformed("_cat/indices", format!("index {name} not found")))
    }

    pub async fn list_aliases(&self) -> ClusterResult<Vec<AliasMember>> {
        let body: Value = retry_transport(self.retry_policy, || async {
            self.req(reqwest::Method::GET, "/_cat/aliases?format=json")
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
                .map_err(ClusterError::from)
        })
        .await?;

        let rows = body
            .as_array()
            .ok_or_else(|| ClusterError::malformed("_cat/aliases", "expected a JSON array"))?;

        rows.iter()
            .map(|row| {
                Ok(AliasMember {
                    alias: field_str(row, "alias", "_cat/aliases")?,
                    index: field_str(row, "index", "_cat/aliases")?,
                    is_write_index: row
                        .get("is_write_index")
                        .and_then(Value::as_str)
                        .map(|v| v == "true")
                        .unwrap_or(false),
                })
            })
            .collect()
    }

    pub async fn list_data_streams(&self) -> ClusterResult<Vec<DataStream>> {
        let body: Value = retry_transport(self.retry_policy, || async {
            self.req(reqwest::Method::GET, "/_data_stream")
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
                .map_err(ClusterError::from)
        })
        .await?;

        let streams = body
            .get("data_streams")
            .and_then(Value::as_array)
            .ok_or_else(|| ClusterError::malformed("_data_stream", "missing data_streams"))?;

        streams
            .iter()
            .map(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| ClusterError::malformed("_data_stream", e.to_string()))
            })
            .collect()
    }

    /// Fetches indices + aliases + data streams and annotates group,
    /// special, and write-index fields in one shot (C1 feeding C3).
    pub async fn list_classified_indices(&self) -> ClusterResult<Vec<IndexRecord>> {
        let mut indices = self.list_indices().await?;
        let aliases = self.list_aliases().await?;
        let data_streams = self.list_data_streams().await?;

        let mut members = aliases;
        members.extend(classify::synthesize_data_stream_members(&data_streams));
        classify::annotate_write_indices(&mut indices, &members);
        Ok(indices)
    }

    pub async fn get_settings(&self, index: &str) -> ClusterResult<Value> {
        retry_transport(self.retry_policy, || async {
            self.req(reqwest::Method::GET, &format!("/{index}/_settings"))
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
                .map_err(ClusterError::from)
        })
        .await
    }

    pub async fn put_settings(&self, index: &str, body: &Value) -> ClusterResult<()> {
        retry_transport(self.retry_policy, || async {
            self.req(reqwest::Method::PUT, &format!("/{index}/_settings"))
                .json(body)
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
        .await
    }

    pub async fn create_index(&self, name: &str) -> ClusterResult<()> {
        retry_transport(self.retry_policy, || async {
            self.req(reqwest::Method::PUT, &format!("/{name}"))
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
        .await
    }

    pub async fn update_aliases(&self, actions: &Value) -> ClusterResult<()> {
        retry_transport(self.retry_policy, || async {
            self.req(reqwest::Method::POST, "/_aliases")
                .json(&json!({ "actions": actions }))
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
        .await
    }

    pub async fn rollover(&self, alias: &str) -> ClusterResult<Value> {
        retry_transport(self.retry_policy, || async {
            self.req(reqwest::Method::POST, &format!("/{alias}/_rollover"))
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
                .map_err(ClusterError::from)
        })
        .await
    }

    /// §4.5: "groups of ≤ 50 index names are deleted in a single call."
    pub async fn delete_indices(&self, names: &[String]) -> ClusterResult<()> {
        for chunk in names.chunks(50) {
            let joined = chunk.join(",");
            retry_transport(self.retry_policy, || async {
                self.req(reqwest::Method::DELETE, &format!("/{joined}"))
                    .send()
                    .await?
                    .error_for_status()?;
                Ok(())
            })
            .await?;
        }
        Ok(())
    }

    pub async fn delete_data_stream(&self, name: &str) -> ClusterResult<()> {
        retry_transport(self.retry_policy, || async {
            self.req(reqwest::Method::DELETE, &format!("/_data_stream/{name}"))
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
        .await
    }

    /// §4.1: a socket timeout on forcemerge is treated as success because
    /// the server continues the merge asynchronously.
    pub async fn forcemerge(&self, index: &str, max_num_segments: u32) -> ClusterResult<()> {
        let path = format!("/{index}/_forcemerge?max_num_segments={max_num_segments}");
        let result = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .basic_auth(&self.user, Some(&self.password))
            .timeout(Duration::from_secs(3600))
            .send()
            .await;

        match result {
            Ok(resp) => {
                resp.error_for_status().map_err(ClusterError::from)?;
                Ok(())
            }
            Err(e) if e.is_timeout() => {
                tracing::info!(index, "forcemerge socket timeout, treating as in-progress success");
                Ok(())
            }
            Err(e) => Err(ClusterError::from(e)),
        }
    }

    // --- Snapshots -----------------------------------------------------

    pub async fn snapshot_list(&self, repo: &str) -> ClusterResult<Vec<SnapshotInfo>> {
        let body: Value = retry_transport(self.retry_policy, || async {
            self.req(reqwest::Method::GET, &format!("/_snapshot/{repo}/_all"))
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
                .map_err(ClusterError::from)
        })
        .await?;

        let snapshots = body
            .get("snapshots")
            .and_then(Value::as_array)
            .ok_or_else(|| ClusterError::malformed("_snapshot", "missing snapshots"))?;

        let now = Utc::now();
        snapshots
            .iter()
            .map(|s| {
                let full_name = field_str(s, "snapshot", "_snapshot")?;
                let start_time = s
                    .get("start_time")
                    .and_then(Value::as_str)
                    .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or(now);
                Ok(SnapshotInfo {
                    repository: repo.to_string(),
                    short_name: short_name(&full_name),
                    full_name,
                    age_days: (now - start_time).num_days(),
                })
            })
            .collect()
    }

    pub async fn snapshot_create(&self, repo: &str, name: &str, body: &Value) -> ClusterResult<()> {
        retry_transport(self.retry_policy, || async {
            self.req(
                reqwest::Method::PUT,
                &format!("/_snapshot/{repo}/{name}?wait_for_completion=false"),
            )
            .json(body)
            .send()
            .await?
            .error_for_status()?;
            Ok(())
        })
        .await
    }

    pub async fn snapshot_delete(&self, repo: &str, name: &str) -> ClusterResult<()> {
        retry_transport(self.retry_policy, || async {
            self.req(reqwest::Method::DELETE, &format!("/_snapshot/{repo}/{name}"))
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
        .await
    }

    pub async fn snapshot_restore(&self, repo: &str, snapshot: &str, body: &Value) -> ClusterResult<()> {
        retry_transport(self.retry_policy, || async {
            self.req(reqwest::Method::POST, &format!("/_snapshot/{repo}/{snapshot}/_restore"))
                .json(body)
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
        .await
    }

    pub async fn repository_exists(&self, repo: &str) -> ClusterResult<bool> {
        let body: Value = retry_transport(self.retry_policy, || async {
            self.req(reqwest::Method::GET, "/_cat/repositories?format=json")
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
                .map_err(ClusterError::from)
        })
        .await?;

        let rows = body.as_array().ok_or_else(|| ClusterError::malformed("_cat/repositories", "expected array"))?;
        Ok(rows.iter().any(|r| r.get("id").and_then(Value::as_str) == Some(repo)))
    }

    // --- Cluster / node stats ------------------------------------------

    pub async fn cluster_health(&self) -> ClusterResult<HealthColor> {
        let body: Value = retry_transport(self.retry_policy, || async {
            self.client
                .get(format!("{}/_cluster/health", self.base_url))
                .basic_auth(&self.user, Some(&self.password))
                .timeout(HEALTH_TIMEOUT)
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
                .map_err(ClusterError::from)
        })
        .await?;

        let status = field_str(&body, "status", "_cluster/health")?;
        HealthColor::parse(&status)
            .ok_or_else(|| ClusterError::malformed("_cluster/health", format!("unknown status {status}")))
    }

    pub async fn cluster_stats(&self) -> ClusterResult<ClusterStats> {
        let body: Value = retry_transport(self.retry_policy, || async {
            self.req(reqwest::Method::GET, "/_cluster/stats")
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
                .map_err(ClusterError::from)
        })
        .await?;

        let size = body
            .pointer("/indices/store/size_in_bytes")
            .and_then(Value::as_u64)
            .ok_or_else(|| ClusterError::malformed("_cluster/stats", "missing indices.store.size_in_bytes"))?;

        Ok(ClusterStats {
            store_size_bytes: size,
        })
    }

    /// §4.10: worker pool sizing queries the lowest node's live JVM thread
    /// count via `node_stats_jvm`.
    pub async fn node_stats_jvm(&self) -> ClusterResult<NodeJvmStats> {
        let body: Value = retry_transport(self.retry_policy, || async {
            self.req(reqwest::Method::GET, "/_nodes/stats/jvm")
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
                .map_err(ClusterError::from)
        })
        .await?;

        let nodes = body
            .get("nodes")
            .and_then(Value::as_object)
            .ok_or_else(|| ClusterError::malformed("_nodes/stats/jvm", "missing nodes"))?;

        let lowest = nodes
            .values()
            .filter_map(|n| n.pointer("/jvm/threads/count").and_then(Value::as_u64))
            .min()
            .ok_or_else(|| ClusterError::malformed("_nodes/stats/jvm", "no node thread counts reported"))?;

        Ok(NodeJvmStats {
            lowest_live_thread_count: lowest as u32,
        })
    }

    // --- Search / aggregations / bulk -----------------------------------

    pub async fn search(&self, index: &str, dsl: &Value) -> ClusterResult<Value> {
        retry_transport(self.retry_policy, || async {
            self.req(reqwest::Method::POST, &format!("/{index}/_search"))
                .json(dsl)
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
                .map_err(ClusterError::from)
        })
        .await
    }

    pub async fn aggregate(&self, index: &str, spec: &Value) -> ClusterResult<Value> {
        self.search(index, &json!({ "size": 0, "aggs": spec })).await
    }

    /// Bulk-indexes `docs` into `index`. `create_only` uses `op_type=create`
    /// so re-invocation with the same `_id` is a no-op (§5 job-queue
    /// idempotence; §4.9 step 6's accounting mirror uses `create_only =
    /// false`).
    pub async fn bulk_index(&self, index: &str, docs: &[(Option<String>, Value)], create_only: bool) -> ClusterResult<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let op = if create_only { "create" } else { "index" };
        let mut body = String::new();
        for (id, doc) in docs {
            let meta = match id {
                Some(id) => json!({ op: { "_index": index, "_id": id } }),
                None => json!({ op: { "_index": index } }),
            };
            body.push_str(&serde_json::to_string(&meta).expect("serializable metadata"));
            body.push('\n');
            body.push_str(&serde_json::to_string(doc).expect("serializable document"));
            body.push('\n');
        }

        retry_transport(self.retry_policy, || async {
            self.req(reqwest::Method::POST, "/_bulk")
                .header("Content-Type", "application/x-ndjson")
                .body(body.clone())
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
        .await
    }
}

fn field_str(value: &Value, field: &str, endpoint: &str) -> ClusterResult<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ClusterError::malformed(endpoint, format!("missing field {field}")))
}

fn field_u64(value: &Value, field: &str, endpoint: &str) -> ClusterResult<u64> {
    value
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<u64>().ok())
        .or_else(|| value.get(field).and_then(Value::as_u64))
        .ok_or_else(|| ClusterError::malformed(endpoint, format!("missing field {field}")))
}

/// Strips the trailing `_YYYY-MM-DD_HH:MM[:SS]` stamp from a snapshot's
/// full name, per §3's `SnapshotInfo.short_name` / §4.8's retention pass.
pub fn short_name(full_name: &str) -> String {
    use std::sync::OnceLock;
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        regex::Regex::new(r"_\d{4}-\d{2}-\d{2}_\d{2}:\d{2}(:\d{2})?$").expect("static regex")
    });
    match re.find(full_name) {
        Some(m) => full_name[..m.start()].to_string(),
        None => full_name.to_string(),
    }
}

fn parse_index_row(row: &Value) -> ClusterResult<IndexRecord> {
    let name = field_str(row, "index", "_cat/indices")?;
    let uuid = field_str(row, "uuid", "_cat/indices").unwrap_or_default();
    let health = row
        .get("health")
        .and_then(Value::as_str)
        .and_then(HealthColor::parse)
        .unwrap_or(HealthColor::Red);
    let primary_shards = row
        .get("pri")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);
    let replica_shards = row
        .get("rep")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let doc_count = row
        .get("docs.count")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let store_size_bytes = field_u64(row, "store.size", "_cat/indices").unwrap_or(0);
    let primary_store_size_bytes = field_u64(row, "pri.store.size", "_cat/indices").unwrap_or(store_size_bytes);
    let creation_date = row
        .get("creation.date.string")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let group = classify::group(&name);
    let is_special = classify::is_special(&name);

    Ok(IndexRecord {
        name,
        uuid,
        health,
        primary_shards,
        replica_shards,
        doc_count,
        store_size_bytes,
        primary_store_size_bytes,
        creation_date,
        group,
        is_write_index: false,
        is_special,
    })
}
