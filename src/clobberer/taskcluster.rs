//! Taskcluster worker-type cache summaries.
//!
//! For every branch namespace under the index root, resolve the branch's
//! latest decision task, download its task graph artifact, and fold every
//! task into `workerType → {cache names}`. Branches without a decision task
//! are skipped; any other failure aborts the whole run.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::models::{BranchWorkerTypes, WorkerType, WorkerTypeCacheMap};
use crate::config::TaskclusterSection;
use crate::errors::TaskclusterError;

/// One child namespace of the index root.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Namespace {
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ListNamespacesResponse {
    #[serde(default)]
    namespaces: Vec<Namespace>,
    #[serde(rename = "continuationToken", default)]
    continuation_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndexedTask {
    #[serde(rename = "taskId")]
    pub task_id: String,
    #[serde(default)]
    pub namespace: String,
}

/// Abstraction over the index and queue calls, for testability.
/// Real implementation: `TaskclusterClient`.
#[async_trait]
pub trait TaskclusterApi: Send + Sync {
    /// First page of namespaces directly under `namespace`.
    async fn list_namespaces(
        &self,
        namespace: &str,
        limit: u32,
    ) -> Result<Vec<Namespace>, TaskclusterError>;

    async fn find_task(&self, namespace: &str) -> Result<IndexedTask, TaskclusterError>;

    async fn get_latest_artifact(
        &self,
        task_id: &str,
        name: &str,
    ) -> Result<serde_json::Value, TaskclusterError>;
}

/// REST client for a Taskcluster deployment.
pub struct TaskclusterClient {
    root_url: String,
    http: reqwest::Client,
}

impl TaskclusterClient {
    pub fn new(root_url: &str, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent("clobberer");
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self {
            root_url: root_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn from_config(config: &TaskclusterSection) -> anyhow::Result<Self> {
        Self::new(
            &config.root_url,
            config.timeout_secs.map(Duration::from_secs),
        )
    }

    fn index_url(&self, path: &str) -> String {
        format!("{}/api/index/v1/{}", self.root_url, path)
    }

    fn queue_url(&self, path: &str) -> String {
        format!("{}/api/queue/v1/{}", self.root_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T, TaskclusterError> {
        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(|source| TaskclusterError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TaskclusterError::NotFound { url });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(TaskclusterError::Status {
                url,
                status: status.as_u16(),
                message,
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|source| TaskclusterError::Transport {
                url: url.clone(),
                source,
            })?;
        serde_json::from_slice(&body).map_err(|e| TaskclusterError::Malformed {
            url,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl TaskclusterApi for TaskclusterClient {
    async fn list_namespaces(
        &self,
        namespace: &str,
        limit: u32,
    ) -> Result<Vec<Namespace>, TaskclusterError> {
        let url = self.index_url(&format!("namespaces/{}", namespace));
        let resp: ListNamespacesResponse = self
            .get_json(url, &[("limit", limit.to_string())])
            .await?;
        if resp.continuation_token.is_some() {
            tracing::warn!(
                namespace,
                limit,
                "namespace listing truncated; only the first page is used"
            );
        }
        Ok(resp.namespaces)
    }

    async fn find_task(&self, namespace: &str) -> Result<IndexedTask, TaskclusterError> {
        self.get_json(self.index_url(&format!("task/{}", namespace)), &[])
            .await
    }

    async fn get_latest_artifact(
        &self,
        task_id: &str,
        name: &str,
    ) -> Result<serde_json::Value, TaskclusterError> {
        self.get_json(
            self.queue_url(&format!("task/{}/artifacts/{}", task_id, name)),
            &[],
        )
        .await
    }
}

// ── Task graph ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskGraph {
    #[serde(default)]
    pub tasks: Vec<GraphEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphEntry {
    pub task: TaskDefinition,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskDefinition {
    #[serde(rename = "provisionerId", default)]
    pub provisioner_id: Option<String>,
    #[serde(rename = "workerType", default)]
    pub worker_type: Option<String>,
    #[serde(default)]
    pub payload: TaskPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPayload {
    #[serde(default)]
    pub cache: serde_json::Map<String, serde_json::Value>,
}

impl TaskGraph {
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Fold a task graph into a branch's worker-type map.
///
/// The last non-empty `provisionerId` wins. Every worker type seen gets an
/// entry; its caches are the union of all cache names declared by its tasks.
pub fn fold_task_graph(branch: &mut BranchWorkerTypes, graph: &TaskGraph) {
    for entry in &graph.tasks {
        let task = &entry.task;

        if let Some(provisioner_id) = task.provisioner_id.as_deref().filter(|p| !p.is_empty()) {
            branch.provisioner_id = Some(provisioner_id.to_string());
        }

        if let Some(worker_type) = task.worker_type.as_deref().filter(|w| !w.is_empty()) {
            let summary = branch
                .worker_types
                .entry(worker_type.to_string())
                .or_insert_with(|| WorkerType {
                    name: worker_type.to_string(),
                    caches: BTreeSet::new(),
                });
            summary.caches.extend(task.payload.cache.keys().cloned());
        }
    }
}

/// Build the worker-type cache map for every branch under the index root.
pub async fn summarize_branches(
    api: &dyn TaskclusterApi,
    config: &TaskclusterSection,
) -> Result<WorkerTypeCacheMap, TaskclusterError> {
    let namespaces = api
        .list_namespaces(&config.index_root, config.namespace_limit)
        .await?;
    tracing::info!(
        root = %config.index_root,
        count = namespaces.len(),
        "listed branch namespaces"
    );

    let mut branches = WorkerTypeCacheMap::new();
    for ns in namespaces {
        let decision_ns = config.decision_namespace_for(&ns.name);

        let decision_task = match api.find_task(&decision_ns).await {
            Ok(task) => task,
            Err(e) if e.is_not_found() => {
                tracing::debug!(branch = %ns.name, namespace = %decision_ns, "no decision task; skipping branch");
                continue;
            }
            Err(e) => return Err(e),
        };

        let artifact = match api
            .get_latest_artifact(&decision_task.task_id, &config.graph_artifact)
            .await
        {
            Ok(value) => value,
            Err(e) if e.is_not_found() => {
                tracing::debug!(
                    branch = %ns.name,
                    task_id = %decision_task.task_id,
                    artifact = %config.graph_artifact,
                    "decision task has no graph artifact; skipping branch"
                );
                continue;
            }
            Err(e) => return Err(e),
        };

        let graph = TaskGraph::from_value(artifact).map_err(|e| TaskclusterError::Malformed {
            url: format!("{}/{}", decision_task.task_id, config.graph_artifact),
            message: e.to_string(),
        })?;

        let branch = branches
            .entry(ns.name.clone())
            .or_insert_with(|| BranchWorkerTypes::new(&ns.name));
        fold_task_graph(branch, &graph);
        tracing::debug!(
            branch = %ns.name,
            tasks = graph.tasks.len(),
            worker_types = branch.worker_types.len(),
            "folded decision task graph"
        );
    }

    Ok(branches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// In-memory index/queue keyed by namespace and task id.
    #[derive(Default)]
    struct MockTaskcluster {
        namespaces: Vec<&'static str>,
        tasks: HashMap<String, String>,
        artifacts: HashMap<String, serde_json::Value>,
        fail_find_with_status: Option<u16>,
        calls: Mutex<Vec<String>>,
    }

    impl MockTaskcluster {
        fn with_branch(mut self, branch: &'static str, graph: serde_json::Value) -> Self {
            let task_id = format!("task-{}", branch);
            self.namespaces.push(branch);
            self.tasks.insert(
                format!("gecko.v2.{}.latest.firefox.decision", branch),
                task_id.clone(),
            );
            self.artifacts.insert(task_id, graph);
            self
        }
    }

    #[async_trait]
    impl TaskclusterApi for MockTaskcluster {
        async fn list_namespaces(
            &self,
            namespace: &str,
            limit: u32,
        ) -> Result<Vec<Namespace>, TaskclusterError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("list {} {}", namespace, limit));
            Ok(self
                .namespaces
                .iter()
                .take(limit as usize)
                .map(|name| Namespace {
                    namespace: format!("{}.{}", namespace, name),
                    name: name.to_string(),
                })
                .collect())
        }

        async fn find_task(&self, namespace: &str) -> Result<IndexedTask, TaskclusterError> {
            self.calls.lock().unwrap().push(format!("find {}", namespace));
            if let Some(status) = self.fail_find_with_status {
                return Err(TaskclusterError::Status {
                    url: namespace.to_string(),
                    status,
                    message: "injected".into(),
                });
            }
            self.tasks
                .get(namespace)
                .map(|task_id| IndexedTask {
                    task_id: task_id.clone(),
                    namespace: namespace.to_string(),
                })
                .ok_or_else(|| TaskclusterError::NotFound {
                    url: namespace.to_string(),
                })
        }

        async fn get_latest_artifact(
            &self,
            task_id: &str,
            name: &str,
        ) -> Result<serde_json::Value, TaskclusterError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("artifact {} {}", task_id, name));
            self.artifacts
                .get(task_id)
                .cloned()
                .ok_or_else(|| TaskclusterError::NotFound {
                    url: task_id.to_string(),
                })
        }
    }

    fn graph(tasks: &[(&str, &str, &[&str])]) -> serde_json::Value {
        let tasks: Vec<_> = tasks
            .iter()
            .map(|(provisioner, worker_type, caches)| {
                let cache: serde_json::Map<_, _> = caches
                    .iter()
                    .map(|c| (c.to_string(), json!(format!("/home/worker/{}", c))))
                    .collect();
                json!({"task": {"provisionerId": provisioner, "workerType": worker_type, "payload": {"cache": cache}}})
            })
            .collect();
        json!({ "tasks": tasks })
    }

    #[test]
    fn test_fold_unions_caches_per_worker_type() {
        let graph = TaskGraph::from_value(graph(&[
            ("aws-provisioner-v1", "w1", &["a"]),
            ("aws-provisioner-v1", "w1", &["a", "b"]),
        ]))
        .unwrap();
        let mut branch = BranchWorkerTypes::new("try");
        fold_task_graph(&mut branch, &graph);

        let caches: Vec<_> = branch.worker_types["w1"].caches.iter().cloned().collect();
        assert_eq!(caches, vec!["a", "b"]);
        assert_eq!(branch.provisioner_id.as_deref(), Some("aws-provisioner-v1"));
    }

    #[test]
    fn test_fold_last_provisioner_wins() {
        let graph = TaskGraph::from_value(graph(&[
            ("first", "w1", &[]),
            ("second", "w2", &[]),
        ]))
        .unwrap();
        let mut branch = BranchWorkerTypes::new("b");
        fold_task_graph(&mut branch, &graph);
        assert_eq!(branch.provisioner_id.as_deref(), Some("second"));
    }

    #[test]
    fn test_fold_records_worker_types_without_caches() {
        let value = json!({"tasks": [
            {"task": {"workerType": "bare"}},
            {"task": {"provisionerId": "p", "payload": {"cache": {"orphan": "/x"}}}}
        ]});
        let graph = TaskGraph::from_value(value).unwrap();
        let mut branch = BranchWorkerTypes::new("b");
        fold_task_graph(&mut branch, &graph);

        assert_eq!(branch.worker_types.len(), 1);
        assert!(branch.worker_types["bare"].caches.is_empty());
        assert_eq!(branch.provisioner_id.as_deref(), Some("p"));
    }

    #[test]
    fn test_graph_without_tasks_is_empty() {
        let graph = TaskGraph::from_value(json!({})).unwrap();
        assert!(graph.tasks.is_empty());
    }

    #[test]
    fn test_graph_entry_without_task_is_malformed() {
        assert!(TaskGraph::from_value(json!({"tasks": [{"label": "x"}]})).is_err());
    }

    #[tokio::test]
    async fn test_summarize_skips_branch_without_decision_task() {
        let mut api = MockTaskcluster::default()
            .with_branch("mozilla-central", graph(&[("p", "w1", &["a"])]))
            .with_branch("try", graph(&[("p", "w2", &["b"])]));
        api.namespaces.push("ash");

        let branches = summarize_branches(&api, &TaskclusterSection::default())
            .await
            .unwrap();

        assert_eq!(branches.len(), 2);
        assert!(branches.contains_key("mozilla-central"));
        assert!(branches.contains_key("try"));
        assert!(!branches.contains_key("ash"));
        assert_eq!(branches["try"].name, "try");
    }

    #[tokio::test]
    async fn test_summarize_skips_branch_with_missing_artifact() {
        let mut api = MockTaskcluster::default().with_branch("b1", graph(&[("p", "w", &[])]));
        api.namespaces.push("b2");
        api.tasks.insert(
            "gecko.v2.b2.latest.firefox.decision".into(),
            "task-without-artifact".into(),
        );

        let branches = summarize_branches(&api, &TaskclusterSection::default())
            .await
            .unwrap();
        assert_eq!(branches.keys().collect::<Vec<_>>(), vec!["b1"]);
    }

    #[tokio::test]
    async fn test_summarize_aborts_on_other_errors() {
        let mut api = MockTaskcluster::default().with_branch("b1", graph(&[("p", "w", &[])]));
        api.fail_find_with_status = Some(500);

        let err = summarize_branches(&api, &TaskclusterSection::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskclusterError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_summarize_aborts_on_malformed_graph() {
        let api = MockTaskcluster::default().with_branch("b1", json!({"tasks": "nope"}));
        let err = summarize_branches(&api, &TaskclusterSection::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskclusterError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_summarize_uses_configured_limit_and_artifact() {
        let api = MockTaskcluster::default()
            .with_branch("a", graph(&[]))
            .with_branch("b", graph(&[]))
            .with_branch("c", graph(&[]));
        let config = TaskclusterSection {
            namespace_limit: 2,
            graph_artifact: "public/task-graph.json".into(),
            ..TaskclusterSection::default()
        };

        let branches = summarize_branches(&api, &config).await.unwrap();
        assert_eq!(branches.len(), 2);

        let calls = api.calls.lock().unwrap();
        assert_eq!(calls[0], "list gecko.v2 2");
        assert!(calls.contains(&"artifact task-a public/task-graph.json".to_string()));
        assert!(!calls.iter().any(|c| c.contains("gecko.v2.c.")));
    }

    #[tokio::test]
    async fn test_client_decodes_index_and_queue_responses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/index/v1/namespaces/gecko.v2"))
            .and(query_param("limit", "1000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "namespaces": [{"namespace": "gecko.v2.try", "name": "try", "expires": "2030-01-01T00:00:00Z"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/index/v1/task/gecko.v2.try.latest.firefox.decision"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "namespace": "gecko.v2.try.latest.firefox.decision",
                "taskId": "abc123",
                "rank": 0
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/queue/v1/task/abc123/artifacts/public/graph.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(graph(&[("p", "w1", &["c"])])))
            .mount(&server)
            .await;

        let client = TaskclusterClient::new(&server.uri(), None).unwrap();
        let config = TaskclusterSection {
            root_url: server.uri(),
            ..TaskclusterSection::default()
        };
        let branches = summarize_branches(&client, &config).await.unwrap();

        assert_eq!(branches.len(), 1);
        let try_branch = &branches["try"];
        assert_eq!(try_branch.provisioner_id.as_deref(), Some("p"));
        assert!(try_branch.worker_types["w1"].caches.contains("c"));
    }

    #[tokio::test]
    async fn test_client_maps_404_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/index/v1/task/gecko.v2.gone.latest.firefox.decision"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"code": "ResourceNotFound"})))
            .mount(&server)
            .await;

        let client = TaskclusterClient::new(&server.uri(), None).unwrap();
        let err = client
            .find_task("gecko.v2.gone.latest.firefox.decision")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_client_maps_other_statuses_and_bad_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/index/v1/task/rate.limited"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/index/v1/task/not.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = TaskclusterClient::new(&format!("{}/", server.uri()), None).unwrap();

        match client.find_task("rate.limited").await.unwrap_err() {
            TaskclusterError::Status {
                status, message, ..
            } => {
                assert_eq!(status, 429);
                assert_eq!(message, "slow down");
            }
            other => panic!("Expected Status, got {:?}", other),
        }
        assert!(matches!(
            client.find_task("not.json").await.unwrap_err(),
            TaskclusterError::Malformed { .. }
        ));
    }
}
