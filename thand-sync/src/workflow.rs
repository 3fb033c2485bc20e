//! Durable-mode workflow runtime
//!
//! An in-process engine with the shapes a hosted workflow service
//! exposes: an activity registry with `<identifier>-<MethodName>`
//! naming, start-to-close timeouts, retry policies that back off on
//! transient failures and never retry the `NotImplemented` sentinel,
//! workflow handles, and indexed search attributes. Wiring the same
//! surface to an external engine is a deployment concern.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use thand_core::{SyncError, SynchronizeCapability, ThandResult};
use thand_providers::Provider;

use crate::orchestrator::run_capability;
use crate::upstream::{ChunkInput, CommitInput, StartInput, UpstreamClient};

/// Execution ceiling for one synchronize workflow.
pub const WORKFLOW_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Start-to-close ceiling for one activity attempt.
pub const ACTIVITY_START_TO_CLOSE: Duration = Duration::from_secs(10 * 60);

// ============================================================================
// POLICIES & OPTIONS
// ============================================================================

/// Retry behavior for activity attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn next_backoff(&self, current: Duration) -> Duration {
        let scaled = Duration::from_secs_f64(current.as_secs_f64() * self.backoff_multiplier);
        scaled.min(self.max_backoff)
    }
}

/// Indexed attributes attached to a workflow start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchAttributes {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub workflow: String,
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub identities: Vec<String>,
    #[serde(default)]
    pub approved: bool,
}

/// Start options for one workflow execution.
#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    pub workflow_id: String,
    pub execution_timeout: Duration,
    /// Pinned worker deployment version, when the caller needs one
    pub worker_version: Option<String>,
    pub search_attributes: Option<SearchAttributes>,
}

/// A started workflow execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowHandle {
    pub workflow_id: String,
    pub run_id: String,
}

// ============================================================================
// ACTIVITY REGISTRY
// ============================================================================

type ActivityFn =
    Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, ThandResult<serde_json::Value>> + Send + Sync>;

/// Named activities available to workflows.
#[derive(Default)]
pub struct ActivityRegistry {
    activities: RwLock<HashMap<String, ActivityFn>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&self, name: impl Into<String>, activity: F)
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ThandResult<serde_json::Value>> + Send + 'static,
    {
        let boxed: ActivityFn = Arc::new(move |input| Box::pin(activity(input)));
        self.activities.write().unwrap().insert(name.into(), boxed);
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.activities.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.activities.read().unwrap().contains_key(name)
    }

    /// Run an activity under the start-to-close timeout and the retry
    /// policy. Transient failures back off and retry; the
    /// `NotImplemented` sentinel becomes a non-retryable failure.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        retry: &RetryPolicy,
    ) -> ThandResult<serde_json::Value> {
        let activity = self
            .activities
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::ActivityFailed {
                activity: name.to_string(),
                reason: "not registered".to_string(),
            })?;

        let mut attempt = 1u32;
        let mut backoff = retry.initial_backoff;
        loop {
            match tokio::time::timeout(ACTIVITY_START_TO_CLOSE, activity(input.clone())).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) if err.is_not_implemented() => {
                    // Retrying an unimplemented operation cannot succeed.
                    return Err(SyncError::ActivityFailed {
                        activity: name.to_string(),
                        reason: err.to_string(),
                    }
                    .into());
                }
                Ok(Err(err)) if err.is_transient() && attempt < retry.max_attempts => {
                    warn!(activity = name, attempt, %err, "retrying activity");
                    tokio::time::sleep(backoff).await;
                    backoff = retry.next_backoff(backoff);
                    attempt += 1;
                }
                Ok(Err(err)) => return Err(err),
                Err(_elapsed) => {
                    return Err(SyncError::ActivityFailed {
                        activity: name.to_string(),
                        reason: format!(
                            "start-to-close timeout of {}s exceeded",
                            ACTIVITY_START_TO_CLOSE.as_secs()
                        ),
                    }
                    .into());
                }
            }
        }
    }
}

// ============================================================================
// WORKFLOW SERVICE
// ============================================================================

/// In-process workflow service: starts executions, tracks handles,
/// owns the activity registry and the default retry policy.
pub struct WorkflowService {
    activities: Arc<ActivityRegistry>,
    retry: RetryPolicy,
    executions: Mutex<HashMap<String, tokio::task::JoinHandle<ThandResult<serde_json::Value>>>>,
}

impl Default for WorkflowService {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowService {
    pub fn new() -> Self {
        Self {
            activities: Arc::new(ActivityRegistry::new()),
            retry: RetryPolicy::default(),
            executions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn activities(&self) -> &Arc<ActivityRegistry> {
        &self.activities
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Start a workflow execution; the body runs on its own task under
    /// the execution timeout and the caller gets the handle immediately.
    /// A workflow id with an execution still running is rejected.
    pub fn start<F>(&self, options: WorkflowOptions, body: F) -> ThandResult<WorkflowHandle>
    where
        F: std::future::Future<Output = ThandResult<serde_json::Value>> + Send + 'static,
    {
        let mut executions = self.executions.lock().unwrap();
        if let Some(existing) = executions.get(&options.workflow_id) {
            if !existing.is_finished() {
                return Err(SyncError::WorkflowStart {
                    workflow: options.workflow_id.clone(),
                    reason: "an execution with this id is already running".to_string(),
                }
                .into());
            }
        }

        let run_id = Uuid::new_v4().to_string();
        debug!(
            workflow_id = %options.workflow_id,
            run_id = %run_id,
            worker_version = options.worker_version.as_deref().unwrap_or("default"),
            "starting workflow"
        );

        let workflow_id = options.workflow_id.clone();
        let timeout = options.execution_timeout;
        let join = tokio::spawn(async move {
            match tokio::time::timeout(timeout, body).await {
                Ok(result) => result,
                Err(_elapsed) => Err(SyncError::WorkflowFailed {
                    workflow: workflow_id,
                    reason: format!("execution timeout of {}s exceeded", timeout.as_secs()),
                }
                .into()),
            }
        });
        executions.insert(options.workflow_id.clone(), join);

        Ok(WorkflowHandle {
            workflow_id: options.workflow_id,
            run_id,
        })
    }

    /// Await a started execution's result (used by tests and embedders;
    /// the orchestrator itself is fire-and-forget).
    pub async fn await_result(&self, workflow_id: &str) -> ThandResult<serde_json::Value> {
        let join = self
            .executions
            .lock()
            .unwrap()
            .remove(workflow_id)
            .ok_or_else(|| SyncError::WorkflowFailed {
                workflow: workflow_id.to_string(),
                reason: "no such execution".to_string(),
            })?;
        join.await.map_err(|err| {
            SyncError::WorkflowFailed {
                workflow: workflow_id.to_string(),
                reason: format!("execution task failed: {err}"),
            }
        })?
    }
}

// ============================================================================
// ACTIVITY REGISTRATION
// ============================================================================

/// Register every synchronize activity of a provider as
/// `<identifier>-<MethodName>`. Activities run the shared pagination
/// streamer and write through the provider's catalogs.
pub fn register_provider_activities(service: &WorkflowService, provider: Arc<dyn Provider>) {
    let identifier = provider.identifier();
    for capability in SynchronizeCapability::ALL {
        let name = format!("{identifier}-{}", capability.activity_name());
        let provider = Arc::clone(&provider);
        service.activities().register(name, move |_input| {
            let provider = Arc::clone(&provider);
            async move {
                let chunk = run_capability(provider.as_ref(), capability).await?;
                serde_json::to_value(&chunk).map_err(json_error)
            }
        });
    }
}

/// Register the three upstream forwarding activities for a provider:
/// `<identifier>-SynchronizeThand{Start,Chunk,Commit}`.
pub fn register_upstream_activities(
    service: &WorkflowService,
    identifier: &str,
    client: Arc<dyn UpstreamClient>,
) {
    let start_client = Arc::clone(&client);
    service.activities().register(
        format!("{identifier}-SynchronizeThandStart"),
        move |input| {
            let client = Arc::clone(&start_client);
            async move {
                let input: StartInput = parse_input(input)?;
                let session = client
                    .start(&input.provider_id, input.org_id.as_deref())
                    .await?;
                serde_json::to_value(&session).map_err(json_error)
            }
        },
    );

    let chunk_client = Arc::clone(&client);
    service.activities().register(
        format!("{identifier}-SynchronizeThandChunk"),
        move |input| {
            let client = Arc::clone(&chunk_client);
            async move {
                let input: ChunkInput = parse_input(input)?;
                client.chunk(&input.workflow_id, &input.chunk).await?;
                Ok(serde_json::Value::Null)
            }
        },
    );

    service.activities().register(
        format!("{identifier}-SynchronizeThandCommit"),
        move |input| {
            let client = Arc::clone(&client);
            async move {
                let input: CommitInput = parse_input(input)?;
                client.commit(&input.workflow_id).await?;
                Ok(serde_json::Value::Null)
            }
        },
    );
}

fn parse_input<T: serde::de::DeserializeOwned>(input: serde_json::Value) -> ThandResult<T> {
    serde_json::from_value(input).map_err(json_error)
}

fn json_error(err: serde_json::Error) -> thand_core::ThandError {
    thand_core::EncodingError::Json {
        reason: err.to_string(),
    }
    .into()
}
