//! The sync orchestrator
//!
//! Fans the requested capability set out over a provider: locally as one
//! tokio task per capability behind a shared deadline, or durably as a
//! workflow over registered activities. Both paths run the same
//! pagination streamer and write through the provider's catalog setters.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use thand_core::{
    Capability, Group, Identity, ProviderPermission, ProviderResource, ProviderRole, SyncError,
    SynchronizeCapability, ThandResult, User,
};
use thand_providers::Provider;

use crate::streamer::collect_pages;
use crate::upstream::{spawn_uploader, UpstreamClient};
use crate::workflow::{
    register_provider_activities, register_upstream_activities, SearchAttributes, WorkflowOptions,
    WorkflowService, WORKFLOW_EXECUTION_TIMEOUT,
};

/// Deadline for a local-mode synchronization pass.
pub const LOCAL_SYNC_TIMEOUT: Duration = Duration::from_secs(10 * 60);

// ============================================================================
// ACCUMULATION TYPES
// ============================================================================

/// One bounded batch of catalog items, also the per-capability
/// accumulation unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncChunk {
    #[serde(default)]
    pub identities: Vec<Identity>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub roles: Vec<ProviderRole>,
    #[serde(default)]
    pub permissions: Vec<ProviderPermission>,
    #[serde(default)]
    pub resources: Vec<ProviderResource>,
}

impl SyncChunk {
    pub fn len(&self) -> usize {
        self.identities.len()
            + self.users.len()
            + self.groups.len()
            + self.roles.len()
            + self.permissions.len()
            + self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append another chunk, preserving insertion order per slice.
    pub fn merge(&mut self, other: SyncChunk) {
        self.identities.extend(other.identities);
        self.users.extend(other.users);
        self.groups.extend(other.groups);
        self.roles.extend(other.roles);
        self.permissions.extend(other.permissions);
        self.resources.extend(other.resources);
    }
}

/// Per-capability item counts of one synchronization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub identities: usize,
    pub users: usize,
    pub groups: usize,
    pub roles: usize,
    pub permissions: usize,
    pub resources: usize,
}

impl SyncSummary {
    pub fn record(&mut self, capability: SynchronizeCapability, count: usize) {
        match capability {
            SynchronizeCapability::Identities => self.identities += count,
            SynchronizeCapability::Users => self.users += count,
            SynchronizeCapability::Groups => self.groups += count,
            SynchronizeCapability::Roles => self.roles += count,
            SynchronizeCapability::Permissions => self.permissions += count,
            SynchronizeCapability::Resources => self.resources += count,
        }
    }

    pub fn total(&self) -> usize {
        self.identities + self.users + self.groups + self.roles + self.permissions + self.resources
    }
}

// ============================================================================
// REQUEST / OUTCOME
// ============================================================================

/// A synchronization request for one provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Provider identifier the request targets
    pub provider: String,
    /// Capability subset to refresh; empty means "everything the
    /// provider declares it can synchronize"
    #[serde(default)]
    pub requests: Vec<SynchronizeCapability>,
    /// Pinned worker deployment version for durable mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_version: Option<String>,
    /// Upstream organization to forward chunks to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_attributes: Option<SearchAttributes>,
}

impl SyncRequest {
    pub fn for_provider(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Default::default()
        }
    }
}

/// How a synchronize call resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Provider declares neither Identities nor RBAC
    Skipped,
    /// Durable mode: the workflow was started, not awaited
    Started { workflow_id: String, run_id: String },
    /// Local mode: the pass ran to completion
    Completed { summary: SyncSummary },
}

// ============================================================================
// CAPABILITY LOOPS
// ============================================================================

/// Stream one capability's catalog slice and write it through the
/// provider's catalog setters. Returns what was accumulated so callers
/// can forward or summarize it.
pub async fn run_capability(
    provider: &dyn Provider,
    capability: SynchronizeCapability,
) -> ThandResult<SyncChunk> {
    let mut chunk = SyncChunk::default();
    match capability {
        SynchronizeCapability::Identities => {
            let identities = collect_pages(|page| provider.sync_identities(page)).await?;
            if !identities.is_empty() {
                provider.base().add_identities(identities.clone())?;
            }
            chunk.identities = identities;
        }
        SynchronizeCapability::Users => {
            let users = collect_pages(|page| provider.sync_users(page)).await?;
            if !users.is_empty() {
                provider.base().add_users(users.clone())?;
            }
            chunk.users = users;
        }
        SynchronizeCapability::Groups => {
            let groups = collect_pages(|page| provider.sync_groups(page)).await?;
            if !groups.is_empty() {
                provider.base().add_groups(groups.clone())?;
            }
            chunk.groups = groups;
        }
        SynchronizeCapability::Roles => {
            let roles = collect_pages(|page| provider.sync_roles(page)).await?;
            if !roles.is_empty() {
                provider.base().add_roles(roles.clone())?;
            }
            chunk.roles = roles;
        }
        SynchronizeCapability::Permissions => {
            let permissions = collect_pages(|page| provider.sync_permissions(page)).await?;
            if !permissions.is_empty() {
                provider.base().add_permissions(permissions.clone())?;
            }
            chunk.permissions = permissions;
        }
        SynchronizeCapability::Resources => {
            let resources = collect_pages(|page| provider.sync_resources(page)).await?;
            if !resources.is_empty() {
                provider.base().add_resources(resources.clone())?;
            }
            chunk.resources = resources;
        }
    }
    Ok(chunk)
}

// ============================================================================
// THE SYNCHRONIZER
// ============================================================================

/// Dispatches synchronization for providers, in local or durable mode.
pub struct Synchronizer {
    workflow: Option<Arc<WorkflowService>>,
    upstream: Option<Arc<dyn UpstreamClient>>,
    local_timeout: Duration,
}

impl Synchronizer {
    /// Local parallel mode.
    pub fn local() -> Self {
        Self {
            workflow: None,
            upstream: None,
            local_timeout: LOCAL_SYNC_TIMEOUT,
        }
    }

    /// Durable mode over a workflow service.
    pub fn durable(workflow: Arc<WorkflowService>) -> Self {
        Self {
            workflow: Some(workflow),
            upstream: None,
            local_timeout: LOCAL_SYNC_TIMEOUT,
        }
    }

    /// Forward accumulated chunks upstream (durable mode only).
    pub fn with_upstream(mut self, upstream: Arc<dyn UpstreamClient>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Tighten the local deadline (tests, interactive refreshes).
    pub fn with_local_timeout(mut self, timeout: Duration) -> Self {
        self.local_timeout = timeout;
        self
    }

    /// Synchronize one provider per the request.
    pub async fn synchronize(
        &self,
        provider: Arc<dyn Provider>,
        request: SyncRequest,
    ) -> ThandResult<SyncOutcome> {
        if !provider.has_any_capability(&[Capability::Identities, Capability::Rbac]) {
            debug!(provider = %request.provider, "provider has no synchronizable capabilities");
            return Ok(SyncOutcome::Skipped);
        }

        let requests = if request.requests.is_empty() {
            SynchronizeCapability::ALL
                .into_iter()
                .filter(|capability| provider.can_synchronize(*capability))
                .collect()
        } else {
            request.requests.clone()
        };

        match &self.workflow {
            Some(workflow) => {
                self.start_durable(Arc::clone(workflow), provider, request, requests)
            }
            None => self.run_local(provider, requests).await,
        }
    }

    /// Durable mode: register activities, start the workflow, return
    /// without waiting.
    fn start_durable(
        &self,
        workflow: Arc<WorkflowService>,
        provider: Arc<dyn Provider>,
        request: SyncRequest,
        requests: Vec<SynchronizeCapability>,
    ) -> ThandResult<SyncOutcome> {
        let identifier = provider.identifier();
        register_provider_activities(&workflow, Arc::clone(&provider));

        let upstream = self.upstream.clone();
        if let Some(upstream) = &upstream {
            register_upstream_activities(&workflow, &identifier, Arc::clone(upstream));
        }

        let search_attributes = request.search_attributes.clone().unwrap_or_else(|| {
            SearchAttributes {
                status: "running".to_string(),
                task: "synchronize".to_string(),
                providers: vec![identifier.clone()],
                ..Default::default()
            }
        });

        let options = WorkflowOptions {
            workflow_id: format!("{identifier}-synchronize"),
            execution_timeout: WORKFLOW_EXECUTION_TIMEOUT,
            worker_version: request.worker_version.clone(),
            search_attributes: Some(search_attributes),
        };

        let activities = Arc::clone(workflow.activities());
        let retry = workflow.retry_policy().clone();
        let body_identifier = identifier.clone();
        let forward_upstream = upstream.is_some();
        let org_id = request.org_id.clone();

        let handle = workflow.start(options, async move {
            // Chunk channel into the detached uploader; the uploader
            // outlives this workflow (abandon semantics) and commits on
            // channel close even if we are cancelled first.
            let (tx, uploader) = if forward_upstream {
                let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
                let uploader = spawn_uploader(
                    Arc::clone(&activities),
                    retry.clone(),
                    body_identifier.clone(),
                    org_id,
                    rx,
                );
                (Some(tx), Some(uploader))
            } else {
                (None, None)
            };

            let mut summary = SyncSummary::default();
            let mut errors = Vec::new();

            for capability in requests {
                let activity = format!("{body_identifier}-{}", capability.activity_name());
                match activities
                    .execute(&activity, serde_json::Value::Null, &retry)
                    .await
                {
                    Ok(value) => match serde_json::from_value::<SyncChunk>(value) {
                        Ok(chunk) => {
                            summary.record(capability, chunk.len());
                            if let Some(tx) = &tx {
                                let _ = tx.send(chunk);
                            }
                        }
                        Err(err) => errors.push(format!("{capability}: {err}")),
                    },
                    Err(err) => errors.push(format!("{capability}: {err}")),
                }
            }

            // Closing the channel is the commit signal; the uploader is
            // deliberately not awaited.
            drop(tx);
            drop(uploader);

            if errors.is_empty() {
                serde_json::to_value(&summary).map_err(|err| {
                    thand_core::EncodingError::Json {
                        reason: err.to_string(),
                    }
                    .into()
                })
            } else {
                Err(SyncError::Aggregate { errors }.into())
            }
        })?;

        info!(
            workflow_id = %handle.workflow_id,
            run_id = %handle.run_id,
            "started synchronize workflow"
        );
        Ok(SyncOutcome::Started {
            workflow_id: handle.workflow_id,
            run_id: handle.run_id,
        })
    }

    /// Local mode: one task per capability, mutex accumulator, aggregate
    /// errors after every loop has finished.
    async fn run_local(
        &self,
        provider: Arc<dyn Provider>,
        requests: Vec<SynchronizeCapability>,
    ) -> ThandResult<SyncOutcome> {
        let accumulator = Arc::new(Mutex::new(SyncChunk::default()));
        let mut tasks = JoinSet::new();

        for capability in requests {
            let provider = Arc::clone(&provider);
            let accumulator = Arc::clone(&accumulator);
            tasks.spawn(async move {
                let result = run_capability(provider.as_ref(), capability).await;
                match result {
                    Ok(chunk) => {
                        accumulator.lock().unwrap().merge(chunk);
                        Ok(())
                    }
                    Err(err) => Err(format!("{capability}: {err}")),
                }
            });
        }

        let drained = tokio::time::timeout(self.local_timeout, async {
            let mut errors = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(message)) => errors.push(message),
                    Err(join_error) => errors.push(format!("task failed: {join_error}")),
                }
            }
            errors
        })
        .await;

        let errors = match drained {
            Ok(errors) => errors,
            Err(_elapsed) => {
                // Dropping the set aborts the loops still in flight.
                warn!("local synchronization deadline exceeded");
                return Err(SyncError::DeadlineExceeded {
                    seconds: self.local_timeout.as_secs(),
                }
                .into());
            }
        };

        if !errors.is_empty() {
            return Err(SyncError::Aggregate { errors }.into());
        }

        let accumulated = accumulator.lock().unwrap().clone();
        let summary = SyncSummary {
            identities: accumulated.identities.len(),
            users: accumulated.users.len(),
            groups: accumulated.groups.len(),
            roles: accumulated.roles.len(),
            permissions: accumulated.permissions.len(),
            resources: accumulated.resources.len(),
        };
        Ok(SyncOutcome::Completed { summary })
    }
}
