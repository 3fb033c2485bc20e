//! Upstream chunk forwarding
//!
//! During a durable sync, accumulated catalog chunks stream to an
//! upstream service: one `Start` to obtain a remote workflow id, a
//! series of `Chunk` uploads (HTTP PATCH, JSON), and a final `Commit`.
//! The uploader runs on a detached task the parent never aborts, so the
//! commit lands even when the parent workflow is cancelled or finishes
//! first; closing the chunk channel is the commit signal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error};

use thand_core::{SyncError, ThandResult};

use crate::orchestrator::SyncChunk;
use crate::workflow::{ActivityRegistry, RetryPolicy};

/// Flush when the buffered batch reaches this many items...
pub const BATCH_SIZE: usize = 100;

/// ...or when this much time has passed since the last flush.
pub const BATCH_TIMEOUT: Duration = Duration::from_millis(500);

/// Remote workflow coordinates returned by `Start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamSession {
    pub workflow_id: String,
    #[serde(default)]
    pub run_id: String,
}

/// Activity inputs for the three upstream operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartInput {
    pub provider_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInput {
    pub workflow_id: String,
    pub chunk: SyncChunk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInput {
    pub workflow_id: String,
}

/// The upstream endpoints the forwarding activities call.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn start(&self, provider_id: &str, org_id: Option<&str>) -> ThandResult<UpstreamSession>;
    async fn chunk(&self, workflow_id: &str, chunk: &SyncChunk) -> ThandResult<()>;
    async fn commit(&self, workflow_id: &str) -> ThandResult<()>;
}

/// HTTP upstream: `Start` and `Commit` POST, chunks PATCH as JSON.
pub struct HttpUpstreamClient {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl HttpUpstreamClient {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn check(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> ThandResult<reqwest::Response> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|err| SyncError::UpstreamFailed {
                operation: operation.to_string(),
                reason: err.to_string(),
            })?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(SyncError::UpstreamFailed {
                operation: operation.to_string(),
                reason: format!("status {}", response.status()),
            }
            .into())
        }
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn start(&self, provider_id: &str, org_id: Option<&str>) -> ThandResult<UpstreamSession> {
        let response = self
            .check(
                "start",
                self.client.post(self.url("/sync/start")).json(&StartInput {
                    provider_id: provider_id.to_string(),
                    org_id: org_id.map(str::to_string),
                }),
            )
            .await?;
        response
            .json()
            .await
            .map_err(|err| {
                SyncError::UpstreamFailed {
                    operation: "start".to_string(),
                    reason: format!("invalid session payload: {err}"),
                }
                .into()
            })
    }

    async fn chunk(&self, workflow_id: &str, chunk: &SyncChunk) -> ThandResult<()> {
        self.check(
            "chunk",
            self.client
                .patch(self.url(&format!("/sync/{workflow_id}/chunk")))
                .json(chunk),
        )
        .await?;
        Ok(())
    }

    async fn commit(&self, workflow_id: &str) -> ThandResult<()> {
        self.check(
            "commit",
            self.client
                .post(self.url(&format!("/sync/{workflow_id}/commit"))),
        )
        .await?;
        Ok(())
    }
}

/// In-memory upstream used by tests: records every call.
#[derive(Debug, Default)]
pub struct RecordingUpstream {
    pub chunks: std::sync::Mutex<Vec<SyncChunk>>,
    pub starts: std::sync::atomic::AtomicUsize,
    pub commits: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl UpstreamClient for RecordingUpstream {
    async fn start(&self, provider_id: &str, _org_id: Option<&str>) -> ThandResult<UpstreamSession> {
        self.starts
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(UpstreamSession {
            workflow_id: format!("upstream-{provider_id}"),
            run_id: "run-1".to_string(),
        })
    }

    async fn chunk(&self, _workflow_id: &str, chunk: &SyncChunk) -> ThandResult<()> {
        self.chunks.lock().unwrap().push(chunk.clone());
        Ok(())
    }

    async fn commit(&self, _workflow_id: &str) -> ThandResult<()> {
        self.commits
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

/// Spawn the detached uploader. Chunks received on `rx` are buffered up
/// to [`BATCH_SIZE`] items or [`BATCH_TIMEOUT`], whichever first, then
/// uploaded through the `SynchronizeThand*` activities. When the channel
/// closes the remaining buffer is flushed and the commit is issued;
/// because the task is detached, that happens even when the spawning
/// workflow is already gone.
pub fn spawn_uploader(
    activities: Arc<ActivityRegistry>,
    retry: RetryPolicy,
    provider_id: String,
    org_id: Option<String>,
    mut rx: UnboundedReceiver<SyncChunk>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = upload(activities, retry, &provider_id, org_id, &mut rx).await {
            error!(provider = %provider_id, %err, "upstream forwarding failed");
        }
    })
}

async fn upload(
    activities: Arc<ActivityRegistry>,
    retry: RetryPolicy,
    provider_id: &str,
    org_id: Option<String>,
    rx: &mut UnboundedReceiver<SyncChunk>,
) -> ThandResult<()> {
    let start = activities
        .execute(
            &format!("{provider_id}-SynchronizeThandStart"),
            serde_json::to_value(StartInput {
                provider_id: provider_id.to_string(),
                org_id,
            })
            .unwrap_or_default(),
            &retry,
        )
        .await?;
    let session: UpstreamSession =
        serde_json::from_value(start).map_err(|err| SyncError::UpstreamFailed {
            operation: "start".to_string(),
            reason: format!("invalid session payload: {err}"),
        })?;
    debug!(workflow_id = %session.workflow_id, "upstream session opened");

    let chunk_activity = format!("{provider_id}-SynchronizeThandChunk");
    let mut buffer = SyncChunk::default();
    let mut flush_timer = tokio::time::interval(BATCH_TIMEOUT);
    flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately.
    flush_timer.tick().await;

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(chunk) => {
                    buffer.merge(chunk);
                    if buffer.len() >= BATCH_SIZE {
                        flush(&activities, &retry, &chunk_activity, &session, &mut buffer).await?;
                    }
                }
                // Channel closed: flush what is left and commit.
                None => break,
            },
            _ = flush_timer.tick() => {
                if !buffer.is_empty() {
                    flush(&activities, &retry, &chunk_activity, &session, &mut buffer).await?;
                }
            }
        }
    }

    if !buffer.is_empty() {
        flush(&activities, &retry, &chunk_activity, &session, &mut buffer).await?;
    }

    activities
        .execute(
            &format!("{provider_id}-SynchronizeThandCommit"),
            serde_json::to_value(CommitInput {
                workflow_id: session.workflow_id.clone(),
            })
            .unwrap_or_default(),
            &retry,
        )
        .await?;
    debug!(workflow_id = %session.workflow_id, "upstream session committed");
    Ok(())
}

async fn flush(
    activities: &ActivityRegistry,
    retry: &RetryPolicy,
    chunk_activity: &str,
    session: &UpstreamSession,
    buffer: &mut SyncChunk,
) -> ThandResult<()> {
    let chunk = std::mem::take(buffer);
    let items = chunk.len();
    activities
        .execute(
            chunk_activity,
            serde_json::to_value(ChunkInput {
                workflow_id: session.workflow_id.clone(),
                chunk,
            })
            .unwrap_or_default(),
            retry,
        )
        .await?;
    debug!(items, "flushed upstream batch");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::register_upstream_activities;
    use crate::workflow::WorkflowService;
    use std::sync::atomic::Ordering;
    use thand_core::User;

    fn user_chunk(count: usize) -> SyncChunk {
        SyncChunk {
            users: (0..count)
                .map(|n| User {
                    id: format!("u{n}"),
                    email: format!("user{n}@example.com"),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn wired_service(upstream: Arc<RecordingUpstream>) -> WorkflowService {
        let service = WorkflowService::new();
        register_upstream_activities(&service, "mem", upstream);
        service
    }

    #[tokio::test]
    async fn test_uploader_batches_and_commits() {
        let upstream = Arc::new(RecordingUpstream::default());
        let service = wired_service(Arc::clone(&upstream));

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let uploader = spawn_uploader(
            Arc::clone(service.activities()),
            RetryPolicy::default(),
            "mem".to_string(),
            None,
            rx,
        );

        // 250 items: two full batches flush on size, the remainder on
        // channel close.
        for _ in 0..5 {
            tx.send(user_chunk(50)).expect("send");
        }
        drop(tx);
        uploader.await.expect("uploader");

        assert_eq!(upstream.starts.load(Ordering::SeqCst), 1);
        assert_eq!(upstream.commits.load(Ordering::SeqCst), 1);
        let chunks = upstream.chunks.lock().unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().map(SyncChunk::len).sum::<usize>(), 250);
        assert!(chunks[0].len() >= BATCH_SIZE);
        // Insertion order is preserved across batches.
        assert_eq!(chunks[0].users[0].id, "u0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_uploader_flushes_on_timeout() {
        let upstream = Arc::new(RecordingUpstream::default());
        let service = wired_service(Arc::clone(&upstream));

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let uploader = spawn_uploader(
            Arc::clone(service.activities()),
            RetryPolicy::default(),
            "mem".to_string(),
            None,
            rx,
        );

        tx.send(user_chunk(3)).expect("send");
        // Under a paused clock the timer fires as soon as time advances.
        tokio::time::sleep(BATCH_TIMEOUT * 2).await;
        tokio::task::yield_now().await;
        assert_eq!(upstream.chunks.lock().unwrap().len(), 1);

        drop(tx);
        uploader.await.expect("uploader");
        assert_eq!(upstream.commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_commit_lands_after_parent_drop() {
        let upstream = Arc::new(RecordingUpstream::default());
        let service = wired_service(Arc::clone(&upstream));

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let uploader = spawn_uploader(
            Arc::clone(service.activities()),
            RetryPolicy::default(),
            "mem".to_string(),
            None,
            rx,
        );

        // Simulate the parent finishing first: it only drops its sender,
        // never awaits or aborts the uploader.
        tx.send(user_chunk(2)).expect("send");
        drop(tx);

        uploader.await.expect("uploader");
        assert_eq!(upstream.commits.load(Ordering::SeqCst), 1);
        assert_eq!(
            upstream
                .chunks
                .lock()
                .unwrap()
                .iter()
                .map(SyncChunk::len)
                .sum::<usize>(),
            2
        );
    }

    #[test]
    fn test_http_client_urls() {
        let client = HttpUpstreamClient::new("https://thand.example.com/api/", "tok");
        assert_eq!(
            client.url("/sync/start"),
            "https://thand.example.com/api/sync/start"
        );
    }
}
