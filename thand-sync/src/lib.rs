//! Thand Sync - Provider Synchronization Engine
//!
//! Streams provider catalogs into the in-memory stores, in one of two
//! modes sharing the same pagination streamer:
//! - local: one task per capability, mutex accumulator, 10-minute deadline
//! - durable: a workflow over registered activities with a 30-minute
//!   execution timeout and chunked upstream forwarding

mod orchestrator;
mod streamer;
mod upstream;
mod workflow;

pub use orchestrator::{
    run_capability, SyncChunk, SyncOutcome, SyncRequest, SyncSummary, Synchronizer,
    LOCAL_SYNC_TIMEOUT,
};
pub use streamer::{collect_pages, collect_pages_with};
pub use upstream::{
    spawn_uploader, HttpUpstreamClient, RecordingUpstream, UpstreamClient, UpstreamSession,
    BATCH_SIZE, BATCH_TIMEOUT,
};
pub use workflow::{
    register_provider_activities, register_upstream_activities, ActivityRegistry, RetryPolicy,
    SearchAttributes, WorkflowHandle, WorkflowOptions, WorkflowService, ACTIVITY_START_TO_CLOSE,
    WORKFLOW_EXECUTION_TIMEOUT,
};
