/*!
 * Batch Store Records
 */

use crate::models::messages::ExecuteBatch;
use crate::models::{Config, ExecutionRequestTemplate};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Lifecycle status shared by batches, chunks and work items
///
/// Persisted as the integer codes `0`, `1`, `-1`, `-2` and `100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Status {
    #[default]
    Created,
    InProgress,
    Failed,
    /// Failed too many times, never retried
    PermanentlyFailed,
    Done,
}

impl Status {
    pub const fn code(&self) -> i32 {
        match self {
            Status::Created => 0,
            Status::InProgress => 1,
            Status::Failed => -1,
            Status::PermanentlyFailed => -2,
            Status::Done => 100,
        }
    }

    /// Statuses of batches that still have work to do
    pub const INCOMPLETE_BATCH: [Status; 2] = [Status::Created, Status::InProgress];

    /// Statuses of work items eligible for (re)execution
    pub const RETRYABLE_ITEM: [Status; 2] = [Status::Created, Status::Failed];
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

impl TryFrom<i32> for Status {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Status::Created),
            1 => Ok(Status::InProgress),
            -1 => Ok(Status::Failed),
            -2 => Ok(Status::PermanentlyFailed),
            100 => Ok(Status::Done),
            other => Err(format!("invalid status code {}", other)),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Created => "created",
            Status::InProgress => "in_progress",
            Status::Failed => "failed",
            Status::PermanentlyFailed => "permanently_failed",
            Status::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteBatchRecord {
    pub id: String,
    pub function_id: String,
    pub method: String,
    #[serde(default)]
    pub config: Config,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub max_attempts: u32,
    pub status: Status,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ExecuteBatchRecord {
    pub fn from_request(id: &str, req: &ExecuteBatch, max_attempts: u32) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.to_string(),
            function_id: req.template.function_id.clone(),
            method: req.template.method.clone(),
            config: req.template.config.clone(),
            topic: req.topic.clone(),
            max_attempts,
            status: Status::Created,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn template(&self) -> ExecutionRequestTemplate {
        ExecutionRequestTemplate {
            function_id: self.function_id.clone(),
            method: self.method.clone(),
            config: self.config.clone(),
        }
    }

    /// Rebuild a batch request from this record and the given items
    pub fn to_request(&self, items: &[WorkItemRecord]) -> ExecuteBatch {
        ExecuteBatch {
            topic: self.topic.clone(),
            template: self.template(),
            arguments: items.iter().map(|item| item.arguments.clone()).collect(),
            worker_concurrency_limit: 0,
            max_attempts: self.max_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub batch_id: String,
    pub status: Status,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ChunkRecord {
    pub fn new(id: impl Into<String>, batch_id: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            batch_id: batch_id.into(),
            status: Status::Created,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemRecord {
    /// `<batch id>/<execution id>`
    pub id: String,
    pub batch_id: String,
    /// Empty until the item is assigned to a chunk
    #[serde(default)]
    pub chunk_id: String,
    pub arguments: Vec<String>,
    pub status: Status,
    #[serde(default)]
    pub attempts: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl WorkItemRecord {
    pub fn new(id: impl Into<String>, batch_id: impl Into<String>, arguments: Vec<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            batch_id: batch_id.into(),
            chunk_id: String::new(),
            arguments,
            status: Status::Created,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Work item ID for an execution within a batch
pub fn work_item_id(batch_id: &str, execution_id: &str) -> String {
    format!("{}/{}", batch_id, execution_id)
}
