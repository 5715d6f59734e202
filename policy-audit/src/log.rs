//! Decision log trait and backends.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use policy_engine::Decision;
use policy_primitives::{OrgId, ProjectId};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::AuditResult;

/// One immutable audit entry: a decision plus its addressing key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    org_id: OrgId,
    project_id: ProjectId,
    build_number: u64,
    decision: Decision,
}

impl DecisionRecord {
    /// Creates a record for the supplied organization and decision. The
    /// project and build key components are taken from the decision's
    /// metadata.
    #[must_use]
    pub fn new(org_id: OrgId, decision: Decision) -> Self {
        Self {
            org_id,
            project_id: decision.metadata().project_id(),
            build_number: decision.metadata().build_number(),
            decision,
        }
    }

    /// Returns the organization the decision was made for.
    #[must_use]
    pub fn org_id(&self) -> OrgId {
        self.org_id
    }

    /// Returns the project of the gated pipeline.
    #[must_use]
    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Returns the build number of the gated run.
    #[must_use]
    pub fn build_number(&self) -> u64 {
        self.build_number
    }

    /// Returns the recorded decision.
    #[must_use]
    pub fn decision(&self) -> &Decision {
        &self.decision
    }
}

/// Filter over decision records; unset components match everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct DecisionQuery {
    org_id: Option<OrgId>,
    project_id: Option<ProjectId>,
    build_number: Option<u64>,
}

impl DecisionQuery {
    /// Creates a query matching all records.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Restricts the query to one organization.
    #[must_use]
    pub fn org(mut self, org_id: OrgId) -> Self {
        self.org_id = Some(org_id);
        self
    }

    /// Restricts the query to one project.
    #[must_use]
    pub fn project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Restricts the query to one build number.
    #[must_use]
    pub fn build(mut self, build_number: u64) -> Self {
        self.build_number = Some(build_number);
        self
    }

    fn matches(self, record: &DecisionRecord) -> bool {
        self.org_id.is_none_or(|org| org == record.org_id())
            && self
                .project_id
                .is_none_or(|project| project == record.project_id())
            && self
                .build_number
                .is_none_or(|build| build == record.build_number())
    }
}

/// Trait implemented by decision log backends.
#[async_trait]
pub trait DecisionLog: Send + Sync {
    /// Appends one record. The write is all-or-nothing and never
    /// overwrites prior records.
    async fn record(&self, record: &DecisionRecord) -> AuditResult<()>;

    /// Returns the most recent `limit` records, ordered oldest to newest.
    async fn tail(&self, limit: usize) -> AuditResult<Vec<DecisionRecord>>;

    /// Returns every record matching the query, in append order.
    async fn find(&self, query: DecisionQuery) -> AuditResult<Vec<DecisionRecord>>;
}

/// File-backed log writing newline-delimited JSON entries.
pub struct FileDecisionLog {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl FileDecisionLog {
    /// Opens (or creates) a log file at the provided path.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors encountered while preparing the file.
    pub async fn open(path: impl Into<PathBuf>) -> AuditResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the underlying path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> AuditResult<Vec<DecisionRecord>> {
        let data = fs::read(&self.path).await?;
        let mut records = Vec::new();
        for chunk in data
            .split(|byte| *byte == b'\n')
            .filter(|chunk| !chunk.is_empty())
        {
            let record: DecisionRecord = serde_json::from_slice(chunk)?;
            records.push(record);
        }
        Ok(records)
    }
}

#[async_trait]
impl DecisionLog for FileDecisionLog {
    async fn record(&self, record: &DecisionRecord) -> AuditResult<()> {
        // Serialize before taking the lock so a failure leaves the file
        // untouched; the record line lands in a single write.
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        guard.write_all(&line).await?;
        guard.flush().await?;
        Ok(())
    }

    async fn tail(&self, limit: usize) -> AuditResult<Vec<DecisionRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let records = self.read_all().await?;
        if records.len() <= limit {
            return Ok(records);
        }

        let skip = records.len() - limit;
        Ok(records.into_iter().skip(skip).collect())
    }

    async fn find(&self, query: DecisionQuery) -> AuditResult<Vec<DecisionRecord>> {
        let records = self.read_all().await?;
        Ok(records
            .into_iter()
            .filter(|record| query.matches(record))
            .collect())
    }
}

/// In-memory log for tests and embedders that manage persistence
/// themselves.
#[derive(Debug, Default)]
pub struct MemoryDecisionLog {
    records: Mutex<Vec<DecisionRecord>>,
}

impl MemoryDecisionLog {
    /// Creates an empty in-memory log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DecisionLog for MemoryDecisionLog {
    async fn record(&self, record: &DecisionRecord) -> AuditResult<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn tail(&self, limit: usize) -> AuditResult<Vec<DecisionRecord>> {
        let records = self.records.lock().await;
        let skip = records.len().saturating_sub(limit);
        Ok(records.iter().skip(skip).cloned().collect())
    }

    async fn find(&self, query: DecisionQuery) -> AuditResult<Vec<DecisionRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect())
    }
}
