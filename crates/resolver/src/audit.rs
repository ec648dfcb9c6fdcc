//! Append-only audit trail of applied resolutions

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tgr_core::{AuditEntry, ContradictionId};

#[derive(thiserror::Error, Debug)]
pub enum AuditError {
    #[error("Audit append failed: {0}")]
    AppendFailed(String),
}

/// Append-only log service, injected into the resolver
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError>;

    async fn entries(&self) -> Vec<AuditEntry>;

    /// Entries that closed `contradiction`, including as a superseded sibling
    async fn entries_for(&self, contradiction: &ContradictionId) -> Vec<AuditEntry> {
        self.entries()
            .await
            .into_iter()
            .filter(|e| e.covers(contradiction))
            .collect()
    }
}

/// In-memory audit log
#[derive(Clone, Default)]
pub struct InMemoryAuditLog {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries.write().push(entry);
        Ok(())
    }

    async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tgr_core::{EdgeId, ResolutionStrategy};

    #[tokio::test]
    async fn test_append_and_filter() {
        let log = InMemoryAuditLog::new();
        let first = ContradictionId::new();
        let second = ContradictionId::new();

        log.append(AuditEntry::new(first, vec![EdgeId::new(), EdgeId::new()], ResolutionStrategy::Merge))
            .await
            .unwrap();
        log.append(AuditEntry::new(second, vec![EdgeId::new()], ResolutionStrategy::NewestWins))
            .await
            .unwrap();

        assert_eq!(log.len(), 2);
        let for_first = log.entries_for(&first).await;
        assert_eq!(for_first.len(), 1);
        assert_eq!(for_first[0].strategy, ResolutionStrategy::Merge);
        assert_eq!(for_first[0].edge_ids.len(), 2);
    }
}
