use std::collections::HashMap;

use async_trait::async_trait;
use relaize_core::task::TaskDetail;
use relaize_core::types::TaskId;
use tokio::sync::RwLock;

use super::TaskRepo;
use crate::error::StoreError;

/// Process-local task records for development and tests.
#[derive(Default)]
pub struct MemoryTaskRepo {
    tasks: RwLock<HashMap<TaskId, TaskDetail>>,
}

impl MemoryTaskRepo {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sorted(&self) -> Vec<TaskDetail> {
        let tasks = self.tasks.read().await;
        let mut all: Vec<TaskDetail> = tasks.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        all
    }
}

#[async_trait]
impl TaskRepo for MemoryTaskRepo {
    async fn save(&self, task: &TaskDetail) -> Result<(), StoreError> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskDetail>, StoreError> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn list(&self, offset: u64, limit: u64) -> Result<Vec<TaskDetail>, StoreError> {
        Ok(self
            .sorted()
            .await
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.tasks.read().await.len() as u64)
    }

    async fn all_ids(&self) -> Result<Vec<TaskId>, StoreError> {
        Ok(self.sorted().await.into_iter().map(|t| t.id).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn task_at(minutes_ago: i64) -> TaskDetail {
        let mut task = TaskDetail::new_pending(uuid::Uuid::new_v4(), "a.png", None, None, None);
        task.created_at = chrono::Utc::now() - Duration::minutes(minutes_ago);
        task
    }

    #[tokio::test]
    async fn list_is_newest_first_and_paged() {
        let repo = MemoryTaskRepo::new();
        let old = task_at(30);
        let mid = task_at(20);
        let new = task_at(10);
        for t in [&mid, &old, &new] {
            repo.save(t).await.unwrap();
        }

        let page: Vec<TaskId> = repo.list(0, 2).await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(page, vec![new.id, mid.id]);

        let rest = repo.list(2, 10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, old.id);

        assert_eq!(repo.count().await.unwrap(), 3);
        assert_eq!(repo.all_ids().await.unwrap(), vec![new.id, mid.id, old.id]);
    }

    #[tokio::test]
    async fn save_overwrites_existing_record() {
        let repo = MemoryTaskRepo::new();
        let mut task = task_at(1);
        repo.save(&task).await.unwrap();

        task.message = Some("updated".into());
        repo.save(&task).await.unwrap();

        let stored = repo.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.message.as_deref(), Some("updated"));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let repo = MemoryTaskRepo::new();
        assert!(repo.get(uuid::Uuid::new_v4()).await.unwrap().is_none());
    }
}
