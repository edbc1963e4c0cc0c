//! In-memory repository for task lifecycle tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::task::{
    domain::{HistoryId, Revision, Task, TaskId, TaskStatusHistory, UserId},
    ports::{TaskHistoryRepository, TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};

/// Thread-safe in-memory task and history repository.
///
/// A single lock guards tasks and history together, so a transition is
/// visible to readers either completely or not at all.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    state: Arc<RwLock<InMemoryTaskState>>,
}

#[derive(Debug, Default)]
struct InMemoryTaskState {
    tasks: HashMap<TaskId, Task>,
    history: HashMap<TaskId, Vec<TaskStatusHistory>>,
    author_index: HashMap<UserId, Vec<TaskId>>,
    assignee_index: HashMap<UserId, Vec<TaskId>>,
}

impl InMemoryTaskRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> TaskRepositoryResult<RwLockReadGuard<'_, InMemoryTaskState>> {
        self.state.read().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(&self) -> TaskRepositoryResult<RwLockWriteGuard<'_, InMemoryTaskState>> {
        self.state.write().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }
}

impl InMemoryTaskState {
    /// Returns the stored task after checking it still has revision `expected`.
    fn current(&self, task_id: TaskId, expected: Revision) -> TaskRepositoryResult<&Task> {
        let stored = self
            .tasks
            .get(&task_id)
            .ok_or(TaskRepositoryError::NotFound(task_id))?;
        if stored.revision() != expected {
            return Err(TaskRepositoryError::Conflict {
                task_id,
                expected,
                actual: stored.revision(),
            });
        }
        Ok(stored)
    }

    fn tasks_for(&self, index: &HashMap<UserId, Vec<TaskId>>, user: UserId) -> Vec<Task> {
        let mut found: Vec<Task> = index
            .get(&user)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.tasks.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        sort_by_creation(&mut found);
        found
    }
}

fn ensure_latest(task: &Task, record: &TaskStatusHistory) -> TaskRepositoryResult<()> {
    if record.is_latest_for(task) {
        return Ok(());
    }
    Err(TaskRepositoryError::MismatchedHistory {
        task_id: task.id(),
        record_id: record.id(),
    })
}

fn add_to_index(index: &mut HashMap<UserId, Vec<TaskId>>, user: Option<UserId>, task_id: TaskId) {
    if let Some(key) = user {
        index.entry(key).or_default().push(task_id);
    }
}

/// Removes a task ID from a user-keyed index, cleaning up the entry if empty.
fn remove_from_index(
    index: &mut HashMap<UserId, Vec<TaskId>>,
    user: Option<UserId>,
    task_id: TaskId,
) {
    let Some(key) = user else {
        return;
    };
    if let Some(ids) = index.get_mut(&key) {
        ids.retain(|id| *id != task_id);
        if ids.is_empty() {
            index.remove(&key);
        }
    }
}

fn sort_by_creation(tasks: &mut [Task]) {
    tasks.sort_by(|left, right| {
        left.created_at()
            .cmp(&right.created_at())
            .then_with(|| left.id().into_inner().cmp(&right.id().into_inner()))
    });
}

fn sort_most_recent_first(records: &mut [TaskStatusHistory]) {
    records.sort_by(|left, right| {
        right
            .changed_at()
            .cmp(&left.changed_at())
            .then_with(|| right.sequence().cmp(&left.sequence()))
    });
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()> {
        let mut state = self.write()?;
        if state.tasks.contains_key(&task.id()) {
            return Err(TaskRepositoryError::DuplicateTask(task.id()));
        }

        add_to_index(&mut state.author_index, Some(task.author()), task.id());
        add_to_index(&mut state.assignee_index, task.assignee(), task.id());
        state.tasks.insert(task.id(), task.clone());
        Ok(())
    }

    async fn update(&self, task: &Task, expected: Revision) -> TaskRepositoryResult<()> {
        let mut state = self.write()?;
        let previous_assignee = state.current(task.id(), expected)?.assignee();

        if previous_assignee != task.assignee() {
            remove_from_index(&mut state.assignee_index, previous_assignee, task.id());
            add_to_index(&mut state.assignee_index, task.assignee(), task.id());
        }
        state.tasks.insert(task.id(), task.clone());
        Ok(())
    }

    async fn record_transition(
        &self,
        task: &Task,
        expected: Revision,
        record: &TaskStatusHistory,
    ) -> TaskRepositoryResult<()> {
        let mut state = self.write()?;
        ensure_latest(task, record)?;
        state.current(task.id(), expected)?;

        state
            .history
            .entry(task.id())
            .or_default()
            .push(record.clone());
        state.tasks.insert(task.id(), task.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        let state = self.read()?;
        Ok(state.tasks.get(&id).cloned())
    }

    async fn find_all(&self) -> TaskRepositoryResult<Vec<Task>> {
        let state = self.read()?;
        let mut tasks: Vec<Task> = state.tasks.values().cloned().collect();
        sort_by_creation(&mut tasks);
        Ok(tasks)
    }

    async fn find_by_author(&self, author: UserId) -> TaskRepositoryResult<Vec<Task>> {
        let state = self.read()?;
        Ok(state.tasks_for(&state.author_index, author))
    }

    async fn find_by_assignee(&self, assignee: UserId) -> TaskRepositoryResult<Vec<Task>> {
        let state = self.read()?;
        Ok(state.tasks_for(&state.assignee_index, assignee))
    }

    async fn delete(&self, id: TaskId) -> TaskRepositoryResult<()> {
        let mut state = self.write()?;
        state.history.remove(&id);
        let removed = state
            .tasks
            .remove(&id)
            .ok_or(TaskRepositoryError::NotFound(id))?;

        remove_from_index(&mut state.author_index, Some(removed.author()), id);
        remove_from_index(&mut state.assignee_index, removed.assignee(), id);
        Ok(())
    }
}

#[async_trait]
impl TaskHistoryRepository for InMemoryTaskRepository {
    async fn history_for_task(
        &self,
        task_id: TaskId,
    ) -> TaskRepositoryResult<Vec<TaskStatusHistory>> {
        let state = self.read()?;
        if !state.tasks.contains_key(&task_id) {
            return Err(TaskRepositoryError::NotFound(task_id));
        }
        let records = state
            .history
            .get(&task_id)
            .map(|records| records.iter().rev().cloned().collect())
            .unwrap_or_default();
        Ok(records)
    }

    async fn find_history_record(
        &self,
        id: HistoryId,
    ) -> TaskRepositoryResult<Option<TaskStatusHistory>> {
        let state = self.read()?;
        let record = state
            .history
            .values()
            .flatten()
            .find(|record| record.id() == id)
            .cloned();
        Ok(record)
    }

    async fn all_history(&self) -> TaskRepositoryResult<Vec<TaskStatusHistory>> {
        let state = self.read()?;
        let mut records: Vec<TaskStatusHistory> =
            state.history.values().flatten().cloned().collect();
        sort_most_recent_first(&mut records);
        Ok(records)
    }
}
