//! `PostgreSQL` repository implementation for task and history storage.

use super::{
    models::{HistoryRow, NewHistoryRow, NewTaskRow, TaskRow},
    schema::{task_status_history, tasks},
};
use crate::task::{
    domain::{
        HistoryId, PersistedHistoryData, PersistedTaskData, Revision, Task, TaskId, TaskStatus,
        TaskStatusHistory, TaskTitle, UserId,
    },
    ports::{TaskHistoryRepository, TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type used by task adapters.
pub type TaskPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed task and history repository.
///
/// Status transitions run in one transaction: a revision-guarded `UPDATE`
/// of the task row followed by the history `INSERT`. A concurrent writer
/// blocks on the row lock and then fails the revision check, surfacing as
/// [`TaskRepositoryError::Conflict`].
#[derive(Debug, Clone)]
pub struct PostgresTaskRepository {
    pool: TaskPgPool,
}

impl PostgresTaskRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: TaskPgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &TaskPgPool {
        &self.pool
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> TaskRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(TaskRepositoryError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(TaskRepositoryError::persistence)?
    }
}

impl From<DieselError> for TaskRepositoryError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()> {
        let task_id = task.id();
        let new_row = to_new_row(task)?;

        self.run_blocking(move |connection| {
            diesel::insert_into(tasks::table)
                .values(&new_row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        TaskRepositoryError::DuplicateTask(task_id)
                    }
                    _ => TaskRepositoryError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn update(&self, task: &Task, expected: Revision) -> TaskRepositoryResult<()> {
        let task_id = task.id();
        let title = task.title().as_str().to_owned();
        let description = task.description().map(str::to_owned);
        let assignee = task.assignee().map(UserId::into_inner);
        let updated_at = task.updated_at();
        let revision = to_db_counter(task.revision().value())?;
        let expected_revision = to_db_counter(expected.value())?;

        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskRepositoryError, _>(|tx| {
                let affected = diesel::update(
                    tasks::table
                        .filter(tasks::id.eq(task_id.into_inner()))
                        .filter(tasks::revision.eq(expected_revision)),
                )
                .set((
                    tasks::title.eq(title),
                    tasks::description.eq(description),
                    tasks::assignee_id.eq(assignee),
                    tasks::updated_at.eq(updated_at),
                    tasks::revision.eq(revision),
                ))
                .execute(tx)?;
                ensure_applied(tx, affected, task_id, expected)
            })
        })
        .await
    }

    async fn record_transition(
        &self,
        task: &Task,
        expected: Revision,
        record: &TaskStatusHistory,
    ) -> TaskRepositoryResult<()> {
        let task_id = task.id();
        if !record.is_latest_for(task) {
            return Err(TaskRepositoryError::MismatchedHistory {
                task_id,
                record_id: record.id(),
            });
        }
        let status = task.status().as_str();
        let completed_at = task.completed_at();
        let updated_at = task.updated_at();
        let revision = to_db_counter(task.revision().value())?;
        let status_changes = to_db_counter(task.status_changes())?;
        let expected_revision = to_db_counter(expected.value())?;
        let history_row = to_new_history_row(record)?;

        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskRepositoryError, _>(|tx| {
                let affected = diesel::update(
                    tasks::table
                        .filter(tasks::id.eq(task_id.into_inner()))
                        .filter(tasks::revision.eq(expected_revision)),
                )
                .set((
                    tasks::status.eq(status),
                    tasks::completed_at.eq(completed_at),
                    tasks::updated_at.eq(updated_at),
                    tasks::revision.eq(revision),
                    tasks::status_changes.eq(status_changes),
                ))
                .execute(tx)?;
                ensure_applied(tx, affected, task_id, expected)?;

                diesel::insert_into(task_status_history::table)
                    .values(&history_row)
                    .execute(tx)?;
                Ok(())
            })
        })
        .await
    }

    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        self.run_blocking(move |connection| {
            let row = tasks::table
                .filter(tasks::id.eq(id.into_inner()))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn find_all(&self) -> TaskRepositoryResult<Vec<Task>> {
        self.run_blocking(move |connection| {
            let rows = tasks::table
                .order((tasks::created_at.asc(), tasks::id.asc()))
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?;
            rows.into_iter().map(row_to_task).collect()
        })
        .await
    }

    async fn find_by_author(&self, author: UserId) -> TaskRepositoryResult<Vec<Task>> {
        self.run_blocking(move |connection| {
            let rows = tasks::table
                .filter(tasks::author_id.eq(author.into_inner()))
                .order((tasks::created_at.asc(), tasks::id.asc()))
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?;
            rows.into_iter().map(row_to_task).collect()
        })
        .await
    }

    async fn find_by_assignee(&self, assignee: UserId) -> TaskRepositoryResult<Vec<Task>> {
        self.run_blocking(move |connection| {
            let rows = tasks::table
                .filter(tasks::assignee_id.eq(assignee.into_inner()))
                .order((tasks::created_at.asc(), tasks::id.asc()))
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?;
            rows.into_iter().map(row_to_task).collect()
        })
        .await
    }

    async fn delete(&self, id: TaskId) -> TaskRepositoryResult<()> {
        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskRepositoryError, _>(|tx| {
                diesel::delete(
                    task_status_history::table
                        .filter(task_status_history::task_id.eq(id.into_inner())),
                )
                .execute(tx)?;
                let deleted =
                    diesel::delete(tasks::table.filter(tasks::id.eq(id.into_inner()))).execute(tx)?;
                if deleted == 0 {
                    return Err(TaskRepositoryError::NotFound(id));
                }
                Ok(())
            })
        })
        .await
    }
}

#[async_trait]
impl TaskHistoryRepository for PostgresTaskRepository {
    async fn history_for_task(
        &self,
        task_id: TaskId,
    ) -> TaskRepositoryResult<Vec<TaskStatusHistory>> {
        self.run_blocking(move |connection| {
            connection
                .build_transaction()
                .read_only()
                .repeatable_read()
                .run::<_, TaskRepositoryError, _>(|tx| {
                    let task_exists = diesel::select(diesel::dsl::exists(
                        tasks::table.filter(tasks::id.eq(task_id.into_inner())),
                    ))
                    .get_result::<bool>(tx)?;
                    if !task_exists {
                        return Err(TaskRepositoryError::NotFound(task_id));
                    }

                    let rows = task_status_history::table
                        .filter(task_status_history::task_id.eq(task_id.into_inner()))
                        .order(task_status_history::sequence.desc())
                        .select(HistoryRow::as_select())
                        .load::<HistoryRow>(tx)?;
                    rows.into_iter().map(row_to_history).collect()
                })
        })
        .await
    }

    async fn find_history_record(
        &self,
        id: HistoryId,
    ) -> TaskRepositoryResult<Option<TaskStatusHistory>> {
        self.run_blocking(move |connection| {
            let row = task_status_history::table
                .filter(task_status_history::id.eq(id.into_inner()))
                .select(HistoryRow::as_select())
                .first::<HistoryRow>(connection)
                .optional()?;
            row.map(row_to_history).transpose()
        })
        .await
    }

    async fn all_history(&self) -> TaskRepositoryResult<Vec<TaskStatusHistory>> {
        self.run_blocking(move |connection| {
            let rows = task_status_history::table
                .order((
                    task_status_history::changed_at.desc(),
                    task_status_history::sequence.desc(),
                ))
                .select(HistoryRow::as_select())
                .load::<HistoryRow>(connection)?;
            rows.into_iter().map(row_to_history).collect()
        })
        .await
    }
}

/// Turns a zero-row guarded update into `NotFound` or `Conflict`.
fn ensure_applied(
    connection: &mut PgConnection,
    affected: usize,
    task_id: TaskId,
    expected: Revision,
) -> TaskRepositoryResult<()> {
    if affected > 0 {
        return Ok(());
    }

    let stored = tasks::table
        .filter(tasks::id.eq(task_id.into_inner()))
        .select(tasks::revision)
        .first::<i64>(connection)
        .optional()?;
    match stored {
        None => Err(TaskRepositoryError::NotFound(task_id)),
        Some(actual) => Err(TaskRepositoryError::Conflict {
            task_id,
            expected,
            actual: Revision::new(from_db_counter(actual)?),
        }),
    }
}

fn to_db_counter(value: u64) -> TaskRepositoryResult<i64> {
    i64::try_from(value).map_err(TaskRepositoryError::persistence)
}

fn from_db_counter(value: i64) -> TaskRepositoryResult<u64> {
    u64::try_from(value).map_err(TaskRepositoryError::persistence)
}

fn to_new_row(task: &Task) -> TaskRepositoryResult<NewTaskRow> {
    Ok(NewTaskRow {
        id: task.id().into_inner(),
        title: task.title().as_str().to_owned(),
        description: task.description().map(str::to_owned),
        status: task.status().as_str().to_owned(),
        author_id: task.author().into_inner(),
        assignee_id: task.assignee().map(UserId::into_inner),
        revision: to_db_counter(task.revision().value())?,
        status_changes: to_db_counter(task.status_changes())?,
        created_at: task.created_at(),
        updated_at: task.updated_at(),
        completed_at: task.completed_at(),
    })
}

fn row_to_task(row: TaskRow) -> TaskRepositoryResult<Task> {
    let TaskRow {
        id,
        title: persisted_title,
        description,
        status: persisted_status,
        author_id,
        assignee_id,
        revision,
        status_changes,
        created_at,
        updated_at,
        completed_at,
    } = row;

    let title = TaskTitle::new(persisted_title).map_err(TaskRepositoryError::persistence)?;
    let status =
        TaskStatus::try_from(persisted_status.as_str()).map_err(TaskRepositoryError::persistence)?;

    let data = PersistedTaskData {
        id: TaskId::from_uuid(id),
        title,
        description,
        status,
        author: UserId::from_uuid(author_id),
        assignee: assignee_id.map(UserId::from_uuid),
        revision: Revision::new(from_db_counter(revision)?),
        status_changes: from_db_counter(status_changes)?,
        created_at,
        updated_at,
        completed_at,
    };
    Ok(Task::from_persisted(data))
}

fn to_new_history_row(record: &TaskStatusHistory) -> TaskRepositoryResult<NewHistoryRow> {
    Ok(NewHistoryRow {
        id: record.id().into_inner(),
        task_id: record.task_id().into_inner(),
        sequence: to_db_counter(record.sequence())?,
        old_status: record.old_status().as_str().to_owned(),
        new_status: record.new_status().as_str().to_owned(),
        changed_by: record.changed_by().into_inner(),
        changed_at: record.changed_at(),
    })
}

fn row_to_history(row: HistoryRow) -> TaskRepositoryResult<TaskStatusHistory> {
    let old_status =
        TaskStatus::try_from(row.old_status.as_str()).map_err(TaskRepositoryError::persistence)?;
    let new_status =
        TaskStatus::try_from(row.new_status.as_str()).map_err(TaskRepositoryError::persistence)?;

    Ok(TaskStatusHistory::from_persisted(PersistedHistoryData {
        id: HistoryId::from_uuid(row.id),
        task_id: TaskId::from_uuid(row.task_id),
        sequence: from_db_counter(row.sequence)?,
        old_status,
        new_status,
        changed_by: UserId::from_uuid(row.changed_by),
        changed_at: row.changed_at,
    }))
}
