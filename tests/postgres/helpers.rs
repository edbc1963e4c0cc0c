//! Shared test helpers for `PostgreSQL` integration tests.

use std::sync::Arc;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use mockable::DefaultClock;
use rstest::fixture;
use taskflow::config::DatabaseSettings;
use taskflow::task::{
    adapters::postgres::{PostgresTaskRepository, TaskPgPool},
    services::{TaskHistoryService, TaskLifecycleService},
};
use uuid::Uuid;

use super::cluster::shared_cluster;

/// Boxed error used by fixtures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Environment variable naming an external server to test against.
pub const TEST_DATABASE_URL_VAR: &str = "TASKFLOW_TEST_DATABASE_URL";

/// SQL creating the task table.
pub const CREATE_TASKS_SQL: &str =
    include_str!("../../migrations/2026-10-19-000000_create_tasks/up.sql");

/// SQL creating the status history table.
pub const CREATE_HISTORY_SQL: &str =
    include_str!("../../migrations/2026-10-19-000001_create_task_status_history/up.sql");

/// Pins pooled connections to a test schema.
#[derive(Debug)]
struct SearchPath(String);

impl CustomizeConnection<PgConnection, diesel::r2d2::Error> for SearchPath {
    fn on_acquire(&self, connection: &mut PgConnection) -> Result<(), diesel::r2d2::Error> {
        connection
            .batch_execute(&format!("SET search_path TO {}", self.0))
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Schema that is dropped, with everything in it, when the value is dropped.
pub struct TemporarySchema {
    url: String,
    name: String,
}

impl TemporarySchema {
    fn create(url: &str) -> Result<Self, BoxError> {
        let name = format!("taskflow_test_{}", Uuid::new_v4().simple());
        let mut connection = PgConnection::establish(url)?;
        connection.batch_execute(&format!("CREATE SCHEMA {name}; SET search_path TO {name};"))?;
        connection.batch_execute(CREATE_TASKS_SQL)?;
        connection.batch_execute(CREATE_HISTORY_SQL)?;
        Ok(Self {
            url: url.to_owned(),
            name,
        })
    }
}

impl Drop for TemporarySchema {
    fn drop(&mut self) {
        let drop_sql = format!("DROP SCHEMA IF EXISTS {} CASCADE", self.name);
        let _cleanup = PgConnection::establish(&self.url)
            .map(|mut connection| connection.batch_execute(&drop_sql));
    }
}

/// Repository and services bound to one temporary schema.
pub struct PostgresContext {
    pub repository: Arc<PostgresTaskRepository>,
    pub lifecycle: TaskLifecycleService<PostgresTaskRepository, DefaultClock>,
    pub history: TaskHistoryService<PostgresTaskRepository>,
    _schema: TemporarySchema,
}

fn build_context(url: &str) -> Result<PostgresContext, BoxError> {
    let schema = TemporarySchema::create(url)?;
    let settings = DatabaseSettings::new(url);
    let manager = ConnectionManager::<PgConnection>::new(url);
    let pool: TaskPgPool = Pool::builder()
        .max_size(4)
        .connection_timeout(settings.connect_timeout())
        .connection_customizer(Box::new(SearchPath(schema.name.clone())))
        .build(manager)?;

    let repository = Arc::new(PostgresTaskRepository::new(pool));
    Ok(PostgresContext {
        lifecycle: TaskLifecycleService::new(Arc::clone(&repository), Arc::new(DefaultClock)),
        history: TaskHistoryService::new(Arc::clone(&repository)),
        repository,
        _schema: schema,
    })
}

/// Returns the server URL: `TASKFLOW_TEST_DATABASE_URL` when set, otherwise
/// the shared embedded cluster.
fn server_url() -> Result<String, BoxError> {
    match std::env::var(TEST_DATABASE_URL_VAR) {
        Ok(url) if !url.trim().is_empty() => Ok(url),
        _ => Ok(shared_cluster()?.admin_url()),
    }
}

/// Provides repository and services over a fresh schema.
#[fixture]
pub async fn context() -> Result<PostgresContext, BoxError> {
    tokio::task::spawn_blocking(|| build_context(&server_url()?)).await?
}
