//! Embedded `PostgreSQL` cluster shared by the integration tests.
//!
//! The cluster starts once per test binary. Unprivileged runs start it in
//! process; root runs delegate to the worker named by `PG_EMBEDDED_WORKER`.

use std::env;
use std::ffi::OsString;
use std::net::TcpListener;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use cap_std::ambient_authority;
use cap_std::fs::Dir;
use pg_embedded_setup_unpriv::worker_process_test_api::{
    WorkerOperation, WorkerRequest, WorkerRequestArgs, run as run_worker,
};
use pg_embedded_setup_unpriv::{ExecutionPrivileges, TestBootstrapSettings, bootstrap_for_tests};
use postgresql_embedded::{PostgreSQL, Settings, Status};
use tokio::runtime::{Builder, Runtime};

use super::helpers::BoxError;

static SHARED_CLUSTER: OnceLock<Result<EmbeddedCluster, String>> = OnceLock::new();
static ENV_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();

/// Running embedded cluster and the settings used to reach it.
pub struct EmbeddedCluster {
    bootstrap: TestBootstrapSettings,
    _server: Option<(Runtime, PostgreSQL)>,
}

impl EmbeddedCluster {
    fn start() -> Result<Self, BoxError> {
        let port_guard = EnvGuard::set_many(&port_override()?);
        let mut bootstrap = bootstrap_for_tests().map_err(|err| Box::new(err) as BoxError)?;
        drop(port_guard);
        sync_password_from_file(&mut bootstrap.settings)?;
        let env_vars = bootstrap.environment.to_env();
        let server = match bootstrap.privileges {
            ExecutionPrivileges::Root => {
                start_via_worker(&mut bootstrap, &env_vars)?;
                None
            }
            ExecutionPrivileges::Unprivileged => Some(start_in_process(&mut bootstrap, &env_vars)?),
        };
        Ok(Self {
            bootstrap,
            _server: server,
        })
    }

    /// Returns the URL of the cluster's `postgres` database.
    #[must_use]
    pub fn admin_url(&self) -> String {
        self.bootstrap.settings.url("postgres")
    }
}

fn start_in_process(
    bootstrap: &mut TestBootstrapSettings,
    env_vars: &[(String, Option<String>)],
) -> Result<(Runtime, PostgreSQL), BoxError> {
    let runtime = Builder::new_current_thread().enable_all().build()?;
    let env_guard = EnvGuard::set_many(&to_os_pairs(env_vars));
    let mut postgres = PostgreSQL::new(bootstrap.settings.clone());
    runtime.block_on(async {
        postgres
            .setup()
            .await
            .map_err(|err| Box::new(err) as BoxError)?;
        if !matches!(postgres.status(), Status::Started) {
            postgres
                .start()
                .await
                .map_err(|err| Box::new(err) as BoxError)?;
        }
        Ok::<(), BoxError>(())
    })?;
    drop(env_guard);
    bootstrap.settings = postgres.settings().clone();
    sync_port_from_pid(&mut bootstrap.settings)?;
    Ok((runtime, postgres))
}

fn start_via_worker(
    bootstrap: &mut TestBootstrapSettings,
    env_vars: &[(String, Option<String>)],
) -> Result<(), BoxError> {
    worker_operation(bootstrap, env_vars, WorkerOperation::Setup, bootstrap.setup_timeout)?;
    worker_operation(bootstrap, env_vars, WorkerOperation::Start, bootstrap.start_timeout)?;
    sync_port_from_pid(&mut bootstrap.settings)
}

fn worker_operation(
    bootstrap: &TestBootstrapSettings,
    env_vars: &[(String, Option<String>)],
    operation: WorkerOperation,
    timeout: Duration,
) -> Result<(), BoxError> {
    let worker = bootstrap.worker_binary.as_ref().ok_or_else(|| {
        Box::new(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "running as root requires PG_EMBEDDED_WORKER",
        )) as BoxError
    })?;
    let worker_env = env_vars.to_vec();
    let args = WorkerRequestArgs {
        worker: worker.as_path(),
        settings: &bootstrap.settings,
        env_vars: &worker_env,
        operation,
        timeout,
    };
    run_worker(&WorkerRequest::new(args)).map_err(|err| Box::new(err) as BoxError)
}

/// Returns the shared cluster, starting it on first use.
///
/// Blocks while the cluster starts, so call it from `spawn_blocking`.
pub fn shared_cluster() -> Result<&'static EmbeddedCluster, BoxError> {
    SHARED_CLUSTER
        .get_or_init(|| EmbeddedCluster::start().map_err(|err| err.to_string()))
        .as_ref()
        .map_err(|message| format!("embedded PostgreSQL failed to start: {message}").into())
}

/// Scoped environment update serialized by a process-wide mutex.
struct EnvGuard {
    previous: Vec<(OsString, Option<OsString>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    fn set_many(changes: &[(OsString, Option<OsString>)]) -> Self {
        let lock = ENV_MUTEX
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut previous = Vec::with_capacity(changes.len());
        for (key, value) in changes {
            previous.push((key.clone(), env::var_os(key)));
            apply(key, value.as_ref());
        }
        Self {
            previous,
            _lock: lock,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.previous.drain(..) {
            apply(&key, value.as_ref());
        }
    }
}

fn apply(key: &OsString, value: Option<&OsString>) {
    unsafe {
        // SAFETY: ENV_MUTEX serializes environment mutations in this binary.
        match value {
            Some(new_value) => env::set_var(key, new_value),
            None => env::remove_var(key),
        }
    }
}

fn to_os_pairs(env_vars: &[(String, Option<String>)]) -> Vec<(OsString, Option<OsString>)> {
    env_vars
        .iter()
        .map(|(key, value)| (OsString::from(key), value.as_ref().map(OsString::from)))
        .collect()
}

/// Picks a free port unless `PG_PORT` is already set.
fn port_override() -> Result<Vec<(OsString, Option<OsString>)>, BoxError> {
    if env::var_os("PG_PORT").is_some() {
        return Ok(Vec::new());
    }
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(vec![(
        OsString::from("PG_PORT"),
        Some(OsString::from(port.to_string())),
    )])
}

fn open_dir(path: &Path) -> Result<Dir, BoxError> {
    Dir::open_ambient_dir(path, ambient_authority()).map_err(|err| Box::new(err) as BoxError)
}

fn sync_password_from_file(settings: &mut Settings) -> Result<(), BoxError> {
    let Some(file_name) = settings.password_file.file_name() else {
        return Err(Box::new(std::io::Error::other("password file has no name")));
    };
    let parent = settings
        .password_file
        .parent()
        .unwrap_or_else(|| Path::new("."));
    match open_dir(parent)?.read_to_string(file_name) {
        Ok(contents) => {
            let password = contents.trim_end();
            if !password.is_empty() {
                password.clone_into(&mut settings.password);
            }
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Box::new(err)),
    }
}

/// Reads the listening port from the fourth line of `postmaster.pid`.
fn sync_port_from_pid(settings: &mut Settings) -> Result<(), BoxError> {
    let contents = match open_dir(&settings.data_dir)?.read_to_string("postmaster.pid") {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(Box::new(err)),
    };
    if let Some(port) = contents
        .lines()
        .nth(3)
        .and_then(|line| line.trim().parse::<u16>().ok())
    {
        settings.port = port;
    }
    Ok(())
}
