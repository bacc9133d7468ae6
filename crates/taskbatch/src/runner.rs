//! Batch submission
//!
//! [`TaskRunner`] turns a source (count, list or task file) into [`Target`]s
//! and runs each one on its worker pool with retries and callbacks.

use std::backtrace::BacktraceStatus;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn, Span};

use crate::config::{EnvSource, Settings, SettingsOverrides};
use crate::error::Result;
use crate::files;
use crate::reliability::{retrying, RetryPolicy, RetryState};
use crate::source::TaskSource;
use crate::target::{ProxyKey, Target};
use crate::task::TaskFn;
use crate::telemetry::TaskLogger;
use crate::worker::{CompletionHooks, TaskHandle, WorkerContext, WorkerPool, WorkerPoolConfig};

/// Separator used by task files unless the caller picks another
pub const DEFAULT_SEPARATOR: &str = "----";

type SuccessCallback<D, R> = Arc<dyn Fn(&Target<D>, &R) + Send + Sync>;
type ErrorCallback<D> = Arc<dyn Fn(&Target<D>, &anyhow::Error) + Send + Sync>;

/// Caller callbacks, shared by every task of a batch
///
/// Each task fires at most one of them, once, after its retries are
/// exhausted or it succeeds. Callbacks run on worker threads and should not
/// panic; a panic is caught and logged and that task's remaining completion
/// handling is skipped.
pub struct Callbacks<D, R> {
    on_success: Option<SuccessCallback<D, R>>,
    on_error: Option<ErrorCallback<D>>,
}

impl<D, R> Callbacks<D, R> {
    pub fn new() -> Self {
        Self {
            on_success: None,
            on_error: None,
        }
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Target<D>, &R) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Target<D>, &anyhow::Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

impl<D, R> Default for Callbacks<D, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, R> Clone for Callbacks<D, R> {
    fn clone(&self) -> Self {
        Self {
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

/// Per-call retry overrides; unset fields fall back to the runner settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitOptions {
    pub retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub notify_without_delay: Option<bool>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn with_notify_without_delay(mut self, notify: bool) -> Self {
        self.notify_without_delay = Some(notify);
        self
    }
}

/// Batch task runner
///
/// Owns a [`WorkerPool`] sized from [`Settings::max_workers`]. Dropping the
/// runner waits for every submitted task and its callback.
///
/// # Example
///
/// ```
/// use taskbatch::{Callbacks, SettingsOverrides, SubmitOptions, Target, TaskFn, TaskRunner};
///
/// let runner = TaskRunner::with_overrides("docs", SettingsOverrides::new().with_max_workers(2))?;
///
/// let handles = runner.submit_tasks(
///     3usize,
///     TaskFn::blocking(|t: &Target<usize>| Ok(t.data() * 10)),
///     Callbacks::new().on_success(|t: &Target<usize>, r: &usize| t.logger().info(format!("got {r}"))),
///     SubmitOptions::new(),
/// )?;
///
/// let mut results: Vec<usize> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
/// results.sort();
/// assert_eq!(results, vec![0, 10, 20]);
/// # Ok::<(), taskbatch::Error>(())
/// ```
pub struct TaskRunner {
    name: String,
    settings: Arc<Settings>,
    pool: WorkerPool,
    span: Span,
}

impl TaskRunner {
    /// Create a runner configured from `.env`, the environment and defaults
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::with_overrides(name, SettingsOverrides::default())
    }

    /// Create a runner with explicit overrides on top of `.env`/environment
    pub fn with_overrides(name: impl Into<String>, overrides: SettingsOverrides) -> Result<Self> {
        let settings = Settings::resolve(&overrides, &EnvSource::with_dotenv())?;
        Self::from_settings(name, settings)
    }

    /// Create a runner from already-resolved settings
    ///
    /// Settings are checked with [`Settings::validate`] first.
    pub fn from_settings(name: impl Into<String>, settings: Settings) -> Result<Self> {
        settings.validate()?;
        let name = name.into();
        let span = tracing::info_span!("batch", name = %name);
        let pool = WorkerPool::new(
            WorkerPoolConfig::new(settings.max_workers).with_name(name.clone()),
        )?;

        let runner = Self {
            name,
            settings: Arc::new(settings),
            pool,
            span,
        };
        runner.log_settings();
        Ok(runner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Effective policy: call options > runner settings
    pub fn retry_policy(&self, options: &SubmitOptions) -> RetryPolicy {
        let retries = options.retries.unwrap_or(self.settings.retries);
        let delay = options
            .retry_delay
            .unwrap_or_else(|| self.settings.retry_delay_duration());
        let policy = RetryPolicy::from_retries(retries, delay);

        match options.notify_without_delay {
            Some(notify) => policy.with_notify_without_delay(notify),
            None => policy,
        }
    }

    /// Submit one prepared target
    pub fn submit_task<D, R>(
        &self,
        target: Arc<Target<D>>,
        task: &TaskFn<D, R>,
        callbacks: &Callbacks<D, R>,
        options: &SubmitOptions,
    ) -> Result<TaskHandle<R>>
    where
        D: Send + Sync + 'static,
        R: Send + 'static,
    {
        let policy = self.retry_policy(options);
        let task = task.clone();
        let job_target = Arc::clone(&target);

        let job = move |ctx: &WorkerContext| {
            let logger = job_target.logger();
            let mut run = retrying(
                policy,
                |state| log_before_retry(logger, state),
                || task.call(&job_target, ctx),
            );
            run()
        };

        let on_success = callbacks.on_success.clone();
        let on_error = callbacks.on_error.clone();
        let hooks = CompletionHooks::new()
            .on_success(move |target: Option<&Target<D>>, result: &R| {
                if let Some(target) = target {
                    target.logger().success("Task succeeded");
                    if let Some(callback) = on_success {
                        callback(target, result);
                    }
                }
            })
            .on_error(move |target: Option<&Target<D>>, err: &anyhow::Error| {
                if let Some(target) = target {
                    log_task_failure(target.logger(), err);
                    if let Some(callback) = on_error {
                        callback(target, err);
                    }
                }
            });

        self.pool.submit(Some(target), job, hooks)
    }

    /// Expand `source` into targets and submit each one
    ///
    /// Fails before submitting anything when the source is invalid. An empty
    /// source logs a warning and submits nothing. Proxies are keyed by
    /// [`ProxyKey`]; use [`submit_tasks_keyed`](Self::submit_tasks_keyed) for
    /// payloads without it.
    ///
    /// If the runner shuts down while the batch is being submitted, the
    /// remaining items are skipped and `Error::PoolShutDown` is returned.
    /// Tasks accepted before that keep running and still fire their
    /// callbacks; only their handles are lost.
    pub fn submit_tasks<S, R>(
        &self,
        source: S,
        task: TaskFn<S::Data, R>,
        callbacks: Callbacks<S::Data, R>,
        options: SubmitOptions,
    ) -> Result<Vec<TaskHandle<R>>>
    where
        S: TaskSource,
        S::Data: ProxyKey + Send + Sync + 'static,
        R: Send + 'static,
    {
        self.submit_tasks_keyed(
            source,
            <S::Data as ProxyKey>::proxy_key,
            task,
            callbacks,
            options,
        )
    }

    /// [`submit_tasks`](Self::submit_tasks) with a caller-supplied proxy key
    ///
    /// `proxy_key` is only called when a proxy template is in effect.
    pub fn submit_tasks_keyed<S, R, K>(
        &self,
        source: S,
        proxy_key: K,
        task: TaskFn<S::Data, R>,
        callbacks: Callbacks<S::Data, R>,
        options: SubmitOptions,
    ) -> Result<Vec<TaskHandle<R>>>
    where
        S: TaskSource,
        S::Data: Send + Sync + 'static,
        R: Send + 'static,
        K: Fn(&S::Data) -> String,
    {
        let _entered = self.span.enter();

        let units = source.into_units()?;
        if units.is_empty() {
            warn!("Task count must be greater than 0, nothing submitted");
            return Ok(Vec::new());
        }

        let items = units.into_ordered(self.settings.shuffle, &mut rand::thread_rng());
        let assign_proxy = self.settings.proxy_template().is_some();
        info!(count = items.len(), "Submitting tasks");

        let total = items.len();
        let mut handles = Vec::with_capacity(total);
        for (index, data) in items.into_iter().enumerate() {
            let proxy = if assign_proxy {
                self.settings.proxy_for(&proxy_key(&data))
            } else {
                None
            };
            let target = Target::new(index, data).with_proxy(proxy);
            match self.submit_task(Arc::new(target), &task, &callbacks, &options) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    warn!(
                        submitted = index,
                        total, "Batch submission stopped early: {err}"
                    );
                    return Err(err);
                }
            }
        }

        Ok(handles)
    }

    /// Read a task file and submit one task per line
    ///
    /// Each non-empty line is split on `separator`; the fields become the
    /// task's payload. A missing or unreadable file is logged and submits
    /// nothing.
    pub fn submit_tasks_from_file<R>(
        &self,
        path: impl AsRef<Path>,
        separator: &str,
        task: TaskFn<Vec<String>, R>,
        callbacks: Callbacks<Vec<String>, R>,
        options: SubmitOptions,
    ) -> Result<Vec<TaskHandle<R>>>
    where
        R: Send + 'static,
    {
        let lines = match files::read_lines(path.as_ref()) {
            Ok(lines) => lines,
            Err(err) => {
                let _entered = self.span.enter();
                error!(file = %err.path().display(), "Failed to parse task file: {err}");
                return Ok(Vec::new());
            }
        };

        let rows = files::split_lines(&lines, separator);
        self.submit_tasks(rows, task, callbacks, options)
    }

    /// Stop accepting tasks; with `wait`, block until all have finished
    pub fn shutdown(&self, wait: bool) {
        self.pool.shutdown(wait);
    }

    fn log_settings(&self) {
        let _entered = self.span.enter();
        info!("--- Loading task settings ---");
        for (label, value) in self.settings.describe() {
            info!("{label}: {value}");
        }
        info!("--- Settings loaded ---");
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        self.pool.shutdown(true);
    }
}

impl fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunner")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("pool", &self.pool)
            .finish()
    }
}

fn log_before_retry(logger: &TaskLogger, state: &RetryState<'_>) {
    logger.warn(format_args!(
        "Task failed, retry {} of {} in {:.2}s... error: {:#}",
        state.attempt,
        state.max_attempts - 1,
        state.sleep.as_secs_f64(),
        state.error
    ));
}

fn log_task_failure(logger: &TaskLogger, err: &anyhow::Error) {
    logger.error(failure_report(err));
}

/// Final failure line: error chain, the root cause's `Debug` form (which
/// names its type), and the backtrace when anyhow captured one
/// (`RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`)
fn failure_report(err: &anyhow::Error) -> String {
    let mut report = format!("Task failed -> {err:#} [{:?}]", err.root_cause());
    let backtrace = err.backtrace();
    if backtrace.status() == BacktraceStatus::Captured {
        report.push_str(&format!("\n{backtrace}"));
    }
    report
}
