//! The executor: central orchestration of task execution (§4.7).
//!
//! `Executor` is cheaply `Clone` (its mutable fields are `Arc`-wrapped) so
//! that parallel dependency fan-out can hand an owned copy to each spawned
//! task, mirroring the teacher's `ProcessManager` pattern of driving a
//! `JoinSet` to completion without aborting siblings on failure.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;

use crate::ast::{FluxFile, Task};
use crate::cache::{self, Cache, CacheEntry};
use crate::collector::{Collector, TaskResult, TaskStatus};
use crate::condition;
use crate::duration;
use crate::error::ExecError;
use crate::graph::Graph;
use crate::matrix;
use crate::notifier::{self, NoopNotifier, Notifier};
use crate::precondition;
use crate::process::{self, ExternalRunner};
use crate::secrets;
use crate::template;
use crate::vars;

#[derive(Clone)]
pub struct Executor {
    file: Arc<FluxFile>,
    cache_dir: PathBuf,
    dry_run: bool,
    collector: Option<Arc<Collector>>,
    notifier: Arc<dyn Notifier>,
    docker_runner: Option<Arc<dyn ExternalRunner>>,
    remote_runner: Option<Arc<dyn ExternalRunner>>,
}

impl Executor {
    /// Expands templates and matrices once, up front, so every downstream
    /// component (graph, cache, lock) only ever sees concrete tasks (§4.7
    /// "Matrix expansion": "the core consumes these as ordinary tasks after
    /// expansion").
    pub fn new(file: FluxFile) -> Result<Self, ExecError> {
        let prepared = preprocess(&file)?;
        Ok(Executor {
            file: Arc::new(prepared),
            cache_dir: PathBuf::from(".flux/cache"),
            dry_run: false,
            collector: None,
            notifier: Arc::new(NoopNotifier),
            docker_runner: None,
            remote_runner: None,
        })
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn set_collector(&mut self, collector: Arc<Collector>) {
        self.collector = Some(collector);
    }

    pub fn set_notifier(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifier = notifier;
    }

    pub fn set_docker_runner(&mut self, runner: Arc<dyn ExternalRunner>) {
        self.docker_runner = Some(runner);
    }

    pub fn set_remote_runner(&mut self, runner: Arc<dyn ExternalRunner>) {
        self.remote_runner = Some(runner);
    }

    pub fn list_tasks(&self) -> Vec<&Task> {
        self.file.tasks.iter().collect()
    }

    pub fn get_task_info(&self, name: &str) -> Option<&Task> {
        self.file.task(name)
    }

    /// A full run of one task and its prerequisites (§4.7 Algorithm of
    /// Execute, steps 1-6).
    pub async fn execute(&self, target: &str, profile: Option<&str>, use_cache: bool) -> Result<(), ExecError> {
        let mut vars_table = self.file.vars.clone();
        if let Some(profile_name) = profile {
            let prof = self
                .file
                .profile(profile_name)
                .ok_or_else(|| ExecError::UnresolvedProfile(profile_name.to_string()))?;
            vars::apply_profile(&mut vars_table, prof);
        }
        vars::resolve_all(&mut vars_table)?;

        let canonical = self.file.resolve_alias(target);
        let graph = Graph::build(&self.file)?;
        if !graph.contains(&canonical) {
            return Err(ExecError::UnknownTask(canonical));
        }
        let dep_names = graph.transitive_deps(&canonical)?;
        let target_task = self
            .file
            .task(&canonical)
            .cloned()
            .ok_or_else(|| ExecError::UnknownTask(canonical.clone()))?;

        if target_task.parallel && !dep_names.is_empty() {
            self.run_parallel(&dep_names, &vars_table, use_cache).await?;
        } else {
            for name in &dep_names {
                let task = self
                    .file
                    .task(name)
                    .cloned()
                    .ok_or_else(|| ExecError::UnknownTask(name.clone()))?;
                self.execute_task(&task, &vars_table, use_cache).await?;
            }
        }

        self.execute_task(&target_task, &vars_table, use_cache).await
    }

    /// Runs every task in topological order, caching off (§4.7 `ExecuteAll`).
    pub async fn execute_all(&self) -> Result<(), ExecError> {
        let mut vars_table = self.file.vars.clone();
        vars::resolve_all(&mut vars_table)?;
        let graph = Graph::build(&self.file)?;
        for name in graph.topological_sort() {
            let task = self
                .file
                .task(&name)
                .cloned()
                .ok_or_else(|| ExecError::UnknownTask(name.clone()))?;
            self.execute_task(&task, &vars_table, false).await?;
        }
        Ok(())
    }

    /// Spawns one worker per dep, waits for all, and returns the first
    /// error in dispatch order; a failing sibling never cancels the rest
    /// (§9 "Parallel dependency fan-out with first-error return").
    async fn run_parallel(
        &self,
        names: &[String],
        vars_table: &BTreeMap<String, String>,
        use_cache: bool,
    ) -> Result<(), ExecError> {
        let mut set = JoinSet::new();
        for (idx, name) in names.iter().enumerate() {
            let task = self
                .file
                .task(name)
                .cloned()
                .ok_or_else(|| ExecError::UnknownTask(name.clone()))?;
            let executor = self.clone();
            let vars_table = vars_table.clone();
            set.spawn(async move {
                let result = executor.execute_task(&task, &vars_table, use_cache).await;
                (idx, result)
            });
        }

        let mut results: Vec<Option<Result<(), ExecError>>> = (0..names.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            let (idx, result) = joined.expect("dependency task panicked");
            results[idx] = Some(result);
        }

        for result in results.into_iter().flatten() {
            result?;
        }
        Ok(())
    }

    /// The per-task procedure (§4.7 steps a-k).
    async fn execute_task(
        &self,
        task: &Task,
        vars_table: &BTreeMap<String, String>,
        use_cache: bool,
    ) -> Result<(), ExecError> {
        let start_instant = Instant::now();
        let start_time = Utc::now();
        tracing::info!(task = %task.name, "starting task");

        let mut effective_env = vars_table.clone();
        if let Some(profile_name) = &task.profile {
            if let Some(profile) = self.file.profile(profile_name) {
                vars::apply_profile(&mut effective_env, profile);
            }
        }
        for (k, v) in &task.env {
            let expanded = vars::expand(v, &effective_env);
            effective_env.insert(k.clone(), expanded);
        }

        let workdir = std::env::current_dir()?;

        if !task.secrets.is_empty() {
            let resolved = secrets::resolve_secrets(&task.name, &task.secrets, &workdir)?;
            effective_env.extend(resolved);
        }

        if let Some(condition) = &task.condition {
            if !condition::evaluate(&task.name, condition, &effective_env)? {
                tracing::info!(task = %task.name, "skipped: condition evaluated false");
                self.record(&task.name, TaskStatus::Skipped, start_instant, start_time, None);
                return Ok(());
            }
        }

        precondition::check_all(&task.name, &task.pre, &effective_env)?;

        let runner: Option<Arc<dyn ExternalRunner>> = if task.docker {
            Some(
                self.docker_runner
                    .clone()
                    .ok_or_else(|| ExecError::DockerUnavailable(task.name.clone()))?,
            )
        } else if let Some(remote) = &task.remote {
            Some(self.remote_runner.clone().ok_or_else(|| {
                ExecError::RemoteUnavailable(task.name.clone(), remote.clone())
            })?)
        } else {
            None
        };

        if let Some(prompt) = &task.prompt {
            if !self.confirm(prompt)? {
                return Err(ExecError::PromptDeclined(task.name.clone()));
            }
        }

        let cacheable = use_cache && cache::is_cacheable(task);
        let cache_key = if cacheable { cache::cache_key(task) } else { None };
        if let Some(input_hash) = &cache_key {
            let cache = Cache::new(self.cache_dir.clone())?;
            if let Some(entry) = cache.get(&task.name, input_hash) {
                if entry.success && (!cache::checks_outputs(task) || cache::outputs_exist(task)) {
                    tracing::info!(task = %task.name, "cache hit");
                    self.record(&task.name, TaskStatus::CacheHit, start_instant, start_time, None);
                    return Ok(());
                }
            }
        }

        let run_result = if self.dry_run {
            for cmd in &task.run {
                tracing::info!(task = %task.name, "(dry-run) {cmd}");
            }
            Ok(())
        } else if task.timeout.is_some() || task.retries > 0 {
            self.run_with_retry(task, &effective_env, &workdir, runner.as_deref()).await
        } else {
            self.run_sequential(task, &effective_env, &workdir, runner.as_deref()).await
        };

        match run_result {
            Ok(()) => {
                if let Some(input_hash) = cache_key {
                    let cache = Cache::new(self.cache_dir.clone())?;
                    cache.set(&CacheEntry {
                        task_name: task.name.clone(),
                        input_hash,
                        output_hash: None,
                        success: true,
                        duration_ms: start_instant.elapsed().as_millis() as u64,
                        timestamp: Utc::now(),
                    })?;
                }
                self.record(&task.name, TaskStatus::Success, start_instant, start_time, None);
                if !self.dry_run {
                    notifier::dispatch(self.notifier.as_ref(), &task.name, &task.notify, true);
                }
                Ok(())
            }
            Err(e) => {
                self.record(
                    &task.name,
                    TaskStatus::Failed,
                    start_instant,
                    start_time,
                    Some(e.to_string()),
                );
                if !self.dry_run {
                    notifier::dispatch(self.notifier.as_ref(), &task.name, &task.notify, false);
                }
                Err(e)
            }
        }
    }

    fn confirm(&self, prompt: &str) -> Result<bool, ExecError> {
        use std::io::Write;
        print!("{prompt} [y/N] ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        Ok(answer.trim().eq_ignore_ascii_case("y"))
    }

    async fn run_sequential(
        &self,
        task: &Task,
        env: &BTreeMap<String, String>,
        workdir: &Path,
        runner: Option<&dyn ExternalRunner>,
    ) -> Result<(), ExecError> {
        for cmd in &task.run {
            let expanded = vars::expand(cmd, env);
            let outcome = match runner {
                Some(r) => r.run(&expanded, env, workdir).await,
                None => process::run_command(&task.name, &expanded, env, workdir).await,
            }
            .map_err(|e| ExecError::Spawn(task.name.clone(), e))?;
            if !outcome.success {
                return Err(ExecError::CommandFailed {
                    task: task.name.clone(),
                    code: outcome.code.unwrap_or(-1),
                });
            }
        }
        Ok(())
    }

    /// The retry/timeout wrapper: `timeout` bounds the whole attempt
    /// sequence, not a single attempt (§9 "Timeout semantics").
    async fn run_with_retry(
        &self,
        task: &Task,
        env: &BTreeMap<String, String>,
        workdir: &Path,
        runner: Option<&dyn ExternalRunner>,
    ) -> Result<(), ExecError> {
        let timeout = duration::parse_timeout(task.timeout.as_deref())
            .map_err(|_| ExecError::BadDuration(task.timeout.clone().unwrap_or_default(), task.name.clone()))?;
        let delay = duration::parse_retry_delay(task.retry_delay.as_deref());
        let attempts = task.max_attempts();

        let body = async {
            let mut last_err = None;
            for attempt in 0..attempts {
                match self.run_sequential(task, env, workdir, runner).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        last_err = Some(e);
                        if attempt + 1 < attempts {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
            Err(last_err.expect("retry loop always attempts at least once"))
        };

        match timeout {
            Some(d) => tokio::time::timeout(d, body)
                .await
                .map_err(|_| ExecError::Timeout(task.name.clone()))?,
            None => body.await,
        }
    }

    fn record(
        &self,
        name: &str,
        status: TaskStatus,
        start_instant: Instant,
        start_time: DateTime<Utc>,
        error: Option<String>,
    ) {
        if let Some(collector) = &self.collector {
            collector.record(TaskResult {
                name: name.to_string(),
                status,
                duration_ms: start_instant.elapsed().as_millis() as u64,
                cache_hit: matches!(status, TaskStatus::CacheHit),
                error,
                start: start_time,
                end: Utc::now(),
            });
        }
    }
}

fn preprocess(file: &FluxFile) -> Result<FluxFile, ExecError> {
    let mut expanded_tasks = Vec::new();
    for task in &file.tasks {
        let templated = template::expand_task(file, task)?;
        expanded_tasks.extend(matrix::expand(&templated));
    }
    let mut out = file.clone();
    out.tasks = expanded_tasks;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_with_pipeline() -> FluxFile {
        let mut f = FluxFile::new();
        let mut clean = Task::new("clean");
        clean.run = vec!["true".into()];
        let mut build = Task::new("build");
        build.deps = vec!["clean".into()];
        build.run = vec!["true".into()];
        f.tasks.push(clean);
        f.tasks.push(build);
        f
    }

    #[tokio::test]
    async fn executes_dependency_before_target() {
        let executor = Executor::new(file_with_pipeline()).unwrap();
        executor.execute("build", None, false).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_target_is_an_error() {
        let executor = Executor::new(file_with_pipeline()).unwrap();
        let err = executor.execute("ghost", None, false).await.unwrap_err();
        assert!(matches!(err, ExecError::UnknownTask(_)));
    }

    #[tokio::test]
    async fn condition_false_skips_without_running_command() {
        let mut f = FluxFile::new();
        let mut t = Task::new("maybe");
        t.condition = Some("ENV == \"prod\"".into());
        t.run = vec!["exit 1".into()];
        f.vars.insert("ENV".into(), "dev".into());
        f.tasks.push(t);

        let executor = Executor::new(f).unwrap();
        executor.execute("maybe", None, false).await.unwrap();
    }

    #[tokio::test]
    async fn failing_command_propagates_as_error() {
        let mut f = FluxFile::new();
        let mut t = Task::new("broken");
        t.run = vec!["exit 1".into()];
        f.tasks.push(t);

        let executor = Executor::new(f).unwrap();
        let err = executor.execute("broken", None, false).await.unwrap_err();
        assert!(matches!(err, ExecError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn parallel_dep_failure_does_not_abort_siblings() {
        let mut f = FluxFile::new();
        let mut a = Task::new("a");
        a.run = vec!["true".into()];
        let mut b = Task::new("b");
        b.run = vec!["exit 1".into()];
        let mut c = Task::new("c");
        c.run = vec!["true".into()];
        let mut t = Task::new("t");
        t.parallel = true;
        t.deps = vec!["a".into(), "b".into(), "c".into()];
        t.run = vec!["true".into()];
        f.tasks.extend([a, b, c, t]);

        let executor = Executor::new(f).unwrap();
        let err = executor.execute("t", None, false).await.unwrap_err();
        assert!(matches!(err, ExecError::CommandFailed { task, .. } if task == "b"));
    }

    #[tokio::test]
    async fn matrix_task_is_reachable_by_derived_name() {
        use crate::ast::Matrix;
        use std::collections::BTreeMap as Map;
        let mut f = FluxFile::new();
        let mut dims = Map::new();
        dims.insert("os".to_string(), vec!["linux".to_string()]);
        let mut t = Task::new("build");
        t.matrix = Some(Matrix { dimensions: dims });
        t.run = vec!["true".into()];
        f.tasks.push(t);

        let executor = Executor::new(f).unwrap();
        assert!(executor.get_task_info("build-os=linux").is_some());
        executor.execute("build-os=linux", None, false).await.unwrap();
    }
}
