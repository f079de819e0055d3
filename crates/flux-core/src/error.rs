//! Error kinds for each subsystem (§7), aggregated into a single top-level
//! error so the CLI dispatcher only needs to match one type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{0}")]
    Joined(String),
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("task '{0}' depends on undefined task '{1}'")]
    UndefinedDependency(String, String),
    #[error("dependency cycle detected at task '{0}'")]
    Cycle(String),
    #[error("unknown task '{0}'")]
    UnknownTask(String),
}

#[derive(Debug, Error)]
pub enum VarError {
    #[error("circular variable dependency detected")]
    Cycle,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error accessing cache: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed cache entry for task '{0}': {1}")]
    Malformed(String, serde_json::Error),
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("io error accessing lock file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed lock file: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("unknown task '{0}'")]
    UnknownTask(String),
    #[error("unresolved template '{0}' referenced by task '{1}'")]
    UnresolvedTemplate(String, String),
    #[error("unresolved profile '{0}'")]
    UnresolvedProfile(String),
    #[error("precondition failed for task '{task}': {reason}")]
    Precondition { task: String, reason: String },
    #[error("condition evaluation failed for task '{task}': {reason}")]
    Condition { task: String, reason: String },
    #[error("secret '{0}' could not be resolved for task '{1}'")]
    MissingSecret(String, String),
    #[error("task '{0}' aborted: prompt not confirmed")]
    PromptDeclined(String),
    #[error("task '{task}' failed: command exited with status {code}")]
    CommandFailed { task: String, code: i32 },
    #[error("task '{0}' could not be spawned: {1}")]
    Spawn(String, std::io::Error),
    #[error("task '{0}' exceeded its timeout")]
    Timeout(String),
    #[error("invalid duration '{0}' for task '{1}'")]
    BadDuration(String, String),
    #[error("task '{0}' requires docker, which has no in-core runner configured")]
    DockerUnavailable(String),
    #[error("task '{0}' requires remote execution ('{1}'), which has no in-core runner configured")]
    RemoteUnavailable(String, String),
    #[error("{0}")]
    Graph(#[from] GraphError),
    #[error("{0}")]
    Cache(#[from] CacheError),
    #[error("{0}")]
    Var(#[from] VarError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Var(#[from] VarError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
