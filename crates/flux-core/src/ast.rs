//! The data model produced by the parser (§3 of the design).
//!
//! `FluxFile` is built once by the parser, mutated once by template
//! expansion and alias registration, then treated as immutable by every
//! downstream component (graph, cache, lock, executor).

use std::collections::BTreeMap;

/// A fully parsed Flux source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct FluxFile {
    pub vars: BTreeMap<String, String>,
    pub tasks: Vec<Task>,
    pub profiles: Vec<Profile>,
    pub templates: Vec<Template>,
    pub groups: Vec<TaskGroup>,
    pub aliases: BTreeMap<String, String>,
    pub includes: Vec<String>,
}

impl FluxFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn task_mut(&mut self, name: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.name == name)
    }

    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.name == name)
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Resolves an alias to its canonical task name, or returns the input
    /// unchanged if it is not a known alias (§4.8).
    pub fn resolve_alias(&self, name: &str) -> String {
        self.aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Profile {
    pub name: String,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TaskGroup {
    pub name: String,
    pub tasks: Vec<String>,
}

/// A precondition guard (§3, §4.7).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Precondition {
    pub kind: PreconditionKind,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreconditionKind {
    File,
    Command,
    Env,
    /// Any keyword the parser doesn't recognize; always fails at runtime.
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Notify {
    pub success: Option<String>,
    pub failure: Option<String>,
}

/// A named partial task used as an inheritance source (§3, §4.8).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Template {
    pub name: String,
    pub run: Vec<String>,
    pub before: Vec<String>,
    pub after: Vec<String>,
    pub deps: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub parallel: bool,
    pub condition: Option<String>,
    pub secrets: Vec<String>,
    pub pre: Vec<Precondition>,
    pub retries: i64,
    pub retry_delay: Option<String>,
    pub timeout: Option<String>,
    pub cache: bool,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub profile: Option<String>,
    pub docker: bool,
    pub remote: Option<String>,
    pub desc: Option<String>,
}

/// The central entity: a named unit of shell work (§3).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Task {
    pub name: String,
    pub alias: Option<String>,
    pub extends: Option<String>,
    pub desc: Option<String>,

    pub deps: Vec<String>,
    pub run: Vec<String>,
    pub before: Vec<String>,
    pub after: Vec<String>,

    pub parallel: bool,
    pub condition: Option<String>,
    pub prompt: Option<String>,
    pub retries: i64,
    pub retry_delay: Option<String>,
    pub timeout: Option<String>,

    pub env: BTreeMap<String, String>,
    pub profile: Option<String>,
    pub secrets: Vec<String>,

    pub cache: bool,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub watch: Vec<String>,
    pub watch_ignore: Vec<String>,

    pub pre: Vec<Precondition>,

    pub matrix: Option<Matrix>,

    pub notify: Notify,

    pub docker: bool,
    pub remote: Option<String>,
}

impl Default for Task {
    fn default() -> Self {
        Task {
            name: String::new(),
            alias: None,
            extends: None,
            desc: None,
            deps: Vec::new(),
            run: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            parallel: false,
            condition: None,
            prompt: None,
            retries: 0,
            retry_delay: None,
            timeout: None,
            env: BTreeMap::new(),
            profile: None,
            secrets: Vec::new(),
            cache: false,
            inputs: Vec::new(),
            outputs: Vec::new(),
            watch: Vec::new(),
            watch_ignore: Vec::new(),
            pre: Vec::new(),
            matrix: None,
            notify: Notify::default(),
            docker: false,
            remote: None,
        }
    }
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Task {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Normalized, non-negative attempt count: `retries` is an upper bound
    /// on total attempts, and any non-positive value means a single attempt
    /// (§4.7, §8 boundary case: -1 → 1).
    pub fn max_attempts(&self) -> u32 {
        if self.retries <= 0 {
            1
        } else {
            self.retries as u32
        }
    }
}

/// The Cartesian-product specification for matrix expansion (§4.7).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Matrix {
    pub dimensions: BTreeMap<String, Vec<String>>,
}
