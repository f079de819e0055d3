//! The `flux` CLI surface (§6): task execution, listing, and the lock
//! subcommands, all wired through [`clap`]'s derive API.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "flux", version, about = "A layout-sensitive task runner")]
pub struct Cli {
    /// Task to run, if not given via `--task`.
    pub target: Option<String>,

    #[arg(short = 't', long = "task")]
    pub task: Option<String>,

    #[arg(short = 'p', long = "profile")]
    pub profile: Option<String>,

    /// List every task name (and its description, if any) and exit.
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// FluxFile path; defaults to searching `FluxFile`, `fluxfile`,
    /// `Fluxfile` in the current directory.
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,

    #[arg(long = "no-cache")]
    pub no_cache: bool,

    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Print the parsed AST instead of (or before) executing.
    #[arg(long = "debug-ast")]
    pub debug_ast: bool,

    /// Emit machine-readable JSON instead of human-readable text, where
    /// the invoked subcommand supports it.
    #[arg(long = "json")]
    pub json: bool,

    #[command(subcommand)]
    pub lock: Option<LockCommand>,
}

#[derive(Subcommand, Debug)]
pub enum LockCommand {
    /// Generate `FluxFile.lock` from the current FluxFile.
    Lock,
    /// Verify the lock file against the files on disk.
    CheckLock,
    /// Print a structured diff between the lock file and the FluxFile.
    LockDiff,
    /// Refresh a single task's lock entry.
    LockUpdate {
        #[arg(long = "task")]
        task: String,
    },
    /// Remove lock entries for tasks no longer declared.
    LockClean,
}

pub fn discover_fluxfile(explicit: Option<&PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.clone());
    }
    for candidate in ["FluxFile", "fluxfile", "Fluxfile"] {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Ok(path);
        }
    }
    anyhow::bail!("no FluxFile found (looked for FluxFile, fluxfile, Fluxfile in the current directory)")
}
