mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, LockCommand};
use flux_core::collector::Collector;
use flux_core::executor::Executor;
use flux_core::lock::{self, LockFile};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FLUX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        let report = miette::Report::msg(format!("{err:#}"));
        eprintln!("{report:?}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let fluxfile_path = cli::discover_fluxfile(cli.file.as_ref())?;
    let file = flux_core::load_file(&fluxfile_path)?;

    if cli.debug_ast {
        println!("{}", serde_json::to_string_pretty(&file)?);
        if cli.lock.is_none() && cli.target.is_none() && cli.task.is_none() && !cli.list {
            return Ok(());
        }
    }

    if let Some(lock_cmd) = &cli.lock {
        return run_lock_command(lock_cmd, &fluxfile_path, &file, cli.json).await;
    }

    let mut executor = Executor::new(file)?.with_dry_run(cli.dry_run);

    if cli.list {
        let mut names: Vec<_> = executor.list_tasks().iter().map(|t| t.name.clone()).collect();
        names.sort();
        for name in names {
            let desc = executor.get_task_info(&name).and_then(|t| t.desc.clone()).unwrap_or_default();
            println!("{name:<20}{desc}");
        }
        return Ok(());
    }

    let collector = Arc::new(Collector::new());
    executor.set_collector(Arc::clone(&collector));

    let target = cli
        .target
        .clone()
        .or(cli.task.clone())
        .ok_or_else(|| anyhow::anyhow!("no task given (pass it positionally or via -t/--task)"))?;

    let start = std::time::Instant::now();
    let result = executor.execute(&target, cli.profile.as_deref(), !cli.no_cache).await;
    let report = collector.generate(start.elapsed());

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    result.map_err(anyhow::Error::from)
}

async fn run_lock_command(
    cmd: &LockCommand,
    fluxfile_path: &PathBuf,
    file: &flux_core::FluxFile,
    json: bool,
) -> anyhow::Result<()> {
    let lock_path = lock::default_lock_path(&std::env::current_dir()?);

    match cmd {
        LockCommand::Lock => {
            let generated = lock::generate(file, fluxfile_path)?;
            generated.save(&lock_path)?;
            println!("wrote {}", lock_path.display());
        }
        LockCommand::CheckLock => {
            let existing = LockFile::load(&lock_path)?;
            let diffs = lock::verify(&existing);
            print_diffs(&diffs, json, "up to date")?;
            if !diffs.is_empty() {
                anyhow::bail!("lock file is stale for {} task(s)", diffs.len());
            }
        }
        LockCommand::LockDiff => {
            let existing = LockFile::load(&lock_path)?;
            let diffs = lock::diff(&existing, file);
            print_diffs(&diffs, json, "no differences")?;
        }
        LockCommand::LockUpdate { task } => {
            let mut existing = LockFile::load(&lock_path)?;
            lock::update_task(&mut existing, file, task)
                .ok_or_else(|| anyhow::anyhow!("unknown task '{task}'"))?;
            existing.save(&lock_path)?;
            println!("updated lock entry for '{task}'");
        }
        LockCommand::LockClean => {
            let mut existing = LockFile::load(&lock_path)?;
            let removed = existing.clean(file);
            existing.save(&lock_path)?;
            println!("removed {removed} stale lock entries");
        }
    }
    Ok(())
}

fn print_diffs(diffs: &[lock::DiffResult], json: bool, empty_message: &str) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(diffs)?);
        return Ok(());
    }
    if diffs.is_empty() {
        println!("{empty_message}");
        return Ok(());
    }
    for d in diffs {
        println!(
            "{}: config_changed={} command_changed={} input_changes={} output_changes={}",
            d.task,
            d.config_changed,
            d.command_changed,
            d.input_changes.len(),
            d.output_changes.len()
        );
    }
    Ok(())
}
