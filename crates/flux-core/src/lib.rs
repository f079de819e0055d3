//! `flux_core` — the lexer, parser, variable engine, dependency graph,
//! cache, lock file, and executor behind the `flux` task runner.
//!
//! The crate is organized the way the pipeline runs: source text goes in
//! through [`lexer`] and [`parser`], producing an [`ast::FluxFile`]; that
//! model is expanded ([`template`], [`matrix`]), graphed ([`graph`]),
//! hashed ([`hash`], [`cache`], [`lock`]), and finally driven by
//! [`executor::Executor`].

pub mod ast;
pub mod cache;
pub mod collector;
pub mod condition;
pub mod duration;
pub mod error;
pub mod executor;
pub mod graph;
pub mod hash;
pub mod lexer;
pub mod lock;
pub mod matrix;
pub mod notifier;
pub mod parser;
pub mod precondition;
pub mod process;
pub mod secrets;
pub mod template;
pub mod token;
pub mod vars;

pub use ast::FluxFile;
pub use error::{Error, Result};
pub use executor::Executor;
pub use parser::parse_with_includes;

use std::path::Path;

/// Parses a FluxFile from disk, following its `include` directives
/// relative to its own directory.
pub fn load_file(path: &Path) -> Result<FluxFile> {
    let source = std::fs::read_to_string(path)?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Path::new(".").to_path_buf());
    let mut seen = Vec::new();
    Ok(parse_with_includes(&source, &base_dir, &mut seen)?)
}
