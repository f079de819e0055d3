//! End-to-end coverage of the parse → graph → execute → cache pipeline,
//! exercising the concrete scenarios from the design spec (§8).

use std::fs;

use flux_core::executor::Executor;
use flux_core::graph::Graph;
use flux_core::parser::Parser;

const PIPELINE_SRC: &str = r#"
task clean:
    run:
        echo cleaning
task build:
    deps: clean
    run:
        echo building
task test:
    deps: build
    run:
        echo testing
"#;

#[test]
fn parses_and_topologically_sorts_three_task_pipeline() {
    let file = Parser::parse_file(PIPELINE_SRC, std::path::Path::new(".")).unwrap();
    let graph = Graph::build(&file).unwrap();
    assert_eq!(graph.topological_sort(), vec!["clean", "build", "test"]);
    assert_eq!(graph.transitive_deps("test").unwrap(), vec!["clean", "build"]);
}

#[tokio::test]
async fn executes_full_pipeline_in_dependency_order() {
    let file = Parser::parse_file(PIPELINE_SRC, std::path::Path::new(".")).unwrap();
    let executor = Executor::new(file).unwrap();
    executor.execute("test", None, false).await.unwrap();
}

#[tokio::test]
async fn execute_all_runs_every_task_without_caching() {
    let file = Parser::parse_file(PIPELINE_SRC, std::path::Path::new(".")).unwrap();
    let executor = Executor::new(file).unwrap();
    executor.execute_all().await.unwrap();
}

#[tokio::test]
async fn second_run_with_unchanged_inputs_is_a_cache_hit() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.go");
    fs::write(&src, b"package main").unwrap();
    let bin_dir = dir.path().join("bin");
    fs::create_dir_all(&bin_dir).unwrap();
    let bin = bin_dir.join("app");

    let source = format!(
        "task build:\n    cache: true\n    inputs: {}\n    outputs: {}\n    run:\n        touch {}\n",
        src.display(),
        bin.display(),
        bin.display()
    );
    let file = Parser::parse_file(&source, dir.path()).unwrap();

    let cache_dir = dir.path().join(".flux/cache");
    let executor = Executor::new(file.clone()).unwrap().with_cache_dir(cache_dir.clone());
    executor.execute("build", None, true).await.unwrap();
    assert!(bin.exists());

    let executor2 = Executor::new(file).unwrap().with_cache_dir(cache_dir);
    executor2.execute("build", None, true).await.unwrap();
}

#[tokio::test]
async fn parallel_dependency_failure_surfaces_but_does_not_abort_siblings() {
    let source = r#"
task a:
    run:
        echo a
task b:
    run:
        exit 1
task c:
    run:
        echo c
task t:
    parallel: true
    deps: a, b, c
    run:
        echo t
"#;
    let file = Parser::parse_file(source, std::path::Path::new(".")).unwrap();
    let executor = Executor::new(file).unwrap();
    let err = executor.execute("t", None, false).await.unwrap_err();
    assert!(err.to_string().contains('b'));
}
