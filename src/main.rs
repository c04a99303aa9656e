//! `semcode`: semantic code search over a set of ingested repositories.
//!
//! ```bash
//! semcode add https://github.com/org/repo.git
//! semcode add-local ./my-project --name mine
//! semcode search "retry with exponential backoff" --limit 10
//! semcode update repo --full-reembed
//! semcode remove repo
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use semcode_core::{
    Config, IngestReport, KnowledgeGraph, RepositoryRecord, SearchResult, UpdateOptions,
    build_knowledge_graph,
};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Parser)]
#[command(name = "semcode", version, about = "Semantic code search across git repositories")]
struct Cli {
    /// Configuration file (TOML). Falls back to `SEMCODE_CONFIG`, then `config/default.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Clone (or fast-forward) a remote repository and index it.
    Add {
        url: String,
        /// Repository name; defaults to the last URL segment.
        #[arg(long)]
        name: Option<String>,
        /// Rebuild the collection if its width no longer matches the model.
        #[arg(long)]
        full_reembed: bool,
    },
    /// Index a local directory in place.
    AddLocal {
        path: PathBuf,
        /// Repository name; defaults to the directory name.
        #[arg(long)]
        name: Option<String>,
        /// Rebuild the collection if its width no longer matches the model.
        #[arg(long)]
        full_reembed: bool,
    },
    /// Re-ingest a registered repository from its recorded source.
    Update {
        name: String,
        /// Accept a changed embedding width by rebuilding the collection.
        #[arg(long)]
        full_reembed: bool,
    },
    /// Remove a repository from the index, the registry and the clone cache.
    Remove { name: String },
    /// List registered repositories.
    List,
    /// Search indexed files.
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        /// Restrict results to one repository.
        #[arg(long, conflicts_with = "grouped")]
        repo: Option<String>,
        /// Group results per repository, ranked by mean score.
        #[arg(long)]
        grouped: bool,
    },
    /// Show aggregate statistics.
    Stats,
    /// Write a JSON snapshot of the statistics to a file.
    Export { path: PathBuf },
    /// Check that the embedding provider and the vector index are reachable.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_subscriber();
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    let kg = build_knowledge_graph(&config).context("initializing knowledge graph")?;

    run(&kg, cli.command, cli.json).await
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // Logs go to stderr so `--json` output stays parseable.
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("SEMCODE_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// Drive a mutation to completion. The first Ctrl-C only warns, since
/// dropping an ingest mid-state skips its rollback; a second one aborts.
async fn run_mutation<T>(fut: impl Future<Output = T>) -> anyhow::Result<T> {
    finish_unless_interrupted_twice(fut, tokio::signal::ctrl_c).await
}

async fn finish_unless_interrupted_twice<T, S>(
    fut: impl Future<Output = T>,
    mut interrupt: impl FnMut() -> S,
) -> anyhow::Result<T>
where
    S: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(fut);
    tokio::select! {
        biased;
        out = &mut fut => return Ok(out),
        Ok(()) = interrupt() => {
            tracing::warn!("interrupt received, finishing the current operation; press Ctrl-C again to abort");
        }
    }
    tokio::select! {
        biased;
        out = &mut fut => Ok(out),
        Ok(()) = interrupt() => {
            tracing::warn!(
                "aborted mid-operation; a repository added for the first time may need `semcode remove <name>` before retrying"
            );
            anyhow::bail!("interrupted; re-run the command to complete it")
        }
    }
}

async fn run(kg: &KnowledgeGraph, command: Command, json: bool) -> anyhow::Result<ExitCode> {
    match command {
        Command::Add {
            url,
            name,
            full_reembed,
        } => {
            let options = UpdateOptions { full_reembed };
            let report = run_mutation(kg.add_or_update_repository_with(
                &url,
                name.as_deref(),
                true,
                options,
            ))
            .await??;
            print_ingest(&report, json)?;
        }
        Command::AddLocal {
            path,
            name,
            full_reembed,
        } => {
            let source = path.to_string_lossy();
            let options = UpdateOptions { full_reembed };
            let report = run_mutation(kg.add_or_update_repository_with(
                &source,
                name.as_deref(),
                false,
                options,
            ))
            .await??;
            print_ingest(&report, json)?;
        }
        Command::Update { name, full_reembed } => {
            let options = UpdateOptions { full_reembed };
            let report = run_mutation(kg.update_repository_with(&name, options)).await??;
            print_ingest(&report, json)?;
        }
        Command::Remove { name } => {
            let removed = run_mutation(kg.remove_repository(&name)).await??;
            if json {
                println!("{}", serde_json::json!({ "name": name, "removed": removed }));
            } else if removed {
                println!("Removed {name}");
            } else {
                println!("Nothing to remove for {name}");
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::List => print_list(&kg.list_repositories(), json)?,
        Command::Search {
            query,
            limit,
            repo,
            grouped,
        } => {
            if grouped {
                let groups = kg.search_grouped(&query, limit).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&groups)?);
                } else {
                    for group in &groups {
                        println!("{} (relevance {:.3})", group.repo_name, group.relevance);
                        for result in &group.results {
                            println!("  {:.3}  {}", result.score, result.path);
                        }
                    }
                }
            } else {
                let results = kg.search(&query, limit, repo.as_deref()).await?;
                print_results(&results, json)?;
            }
        }
        Command::Stats => {
            let stats = kg.stats().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Repositories: {}", stats.total_repositories);
                println!("Files:        {}", stats.total_files);
                println!("Bytes:        {}", stats.total_bytes);
                match stats.indexed_documents {
                    Some(n) => println!("Indexed:      {n}"),
                    None => println!("Indexed:      unavailable"),
                }
                for (ext, count) in &stats.languages {
                    println!("  {ext:<8} {count}");
                }
            }
        }
        Command::Export { path } => {
            let stats = kg.export(&path).await?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "path": path, "repositories": stats.total_repositories })
                );
            } else {
                println!(
                    "Exported {} repositories to {}",
                    stats.total_repositories,
                    path.display()
                );
            }
        }
        Command::Health => {
            let report = kg.health_check().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("embedding:    {:?}", report.embedding);
                println!("vector index: {:?}", report.vector_index);
            }
            if !report.is_healthy() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_ingest(report: &IngestReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let verb = if report.updated { "Updated" } else { "Added" };
    println!(
        "{verb} {}: {} files, {} bytes in {} ms",
        report.name, report.files_processed, report.total_bytes, report.duration_ms
    );
    for (ext, count) in &report.language_histogram {
        println!("  {ext:<8} {count}");
    }
    Ok(())
}

fn print_list(records: &[RepositoryRecord], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No repositories.");
    }
    for r in records {
        let kind = if r.is_remote { "remote" } else { "local" };
        println!(
            "{:<24} {:<6} {:>6} files  {}  {}",
            r.name,
            kind,
            r.files_processed,
            r.processed_at.format("%Y-%m-%d %H:%M"),
            r.source
        );
    }
    Ok(())
}

fn print_results(results: &[SearchResult], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No results.");
    }
    for (i, r) in results.iter().enumerate() {
        println!("{}. [{:.3}] {}/{}", i + 1, r.score, r.repo_name, r.path);
        for line in r.content.lines().take(3) {
            println!("     {line}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use serial_test::serial;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_search_with_options() {
        let cli = Cli::try_parse_from([
            "semcode", "search", "parse toml", "--limit", "7", "--repo", "demo", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Command::Search {
                query,
                limit,
                repo,
                grouped,
            } => {
                assert_eq!(query, "parse toml");
                assert_eq!(limit, 7);
                assert_eq!(repo.as_deref(), Some("demo"));
                assert!(!grouped);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn search_limit_defaults_to_five() {
        let cli = Cli::try_parse_from(["semcode", "search", "q"]).unwrap();
        assert!(matches!(cli.command, Command::Search { limit: 5, .. }));
    }

    #[test]
    fn grouped_search_rejects_repo_filter() {
        assert!(
            Cli::try_parse_from(["semcode", "search", "q", "--grouped", "--repo", "x"]).is_err()
        );
    }

    #[test]
    fn parses_update_full_reembed() {
        let cli = Cli::try_parse_from(["semcode", "update", "demo", "--full-reembed"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Update { ref name, full_reembed: true } if name == "demo"
        ));
    }

    #[test]
    fn parses_add_full_reembed() {
        let cli = Cli::try_parse_from([
            "semcode",
            "add",
            "https://github.com/org/repo.git",
            "--full-reembed",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Add { full_reembed: true, .. }));
        let cli = Cli::try_parse_from(["semcode", "add-local", "./src"]).unwrap();
        assert!(matches!(cli.command, Command::AddLocal { full_reembed: false, .. }));
    }

    #[test]
    fn parses_add_local_with_name() {
        let cli =
            Cli::try_parse_from(["semcode", "add-local", "./src", "--name", "mine"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::AddLocal { ref name, .. } if name.as_deref() == Some("mine")
        ));
    }

    #[test]
    #[serial]
    fn config_flag_wins_over_env() {
        unsafe { std::env::set_var("SEMCODE_CONFIG", "/from/env.toml") };
        let path = resolve_config_path(Some(Path::new("/from/flag.toml")));
        let fallback = resolve_config_path(None);
        unsafe { std::env::remove_var("SEMCODE_CONFIG") };

        assert_eq!(path, PathBuf::from("/from/flag.toml"));
        assert_eq!(fallback, PathBuf::from("/from/env.toml"));
        assert_eq!(resolve_config_path(None), PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[tokio::test]
    async fn single_interrupt_lets_mutation_finish() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let out = finish_unless_interrupted_twice(
            async {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                7
            },
            || {
                let n = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Ok(())
                    } else {
                        std::future::pending().await
                    }
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_interrupt_aborts() {
        let result = finish_unless_interrupted_twice(std::future::pending::<()>(), || async {
            Ok(())
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn failed_signal_handler_is_not_an_interrupt() {
        let out = finish_unless_interrupted_twice(
            async {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                3
            },
            || async {
                Err(std::io::Error::other("no handler"))
            },
        )
        .await
        .unwrap();
        assert_eq!(out, 3);
    }

    #[tokio::test]
    async fn commands_run_against_memory_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.vector_store.backend = semcode_core::config::VectorBackend::Memory;
        config.storage.data_dir = dir.path().join("data");
        config.storage.repos_dir = dir.path().join("repos");
        let kg = build_knowledge_graph(&config).unwrap();

        assert_eq!(run(&kg, Command::List, true).await.unwrap(), ExitCode::SUCCESS);
        assert_eq!(run(&kg, Command::Stats, false).await.unwrap(), ExitCode::SUCCESS);
        assert_eq!(
            run(&kg, Command::Remove { name: "ghost".into() }, false)
                .await
                .unwrap(),
            ExitCode::FAILURE
        );
        let export = dir.path().join("export.json");
        run(&kg, Command::Export { path: export.clone() }, false)
            .await
            .unwrap();
        assert!(export.exists());
    }
}
