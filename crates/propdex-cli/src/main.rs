//! Propdex CLI
//!
//! Index classpath roots and query configuration keys from the command line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use propdex_core::{EngineConfig, IndexCoordinator, ModuleConfig, NodeHandle, PassOutcome};
use propdex_indexer::{ChangeBatcher, ClasspathWatcher, WatcherOptions};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "propdex")]
#[command(about = "Propdex - configuration key index and completion")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ~/.propdex/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Classpath root; replaces configured modules with a module named "default"
    #[arg(long = "root", global = true)]
    roots: Vec<PathBuf>,

    /// Module to query (default: the first configured module)
    #[arg(long, global = true)]
    module: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the module and print statistics
    Index {
        /// Also print the key tree
        #[arg(long)]
        tree: bool,
    },

    /// Suggest keys for a partially typed dotted path
    Keys {
        #[arg(default_value = "")]
        query: String,

        /// Resolved path the query is relative to
        #[arg(long, default_value = "")]
        ancestor: String,

        /// Sibling keys already present
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Suggest values for a key
    Values {
        path: String,

        #[arg(default_value = "")]
        prefix: String,

        /// Values already present
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Show documentation for a key or one of its values
    Doc {
        path: String,

        #[arg(long)]
        value: Option<String>,
    },

    /// Watch the module's roots and reindex on change
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let module = match (&cli.module, config.modules.first()) {
        (Some(id), _) => id.clone(),
        (None, Some(first)) => first.id.clone(),
        (None, None) => anyhow::bail!("No modules configured. Pass --root or add modules to the config file."),
    };

    let coordinator = IndexCoordinator::new(config).context("Failed to set up modules")?;
    let outcome = coordinator
        .reindex_now(&module)
        .await
        .with_context(|| format!("Failed to index module {}", module))?;
    if outcome == PassOutcome::Superseded {
        coordinator.wait_idle(&module).await?;
    }

    match cli.command {
        Commands::Index { tree } => cmd_index(&coordinator, &module, tree),
        Commands::Keys {
            query,
            ancestor,
            exclude,
        } => cmd_keys(&coordinator, &module, &ancestor, &query, &exclude),
        Commands::Values {
            path,
            prefix,
            exclude,
        } => cmd_values(&coordinator, &module, &path, &prefix, &exclude),
        Commands::Doc { path, value } => cmd_doc(&coordinator, &module, &path, value.as_deref()),
        Commands::Watch => cmd_watch(&coordinator).await,
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::load(),
    };

    if !cli.roots.is_empty() {
        config.modules = vec![ModuleConfig {
            id: "default".to_string(),
            roots: cli.roots.clone(),
            type_catalogs: vec![],
        }];
    }
    Ok(config)
}

fn resolve(coordinator: &IndexCoordinator, module: &str, path: &str) -> Result<NodeHandle> {
    coordinator
        .resolve_ancestor_path(module, path)?
        .with_context(|| format!("Unknown key: {}", path))
}

fn cmd_index(coordinator: &IndexCoordinator, module: &str, tree: bool) -> Result<()> {
    let stats = coordinator.stats(module)?;

    println!("Module {} (generation {})", module, stats.generation);
    println!();
    println!("  Sources:    {}", stats.sources);
    println!("  Groups:     {}", stats.groups);
    println!("  Properties: {}", stats.properties);
    println!("  Types:      {}", stats.types);
    println!("  Pass:       {}ms", stats.last_pass_ms);

    if tree {
        println!();
        print!("{}", coordinator.render_tree(module)?);
    }
    Ok(())
}

fn cmd_keys(
    coordinator: &IndexCoordinator,
    module: &str,
    ancestor: &str,
    query: &str,
    exclude: &[String],
) -> Result<()> {
    let handle = resolve(coordinator, module, ancestor)?;
    let suggestions = coordinator.suggest_keys(module, &handle, query, exclude)?;

    if suggestions.is_empty() {
        println!("No matching keys.");
        return Ok(());
    }

    for suggestion in suggestions {
        let mut line = suggestion.display_path.clone();
        if let Some(short_type) = &suggestion.short_type {
            line.push_str(&format!("  ({})", short_type));
        }
        if let Some(default) = &suggestion.default_value {
            line.push_str(&format!(" = {}", default));
        }
        if suggestion.is_deprecated() {
            line.push_str("  [deprecated]");
        }
        if let Some(summary) = suggestion.summary() {
            line.push_str(&format!("  {}", summary));
        }
        println!("{}", line);
    }
    Ok(())
}

fn cmd_values(
    coordinator: &IndexCoordinator,
    module: &str,
    path: &str,
    prefix: &str,
    exclude: &[String],
) -> Result<()> {
    let handle = resolve(coordinator, module, path)?;
    let suggestions = coordinator.suggest_values(module, &handle, prefix, exclude)?;

    if suggestions.is_empty() {
        println!("No known values.");
        return Ok(());
    }

    for suggestion in suggestions {
        let marker = if suggestion.is_default { " (default)" } else { "" };
        match &suggestion.description {
            Some(description) => println!("{}{}  {}", suggestion.display_value, marker, description),
            None => println!("{}{}", suggestion.display_value, marker),
        }
    }
    Ok(())
}

fn cmd_doc(coordinator: &IndexCoordinator, module: &str, path: &str, value: Option<&str>) -> Result<()> {
    let handle = resolve(coordinator, module, path)?;
    let doc = match value {
        Some(value) => coordinator.value_documentation_for(&handle, value),
        None => coordinator.documentation_for(&handle),
    };

    match doc {
        Some(doc) => println!("{}", doc),
        None => println!("No documentation for {}.", path),
    }
    Ok(())
}

async fn cmd_watch(coordinator: &IndexCoordinator) -> Result<()> {
    let config = coordinator.config();
    let mut watcher = ClasspathWatcher::new(WatcherOptions {
        debounce: Duration::from_millis(config.watch_debounce_ms),
        ..Default::default()
    });

    let mut owners: HashMap<PathBuf, Vec<String>> = HashMap::new();
    for module in &config.modules {
        for root in &module.roots {
            match watcher.watch(root) {
                Ok(()) => {
                    let canonical = root.canonicalize().unwrap_or_else(|_| root.clone());
                    owners.entry(canonical).or_default().push(module.id.clone());
                }
                Err(e) => eprintln!("✗ Not watching {}: {}", root.display(), e),
            }
        }
    }

    println!("Watching {} roots. Press Ctrl+C to stop.", watcher.roots().len());
    coordinator.reindex_all();

    let mut batcher = ChangeBatcher::new(Duration::from_millis(config.watch_debounce_ms));
    let mut tick = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            change = watcher.next() => match change {
                Some(change) => batcher.add(change),
                None => break,
            },
            _ = tick.tick() => {
                if !batcher.is_ready() {
                    continue;
                }
                let mut modules: Vec<&String> = batcher
                    .dirty_roots()
                    .iter()
                    .filter_map(|root| owners.get(root))
                    .flatten()
                    .collect();
                modules.sort();
                modules.dedup();
                let changes = batcher.take();
                info!(changes = changes.len(), modules = ?modules, "Reindexing after classpath changes");
                for module in modules {
                    coordinator.reindex(module)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping.");
                break;
            }
        }
    }
    Ok(())
}
