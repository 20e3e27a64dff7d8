// toolhub CLI entry point

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use toolhub_cli::{logging, HubError, ToolHub};
use toolhub_config::{AppConfig, ConfigManager, ConflictStrategy};

#[derive(Parser, Debug)]
#[command(name = "toolhub")]
#[command(about = "Sync tool specifications from GitLab repositories into a local cache")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (YAML or TOML); TOOLHUB__* variables override it
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging for toolhub crates
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Load and validate the configuration
    ValidateConfig,

    /// Check the GitLab connection and each repository's manifest
    TestConnection,

    /// Invalidate and re-fetch repository content
    Sync {
        /// Repository url; all repositories when omitted
        repository: Option<String>,
    },

    /// List resolved tools and name conflicts
    Tools {
        /// Override the configured conflict strategy
        #[arg(long)]
        strategy: Option<ConflictStrategy>,
    },

    /// Print the content behind a toolhub:// URI
    Resource {
        #[arg(value_name = "URI")]
        uri: String,
    },

    /// Print the synced rule files of one repository branch
    Rules {
        /// Repository url
        repository: String,

        /// Branch to read
        #[arg(short, long, default_value = "main")]
        branch: String,

        /// Print only this file
        #[arg(long, value_name = "PATH")]
        file: Option<String>,
    },

    /// Check repository reachability and cached file counts
    Status {
        repository: Option<String>,
    },

    /// List configured repositories
    Repos,

    /// Show cache statistics
    Stats,

    /// Drop cached content for one repository or everything
    Invalidate {
        repository: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<HubError>() {
            Some(hub_error) => eprintln!("Error: {}", hub_error.user_message()),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let manager = match path {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(),
    };
    manager.load().context("failed to load configuration")
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_ref())?;
    logging::init_tracing(&config.logging, cli.verbose)?;

    if let Commands::ValidateConfig = cli.command {
        return validate_config(&config, cli.json);
    }

    let mut hub = ToolHub::from_config(config)?;
    let result = execute(&mut hub, cli.command, cli.json).await;
    hub.stop().await?;
    result
}

async fn execute(hub: &mut ToolHub, command: Commands, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::ValidateConfig => validate_config(hub.config(), json),
        Commands::TestConnection => test_connection(hub, json).await,
        Commands::Sync { repository } => {
            let result = hub.refresh_repositories(repository.as_deref()).await?;
            if json {
                return print_json(&result);
            }
            println!(
                "Updated {} files, cached {} files",
                result.updated_files, result.cached_files
            );
            for error in &result.errors {
                eprintln!("  ✗ {}", error);
            }
            if !result.success {
                anyhow::bail!("sync finished with {} error(s)", result.errors.len());
            }
            Ok(())
        }
        Commands::Tools { strategy } => {
            if let Some(strategy) = strategy {
                hub.set_conflict_strategy(strategy);
            }
            let resolution = hub.load_resolution().await?;
            if json {
                return print_json(&serde_json::json!({
                    "tools": resolution.tools,
                    "conflicts": resolution.conflicts,
                }));
            }
            for tool in &resolution.tools {
                println!("{}  ({}@{})", tool.resolved_name, tool.repository, tool.branch);
                println!("    {}", tool.specification.description);
                for uri in &tool.resource_uris {
                    println!("    {}", uri);
                }
            }
            for conflict in &resolution.conflicts {
                println!(
                    "conflict '{}' in {}: {}",
                    conflict.name,
                    conflict.repositories.join(", "),
                    conflict.resolution
                );
            }
            Ok(())
        }
        Commands::Resource { uri } => {
            let content = hub.get_resource_content(&uri).await?;
            if json {
                return print_json(&serde_json::json!({ "uri": uri, "content": content }));
            }
            print!("{}", content);
            Ok(())
        }
        Commands::Rules {
            repository,
            branch,
            file,
        } => {
            if let Some(file) = file {
                let Some(content) = hub.get_specific_rule(&repository, &branch, &file).await else {
                    anyhow::bail!("no rule file {} in {}@{}", file, repository, branch);
                };
                if json {
                    return print_json(&serde_json::json!({ "path": file, "content": content }));
                }
                print!("{}", content);
                return Ok(());
            }

            let rules = hub.get_repository_rules(&repository, &branch).await;
            if json {
                return print_json(&rules);
            }
            for (path, content) in &rules {
                println!("==> {} ({} bytes)", path, content.len());
                println!("{}", content);
            }
            Ok(())
        }
        Commands::Status { repository } => {
            let statuses = hub.repository_status(repository.as_deref()).await;
            if json {
                return print_json(&statuses);
            }
            for status in &statuses {
                let mark = if status.accessible { "✓" } else { "✗" };
                println!(
                    "{} {}@{}  {} cached files",
                    mark, status.repository, status.branch, status.cached_files
                );
                if let Some(error) = &status.error {
                    println!("    {}", error);
                }
            }
            Ok(())
        }
        Commands::Repos => {
            let repositories = hub.list_repositories().await;
            if json {
                return print_json(&repositories);
            }
            for info in &repositories {
                println!(
                    "{} ({}@{})  {}  {} cached files",
                    info.name, info.url, info.branch, info.status, info.cached_files
                );
            }
            Ok(())
        }
        Commands::Stats => {
            let status = hub.cache_status().await?;
            let stats = hub.get_stats().await?;
            if json {
                return print_json(&status);
            }
            println!("Backend: {}", status.backend);
            println!("Items: {}", status.item_count);
            println!(
                "Hit rate: {:.2}% ({}/{})",
                status.hit_rate * 100.0,
                stats.hit_count,
                stats.total_requests()
            );
            if let Some(mb) = status.memory_usage_mb {
                println!("Memory usage: {:.2} MB", mb);
            }
            if let Some(mb) = status.storage_usage_mb {
                println!("Storage usage: {:.2} MB", mb);
            }
            if let Some(oldest) = stats.oldest_entry {
                println!("Oldest entry: {}", oldest);
            }
            if let Some(newest) = stats.newest_entry {
                println!("Newest entry: {}", newest);
            }
            Ok(())
        }
        Commands::Invalidate { repository } => {
            let result = hub.invalidate_cache(repository.as_deref()).await?;
            if json {
                return print_json(&result);
            }
            match (&result.error, result.invalidated) {
                (Some(error), _) => anyhow::bail!("{}", error),
                (None, _) if result.cleared_all => println!("✓ Cache cleared"),
                (None, count) => println!("✓ Invalidated {} entries", count.unwrap_or_default()),
            }
            Ok(())
        }
    }
}

fn validate_config(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&serde_json::json!({
            "valid": true,
            "server": config.server.name,
            "instance_url": config.gitlab.instance_url,
            "repositories": config.gitlab.repositories.len(),
            "cache_backend": config.cache.backend.to_string(),
            "ttl_seconds": config.cache.ttl_seconds,
            "conflict_strategy": config.tools.conflict_strategy,
        }));
    }
    println!("✓ Configuration is valid");
    println!("  Server: {}", config.server.name);
    println!("  GitLab: {}", config.gitlab.instance_url);
    println!("  Repositories: {}", config.gitlab.repositories.len());
    println!("  Cache: {} (TTL: {}s)", config.cache.backend, config.cache.ttl_seconds);
    println!("  Conflict strategy: {}", config.tools.conflict_strategy);
    Ok(())
}

async fn test_connection(hub: &ToolHub, json: bool) -> anyhow::Result<()> {
    let connection = hub.probe_connection().await;
    let statuses = hub.repository_status(None).await;

    if json {
        return print_json(&serde_json::json!({
            "connection": connection,
            "repositories": statuses,
        }));
    }

    println!("Instance: {}", hub.config().gitlab.instance_url);
    if !connection.connected {
        anyhow::bail!(
            "connection failed: {}",
            connection.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    println!(
        "✓ Connected as user: {}",
        connection.user.as_deref().unwrap_or("unknown")
    );
    if let Some(version) = &connection.gitlab_version {
        println!("  GitLab version: {}", version);
    }

    for status in &statuses {
        match &status.error {
            None => println!("✓ {}@{}", status.repository, status.branch),
            Some(error) => println!("✗ {}@{} - {}", status.repository, status.branch, error),
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
