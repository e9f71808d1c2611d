mod config;
mod engine;
mod messages;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use multiworld_command::{AllowAll, CommandSet, GrantList, PermissionChecker};
use multiworld_kernel::{EffectiveOn, PropertyRegistry, WorldManager};
use multiworld_persist::JsonWorldStore;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::engine::{ConsoleSessions, DirectoryEngine};

#[derive(Parser)]
#[command(name = "multiworld", about = "Manage the worlds of a multi-world server")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file; missing means defaults
    #[arg(short, long, default_value = "multiworld.toml")]
    config: PathBuf,

    /// Override the store directory
    #[arg(long)]
    store: Option<PathBuf>,

    /// Override the worlds directory
    #[arg(long)]
    worlds: Option<PathBuf>,

    /// Permission node to grant (repeatable). Without any, everything is allowed.
    #[arg(long = "grant")]
    grants: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read commands from stdin, one per line
    Console,
    /// Run a single command, e.g. `exec import skyworld normal`
    Exec {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// List every world property with its kind and default
    Properties,
    /// Print a config file with every default filled in
    DefaultConfig,
    /// Check the store's integrity manifest
    Verify,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let mut config = AppConfig::load(&cli.config)?;
    if let Some(store) = cli.store {
        config.store_dir = store;
    }
    if let Some(worlds) = cli.worlds {
        config.worlds_dir = worlds;
    }

    match cli.command {
        Commands::Properties => {
            for def in PropertyRegistry::global().defs() {
                let when = match def.effective_on {
                    EffectiveOn::Immediate => "",
                    EffectiveOn::NextLoad => " (next load)",
                };
                println!(
                    "{:<22} {:<8} default={}{when}  {}",
                    def.key,
                    def.kind.name(),
                    def.default,
                    def.description
                );
            }
        }
        Commands::DefaultConfig => {
            print!("{}", AppConfig::default().to_toml()?);
        }
        Commands::Verify => {
            let store = JsonWorldStore::open(&config.store_dir)
                .with_context(|| format!("opening store {}", config.store_dir.display()))?;
            let checked = store.verify_integrity()?;
            println!("Integrity OK: {checked} world file(s) verified");
        }
        Commands::Exec { args } => {
            let session = Session::start(&config, &cli.grants)?;
            let ok = session.run(&args);
            session.finish()?;
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Console => {
            let session = Session::start(&config, &cli.grants)?;
            for line in std::io::stdin().lock().lines() {
                let line = line?;
                let words: Vec<String> = line.split_whitespace().map(str::to_string).collect();
                match words.first().map(String::as_str) {
                    None => continue,
                    Some("quit" | "exit") => break,
                    Some("help") => session.print_help(),
                    Some(_) => {
                        session.run(&words);
                    }
                }
            }
            session.finish()?;
        }
    }

    Ok(())
}

/// A manager restored from the store, plus the commands and grants to
/// drive it with.
struct Session {
    manager: WorldManager,
    commands: CommandSet,
    perms: Box<dyn PermissionChecker>,
}

impl Session {
    fn start(config: &AppConfig, grants: &[String]) -> anyhow::Result<Self> {
        let engine = DirectoryEngine::new(&config.worlds_dir)
            .with_context(|| format!("opening worlds directory {}", config.worlds_dir.display()))?;
        let store = JsonWorldStore::open(&config.store_dir)
            .with_context(|| format!("opening store {}", config.store_dir.display()))?;
        let manager = WorldManager::new(
            Arc::new(engine),
            Arc::new(ConsoleSessions),
            Arc::new(store),
            config.manager.clone(),
        );

        let restored = manager.restore_from_store()?;
        if config.manager.auto_load_on_start {
            let failed = manager
                .auto_load()
                .into_iter()
                .filter(|(_, result)| result.is_err())
                .count();
            tracing::info!(restored, failed, "startup complete");
        }

        let perms: Box<dyn PermissionChecker> = if grants.is_empty() {
            Box::new(AllowAll)
        } else {
            Box::new(GrantList::new(grants.iter().cloned()))
        };
        Ok(Self {
            manager,
            commands: CommandSet::standard(),
            perms,
        })
    }

    /// Run one command line and print the result. Returns whether it succeeded.
    fn run(&self, words: &[String]) -> bool {
        match self.commands.dispatch(&self.manager, self.perms.as_ref(), words) {
            Ok(outcome) => {
                println!("{}", messages::render(&outcome));
                true
            }
            Err(e) => {
                tracing::debug!(key = e.message_key(), "command failed: {e}");
                eprintln!("{}", messages::render_error(&e));
                false
            }
        }
    }

    fn print_help(&self) {
        for command in self.commands.iter() {
            let allowed = self.perms.has(command.permission().node());
            let marker = if allowed { " " } else { "x" };
            println!("{marker} {:<60} {}", command.usage(), command.help());
        }
        println!("  quit");
    }

    /// Persist anything a command left unsaved.
    fn finish(&self) -> anyhow::Result<()> {
        let saved = self.manager.save_all()?;
        if saved > 0 {
            tracing::info!(saved, "saved dirty worlds");
        }
        Ok(())
    }
}
