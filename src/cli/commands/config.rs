use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::PathBuf;

use crate::cli::output::{Formatter, get_formatter};
use crate::models::{Config, OutputFormat, ResolvedConfig};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a default configuration file")]
    Init {
        #[arg(
            long,
            short = 'g',
            help = "Create global config instead of ./rebatch.toml"
        )]
        global: bool,
        #[arg(long, help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Show configuration file paths")]
    Path {
        #[arg(long, help = "Show all possible config paths")]
        all: bool,
    },
}

pub async fn handle_config(
    cmd: ConfigCommand,
    resolved: &ResolvedConfig,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { global, force } => {
            let path = init_path(global)?;
            handle_init(&path, force, formatter.as_ref())
        }
        ConfigCommand::Show => handle_show(resolved, format),
        ConfigCommand::Path { all } => handle_path(resolved, all),
    }
}

fn init_path(global: bool) -> Result<PathBuf> {
    if global {
        Config::global_path().ok_or_else(|| anyhow::anyhow!("could not determine config directory"))
    } else {
        Ok(Config::project_path())
    }
}

fn handle_init(path: &std::path::Path, force: bool, formatter: &dyn Formatter) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    Config::default()
        .save_to(path)
        .with_context(|| format!("failed to write config to {}", path.display()))?;
    println!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", path.display()))
    );
    Ok(())
}

fn handle_show(resolved: &ResolvedConfig, format: OutputFormat) -> Result<()> {
    let config = &resolved.config;
    let key_env = config.llm.api_key_env();
    let key_set = std::env::var(key_env).is_ok_and(|v| !v.is_empty());

    if format == OutputFormat::Json {
        let output = serde_json::json!({
            "config": config,
            "path": resolved.path,
            "api_key_env": key_env,
            "api_key_set": key_set,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match resolved.path {
        Some(ref path) => println!("# Config: {}", path.display()),
        None => println!("# Config: built-in defaults"),
    }
    println!(
        "# API key: ${} ({})",
        key_env,
        if key_set { "set" } else { "not set" }
    );
    println!();
    print!("{}", toml::to_string_pretty(config)?);

    Ok(())
}

fn handle_path(resolved: &ResolvedConfig, show_all: bool) -> Result<()> {
    println!("Configuration paths:");
    println!();

    match resolved.path {
        Some(ref path) => println!("Active config: {}", path.display()),
        None => println!("Active config: none (using defaults)"),
    }

    if show_all {
        println!("Project config: {}", Config::project_path().display());
        if let Some(path) = Config::global_path() {
            println!("Global config:  {}", path.display());
        }
        if let Ok(cwd) = std::env::current_dir() {
            let env_path = cwd.join(".env");
            let state = if env_path.exists() { "active" } else { "would be" };
            println!(".env file ({}): {}", state, env_path.display());
        }
    }

    Ok(())
}
