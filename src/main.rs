use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use rebatch::cli::commands::{
    handle_config, handle_export, handle_extract, handle_run, handle_status,
};
use rebatch::cli::output::get_formatter;
use rebatch::cli::{Cli, Commands};
use rebatch::error::ProcessorError;
use rebatch::models::{Config, OutputFormat, ResolvedConfig};

const RESUME_HINT: &str = "Completed rows are saved; rerun the same command to resume.";

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "rebatch=debug,info"
    } else {
        "rebatch=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let resolved = Config::load(cli.config.as_deref())?;
    if let Some(ref path) = resolved.path {
        tracing::debug!(path = %path.display(), "loaded config");
    }
    let format = cli.format.unwrap_or_default();
    let verbose = cli.verbose;

    let is_run = matches!(cli.command, Commands::Run(_));
    let cancel = CancellationToken::new();
    let command = run_command(cli.command, resolved, format, verbose, cancel.clone());
    tokio::pin!(command);

    tokio::select! {
        result = &mut command => finish(result, format),
        _ = shutdown_signal() => {
            if !is_run {
                eprintln!("\nInterrupted.");
                std::process::exit(130);
            }
            // First signal: let the processor write its checkpoint. Second: leave now.
            eprintln!("\nInterrupted. Saving a checkpoint; press Ctrl-C again to exit immediately.");
            cancel.cancel();
            tokio::select! {
                result = &mut command => finish(result, format),
                _ = shutdown_signal() => {
                    eprintln!("\n{RESUME_HINT}");
                    std::process::exit(130);
                }
            }
        }
    }

    Ok(())
}

fn finish(result: Result<()>, format: OutputFormat) {
    let Err(e) = result else {
        return;
    };
    let interrupted = e.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<ProcessorError>(),
            Some(ProcessorError::Interrupted)
        )
    });
    if interrupted {
        eprintln!("{RESUME_HINT}");
        std::process::exit(130);
    }
    eprint!("{}", get_formatter(format).format_error(&format!("{e:#}")));
    std::process::exit(1);
}

async fn run_command(
    command: Commands,
    resolved: ResolvedConfig,
    format: OutputFormat,
    verbose: bool,
    cancel: CancellationToken,
) -> Result<()> {
    match command {
        Commands::Run(args) => {
            handle_run(args, resolved.config, format, verbose, cancel).await?;
        }
        Commands::Status(args) => {
            handle_status(args, resolved.config, format, verbose).await?;
        }
        Commands::Export(args) => {
            handle_export(args, format, verbose).await?;
        }
        Commands::Extract(args) => {
            handle_extract(args, resolved.config, format, verbose).await?;
        }
        Commands::Config(cmd) => {
            handle_config(cmd, &resolved, format, verbose).await?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
