mod cli;

use std::sync::Arc;

use clap::Parser;

use overseer::config::PartialConfig;
use overseer::exec::{DockerSandbox, LocalSandbox, Sandbox};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = cli::Cli::parse();

    match cli.command {
        cli::Commands::Run {
            instruction,
            container,
            root,
            model,
            log_dir,
        } => {
            let overrides = PartialConfig {
                model,
                logging_dir: log_dir,
                ..Default::default()
            };
            let config = overrides.with_fallback(PartialConfig::from_env()).finalize();
            tracing::info!(model = %config.model, "Overseer starting");

            let sandbox: Arc<dyn Sandbox> = match container {
                Some(name) => Arc::new(
                    DockerSandbox::new(name).with_max_output_bytes(config.max_output_bytes),
                ),
                None => {
                    let root = root.unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
                    Arc::new(
                        LocalSandbox::new(root).with_max_output_bytes(config.max_output_bytes),
                    )
                }
            };

            let outcome = overseer::perform_task(&instruction, sandbox, &config).await?;

            println!("{}", outcome.final_message);
            println!("{}", serde_json::to_string_pretty(&outcome.stats)?);
        }
    }

    Ok(())
}
