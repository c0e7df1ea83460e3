mod cli;

use clap::Parser;
use cli::{Cli, Commands, DbCommands, ImportCommands};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use wm_import::config::Config;
use wm_import::{import, observability, shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    observability::init_tracing();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Import(command) => {
            let cancel = CancellationToken::new();
            shutdown::install(cancel.clone());

            let report = match command {
                ImportCommands::Ia(args) => {
                    let options = args.import.into_options(&config);
                    import::import_urls(&config, vec![args.url], options, cancel).await?
                }
                ImportCommands::IaKnownPages(args) => {
                    let options = args.import.into_options(&config);
                    import::import_known_pages(&config, args.pattern.as_deref(), options, cancel)
                        .await?
                }
            };

            if !report.upload.job_ids.is_empty() {
                println!("Import jobs IDs: {:?}", report.upload.job_ids);
            }
            if !report.upload.errors.is_empty() {
                warn!(errors = ?report.upload.errors, "Import finished with errors");
            }
        }
        Commands::Db(DbCommands::ListDomains(args)) => {
            let targets = import::list_domains(&config, args.pattern.as_deref()).await?;
            let listing: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
            println!(
                "Found {} matching domains:\n  {}",
                listing.len(),
                listing.join("\n  ")
            );
        }
    }

    Ok(())
}
