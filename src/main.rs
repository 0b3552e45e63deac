use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use tracing::{error, info};

use counterpoint::{chat, constants, settings::Settings, web_server};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    settings: Settings,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the web UI.
    Start {
        #[arg(long, default_value_t = constants::DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
    },
    /// Debate in the terminal instead of the browser.
    Chat,
    /// Print the saved exploration.
    Show,
    /// Discard the saved exploration.
    Reset {
        #[arg(long, help = "Skip the confirmation prompt.")]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for environment variables like API keys)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=info,counterpoint=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    info!("Counterpoint starting with command: {:?}", cli.command);

    match cli.command {
        Commands::Start { port } => {
            let controller = cli.settings.build_controller()?;
            info!("Starting web UI on port {}...", port);

            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(port, controller).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed unexpectedly."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            info!("Shutdown complete.");
        }
        Commands::Chat => {
            let controller = cli.settings.build_controller()?;
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let mut out = io::stdout();
            chat::run_chat(&controller, &mut input, &mut out)
                .await
                .context("Chat session failed")?;
        }
        Commands::Show => {
            let store = cli.settings.open_store()?;
            let mut out = io::stdout();
            match store.get() {
                Some(session) => chat::print_transcript(&mut out, &session)?,
                None => println!("No active exploration."),
            }
        }
        Commands::Reset { yes } => {
            let store = cli.settings.open_store()?;
            if store.get().is_none() {
                println!("No active exploration.");
                return Ok(());
            }
            if !yes && !confirm("Explore a new topic? This will clear the history and cannot be undone. [y/N] ")? {
                println!("Reset cancelled.");
                return Ok(());
            }
            store.set(None).context("Failed to clear saved exploration")?;
            println!("Ready for a new exploration!");
        }
    }

    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{}", question);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
