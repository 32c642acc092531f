use clap::{Parser, Subcommand};
use log::{debug, error, info, LevelFilter};
use mcp_attr::server::serve_stdio;
use mcp_productivity::logging::is_read_only_environment;
use mcp_productivity::{setup_logging, Config, CredentialManager, ProductivityServer, Provider};
use std::env;

#[derive(Parser)]
#[clap(name = "Productivity MCP Server")]
#[clap(version = "0.1.0")]
#[clap(about = "MCP server for Gmail, Google Calendar, Google Drive and Notion", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Force use of stderr-only logging (no file logging)
    #[clap(long, short, action)]
    memory_only: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server (default if no command specified)
    #[clap(name = "server")]
    Server,

    /// Authorize providers, refreshing or re-running consent as needed
    #[clap(name = "auth")]
    Auth {
        /// Only authorize this provider (gmail, calendar, drive, notion)
        #[clap(long, short)]
        provider: Option<Provider>,
    },

    /// Report the state of each stored credential
    #[clap(name = "test")]
    Test,
}

async fn run_auth(config: &Config, only: Option<Provider>) -> bool {
    let providers: Vec<Provider> = match only {
        Some(provider) => vec![provider],
        None => Provider::ALL.to_vec(),
    };

    let mut all_ok = true;
    for provider in providers {
        println!("Authorizing {}...", provider);
        let manager = CredentialManager::from_config(config, provider);
        match manager.obtain().await {
            Ok(_) => println!(
                "✅ {} credential saved to {}",
                provider,
                manager.config().token_path.display()
            ),
            Err(e) => {
                eprintln!("❌ {} authorization failed: {}", provider, e);
                all_ok = false;
            }
        }
    }
    all_ok
}

fn run_test(config: &Config) {
    for provider in Provider::ALL {
        let manager = CredentialManager::from_config(config, provider);
        println!(
            "{:<10} {:<26} {}",
            provider.name(),
            manager.stored_state().as_str(),
            manager.config().token_path.display()
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let is_read_only = is_read_only_environment(cli.memory_only);
    if is_read_only {
        env::set_var("MCP_READ_ONLY", "1");
    }

    match cli.command {
        Some(Commands::Auth { provider }) => {
            env_logger::builder().filter_level(LevelFilter::Info).init();
            let config = Config::from_env()?;
            if !run_auth(&config, provider).await {
                std::process::exit(1);
            }
            return Ok(());
        }
        Some(Commands::Test) => {
            let config = Config::from_env()?;
            run_test(&config);
            return Ok(());
        }
        Some(Commands::Server) | None => {}
    }

    // stdout carries the MCP stream from here on
    let log_file = if is_read_only {
        env_logger::builder()
            .filter_level(LevelFilter::Debug)
            .init();
        info!("Using in-memory logging (stderr) in read-only environment");
        String::from("stderr-only (read-only environment)")
    } else {
        setup_logging(LevelFilter::Trace, None)?
    };

    info!("Productivity MCP Server starting...");
    info!("Logs will be saved to {}", log_file);

    let config = Config::from_env()?;
    debug!("Using home directory {}", config.home_dir.display());
    let server = ProductivityServer::new(config);

    info!("Starting MCP server with stdio interface");
    let result = serve_stdio(server).await;

    if let Err(ref e) = result {
        error!("Error running MCP server: {}", e);
    } else {
        info!("MCP server completed successfully");
    }

    debug!("Exiting application");
    result.map_err(|e| e.into())
}
