use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;

mod commands;
mod utils;

use commands::{catalog, check, config, serve};
use utils::{env_paths::EnvPaths, logging};

/// PaaS CLI - Command line interface for the PaaS API authorization server
#[derive(Parser)]
#[command(name = "paasctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Port to listen on, overrides the configuration file
        #[arg(short, long, env = "PAAS_PORT")]
        port: Option<u16>,
    },

    /// List the registered API routes
    Routes {
        /// Output format (json, yaml, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List the actions and the endpoints they grant
    Actions {
        /// Output format (json, yaml, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List the roles and the endpoints they reach
    Roles {
        /// Output format (json, yaml, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check whether a user may perform a request
    Check {
        /// Username from the users file
        username: String,

        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,

        /// Request path, e.g. /api/v1/namespaces/workspace/applications
        path: String,

        /// Output format (json, yaml, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective server configuration
    Show {
        /// Output format (json, yaml, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    if let Commands::Serve { port } = cli.command {
        let env_paths = EnvPaths::load()?;
        let _guard = logging::init_logging(&env_paths, cli.verbose)?;
        return serve::execute(&env_paths, port).await;
    }

    logging::init_console_logging(cli.verbose);

    let result = match cli.command {
        Commands::Routes { format } => catalog::routes(format).await,
        Commands::Actions { format } => catalog::actions(format).await,
        Commands::Roles { format } => catalog::roles(format).await,
        Commands::Check {
            username,
            method,
            path,
            format,
        } => match check::execute(username, method, path, format).await {
            // exit status 2 on deny, 1 on error
            Ok(false) => std::process::exit(2),
            other => other.map(|_| ()),
        },
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => config::show(format).await,
        },
        Commands::Serve { .. } => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
