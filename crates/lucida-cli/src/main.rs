mod cmd;

use clap::{Parser, Subcommand};
use cmd::publish::PublishArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "lucida",
    about = "Connect chat channels to the Lucida command center",
    version,
    propagate_version = true
)]
struct Cli {
    /// YAML config file (default: built-in settings)
    #[arg(long, global = true, env = "LUCIDA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the chat relay between the channel connector and the command center
    Relay {
        /// Listen port and/or command-center host, in either order
        #[arg(value_name = "PORT|HOST")]
        args: Vec<String>,

        /// Bot application id for authenticated channel replies
        #[arg(long, env = "LUCIDA_APP_ID")]
        app_id: Option<String>,

        /// Bot application password for authenticated channel replies
        #[arg(long, env = "LUCIDA_APP_PASSWORD", hide_env_values = true)]
        app_password: Option<String>,
    },

    /// Sign in to the bot portal and point a bot at a new messaging endpoint
    Publish(PublishArgs),
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Relay { .. } => tracing::Level::INFO,
        Commands::Publish(_) => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Relay {
            args,
            app_id,
            app_password,
        } => cmd::relay::run(config, &args, app_id, app_password),
        Commands::Publish(args) => cmd::publish::run(config, args),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
