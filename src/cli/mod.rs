use clap::{Parser, Subcommand};

pub mod init_config;
pub mod run;
pub mod status;
pub mod version;

#[derive(Parser)]
#[command(name = "procura")]
#[command(author = "Procura Project")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Replicated contract-approval ledger node", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the node: HTTP API, replication and discovery timers
    Run {
        /// Path to config file (default: ~/.local/share/procura/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Override the listen port from the config file
        #[arg(long)]
        port: Option<u16>,

        /// Override the discovery registry URL from the config file
        #[arg(long)]
        registry_url: Option<String>,
    },

    /// Write a commented default config file
    InitConfig {
        /// Output path (default: ~/.local/share/procura/config.toml)
        #[arg(long)]
        output: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Query a running node's network health
    Status {
        /// Base URL of the node
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run {
            config,
            port,
            registry_url,
        } => run::execute(config, port, registry_url).await,
        Commands::InitConfig { output, force } => init_config::execute(output, force),
        Commands::Status { url } => status::execute(url).await,
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}
