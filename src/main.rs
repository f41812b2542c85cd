use anyhow::Context;
use clap::{Parser, Subcommand};
use fraglet::{config::Config, logging, transport::Forwarder, FragmentSpec, Fragmenter};
use std::path::PathBuf;

/// Fragmenting TCP forwarder for DPI bypass
#[derive(Parser)]
#[command(name = "fraglet")]
#[command(about = "Forward TCP connections, splitting outbound writes into jittered chunks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the forwarder
    Run {
        /// Path to the configuration file
        #[arg(long, default_value = "config/fraglet.yml")]
        config: PathBuf,

        /// Local listen address (overrides forward.listen)
        #[arg(long)]
        listen: Option<String>,

        /// Remote host:port (overrides forward.remote)
        #[arg(long)]
        remote: Option<String>,
    },
    /// Parse fragment options and print the resulting spec
    Check {
        /// Packets selector: tlshello, N, A-B, or empty for every write
        #[arg(long, default_value = "")]
        packets: String,

        /// Chunk length range in bytes
        #[arg(long)]
        length: String,

        /// Pause range after each chunk in milliseconds
        #[arg(long)]
        interval: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            packets,
            length,
            interval,
        } => {
            let spec = FragmentSpec::parse(&packets, &length, &interval)?;
            println!("{}", spec);
            println!(
                "packets_from={} packets_to={}",
                spec.packets_from(),
                spec.packets_to()
            );
        }
        Commands::Run {
            config,
            listen,
            remote,
        } => {
            let mut config = Config::load(&config).await?;

            logging::init_logging(
                &config.log_level,
                &config.log_theme_path,
                config.log_to_file,
                config.log_file_path.as_deref(),
            )
            .await?;

            if let Some(listen) = listen {
                config.forward.listen = listen;
            }
            if let Some(remote) = remote {
                config.forward.remote = remote;
            }

            let fragmenter = Fragmenter::from_config(&config.fragment)
                .context("Invalid fragment configuration")?;
            if fragmenter.is_none() {
                tracing::info!("Fragmentation disabled, relaying unchanged");
            }

            Forwarder::new(config.forward, fragmenter).run().await?;
            tracing::info!("Forwarder stopped");
        }
    }

    Ok(())
}
