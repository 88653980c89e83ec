use std::path::PathBuf;

use clap::Parser;
use dotenv::dotenv;
use quietwire::{setup_tracing, AppConfig, AppResult, ClientHost, Dispatcher, HostExit, TcpClient};
use tokio::{runtime, signal};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    /// text sent to the server once connected
    #[arg(long)]
    pub send: Option<String>,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Parser)]
pub enum Command {
    /// print the resolved configuration and exit
    PrintConfig,
}

fn default_level(verbose: u8) -> &'static str {
    match verbose {
        0 | 1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn main() -> AppResult<()> {
    dotenv().ok();

    let commandline: CommandLine = CommandLine::parse();
    let config_path = commandline.conf.as_ref().map_or_else(
        || {
            let mut path = PathBuf::from("./");
            path.push("conf.toml");
            path
        },
        PathBuf::from,
    );
    let app_config = AppConfig::set_up_config(config_path)?;

    if let Some(Command::PrintConfig) = commandline.command {
        println!("{:#?}", app_config);
        return Ok(());
    }

    let _log_guard = setup_tracing(&app_config.log, default_level(commandline.verbose));

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(run(app_config, commandline.send))
}

async fn run(app_config: AppConfig, greeting: Option<String>) -> AppResult<()> {
    let client_config = app_config.tcp_client;
    let dispatcher = Dispatcher::builder(client_config.address())
        .completion(client_config.observer_completion)
        .build();
    let client = TcpClient::new(client_config)?;
    let mut host = ClientHost::new(client, dispatcher);

    host.start().await?;
    if let Some(text) = greeting {
        if let Err(e) = host.client().send(&text).await {
            error!(error = %e, "failed to send greeting");
        }
    }

    match host
        .run_until(async {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await
    {
        HostExit::Signal => info!("shutting down"),
        HostExit::ConnectionLost(disconnect) => warn!(
            session_id = disconnect.session_id,
            reason = %disconnect.reason,
            "connection lost, shutting down"
        ),
    }

    host.stop().await
}
