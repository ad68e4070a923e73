use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use spacetoggle::common::config::{Paths, Settings};
use spacetoggle::common::log;
use spacetoggle::daemon;
use spacetoggle::ipc::DaemonClient;
use spacetoggle::model::SpaceId;
use spacetoggle::model::server::StatusSnapshot;

#[derive(Parser, Debug)]
#[command(name = "spacetoggle", version, about = "Remember a preference per space")]
struct Cli {
    /// Directory holding settings, the space configuration and the socket.
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon in the foreground.
    Daemon,
    #[command(flatten)]
    Client(ClientCommand),
}

#[derive(Subcommand, Debug)]
enum ClientCommand {
    /// Flip the preference for a space.
    Toggle {
        /// Space id; defaults to the current space.
        #[arg(long)]
        space: Option<SpaceId>,
    },
    /// Turn the preference on or off for a space.
    Set {
        state: Switch,
        /// Space id; defaults to the current space.
        #[arg(long)]
        space: Option<SpaceId>,
    },
    /// Show every known space and its state.
    Status {
        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Switch {
    On,
    Off,
}

fn main() -> anyhow::Result<()> {
    sigpipe::reset();
    log::init_logging();
    let cli = Cli::parse();
    let paths = Paths::resolve(cli.config_dir)?;

    let command = match cli.command {
        Command::Daemon => {
            let settings = Settings::read(&paths.settings())?;
            return daemon::run(paths, settings);
        }
        Command::Client(command) => command,
    };
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    runtime.block_on(run_client(&paths, command))
}

async fn run_client(paths: &Paths, command: ClientCommand) -> anyhow::Result<()> {
    let client = DaemonClient::connect(paths)?;
    match command {
        ClientCommand::Toggle { space } => {
            let id = target(&client, space).await?;
            let enabled = client.toggle_space(id).await?;
            println!("space {id}: {}", on_off(enabled));
        }
        ClientCommand::Set { state, space } => {
            let id = target(&client, space).await?;
            let enabled = client.set_space(id, matches!(state, Switch::On)).await?;
            println!("space {id}: {}", on_off(enabled));
        }
        ClientCommand::Status { json } => {
            let status = client.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
    }
    Ok(())
}

async fn target(client: &DaemonClient, space: Option<SpaceId>) -> anyhow::Result<SpaceId> {
    if let Some(id) = space {
        if id.is_unknown() {
            bail!("space id must be non-zero");
        }
        return Ok(id);
    }
    match client.status().await?.current.id {
        Some(id) => Ok(id),
        None => bail!("the daemon could not determine the current space; pass --space"),
    }
}

fn print_status(status: &StatusSnapshot) {
    println!("preference is {}", on_off(status.current.enabled));
    for space in &status.spaces {
        let marker = if status.current.id == Some(space.id) { '*' } else { ' ' };
        println!("{marker} {:>20}  {:<28} {}", space.id, space.description, on_off(space.enabled));
    }
}

fn on_off(enabled: bool) -> &'static str { if enabled { "on" } else { "off" } }
