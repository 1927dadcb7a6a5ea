use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use raffle_core::Config;

mod commands;
mod poll;

#[derive(Parser)]
#[command(name = "giftwatch", version, about = "Live-room raffle watcher")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitor fleet: discover live rooms, watch their chat
    /// streams, push trigger envelopes onto the queue.
    Monitor,
    /// Run the processor: drain the queue and dispatch raffle events.
    Process,
    /// One-shot guard-list bootstrap poll.
    PollGuards,
    /// Print recent broadcast feed entries as JSON lines.
    Feed {
        /// Look-back window in seconds.
        #[arg(long, default_value_t = 3600)]
        since_secs: i64,
        /// Also list rooms currently running a raffle.
        #[arg(long)]
        rooms: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "giftwatch=info,raffle_core=info,live_api=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Command::Monitor => commands::monitor(config).await,
        Command::Process => commands::process(config).await,
        Command::PollGuards => poll::poll_guards(config).await,
        Command::Feed { since_secs, rooms } => commands::feed(config, since_secs, rooms).await,
    }
}
