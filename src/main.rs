use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use std::sync::Arc;
use std::time::Duration;
use swapwire::application::session::ClientSession;
use swapwire::application::swap::{SwapOutcome, SwapStateMachine};
use swapwire::config::{
    DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_RECV_ASSET, DEFAULT_SEND_ASSET, SwapConfig,
};
use swapwire::domain::amount::Amount;
use swapwire::domain::ports::PromptRef;
use swapwire::infrastructure::websocket::WebSocketTransport;
use swapwire::interfaces::terminal::prompt::{AutoPrompt, TerminalPrompt};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// WebSocket endpoint of the swap server
    #[arg(long, env = "SWAPWIRE_URL", default_value = "ws://127.0.0.1:8080")]
    url: String,

    /// Seconds to wait for any single response
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a full swap: fund check, quote, acceptance and confirmation polling
    Swap {
        #[arg(long, default_value = DEFAULT_SEND_ASSET)]
        send_asset: String,

        #[arg(long, default_value = DEFAULT_RECV_ASSET)]
        recv_asset: String,

        /// Amount of the send asset to swap
        #[arg(long)]
        amount: Amount,

        /// Seconds between confirmation polls
        #[arg(long, default_value_t = 5)]
        poll_interval_secs: u64,

        /// Confirmation polls before giving up (at least one)
        #[arg(
            long,
            default_value_t = DEFAULT_MAX_POLL_ATTEMPTS,
            value_parser = clap::value_parser!(u32).range(1..)
        )]
        max_attempts: u32,

        /// Seconds to wait for a balance update after requesting an address
        #[arg(long, default_value_t = 30)]
        balance_timeout_secs: u64,

        /// Answer yes to every question
        #[arg(long, short)]
        yes: bool,
    },
    /// Request a fresh receive address
    Address,
    /// List swaps known to the server
    Swaps,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("swapwire=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let request_timeout = Duration::from_secs(cli.request_timeout_secs);

    let (transport, events) = WebSocketTransport::connect(&cli.url)
        .await
        .into_diagnostic()?;
    let session = Arc::new(
        ClientSession::start(Box::new(transport), events).with_request_timeout(request_timeout),
    );

    match cli.command {
        Command::Swap {
            send_asset,
            recv_asset,
            amount,
            poll_interval_secs,
            max_attempts,
            balance_timeout_secs,
            yes,
        } => {
            let config = SwapConfig {
                poll_interval: Duration::from_secs(poll_interval_secs),
                max_poll_attempts: max_attempts,
                request_timeout,
                balance_timeout: Duration::from_secs(balance_timeout_secs),
                ..SwapConfig::new(send_asset, recv_asset, amount)
            };
            let prompt: PromptRef = if yes {
                Arc::new(AutoPrompt(true))
            } else {
                Arc::new(TerminalPrompt::stdio())
            };

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let report = SwapStateMachine::new(Arc::clone(&session), prompt, config)
                .with_cancel_token(cancel)
                .run()
                .await;
            session.shutdown();

            println!("{}", report.outcome);
            if let SwapOutcome::Failed(reason) = report.outcome {
                return Err(miette!("{reason}"));
            }
        }
        Command::Address => {
            let address = session.new_address().await.into_diagnostic()?;
            println!("{address}");
        }
        Command::Swaps => {
            let swaps = session.swaps().await.into_diagnostic()?;
            for swap in swaps {
                println!("{} {:?}", swap.txid, swap.status);
            }
        }
    }

    Ok(())
}
