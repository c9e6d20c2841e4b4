//! # POS Link CLI
//!
//! Thin command-line collaborator for the terminal link.
//!
//! ## Commands
//!
//! - `pay`: sign and send one payment request, then print every outcome the
//!   terminal produces until the answer for that request arrives
//! - `keygen`: print a fresh P-256 key pair for test terminals
//!
//! ## Configuration
//!
//! Defaults, then the TOML file given by `--config`, then `POS_LINK_*`
//! environment variables. Logs go to stderr (`RUST_LOG`, default `info`);
//! outcomes go to stdout.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pos_crypto::EcPrivateKey;
use pos_link::{
    InboundEvent, InboundOutcome, LinkConfig, PaymentOrder, PaymentTerminalApi, TcpPosLink,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// POS Link: signed payment requests to a local terminal
#[derive(Parser, Debug)]
#[command(name = "pos-link", version)]
#[command(about = "Send signed payment requests to a local POS terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one payment request and wait for the terminal's answer
    Pay(PayArgs),
    /// Print a fresh P-256 key pair (PKCS#8 and SPKI, base64)
    Keygen,
}

#[derive(Args, Debug)]
struct PayArgs {
    /// Amount in minor units, decimal digits only
    #[arg(short, long)]
    amount: String,

    /// Opaque data echoed back by the terminal
    #[arg(short, long, default_value = "")]
    payload: String,

    /// Terminal public key (SPKI, base64 or PEM)
    #[arg(long, required_unless_present = "terminal_key_file")]
    terminal_key: Option<String>,

    /// File holding the terminal public key
    #[arg(long, conflicts_with = "terminal_key")]
    terminal_key_file: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "POS_LINK_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds to wait for the answer
    #[arg(short, long, default_value_t = 120)]
    wait_secs: u64,
}

/// Where a `pay` run stands after an outcome.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Pending,
    Answered,
    Failed(String),
}

fn judge(outcome: &InboundOutcome, stan_id: &str) -> Verdict {
    match outcome {
        InboundOutcome::Verified(event) if event.stan_id() == stan_id => Verdict::Answered,
        InboundOutcome::Rejected {
            stan_id: rejected,
            error,
            ..
        } if rejected == stan_id => {
            Verdict::Failed(format!("answer for {} was rejected: {}", stan_id, error))
        }
        InboundOutcome::Terminated { error: None } => {
            Verdict::Failed("terminal closed the connection before answering".to_string())
        }
        InboundOutcome::Terminated { error: Some(e) } => {
            Verdict::Failed(format!("connection lost: {}", e))
        }
        _ => Verdict::Pending,
    }
}

fn render(outcome: &InboundOutcome) -> String {
    match outcome {
        InboundOutcome::Verified(InboundEvent::Success(s)) => format!(
            "payment_success stan_id={} amount={} rrn={} serial={} trace={} card={} datetime={} payload={}",
            s.stan_id, s.amount, s.rrn, s.serial, s.trace, s.card_number, s.datetime, s.payload
        ),
        InboundOutcome::Verified(InboundEvent::Failure(f)) => format!(
            "payment_failed stan_id={} error={} payload={}",
            f.stan_id, f.error, f.payload
        ),
        InboundOutcome::Rejected {
            event_type,
            stan_id,
            error,
        } => format!("REJECTED {} stan_id={}: {}", event_type, stan_id, error),
        InboundOutcome::Malformed(error) => format!("malformed line: {}", error),
        InboundOutcome::Terminated { error: None } => "connection closed".to_string(),
        InboundOutcome::Terminated { error: Some(e) } => format!("connection lost: {}", e),
    }
}

fn load_config(path: Option<&Path>) -> Result<LinkConfig> {
    let config = match path {
        Some(path) => LinkConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => LinkConfig::default(),
    };
    let config = config
        .apply_env()
        .context("reading POS_LINK_* environment")?;
    config.validate()?;
    Ok(config)
}

fn terminal_key(args: &PayArgs) -> Result<String> {
    let key = match (&args.terminal_key, &args.terminal_key_file) {
        (Some(key), _) => key.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("reading terminal key from {}", path.display()))?,
        (None, None) => bail!("--terminal-key or --terminal-key-file is required"),
    };
    // Fail before sending rather than rejecting every answer.
    pos_crypto::load_public_key(&key).context("terminal public key is unusable")?;
    Ok(key)
}

async fn pay(args: PayArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let terminal_key = terminal_key(&args)?;
    info!(endpoint = %config.endpoint, "using terminal");

    let link = TcpPosLink::over_tcp(config)?;
    let mut events = link.subscribe();

    let stan_id = link
        .send_payment_request(PaymentOrder::new(args.amount, args.payload, terminal_key))
        .await
        .context("sending payment request")?;
    println!("stan_id: {}", stan_id);

    let deadline = tokio::time::sleep(Duration::from_secs(args.wait_secs));
    tokio::pin!(deadline);

    let result = loop {
        tokio::select! {
            _ = &mut deadline => {
                break Err(anyhow::anyhow!("no answer within {}s", args.wait_secs));
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted before the terminal answered");
                break Ok(());
            }
            outcome = events.recv() => {
                let Some(outcome) = outcome else {
                    break Ok(());
                };
                println!("{}", render(&outcome));
                match judge(&outcome, &stan_id) {
                    Verdict::Pending => {}
                    Verdict::Answered => break Ok(()),
                    Verdict::Failed(reason) => break Err(anyhow::anyhow!(reason)),
                }
            }
        }
    };

    link.disconnect().await;
    result
}

fn keygen() -> Result<()> {
    let key = EcPrivateKey::generate();
    let private_key = key.to_pkcs8_base64()?;
    let public_key = key.public_key().to_spki_base64()?;

    println!("private_key: {}", private_key.as_str());
    println!("public_key:  {}", public_key);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match Cli::parse().command {
        Command::Pay(args) => pay(args).await,
        Command::Keygen => keygen(),
    }
}
