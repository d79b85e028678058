use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use buds_crypto::{
    compute_cid,
    phone::{hash_phone_number, PhoneNormalization},
};
use buds_relay::{
    harness::{
        e2e::{self, E2eOptions},
        stress::{self, StressOptions},
    },
    RelayArgs, RelayClient,
};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Buds E2EE relay harness", long_about = None)]
struct Cli {
    /// Log filter; overrides RUST_LOG (default: info)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a simulated device and open a message sent to it
    E2e {
        #[command(flatten)]
        relay: RelayArgs,
        /// Owner DID the simulated device joins
        #[arg(long)]
        did: String,
        /// Owner phone number, hashed for registration
        #[arg(long)]
        phone: String,
        /// Normalise the phone number to NANP digits before hashing
        #[arg(long)]
        nanp: bool,
        #[arg(long, default_value = "Test Device B")]
        device_name: String,
        /// Poll immediately instead of waiting for Enter
        #[arg(long)]
        no_wait: bool,
        /// Base64 Ed25519 key of the sending device; enables signature checks
        #[arg(long)]
        sender_signing_key: Option<String>,
    },
    /// Load the relay with simulated users
    Stress {
        #[command(flatten)]
        relay: RelayArgs,
        #[arg(long, default_value_t = 100)]
        users: usize,
        #[arg(long, default_value_t = 1000)]
        messages: usize,
        #[arg(long, default_value_t = 10)]
        concurrency: usize,
        /// Length of the inbox polling phase
        #[arg(long, default_value_t = 30)]
        poll_seconds: u64,
        #[arg(long, default_value_t = 5)]
        poll_interval_secs: u64,
        #[arg(long, default_value_t = 2)]
        min_circle: usize,
        #[arg(long, default_value_t = 12)]
        max_circle: usize,
        #[arg(long, default_value_t = 672)]
        payload_len: usize,
    },
    /// Print the receipt CID of a file
    Cid { file: PathBuf },
    /// Print the registration hash of a phone number
    PhoneHash {
        phone: String,
        #[arg(long)]
        nanp: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());
    match cli.command {
        Commands::E2e {
            relay,
            did,
            phone,
            nanp,
            device_name,
            no_wait,
            sender_signing_key,
        } => {
            let client = RelayClient::new(&relay.into_config()?)?;
            let sender_signing_key = sender_signing_key
                .as_deref()
                .map(parse_signing_key)
                .transpose()?;
            let options = E2eOptions {
                did,
                phone,
                normalization: normalization(nanp),
                device_name,
                wait_for_operator: !no_wait,
                sender_signing_key,
            };
            e2e_command(&client, options).await
        }
        Commands::Stress {
            relay,
            users,
            messages,
            concurrency,
            poll_seconds,
            poll_interval_secs,
            min_circle,
            max_circle,
            payload_len,
        } => {
            let client = RelayClient::new(&relay.into_config()?)?;
            let options = StressOptions {
                users,
                messages,
                concurrency,
                poll_duration: Duration::from_secs(poll_seconds),
                poll_interval: Duration::from_secs(poll_interval_secs),
                min_circle,
                max_circle,
                payload_len,
            };
            let report = stress::run(client, options).await?;
            println!("{}", report.render());
            Ok(())
        }
        Commands::Cid { file } => {
            let bytes = tokio::fs::read(&file).await?;
            println!("{}", compute_cid(&bytes));
            Ok(())
        }
        Commands::PhoneHash { phone, nanp } => {
            println!("{}", hash_phone_number(&phone, normalization(nanp)));
            Ok(())
        }
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn normalization(nanp: bool) -> PhoneNormalization {
    if nanp {
        PhoneNormalization::NanpDigits
    } else {
        PhoneNormalization::AsIs
    }
}

fn parse_signing_key(b64: &str) -> Result<[u8; 32]> {
    let bytes = STANDARD.decode(b64.trim())?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow!("sender signing key must be 32 bytes, got {}", b.len()))
}

async fn e2e_command(client: &RelayClient, options: E2eOptions) -> Result<()> {
    let outcome = e2e::run(client, options).await?;
    info!(message_id = %outcome.message_id, "e2e check passed");
    println!("E2EE check passed ({})", outcome.verification.as_str());
    println!("   Device:        {}", outcome.device_id);
    println!("   Message:       {}", outcome.message_id);
    println!("   CID:           {}", outcome.receipt_cid);
    println!("   Payload:       {} bytes", outcome.plaintext_len);
    println!("   Sender:        {}", outcome.sender_did);
    println!("   Sender device: {}", outcome.sender_device_id);
    if !outcome.deleted {
        println!("   (message left on relay; delete failed)");
    }
    Ok(())
}
