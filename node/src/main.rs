// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Warden Signing Node
//!
//! Entry point for the `warden-node` binary. Parses CLI arguments, opens the
//! data directory, assembles the signer, and either runs one command or
//! serves the loopback signing API.
//!
//! Subcommands:
//!
//! - `keygen`     : generate (or replace) the signing key
//! - `pubkey`     : print the active public key
//! - `status`     : show key and ledger state
//! - `next-nonce` : print the next acceptable nonce
//! - `sign`       : sign one transaction, print the submission payload
//! - `serve`      : run the HTTP signing API
//! - `version`    : print build version information

mod api;
mod cli;
mod config;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use warden_protocol::custody::{
    load_or_create_salt, AlwaysDeny, AuthenticationGate, DeviceCredential, PassphraseGate,
    VaultCustodian,
};
use warden_protocol::ledger::NonceLedger;
use warden_protocol::storage::WardenDb;
use warden_protocol::transaction::{Transaction, TransactionSigner};

use cli::{Commands, GlobalArgs, WardenCli};
use config::NodeConfig;
use logging::LogFormat;
use metrics::NodeMetrics;

type Signer = TransactionSigner<VaultCustodian>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = WardenCli::parse();

    if let Commands::Version = cli.command {
        print_version();
        return Ok(());
    }

    std::fs::create_dir_all(&cli.global.data_dir).with_context(|| {
        format!(
            "failed to create data directory: {}",
            cli.global.data_dir.display()
        )
    })?;
    let config = NodeConfig::load(&cli.global.data_dir)?;
    let format = cli.global.log_format.as_deref().unwrap_or(&config.log_format);
    logging::init_logging(&config.log_level, LogFormat::from_str_lossy(format));

    match cli.command {
        Commands::Keygen(args) => keygen(&cli.global, &config, args),
        Commands::Pubkey => {
            let signer = open_signer(&cli.global)?;
            println!("{}", signer.public_key()?.to_base64());
            Ok(())
        }
        Commands::Status => print_status(&open_signer(&cli.global)?),
        Commands::NextNonce => {
            let signer = open_signer(&cli.global)?;
            println!("{}", signer.peek_next_nonce()?);
            Ok(())
        }
        Commands::Sign(args) => sign_once(&open_signer(&cli.global)?, args),
        Commands::Serve(args) => serve(&cli.global, &config, args).await,
        Commands::Version => unreachable!("handled above"),
    }
}

/// Opens the database and assembles the signer.
fn open_signer(global: &GlobalArgs) -> Result<Signer> {
    let db_path = global.data_dir.join(config::DB_DIR_NAME);
    let db = WardenDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::debug!(path = %db_path.display(), "database opened");

    let Some(passphrase) = global.device_passphrase.as_deref() else {
        bail!("no device passphrase; set WARDEN_DEVICE_PASSPHRASE or pass --device-passphrase");
    };
    let salt = load_or_create_salt(&db).context("failed to load credential salt")?;
    let credential = DeviceCredential::from_passphrase(passphrase, &salt)
        .context("failed to derive device credential")?;

    let gate: Arc<dyn AuthenticationGate> = match global.auth_passphrase.as_deref() {
        Some(expected) => Arc::new(PassphraseGate::new(expected, prompt_passphrase)),
        None => Arc::new(AlwaysDeny),
    };

    Ok(TransactionSigner::new(
        Arc::new(VaultCustodian::new(db.clone(), credential)),
        Arc::new(NonceLedger::new(db)),
        gate,
    ))
}

/// Hidden terminal prompt. `None` if the terminal cannot be read.
fn prompt_passphrase() -> Option<String> {
    rpassword::prompt_password("Authentication passphrase: ").ok()
}

fn keygen(global: &GlobalArgs, config: &NodeConfig, args: cli::KeygenArgs) -> Result<()> {
    let mut params = config.key_params();
    if let Some(curve) = args.curve {
        params = params.with_curve(curve);
    }
    if args.no_auth {
        params = params.with_auth_validity(None);
    } else if let Some(secs) = args.auth_validity_secs {
        params = params.with_auth_validity(Some(Duration::from_secs(secs)));
    }

    let signer = open_signer(global)?;
    if signer.key_exists() {
        tracing::warn!("replacing the existing signing key");
    }
    let public_key = signer.generate_key_pair(&params)?;

    if args.reset_nonces {
        signer
            .ledger()
            .reset()
            .context("key generated but the nonce ledger could not be reset")?;
    }
    if let Some(path) = config.write_default_if_missing(&global.data_dir)? {
        tracing::info!(path = %path.display(), "wrote default config");
    }

    println!("{}", public_key.to_base64());
    eprintln!("Generated {params} key {}", public_key.fingerprint());
    if args.reset_nonces {
        eprintln!("Nonce ledger reset; next nonce is 0");
    }
    Ok(())
}

fn print_status(signer: &Signer) -> Result<()> {
    match signer.custodian().key_info()? {
        Some(info) => {
            println!("Key            : present");
            println!("  Curve        : {}", info.params.curve);
            println!("  Fingerprint  : {}", info.public_key.fingerprint());
            match info.params.auth_validity {
                Some(v) => println!("  Auth window  : {}s", v.as_secs()),
                None => println!("  Auth window  : none"),
            }
            println!("  Created      : {}", info.created_at.to_rfc3339());
            if info.invalidated {
                println!("  State        : INVALIDATED (regenerate with `keygen`)");
            }
        }
        None => println!("Key            : absent"),
    }
    match signer.ledger().last_accepted()? {
        Some(n) => println!("Last nonce     : {n}"),
        None => println!("Last nonce     : none"),
    }
    println!("Next nonce     : {}", signer.peek_next_nonce()?);
    Ok(())
}

fn sign_once(signer: &Signer, args: cli::SignArgs) -> Result<()> {
    let nonce = match args.nonce {
        Some(n) => n,
        None => signer.peek_next_nonce()?,
    };
    let tx = Transaction::new(args.amount, args.currency, nonce);

    let needs_auth = signer
        .custodian()
        .key_info()?
        .is_some_and(|info| info.params.auth_validity.is_some());
    if needs_auth {
        signer.authenticate().context("authentication failed")?;
    }

    let payload = signer
        .sign_for_submission(&tx)
        .with_context(|| format!("failed to sign {tx}"))?;
    println!("{}", payload.to_json()?);
    Ok(())
}

/// Runs the signing API until SIGINT or SIGTERM.
async fn serve(global: &GlobalArgs, config: &NodeConfig, args: cli::ServeArgs) -> Result<()> {
    let listen_addr = args.listen.unwrap_or(config.listen_addr);
    if !listen_addr.ip().is_loopback() {
        tracing::warn!(%listen_addr, "signing API is bound to a non-loopback address");
    }

    let signer = Arc::new(open_signer(global)?);
    let node_metrics = Arc::new(NodeMetrics::new());
    node_metrics.set_last_accepted(signer.ledger().last_accepted()?);

    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            warden_protocol::config::PROTOCOL_VERSION,
        ),
        signer: Arc::clone(&signer),
        auth_passphrase: global.auth_passphrase.clone().map(Arc::new),
        metrics: node_metrics,
    };
    let router = api::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {listen_addr}"))?;
    tracing::info!(
        %listen_addr,
        key_present = signer.key_exists(),
        next_nonce = signer.peek_next_nonce()?,
        "signing API listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    tracing::info!("warden-node stopped");
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("warden-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", warden_protocol::config::PROTOCOL_VERSION);
    println!("algorithm   {}", warden_protocol::config::SIGNING_ALGORITHM);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining connections");
}
