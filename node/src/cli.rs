//! # CLI Interface
//!
//! Defines the command-line argument structure for `warden-node` using
//! `clap` derive.

use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use warden_protocol::custody::SignatureCurve;

/// Local transaction-signing authority.
///
/// Holds one sealed signing key and a persistent nonce ledger, and signs
/// wallet transactions from the command line or over a loopback HTTP API.
#[derive(Parser, Debug)]
#[command(
    name = "warden-node",
    about = "Local transaction-signing authority",
    version,
    propagate_version = true
)]
pub struct WardenCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding the database and `config.toml`.
    #[arg(long, short = 'd', global = true, env = "WARDEN_DATA_DIR", default_value = ".warden")]
    pub data_dir: PathBuf,

    /// Passphrase that unlocks the sealed signing key. Changing it
    /// invalidates the key.
    #[arg(long, global = true, env = "WARDEN_DEVICE_PASSPHRASE", hide_env_values = true)]
    pub device_passphrase: Option<String>,

    /// Passphrase the user presents to open the authentication window.
    #[arg(long, global = true, env = "WARDEN_AUTH_PASSPHRASE", hide_env_values = true)]
    pub auth_passphrase: Option<String>,

    /// Log output format: `pretty` or `json`. Overrides the config file.
    #[arg(long, global = true, env = "WARDEN_LOG_FORMAT")]
    pub log_format: Option<String>,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a new signing key, destroying any existing one.
    Keygen(KeygenArgs),
    /// Print the active public key (base64 SubjectPublicKeyInfo DER).
    Pubkey,
    /// Show key and ledger status.
    Status,
    /// Print the smallest nonce the signer will currently accept.
    NextNonce,
    /// Sign one transaction and print the submission payload as JSON.
    Sign(SignArgs),
    /// Serve the signing API on loopback.
    Serve(ServeArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Curve for the new key: `p256` or `secp256k1`.
    #[arg(long)]
    pub curve: Option<SignatureCurve>,

    /// Do not require user authentication to use the new key.
    #[arg(long)]
    pub no_auth: bool,

    /// Authentication window in seconds. Ignored with `--no-auth`.
    #[arg(long, conflicts_with = "no_auth")]
    pub auth_validity_secs: Option<u64>,

    /// Also reset the nonce ledger. Previously used nonces become
    /// signable again; only do this when the old key is retired.
    #[arg(long)]
    pub reset_nonces: bool,
}

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Decimal amount, e.g. `100.50`.
    #[arg(long)]
    pub amount: String,

    /// Currency code, e.g. `USD`.
    #[arg(long)]
    pub currency: String,

    /// Nonce. Defaults to the next acceptable one.
    #[arg(long)]
    pub nonce: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address. Overrides the config file.
    #[arg(long, env = "WARDEN_LISTEN")]
    pub listen: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        WardenCli::command().debug_assert();
    }

    #[test]
    fn parses_keygen_flags() {
        let cli = WardenCli::try_parse_from([
            "warden-node",
            "--data-dir",
            "/tmp/w",
            "keygen",
            "--curve",
            "secp256k1",
            "--no-auth",
            "--reset-nonces",
        ])
        .unwrap();
        assert_eq!(cli.global.data_dir, PathBuf::from("/tmp/w"));
        match cli.command {
            Commands::Keygen(args) => {
                assert_eq!(args.curve, Some(SignatureCurve::Secp256k1));
                assert!(args.no_auth);
                assert!(args.reset_nonces);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn no_auth_conflicts_with_window() {
        assert!(WardenCli::try_parse_from([
            "warden-node",
            "keygen",
            "--no-auth",
            "--auth-validity-secs",
            "10",
        ])
        .is_err());
    }

    #[test]
    fn parses_sign() {
        let cli = WardenCli::try_parse_from([
            "warden-node",
            "sign",
            "--amount",
            "100.50",
            "--currency",
            "USD",
        ])
        .unwrap();
        match cli.command {
            Commands::Sign(args) => {
                assert_eq!(args.amount, "100.50");
                assert_eq!(args.nonce, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
