//! Command line and environment configuration for the server

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use tessera::{error::EmptySigningKey, ContactAddress, Identity, SigningKey};
use thiserror::Error;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

/// Configuration for `tessera-server`
#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct ServerConfig {
    /// The address to listen on
    #[arg(long, env, default_value = "127.0.0.1:8080")]
    pub address: SocketAddr,

    /// The secret used to sign access and refresh tokens
    #[arg(long, env, hide_env_values = true, value_parser = parse_signing_key)]
    pub signing_key: SigningKey,

    /// The file refresh records and principals are kept in
    #[arg(long, env, default_value = "tessera-store.json")]
    pub store_file: PathBuf,

    /// A principal to register at startup, as `<uuid>=<contact address>`
    ///
    /// May be given more than once. Other principals already in the store
    /// are kept.
    #[arg(
        long = "principal",
        env = "PRINCIPALS",
        value_delimiter = ',',
        value_parser = parse_principal
    )]
    pub principals: Vec<Principal>,

    /// Seconds a request may take before it is abandoned
    #[arg(long, env, default_value_t = 4)]
    pub timeout: u64,

    /// A webhook that theft alerts are posted to
    ///
    /// Alerts are only logged when unset.
    #[arg(long, env)]
    pub notify_url: Option<reqwest::Url>,

    /// Seconds a theft alert may take before it is abandoned
    #[arg(long, env, default_value_t = 2)]
    pub notify_timeout: u64,

    /// Log at debug level by default
    #[arg(short, long)]
    pub debug: bool,

    /// Log in a human-readable, multi-line format
    #[arg(short, long)]
    pub readable: bool,
}

/// A principal named on the command line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    /// The principal's identity
    pub identity: Identity,
    /// Where its theft alerts are sent
    pub contact: ContactAddress,
}

/// A malformed `--principal` value
#[derive(Debug, Error)]
#[error("expected `<uuid>=<contact address>`")]
pub struct MalformedPrincipal {
    _p: (),
}

fn parse_principal(value: &str) -> Result<Principal, MalformedPrincipal> {
    let malformed = || MalformedPrincipal { _p: () };

    let (identity, contact) = value.split_once('=').ok_or_else(malformed)?;
    let identity: Identity = identity.trim().parse().map_err(|_| malformed())?;
    let contact = contact.trim();
    if identity.is_nil() || contact.is_empty() {
        return Err(malformed());
    }

    Ok(Principal {
        identity,
        contact: ContactAddress::new(contact.to_owned()),
    })
}

fn parse_signing_key(secret: &str) -> Result<SigningKey, EmptySigningKey> {
    SigningKey::new(secret.as_bytes())
}

impl ServerConfig {
    /// The per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// The theft alert budget
    pub fn notify_budget(&self) -> Duration {
        Duration::from_secs(self.notify_timeout)
    }

    /// Installs the global `tracing` subscriber
    ///
    /// `RUST_LOG` takes precedence over the default level.
    pub fn init_tracing(&self) {
        let default_level = if self.debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };

        let filter = EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy();

        if self.readable {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .init();
        } else {
            tracing_subscriber::fmt()
                .compact()
                .with_env_filter(filter)
                .init();
        }
    }
}
