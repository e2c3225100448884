use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

/// CLI flags, mirroring the env-var names in the same order as the source.
#[derive(Debug, Parser)]
#[command(name = "telemetrix-server")]
struct Cli {
    #[arg(short = 'a', long = "address", env = "ADDRESS")]
    address: Option<SocketAddr>,
    #[arg(short = 'i', long = "store-interval", env = "STORE_INTERVAL")]
    store_interval: Option<u64>,
    #[arg(short = 'f', long = "file-storage-path", env = "FILE_STORAGE_PATH")]
    file_storage_path: Option<PathBuf>,
    #[arg(short = 'r', long = "restore", env = "RESTORE")]
    restore: Option<bool>,
    #[arg(short = 'd', long = "database-dsn", env = "DATABASE_DSN")]
    database_dsn: Option<String>,
    #[arg(short = 'k', long = "key", env = "KEY")]
    key: Option<String>,
    #[arg(long = "crypto-key", env = "CRYPTO_KEY")]
    crypto_key: Option<PathBuf>,
    #[arg(short = 't', long = "trusted-subnet", env = "TRUSTED_SUBNET")]
    trusted_subnet: Option<String>,
    #[arg(short = 'c', long = "config", env = "CONFIG")]
    config: Option<PathBuf>,
    #[arg(long = "grpc-address", env = "GRPC_ADDRESS")]
    grpc_address: Option<SocketAddr>,
}

/// Intermediate struct used by the three-pass merge (defaults < file < flags < env).
/// Every field is optional so a pass only overlays the keys it actually saw.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    address: Option<SocketAddr>,
    store_interval: Option<u64>,
    file_storage_path: Option<PathBuf>,
    restore: Option<bool>,
    database_dsn: Option<String>,
    key: Option<String>,
    crypto_key: Option<PathBuf>,
    trusted_subnet: Option<String>,
    grpc_address: Option<SocketAddr>,
}

impl RawConfig {
    fn merge(self, other: RawConfig) -> RawConfig {
        RawConfig {
            address: other.address.or(self.address),
            store_interval: other.store_interval.or(self.store_interval),
            file_storage_path: other.file_storage_path.or(self.file_storage_path),
            restore: other.restore.or(self.restore),
            database_dsn: other.database_dsn.or(self.database_dsn),
            key: other.key.or(self.key),
            crypto_key: other.crypto_key.or(self.crypto_key),
            trusted_subnet: other.trusted_subnet.or(self.trusted_subnet),
            grpc_address: other.grpc_address.or(self.grpc_address),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AppConfig {
    pub(crate) address: SocketAddr,
    pub(crate) grpc_address: SocketAddr,
    pub(crate) store_interval: u64,
    pub(crate) file_storage_path: Option<PathBuf>,
    pub(crate) restore: bool,
    pub(crate) database_dsn: Option<String>,
    pub(crate) hmac_key: Option<Vec<u8>>,
    pub(crate) crypto_key_path: Option<PathBuf>,
    pub(crate) trusted_subnet: Option<String>,
}

fn defaults() -> RawConfig {
    RawConfig {
        address: Some("127.0.0.1:8080".parse().expect("default address must parse")),
        store_interval: Some(300),
        file_storage_path: None,
        restore: Some(true),
        database_dsn: None,
        key: None,
        crypto_key: None,
        trusted_subnet: None,
        grpc_address: Some("127.0.0.1:8081".parse().expect("default grpc address must parse")),
    }
}

fn from_file(path: &PathBuf) -> Result<RawConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("config file '{}' is not valid JSON", path.display()))
}

fn from_flags(cli: &Cli) -> RawConfig {
    RawConfig {
        address: cli.address,
        store_interval: cli.store_interval,
        file_storage_path: cli.file_storage_path.clone(),
        restore: cli.restore,
        database_dsn: cli.database_dsn.clone(),
        key: cli.key.clone(),
        crypto_key: cli.crypto_key.clone(),
        trusted_subnet: cli.trusted_subnet.clone(),
        grpc_address: cli.grpc_address,
    }
}

fn from_process_env() -> RawConfig {
    RawConfig {
        address: env::var("ADDRESS").ok().and_then(|value| value.parse().ok()),
        store_interval: env::var("STORE_INTERVAL").ok().and_then(|value| value.parse().ok()),
        file_storage_path: env::var("FILE_STORAGE_PATH").ok().map(PathBuf::from),
        restore: env::var("RESTORE").ok().and_then(|value| value.parse().ok()),
        database_dsn: env::var("DATABASE_DSN").ok(),
        key: env::var("KEY").ok(),
        crypto_key: env::var("CRYPTO_KEY").ok().map(PathBuf::from),
        trusted_subnet: env::var("TRUSTED_SUBNET").ok(),
        grpc_address: env::var("GRPC_ADDRESS").ok().and_then(|value| value.parse().ok()),
    }
}

impl AppConfig {
    pub(crate) fn load() -> Result<Self> {
        let cli = Cli::parse();
        Self::from_parts(cli)
    }

    fn from_parts(cli: Cli) -> Result<Self> {
        let mut merged = defaults();

        if let Some(path) = &cli.config {
            merged = merged.merge(from_file(path)?);
        }
        merged = merged.merge(from_flags(&cli));
        merged = merged.merge(from_process_env());

        let address = merged.address.context("ADDRESS must be set")?;
        let grpc_address = merged.grpc_address.context("GRPC_ADDRESS must be set")?;
        let store_interval = merged.store_interval.unwrap_or(300);
        let restore = merged.restore.unwrap_or(true);

        let hmac_key = merged.key.filter(|key| !key.is_empty()).map(|key| key.into_bytes());

        Ok(Self {
            address,
            grpc_address,
            store_interval,
            file_storage_path: merged.file_storage_path,
            restore,
            database_dsn: merged.database_dsn,
            hmac_key,
            crypto_key_path: merged.crypto_key,
            trusted_subnet: merged.trusted_subnet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    const ENV_KEYS: &[&str] = &[
        "ADDRESS",
        "STORE_INTERVAL",
        "FILE_STORAGE_PATH",
        "RESTORE",
        "DATABASE_DSN",
        "KEY",
        "CRYPTO_KEY",
        "TRUSTED_SUBNET",
        "GRPC_ADDRESS",
    ];

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn capture(keys: &[&str]) -> Self {
            let saved = keys.iter().map(|key| ((*key).to_string(), env::var(key).ok())).collect();
            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                match value {
                    Some(value) => env::set_var(key, value),
                    None => env::remove_var(key),
                }
            }
        }
    }

    fn with_env<R>(pairs: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
        let _lock = env_lock().lock().expect("env test mutex must be lockable");
        let _guard = EnvGuard::capture(ENV_KEYS);
        for key in ENV_KEYS {
            env::remove_var(key);
        }
        for (key, value) in pairs {
            env::set_var(key, value);
        }
        f()
    }

    fn cli_with(args: &[&str]) -> Cli {
        let mut full = vec!["telemetrix-server"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn defaults_apply_with_no_overrides() {
        let config = with_env(&[], || AppConfig::from_parts(cli_with(&[])).unwrap());
        assert_eq!(config.address, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.store_interval, 300);
        assert!(config.restore);
        assert!(config.hmac_key.is_none());
    }

    #[test]
    fn env_wins_over_flags() {
        let config = with_env(&[("ADDRESS", "0.0.0.0:9999")], || {
            AppConfig::from_parts(cli_with(&["-a", "127.0.0.1:7777"])).unwrap()
        });
        assert_eq!(config.address, "0.0.0.0:9999".parse().unwrap());
    }

    #[test]
    fn flags_win_over_defaults() {
        let config = with_env(&[], || {
            AppConfig::from_parts(cli_with(&["-i", "15", "-k", "secret"])).unwrap()
        });
        assert_eq!(config.store_interval, 15);
        assert_eq!(config.hmac_key, Some(b"secret".to_vec()));
    }
}
