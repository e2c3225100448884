use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

/// CLI flags, mirroring the env-var names in the same order as the source.
#[derive(Debug, Parser)]
#[command(name = "telemetrix-agent")]
struct Cli {
    #[arg(short = 'a', long = "address", env = "ADDRESS")]
    address: Option<String>,
    #[arg(short = 'r', long = "report-interval", env = "REPORT_INTERVAL")]
    report_interval: Option<u64>,
    #[arg(short = 'p', long = "poll-interval", env = "POLL_INTERVAL")]
    poll_interval: Option<u64>,
    #[arg(short = 'k', long = "key", env = "KEY")]
    key: Option<String>,
    #[arg(short = 'l', long = "rate-limit", env = "RATE_LIMIT")]
    rate_limit: Option<usize>,
    #[arg(long = "crypto-key", env = "CRYPTO_KEY")]
    crypto_key: Option<PathBuf>,
    #[arg(short = 'c', long = "config", env = "CONFIG")]
    config: Option<PathBuf>,
    #[arg(long = "profile")]
    profile: Option<String>,
}

/// Intermediate struct used by the three-pass merge (defaults < file < flags < env).
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    address: Option<String>,
    report_interval: Option<u64>,
    poll_interval: Option<u64>,
    key: Option<String>,
    rate_limit: Option<usize>,
    crypto_key: Option<PathBuf>,
    profile: Option<String>,
}

impl RawConfig {
    fn merge(self, other: RawConfig) -> RawConfig {
        RawConfig {
            address: other.address.or(self.address),
            report_interval: other.report_interval.or(self.report_interval),
            poll_interval: other.poll_interval.or(self.poll_interval),
            key: other.key.or(self.key),
            rate_limit: other.rate_limit.or(self.rate_limit),
            crypto_key: other.crypto_key.or(self.crypto_key),
            profile: other.profile.or(self.profile),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AppConfig {
    pub(crate) address: String,
    pub(crate) report_interval: u64,
    pub(crate) poll_interval: u64,
    pub(crate) hmac_key: Option<Vec<u8>>,
    pub(crate) rate_limit: usize,
    pub(crate) crypto_key_path: Option<PathBuf>,
    pub(crate) profile: Option<String>,
}

fn defaults() -> RawConfig {
    RawConfig {
        address: Some("localhost:8080".to_string()),
        report_interval: Some(2),
        poll_interval: Some(1),
        key: None,
        rate_limit: Some(1),
        crypto_key: None,
        profile: None,
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
        address: cli.address.clone(),
        report_interval: cli.report_interval,
        poll_interval: cli.poll_interval,
        key: cli.key.clone(),
        rate_limit: cli.rate_limit,
        crypto_key: cli.crypto_key.clone(),
        profile: cli.profile.clone(),
    }
}

fn from_process_env() -> RawConfig {
    RawConfig {
        address: env::var("ADDRESS").ok(),
        report_interval: env::var("REPORT_INTERVAL").ok().and_then(|value| value.parse().ok()),
        poll_interval: env::var("POLL_INTERVAL").ok().and_then(|value| value.parse().ok()),
        key: env::var("KEY").ok(),
        rate_limit: env::var("RATE_LIMIT").ok().and_then(|value| value.parse().ok()),
        crypto_key: env::var("CRYPTO_KEY").ok().map(PathBuf::from),
        profile: env::var("PROFILE_ADDRESS").ok(),
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
        let report_interval = merged.report_interval.unwrap_or(2);
        let poll_interval = merged.poll_interval.unwrap_or(1);
        let rate_limit = merged.rate_limit.unwrap_or(1).max(1);
        let hmac_key = merged.key.filter(|key| !key.is_empty()).map(|key| key.into_bytes());

        Ok(Self {
            address,
            report_interval,
            poll_interval,
            hmac_key,
            rate_limit,
            crypto_key_path: merged.crypto_key,
            profile: merged.profile,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    const ENV_KEYS: &[&str] = &["ADDRESS", "REPORT_INTERVAL", "POLL_INTERVAL", "KEY", "RATE_LIMIT", "CRYPTO_KEY"];

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
        let mut full = vec!["telemetrix-agent"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn defaults_apply_with_no_overrides() {
        let config = with_env(&[], || AppConfig::from_parts(cli_with(&[])).unwrap());
        assert_eq!(config.address, "localhost:8080");
        assert_eq!(config.report_interval, 2);
        assert_eq!(config.poll_interval, 1);
        assert_eq!(config.rate_limit, 1);
    }

    #[test]
    fn env_wins_over_flags() {
        let config = with_env(&[("ADDRESS", "example.com:9000")], || {
            AppConfig::from_parts(cli_with(&["-a", "127.0.0.1:7777"])).unwrap()
        });
        assert_eq!(config.address, "example.com:9000");
    }

    #[test]
    fn flags_win_over_defaults() {
        let config = with_env(&[], || {
            AppConfig::from_parts(cli_with(&["-l", "5", "-k", "secret"])).unwrap()
        });
        assert_eq!(config.rate_limit, 5);
        assert_eq!(config.hmac_key, Some(b"secret".to_vec()));
    }
}
