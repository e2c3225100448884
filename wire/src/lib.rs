//! Transport-independent wire layer shared by the agent and server.

pub mod gzip;
pub mod hmac_sign;
pub mod retry;
pub mod rsa_envelope;
pub mod subnet;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("invalid subnet: {0}")]
    Subnet(String),
}

pub use retry::RetryBudget;
pub use subnet::TrustedSubnet;
