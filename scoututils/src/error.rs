use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("Invalid network range: {0}")]
    InvalidRange(String),

    #[error("Cannot resolve host {0}")]
    Resolve(String),

    #[error("ARP table unavailable: {0}")]
    ArpUnavailable(String),

    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),
}
