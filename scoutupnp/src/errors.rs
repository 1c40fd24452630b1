use thiserror::Error;

/// Erreurs du validateur strict de descriptions
#[derive(Debug, Error)]
pub enum DescriptionError {
    #[error("Invalid XML: {0}")]
    InvalidXml(String),

    #[error("No device element found")]
    NoDeviceElement,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Invalid description URL: {0}")]
    InvalidUrl(String),
}

/// Erreurs d'un scan complet (les échecs par cible ne remontent jamais ici)
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Cannot bind SSDP discovery socket: {0}")]
    Bind(#[source] std::io::Error),

    #[error("Invalid network range: {0}")]
    InvalidRange(String),

    #[error("Invalid scan configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
