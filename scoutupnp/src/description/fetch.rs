use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::model::DeviceDescription;
use super::parser::{parse_description, validate_description};
use crate::errors::DescriptionError;

/// Télécharge et résout des descriptions de devices.
///
/// Les certificats TLS ne sont pas vérifiés : beaucoup de devices servent
/// leur description en HTTPS avec un certificat auto-signé.
#[derive(Debug, Clone)]
pub struct DescriptionFetcher {
    client: Client,
}

impl DescriptionFetcher {
    pub fn new() -> Result<Self, DescriptionError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .no_proxy()
            .user_agent("UpnpScout/0.1")
            .build()?;
        Ok(Self { client })
    }

    /// Récupère `url` et résout la description au mieux.
    ///
    /// Toute erreur (transport, statut non 200, XML inexploitable) donne `None`
    /// avec un avertissement. Le résultat porte `ip`, `port` (port par défaut du schéma)
    /// et `locationURL`.
    pub async fn fetch(&self, url: &str, timeout: Duration) -> Option<DeviceDescription> {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Invalid description URL {}: {}", url, e);
                return None;
            }
        };

        let body = match self.get(&parsed, timeout).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to fetch description {}: {}", url, e);
                return None;
            }
        };

        let Some(mut device) = parse_description(&body) else {
            warn!("Unusable device description at {}", url);
            return None;
        };

        attach_location(&mut device, &parsed);
        debug!("Resolved {} at {}", device.display_name(), url);
        Some(device)
    }

    /// Variante stricte : les erreurs remontent, le XML doit être bien formé.
    pub async fn fetch_strict(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<DeviceDescription, DescriptionError> {
        let parsed = Url::parse(url).map_err(|e| DescriptionError::InvalidUrl(e.to_string()))?;
        let body = self.get(&parsed, timeout).await?;
        let mut device = validate_description(&String::from_utf8_lossy(&body))?;
        attach_location(&mut device, &parsed);
        Ok(device)
    }

    async fn get(&self, url: &Url, timeout: Duration) -> Result<Vec<u8>, DescriptionError> {
        let response = self.client.get(url.clone()).timeout(timeout).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DescriptionError::Status(status.as_u16()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

fn attach_location(device: &mut DeviceDescription, url: &Url) {
    device.ip = url.host_str().map(|h| h.trim_matches(|c| c == '[' || c == ']').to_string());
    device.port = Some(url.port_or_known_default().unwrap_or(80));
    device.location_url = Some(url.to_string());
}
