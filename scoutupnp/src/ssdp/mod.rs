//! Découverte SSDP (control point uniquement)
//!
//! Le client émet des M-SEARCH sur le groupe multicast et collecte les
//! réponses unicast pendant une fenêtre d'écoute unique.

mod client;

pub use client::{SsdpClient, SsdpEvent, discover, parse_message};

use std::collections::HashMap;
use std::net::SocketAddr;

/// Adresse multicast SSDP standard
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";

/// Port SSDP standard
pub const SSDP_PORT: u16 = 1900;

/// Durée de validité par défaut d'une annonce (secondes)
pub const MAX_AGE: u32 = 1800;

/// Cibles de recherche par défaut
pub const DEFAULT_SEARCH_TARGETS: &[&str] = &[
    "ssdp:all",
    "upnp:rootdevice",
    "urn:schemas-upnp-org:device:MediaRenderer:1",
    "urn:schemas-upnp-org:device:MediaServer:1",
];

/// Réponse SSDP exploitable : toujours porteuse d'un LOCATION
#[derive(Debug, Clone)]
pub struct SsdpResponse {
    pub location: String,
    /// ST d'une réponse M-SEARCH, ou NT d'une annonce `ssdp:alive`
    pub st: Option<String>,
    pub usn: Option<String>,
    pub server: Option<String>,
    pub cache_control: Option<String>,
    pub source: SocketAddr,
    /// Tous les en-têtes, noms en majuscules
    pub headers: HashMap<String, String>,
}

impl SsdpResponse {
    /// UDN extrait de l'USN (`uuid:xxx::urn:...` → `uuid:xxx`)
    pub fn udn(&self) -> Option<String> {
        self.usn.as_deref().and_then(extract_udn_from_usn)
    }

    /// Valeur `max-age` de CACHE-CONTROL, [`MAX_AGE`] par défaut
    pub fn max_age(&self) -> u32 {
        client::parse_max_age(self.cache_control.as_ref())
    }
}

/// Extrait l'UDN d'un USN SSDP.
pub fn extract_udn_from_usn(usn: &str) -> Option<String> {
    let usn = usn.trim();
    if usn.is_empty() {
        return None;
    }

    let lower = usn.to_ascii_lowercase();
    let start = lower.find("uuid:")?;
    let rest = &usn[start..];
    let end = rest.find("::").unwrap_or(rest.len());
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_udn_from_usn() {
        assert_eq!(
            extract_udn_from_usn("uuid:1234-abcd::urn:schemas-upnp-org:device:MediaRenderer:1"),
            Some("uuid:1234-abcd".to_string())
        );
        assert_eq!(
            extract_udn_from_usn("uuid:1234-abcd"),
            Some("uuid:1234-abcd".to_string())
        );
        assert_eq!(extract_udn_from_usn("upnp:rootdevice"), None);
        assert_eq!(extract_udn_from_usn(""), None);
    }
}
