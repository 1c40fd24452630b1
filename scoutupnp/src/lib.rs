//! # scoutupnp - Découverte des devices UPnP d'un réseau local
//!
//! Deux chemins de découverte indépendants, fusionnés en une seule liste :
//!
//! - **SSDP** : M-SEARCH multicast, puis téléchargement de la description
//!   annoncée par chaque réponse ([`ssdp`], [`description`])
//! - **Scan de ports** : les hôtes de la table ARP ou d'une plage CIDR sont
//!   sondés, et chaque port ouvert est interrogé sur un chemin de description courant
//!
//! Les deux sources sont réconciliées par une identité canonique ([`identity`]).
//!
//! ```no_run
//! use scoutupnp::{NetworkScanner, ScanOptions};
//!
//! # async fn run() -> Result<(), scoutupnp::ScanError> {
//! let scanner = NetworkScanner::new(ScanOptions::default())?;
//! for device in scanner.scan(Some("192.168.1.0/24"), None, false).await? {
//!     println!("{} at {:?}", device.display_name(), device.location_url);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod description;
pub mod errors;
pub mod identity;
pub mod scanner;
pub mod ssdp;

pub use cache::{DeviceCache, MemoryDeviceCache};
pub use description::{
    DescriptionFetcher, DeviceDescription, DiscoveryMethod, IconDescriptor, ServiceDescriptor,
    parse_description, validate_description,
};
pub use errors::{DescriptionError, ScanError};
pub use identity::{deduplicate, device_identity};
pub use scanner::{COMMON_DESCRIPTION_PATHS, NetworkScanner, ScanOptions, dedup_by_location};
pub use ssdp::{SsdpClient, SsdpResponse, discover};
