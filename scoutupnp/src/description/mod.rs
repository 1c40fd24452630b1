//! Descriptions de devices UPnP : modèle, lecture tolérante, téléchargement.

mod fetch;
mod model;
mod parser;
pub mod xml;

pub use fetch::DescriptionFetcher;
pub use model::{DeviceDescription, DiscoveryMethod, IconDescriptor, ServiceDescriptor};
pub use parser::{find_device_element, parse_description, validate_description};
