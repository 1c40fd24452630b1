/// Primitives réseau partagées par les crates de découverte et d'audit.
///
/// Ce crate regroupe les opérations de bas niveau utilisées partout ailleurs :
///
/// - [`expand_cidr`] / [`parse_cidr`] : validation et expansion des plages d'adresses
/// - [`probe_port`] / [`scan_ports`] : sondage TCP connect concurrent, borné
/// - [`read_arp_table`] : énumération de la table ARP de la plateforme
/// - [`guess_local_ip`] / [`list_local_ipv4`] : interfaces locales
///
/// # Examples
///
/// ```
/// use scoututils::expand_cidr;
///
/// let hosts = expand_cidr("192.168.1.0/30");
/// assert_eq!(hosts.len(), 2);
/// ```
mod arp;
mod error;
mod ip_utils;
mod probe;

pub use arp::{ArpEntry, parse_arp_an, parse_ip_neigh, parse_proc_net_arp, read_arp_table};
pub use error::NetError;
pub use ip_utils::{
    expand_cidr, guess_local_ip, is_valid_cidr, is_valid_ip, list_local_ipv4, parse_cidr,
};
pub use probe::{open_ports, probe_port, resolve_host, scan_ports};
