use get_if_addrs::get_if_addrs;
use ipnet::Ipv4Net;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use tracing::{debug, trace};

use crate::NetError;

/// Devine l'adresse IP locale de la machine.
///
/// Un socket UDP est « connecté » vers un serveur public : aucun paquet n'est
/// émis, mais le système choisit l'interface de sortie et donc l'adresse locale.
/// En cas d'échec, retourne `127.0.0.1`.
pub fn guess_local_ip() -> Ipv4Addr {
    let probe = UdpSocket::bind("0.0.0.0:0").and_then(|socket| {
        socket.connect("8.8.8.8:80")?;
        socket.local_addr()
    });

    match probe {
        Ok(addr) => match addr.ip() {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => Ipv4Addr::LOCALHOST,
        },
        Err(e) => {
            debug!("Cannot guess local IP ({}), falling back to loopback", e);
            Ipv4Addr::LOCALHOST
        }
    }
}

/// Liste les adresses IPv4 non-loopback de toutes les interfaces.
///
/// Utilisé pour rejoindre le groupe multicast SSDP sur chaque interface.
/// Les doublons (alias d'interface) sont supprimés, l'ordre est celui du système.
pub fn list_local_ipv4() -> Vec<Ipv4Addr> {
    let mut result = Vec::new();

    match get_if_addrs() {
        Ok(interfaces) => {
            for iface in interfaces {
                if let IpAddr::V4(ip) = iface.ip() {
                    if !ip.is_loopback() && !result.contains(&ip) {
                        trace!("Interface {} has address {}", iface.name, ip);
                        result.push(ip);
                    }
                }
            }
        }
        Err(e) => debug!("Failed to list network interfaces: {}", e),
    }

    result
}

/// Vérifie qu'une chaîne est une adresse IP (v4 ou v6) valide.
pub fn is_valid_ip(value: &str) -> bool {
    value.trim().parse::<IpAddr>().is_ok()
}

/// Vérifie qu'une chaîne est une plage CIDR IPv4 valide.
///
/// Une adresse seule est acceptée et vaut `/32`.
pub fn is_valid_cidr(value: &str) -> bool {
    parse_cidr(value).is_ok()
}

/// Parse une plage CIDR IPv4, bits d'hôte tolérés (`192.168.1.7/24` → `192.168.1.0/24`).
pub fn parse_cidr(value: &str) -> Result<Ipv4Net, NetError> {
    let value = value.trim();

    if let Ok(net) = value.parse::<Ipv4Net>() {
        return Ok(net.trunc());
    }

    if let Ok(ip) = value.parse::<Ipv4Addr>() {
        return Ok(Ipv4Net::from(ip));
    }

    Err(NetError::InvalidRange(value.to_string()))
}

/// Développe une plage CIDR en liste d'adresses.
///
/// - préfixe ≥ 24 : seules les adresses d'hôte (ni réseau, ni broadcast)
/// - préfixe < 24 : **toutes** les adresses du bloc, réseau et broadcast compris
///
/// Une entrée invalide donne une liste vide, jamais une erreur.
///
/// ```
/// use std::net::Ipv4Addr;
/// use scoututils::expand_cidr;
///
/// assert_eq!(
///     expand_cidr("192.168.1.0/30"),
///     vec![Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 2)]
/// );
/// assert!(expand_cidr("invalid").is_empty());
/// ```
pub fn expand_cidr(value: &str) -> Vec<Ipv4Addr> {
    let net = match parse_cidr(value) {
        Ok(net) => net,
        Err(e) => {
            debug!("{}", e);
            return Vec::new();
        }
    };

    if net.prefix_len() >= 24 {
        return net.hosts().collect();
    }

    // Large blocks keep network and broadcast addresses
    let first = u32::from(net.network());
    let last = u32::from(net.broadcast());
    (first..=last).map(Ipv4Addr::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_cidr_slash_30_hosts_only() {
        let hosts = expand_cidr("192.168.1.0/30");
        assert_eq!(
            hosts,
            vec![Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 2)]
        );
    }

    #[test]
    fn test_expand_cidr_slash_24_excludes_network_and_broadcast() {
        let hosts = expand_cidr("10.0.0.0/24");
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts.first(), Some(&Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(hosts.last(), Some(&Ipv4Addr::new(10, 0, 0, 254)));
    }

    #[test]
    fn test_expand_cidr_short_prefix_keeps_whole_block() {
        let hosts = expand_cidr("10.0.0.0/23");
        assert_eq!(hosts.len(), 512);
        assert_eq!(hosts.first(), Some(&Ipv4Addr::new(10, 0, 0, 0)));
        assert_eq!(hosts.last(), Some(&Ipv4Addr::new(10, 0, 1, 255)));
    }

    #[test]
    fn test_expand_cidr_invalid_is_empty() {
        assert!(expand_cidr("invalid").is_empty());
        assert!(expand_cidr("192.168.1.0/33").is_empty());
        assert!(expand_cidr("").is_empty());
    }

    #[test]
    fn test_expand_cidr_single_address() {
        assert_eq!(
            expand_cidr("192.168.1.42"),
            vec![Ipv4Addr::new(192, 168, 1, 42)]
        );
    }

    #[test]
    fn test_parse_cidr_truncates_host_bits() {
        let net = parse_cidr("192.168.1.77/24").unwrap();
        assert_eq!(net.network(), Ipv4Addr::new(192, 168, 1, 0));
        assert!(matches!(
            parse_cidr("300.1.1.1/24"),
            Err(NetError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_is_valid_ip_and_cidr() {
        assert!(is_valid_ip("192.168.1.1"));
        assert!(is_valid_ip("::1"));
        assert!(!is_valid_ip("192.168.1"));
        assert!(is_valid_cidr("192.168.0.0/16"));
        assert!(!is_valid_cidr("192.168.0.0/xx"));
    }

    #[test]
    fn test_list_local_ipv4_has_no_loopback() {
        for ip in list_local_ipv4() {
            assert!(!ip.is_loopback(), "Loopback addresses should be filtered out");
        }
    }

    #[test]
    fn test_guess_local_ip_is_ipv4() {
        // Retourne soit une IP d'interface, soit 127.0.0.1
        let ip = guess_local_ip();
        assert!(!ip.is_unspecified());
    }
}
