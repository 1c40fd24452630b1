use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::NetError;

/// Tente une connexion TCP sur `ip:port`.
///
/// Aucun octet n'est lu ni écrit : la connexion est fermée dès qu'elle est établie.
/// Refus, timeout et erreurs réseau donnent tous `false`.
pub async fn probe_port(ip: IpAddr, port: u16, connect_timeout: Duration) -> bool {
    let addr = SocketAddr::new(ip, port);
    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => {
            trace!("Port {} open", addr);
            true
        }
        Ok(Err(e)) => {
            trace!("Port {} closed: {}", addr, e);
            false
        }
        Err(_) => {
            trace!("Port {} timed out", addr);
            false
        }
    }
}

/// Sonde tous les couples (ip, port) avec au plus `max_workers` connexions simultanées.
///
/// Les couples sont consommés dans l'ordre depuis une file ; l'échec d'un couple
/// n'interrompt jamais les autres. Seules les IP ayant au moins un port ouvert
/// figurent dans le résultat.
pub async fn scan_ports(
    targets: &[IpAddr],
    ports: &[u16],
    connect_timeout: Duration,
    max_workers: usize,
) -> BTreeMap<IpAddr, BTreeSet<u16>> {
    let pairs: Vec<(IpAddr, u16)> = targets
        .iter()
        .flat_map(|ip| ports.iter().map(move |port| (*ip, *port)))
        .collect();

    if pairs.is_empty() {
        return BTreeMap::new();
    }

    let workers = max_workers.clamp(1, pairs.len());
    debug!(
        "Probing {} endpoints with {} workers (timeout {:?})",
        pairs.len(),
        workers,
        connect_timeout
    );

    let responsive: Vec<(IpAddr, u16)> = stream::iter(pairs)
        .map(|(ip, port)| async move {
            probe_port(ip, port, connect_timeout)
                .await
                .then_some((ip, port))
        })
        .buffer_unordered(workers)
        .filter_map(|hit| async move { hit })
        .collect()
        .await;

    let mut open: BTreeMap<IpAddr, BTreeSet<u16>> = BTreeMap::new();
    for (ip, port) in responsive {
        open.entry(ip).or_default().insert(port);
    }
    open
}

/// Ports ouverts d'un seul hôte, triés par ordre croissant.
pub async fn open_ports(
    ip: IpAddr,
    ports: &[u16],
    connect_timeout: Duration,
    max_workers: usize,
) -> Vec<u16> {
    scan_ports(&[ip], ports, connect_timeout, max_workers)
        .await
        .remove(&ip)
        .map(|set| set.into_iter().collect())
        .unwrap_or_default()
}

/// Résout un nom d'hôte ou une adresse littérale en adresse IP.
///
/// C'est la seule étape d'un audit qui peut échouer au niveau transport.
pub async fn resolve_host(host: &str) -> Result<IpAddr, NetError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(NetError::InvalidAddress(host.to_string()));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| NetError::Resolve(format!("{}: {}", host, e)))?;

    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| NetError::Resolve(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_port_open_and_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);

        assert!(probe_port(ip, port, Duration::from_secs(1)).await);

        drop(listener);
        assert!(!probe_port(ip, port, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_scan_ports_only_reports_open_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();

        // Port libéré juste après la réservation : fermé pour le scan
        let closed = {
            let tmp = TcpListener::bind("127.0.0.1:0").await.unwrap();
            tmp.local_addr().unwrap().port()
        };

        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let result = scan_ports(&[ip], &[closed, open], Duration::from_secs(1), 4).await;

        let ports = result.get(&ip).expect("loopback should be responsive");
        assert!(ports.contains(&open));
        assert!(!ports.contains(&closed));
    }

    #[tokio::test]
    async fn test_scan_ports_empty_input() {
        let result = scan_ports(&[], &[80], Duration::from_millis(10), 8).await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_host_literal_and_invalid() {
        assert_eq!(
            resolve_host("127.0.0.1").await.unwrap(),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
        assert!(resolve_host("").await.is_err());
    }
}
