/*!
Le client SSDP d'UpnpScout est un *control point* : il ne se lie jamais au
port UDP 1900.

Un serveur SSDP local (lecteur multimédia, passerelle) écoute déjà souvent sur
0.0.0.0:1900 ; si le client s'y liait aussi, le noyau répartirait les
datagrammes entre les deux sockets et des réponses seraient perdues.

* bind(0.0.0.0:0) : port éphémère, réponses unicast HTTP/200
* adhésion au groupe multicast sur chaque interface : annonces NOTIFY
*/

use super::{MAX_AGE, SSDP_MULTICAST_ADDR, SSDP_PORT, SsdpResponse};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, trace, warn};

/// Événements SSDP reçus par le client
#[derive(Debug, Clone)]
pub enum SsdpEvent {
    /// Réponse M-SEARCH ou annonce `ssdp:alive`
    Response(SsdpResponse),
    ByeBye {
        usn: String,
        nt: String,
        from: SocketAddr,
    },
    /// M-SEARCH d'un autre control point
    Search { st: String, from: SocketAddr },
}

/// Client SSDP pour envoyer des M-SEARCH et collecter les réponses
pub struct SsdpClient {
    socket: UdpSocket,
    target: SocketAddr,
}

impl SsdpClient {
    /// Crée un nouveau client SSDP sur un port éphémère.
    ///
    /// Doit être appelé depuis un runtime tokio.
    pub fn new() -> std::io::Result<Self> {
        let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
        socket2.bind(&bind_addr.into())?;
        socket2.set_multicast_loop_v4(true)?;

        let group: Ipv4Addr = SSDP_MULTICAST_ADDR
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        for ipv4 in scoututils::list_local_ipv4() {
            match socket2.join_multicast_v4(&group, &ipv4) {
                Ok(()) => debug!("SSDP: joined {} on {}", SSDP_MULTICAST_ADDR, ipv4),
                Err(e) => warn!(
                    "SSDP: failed to join {} on {}: {}",
                    SSDP_MULTICAST_ADDR, ipv4, e
                ),
            }
        }

        socket2.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket2.into())?;
        let local = socket.local_addr()?;

        info!("✅ SSDP client ready on {}", local);

        Ok(Self {
            socket,
            target: SocketAddr::V4(SocketAddrV4::new(group, SSDP_PORT)),
        })
    }

    /// Envoie un M-SEARCH pour un type donné (MX borné à 1..=5)
    pub async fn send_msearch(&self, st: &str, mx: u8) -> std::io::Result<()> {
        let msg = build_msearch(st, mx);

        match self.socket.send_to(msg.as_bytes(), self.target).await {
            Ok(_) => {
                debug!("📤 M-SEARCH sent (ST={}, MX={})", st, mx.clamp(1, 5));
                trace!("📨 M-SEARCH payload\n{}", msg);
                Ok(())
            }
            Err(e) => {
                warn!("❌ Failed to send M-SEARCH (ST={}): {}", st, e);
                Err(e)
            }
        }
    }

    /// Émet un M-SEARCH par cible puis écoute pendant `window`.
    ///
    /// Une seule fenêtre est partagée par toutes les cibles. Seules les réponses
    /// porteuses d'un LOCATION sont retenues ; les autres sont journalisées et ignorées.
    pub async fn discover(
        &self,
        window: Duration,
        search_targets: &[String],
        mx: u8,
    ) -> Vec<SsdpResponse> {
        for st in search_targets {
            // Échec d'envoi déjà journalisé, les autres cibles restent valables
            let _ = self.send_msearch(st, mx).await;
        }

        let deadline = Instant::now() + window;
        let socket = &self.socket;
        collect_responses(deadline, move || async move {
            let mut buf = vec![0u8; 8192];
            let (n, from) = socket.recv_from(&mut buf).await?;
            buf.truncate(n);
            Ok::<_, std::io::Error>((buf, from))
        })
        .await
    }
}

/// Pause après une erreur de lecture, pour ne pas boucler à vide
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Collecte les réponses SSDP jusqu'à `deadline`.
///
/// Une erreur de lecture (ICMP port unreachable, ECONNRESET sous Windows) ne
/// concerne qu'un datagramme : elle est journalisée et l'écoute continue.
async fn collect_responses<R, Fut>(deadline: Instant, mut recv: R) -> Vec<SsdpResponse>
where
    R: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<(Vec<u8>, SocketAddr)>>,
{
    let mut responses = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match timeout(remaining, recv()).await {
            Ok(Ok((data, from))) => match parse_message(&data, from) {
                Some(SsdpEvent::Response(response)) => {
                    debug!("📥 SSDP response from {}: {}", from, response.location);
                    responses.push(response);
                }
                Some(other) => trace!("Ignoring SSDP event {:?}", other),
                None => warn!("Discarding malformed SSDP message from {}", from),
            },
            Ok(Err(e)) => {
                warn!("⚠️ SSDP client read error: {}", e);
                let pause = READ_ERROR_BACKOFF.min(deadline.saturating_duration_since(Instant::now()));
                tokio::time::sleep(pause).await;
            }
            Err(_) => break,
        }
    }

    info!("SSDP discovery collected {} responses", responses.len());
    responses
}

/// Découverte en un appel : un échec de bind donne une liste vide.
pub async fn discover(window: Duration, search_targets: &[String], mx: u8) -> Vec<SsdpResponse> {
    match SsdpClient::new() {
        Ok(client) => client.discover(window, search_targets, mx).await,
        Err(e) => {
            error!("❌ Cannot create SSDP client: {}", e);
            Vec::new()
        }
    }
}

fn build_msearch(st: &str, mx: u8) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\
         USER-AGENT: UpnpScout SSDP Client\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR,
        SSDP_PORT,
        mx.clamp(1, 5),
        st
    )
}

/// Analyse un datagramme SSDP.
///
/// Retourne `None` pour un message illisible, sans en-têtes, ou sans LOCATION
/// quand il en faut un.
pub fn parse_message(data: &[u8], from: SocketAddr) -> Option<SsdpEvent> {
    let text = String::from_utf8_lossy(data);
    let mut lines = text.lines();
    let first_line = lines.next()?.trim();
    let upper = first_line.to_ascii_uppercase();
    let headers = parse_headers(lines);

    if headers.is_empty() {
        trace!("SSDP message from {} has no headers", from);
        return None;
    }

    if upper.starts_with("NOTIFY ") {
        handle_notify(headers, from)
    } else if upper.starts_with("HTTP/") && upper.split_whitespace().nth(1) == Some("200") {
        handle_search_response(headers, from)
    } else if upper.starts_with("M-SEARCH ") {
        Some(SsdpEvent::Search {
            st: headers.get("ST").cloned().unwrap_or_default(),
            from,
        })
    } else {
        trace!("Unknown SSDP message type from {}: {}", from, first_line);
        None
    }
}

fn handle_notify(headers: HashMap<String, String>, from: SocketAddr) -> Option<SsdpEvent> {
    let nts = headers.get("NTS")?.to_ascii_lowercase();

    if nts == "ssdp:byebye" {
        return Some(SsdpEvent::ByeBye {
            usn: headers.get("USN").cloned().unwrap_or_default(),
            nt: headers.get("NT").cloned().unwrap_or_default(),
            from,
        });
    }

    if nts != "ssdp:alive" {
        trace!("Unknown NTS value from {}: {}", from, nts);
        return None;
    }

    let st = headers.get("NT").cloned();
    build_response(headers, st, from)
}

fn handle_search_response(headers: HashMap<String, String>, from: SocketAddr) -> Option<SsdpEvent> {
    let st = headers.get("ST").cloned();
    build_response(headers, st, from)
}

fn build_response(
    headers: HashMap<String, String>,
    st: Option<String>,
    from: SocketAddr,
) -> Option<SsdpEvent> {
    let location = match headers.get("LOCATION") {
        Some(loc) => loc.clone(),
        None => {
            trace!("SSDP message from {} missing LOCATION header, ignoring", from);
            return None;
        }
    };

    Some(SsdpEvent::Response(SsdpResponse {
        location,
        st,
        usn: headers.get("USN").cloned(),
        server: headers.get("SERVER").cloned(),
        cache_control: headers.get("CACHE-CONTROL").cloned(),
        source: from,
        headers,
    }))
}

fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();

        // Une ligne vide termine les en-têtes
        if line.is_empty() {
            break;
        }

        // Découpe sur le premier ':' seulement (les URL en contiennent)
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_uppercase();
            let value = value.trim().to_string();

            if !name.is_empty() && !value.is_empty() {
                headers.insert(name, value);
            } else {
                trace!("Skipping malformed header: '{}'", line);
            }
        } else {
            trace!("Skipping line without colon: '{}'", line);
        }
    }
    headers
}

pub(super) fn parse_max_age(value: Option<&String>) -> u32 {
    if let Some(v) = value {
        let lower = v.to_ascii_lowercase();
        if let Some(idx) = lower.find("max-age") {
            let after_key = &lower[idx + 7..];
            let after_eq = after_key.trim_start().trim_start_matches('=').trim_start();
            let digits: String = after_eq
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(age) = digits.parse::<u32>() {
                return age;
            }
        }
        trace!(
            "Could not parse max-age from CACHE-CONTROL: '{}', using default {}",
            v,
            MAX_AGE
        );
    }
    MAX_AGE
}
