//! Énumération de la table ARP de la plateforme.
//!
//! Lecture passive uniquement : aucun paquet ARP n'est émis. Sources essayées
//! dans l'ordre : `/proc/net/arp`, `ip neigh show`, `arp -an`.

use std::net::Ipv4Addr;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::NetError;

/// Entrée de la table ARP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    /// MAC normalisée : minuscules, séparateur `:`
    pub mac: String,
    /// Nom d'hôte quand la source en fournit un (`arp -a`)
    pub hostname: Option<String>,
    pub interface: Option<String>,
}

/// Lit la table ARP du système.
///
/// Retourne une erreur seulement si aucune source n'est lisible ; une table vide
/// est un résultat valide.
pub async fn read_arp_table() -> Result<Vec<ArpEntry>, NetError> {
    if let Ok(content) = tokio::fs::read_to_string("/proc/net/arp").await {
        let entries = parse_proc_net_arp(&content);
        info!(entries = entries.len(), "Read ARP table from /proc/net/arp");
        return Ok(entries);
    }

    match run_command("ip", &["neigh", "show"]).await {
        Ok(output) => {
            let entries = parse_ip_neigh(&output);
            info!(entries = entries.len(), "Read ARP table from ip neigh");
            return Ok(entries);
        }
        Err(e) => debug!("ip neigh show unavailable: {}", e),
    }

    match run_command("arp", &["-an"]).await {
        Ok(output) => {
            let entries = parse_arp_an(&output);
            info!(entries = entries.len(), "Read ARP table from arp -an");
            Ok(entries)
        }
        Err(e) => Err(NetError::ArpUnavailable(e.to_string())),
    }
}

async fn run_command(program: &str, args: &[&str]) -> Result<String, NetError> {
    let output = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(NetError::ArpUnavailable(format!(
            "{} exited with {}",
            program, output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `/proc/net/arp`.
///
/// ```text
/// IP address       HW type     Flags       HW address            Mask     Device
/// 192.168.1.1      0x1         0x2         aa:bb:cc:dd:ee:ff     *        eth0
/// ```
pub fn parse_proc_net_arp(content: &str) -> Vec<ArpEntry> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 {
                return None;
            }
            let ip = parts[0].parse::<Ipv4Addr>().ok()?;
            // Flags 0x0 : entrée incomplète
            if parts[2] == "0x0" {
                return None;
            }
            let mac = normalize_mac(parts[3])?;
            Some(ArpEntry {
                ip,
                mac,
                hostname: None,
                interface: parts.get(5).map(|s| s.to_string()),
            })
        })
        .collect()
}

/// Parse la sortie de `ip neigh show`.
///
/// ```text
/// 192.168.1.1 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE
/// 192.168.1.9 dev eth0  FAILED
/// ```
pub fn parse_ip_neigh(output: &str) -> Vec<ArpEntry> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let ip = parts.first()?.parse::<Ipv4Addr>().ok()?;
            let mac_pos = parts.iter().position(|p| *p == "lladdr")?;
            let mac = normalize_mac(parts.get(mac_pos + 1)?)?;
            let interface = parts
                .iter()
                .position(|p| *p == "dev")
                .and_then(|i| parts.get(i + 1))
                .map(|s| s.to_string());
            Some(ArpEntry {
                ip,
                mac,
                hostname: None,
                interface,
            })
        })
        .collect()
}

/// Parse la sortie de `arp -an` / `arp -a` (BSD, Linux) et le format Windows.
///
/// ```text
/// ? (192.168.1.1) at aa:bb:cc:dd:ee:ff [ether] on eth0
/// router.lan (192.168.1.1) at aa:bb:cc:dd:ee:ff on en0 ifscope [ethernet]
///   192.168.1.1           aa-bb-cc-dd-ee-ff     dynamic
/// ```
pub fn parse_arp_an(output: &str) -> Vec<ArpEntry> {
    output.lines().filter_map(parse_arp_an_line).collect()
}

fn parse_arp_an_line(line: &str) -> Option<ArpEntry> {
    let parts: Vec<&str> = line.split_whitespace().collect();

    // Format Windows : "ip mac type"
    if let Some(ip) = parts.first().and_then(|p| p.parse::<Ipv4Addr>().ok()) {
        let mac = normalize_mac(parts.get(1)?)?;
        return Some(ArpEntry {
            ip,
            mac,
            hostname: None,
            interface: None,
        });
    }

    let ip_pos = parts
        .iter()
        .position(|p| p.starts_with('(') && p.ends_with(')'))?;
    let ip = parts[ip_pos]
        .trim_matches(|c| c == '(' || c == ')')
        .parse::<Ipv4Addr>()
        .ok()?;
    let at_pos = parts.iter().position(|p| *p == "at")?;
    let mac = normalize_mac(parts.get(at_pos + 1)?)?;

    let hostname = if ip_pos > 0 && parts[0] != "?" {
        Some(parts[0].to_string())
    } else {
        None
    };
    let interface = parts
        .iter()
        .position(|p| *p == "on")
        .and_then(|i| parts.get(i + 1))
        .map(|s| s.to_string());

    Some(ArpEntry {
        ip,
        mac,
        hostname,
        interface,
    })
}

/// Normalise une adresse MAC ; `None` pour les entrées incomplètes.
fn normalize_mac(raw: &str) -> Option<String> {
    let mac = raw.trim().to_ascii_lowercase().replace('-', ":");
    let octets: Vec<&str> = mac.split(':').collect();
    if octets.len() != 6 || octets.iter().any(|o| o.is_empty() || o.len() > 2) {
        return None;
    }
    if !octets.iter().all(|o| o.chars().all(|c| c.is_ascii_hexdigit())) {
        return None;
    }
    if octets.iter().all(|o| o.trim_start_matches('0').is_empty()) {
        return None;
    }
    // macOS abrège les octets : "0:1a:2b:3:4d:5e"
    Some(
        octets
            .iter()
            .map(|o| format!("{:0>2}", o))
            .collect::<Vec<_>>()
            .join(":"),
    )
}
