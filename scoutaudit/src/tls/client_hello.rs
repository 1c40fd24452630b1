//! ClientHello construits à la main pour l'énumération de protocoles.
//!
//! rustls ne parle ni SSLv2/SSLv3 ni TLS 1.0/1.1 : pour savoir si un serveur
//! les accepte encore, on envoie un ClientHello brut par version et on décode
//! le ServerHello (version et suite retenues).

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, trace};

use super::suites::{
    OFFERED_SUITES, SSLV2_CIPHER_SPECS, TLS13_SUITES, TlsProtocol, sslv2_cipher_name, suite_name,
};

const MAX_RESPONSE: usize = 16384;

/// Plafond de lecture quand on attend la chaîne de certificats
const MAX_CERTIFICATE_RESPONSE: usize = 65536;

/// Type Handshake : Certificate
const HANDSHAKE_CERTIFICATE: u8 = 0x0B;
/// Type Handshake : ServerHelloDone
const HANDSHAKE_SERVER_HELLO_DONE: u8 = 0x0E;

/// Réponse du serveur à un ClientHello
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerChoice {
    /// Le serveur a accepté : version et suite négociées
    Accepted { version: u16, cipher: String },
    /// Alerte, version inférieure, fermeture ou réponse illisible
    Rejected,
}

/// Construit le ClientHello correspondant à `protocol`.
pub fn build_client_hello(protocol: TlsProtocol, server_name: Option<&str>) -> Vec<u8> {
    match protocol {
        TlsProtocol::SslV2 => build_sslv2_client_hello(),
        other => build_tls_client_hello(other, server_name),
    }
}

fn pseudo_random(len: usize) -> Vec<u8> {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (0..len as u32)
        .map(|i| (seed.wrapping_add(i.wrapping_mul(0x9E37_79B9)) >> 13) as u8)
        .collect()
}

/// CLIENT-HELLO au format d'enregistrement SSLv2 (en-tête 2 octets, bit de poids fort).
fn build_sslv2_client_hello() -> Vec<u8> {
    let challenge = pseudo_random(16);

    let mut body = vec![0x01]; // MSG-CLIENT-HELLO
    body.extend_from_slice(&0x0002u16.to_be_bytes());
    body.extend_from_slice(&((SSLV2_CIPHER_SPECS.len() * 3) as u16).to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes()); // session id
    body.extend_from_slice(&(challenge.len() as u16).to_be_bytes());
    for (spec, _) in SSLV2_CIPHER_SPECS {
        body.extend_from_slice(spec);
    }
    body.extend_from_slice(&challenge);

    let len = body.len() as u16;
    let mut record = vec![0x80 | (len >> 8) as u8, len as u8];
    record.extend_from_slice(&body);
    record
}

fn build_tls_client_hello(protocol: TlsProtocol, server_name: Option<&str>) -> Vec<u8> {
    let tls13 = protocol == TlsProtocol::TlsV1_3;

    let mut hello_body = Vec::new();

    // TLS 1.3 annonce 1.2 ici et sa vraie version dans supported_versions
    let client_version = if tls13 { 0x0303 } else { protocol.wire_version() };
    hello_body.extend_from_slice(&client_version.to_be_bytes());
    hello_body.extend_from_slice(&pseudo_random(32));

    if tls13 {
        // session id non vide : mode de compatibilité middlebox
        hello_body.push(32);
        hello_body.extend_from_slice(&pseudo_random(32));
    } else {
        hello_body.push(0);
    }

    let suites: &[u16] = if tls13 { TLS13_SUITES } else { OFFERED_SUITES };
    hello_body.extend_from_slice(&((suites.len() * 2) as u16).to_be_bytes());
    for suite in suites {
        hello_body.extend_from_slice(&suite.to_be_bytes());
    }

    // Compression : null uniquement
    hello_body.push(1);
    hello_body.push(0);

    // SSLv3 ne connaît pas les extensions
    if protocol != TlsProtocol::SslV3 {
        let extensions = build_extensions(tls13, server_name);
        hello_body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
        hello_body.extend_from_slice(&extensions);
    }

    let mut handshake = vec![0x01]; // ClientHello
    let body_len = hello_body.len() as u32;
    handshake.push((body_len >> 16) as u8);
    handshake.push((body_len >> 8) as u8);
    handshake.push(body_len as u8);
    handshake.extend_from_slice(&hello_body);

    let record_version: u16 = if protocol == TlsProtocol::SslV3 { 0x0300 } else { 0x0301 };
    let mut record = vec![0x16];
    record.extend_from_slice(&record_version.to_be_bytes());
    record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
    record.extend_from_slice(&handshake);
    record
}

fn build_extensions(tls13: bool, server_name: Option<&str>) -> Vec<u8> {
    let mut exts = Vec::new();

    if let Some(host) = server_name {
        let host = host.as_bytes();
        let mut data = Vec::new();
        data.extend_from_slice(&((host.len() + 3) as u16).to_be_bytes());
        data.push(0x00);
        data.extend_from_slice(&(host.len() as u16).to_be_bytes());
        data.extend_from_slice(host);
        append_extension(&mut exts, 0x0000, &data);
    }

    // supported_groups : x25519, secp256r1, secp384r1
    append_extension(
        &mut exts,
        0x000A,
        &u16_list(&[0x001D, 0x0017, 0x0018]),
    );

    // ec_point_formats : uncompressed
    append_extension(&mut exts, 0x000B, &[0x01, 0x00]);

    // signature_algorithms
    append_extension(
        &mut exts,
        0x000D,
        &u16_list(&[
            0x0403, 0x0503, 0x0804, 0x0805, 0x0806, 0x0401, 0x0501, 0x0601, 0x0201, 0x0203,
        ]),
    );

    // renegotiation_info vide
    append_extension(&mut exts, 0xFF01, &[0x00]);

    if tls13 {
        // supported_versions : TLS 1.3 seulement
        append_extension(&mut exts, 0x002B, &[0x02, 0x03, 0x04]);

        // key_share x25519 : n'importe quels 32 octets forment une clé publique valide
        let key = pseudo_random(32);
        let mut entry = Vec::new();
        entry.extend_from_slice(&0x001Du16.to_be_bytes());
        entry.extend_from_slice(&(key.len() as u16).to_be_bytes());
        entry.extend_from_slice(&key);
        let mut data = Vec::new();
        data.extend_from_slice(&(entry.len() as u16).to_be_bytes());
        data.extend_from_slice(&entry);
        append_extension(&mut exts, 0x0033, &data);
    }

    exts
}

fn u16_list(values: &[u16]) -> Vec<u8> {
    let mut data = Vec::with_capacity(2 + values.len() * 2);
    data.extend_from_slice(&((values.len() * 2) as u16).to_be_bytes());
    for v in values {
        data.extend_from_slice(&v.to_be_bytes());
    }
    data
}

fn append_extension(buf: &mut Vec<u8>, ext_type: u16, data: &[u8]) {
    buf.extend_from_slice(&ext_type.to_be_bytes());
    buf.extend_from_slice(&(data.len() as u16).to_be_bytes());
    buf.extend_from_slice(data);
}

/// Décode la réponse à un ClientHello `protocol`.
///
/// Seul un ServerHello à la version demandée vaut acceptation.
pub fn parse_server_response(protocol: TlsProtocol, data: &[u8]) -> ServerChoice {
    let choice = if protocol == TlsProtocol::SslV2 {
        parse_sslv2_server_hello(data)
    } else {
        parse_tls_server_hello(data)
    };

    match choice {
        ServerChoice::Accepted { version, .. } if version != protocol.wire_version() => {
            trace!(
                "{} hello answered with version 0x{:04X}",
                protocol, version
            );
            ServerChoice::Rejected
        }
        other => other,
    }
}

fn parse_sslv2_server_hello(data: &[u8]) -> ServerChoice {
    // en-tête 2 octets + type(1) session_id_hit(1) cert_type(1) version(2)
    // cert_len(2) cipher_specs_len(2) connection_id_len(2)
    if data.len() < 13 || data[0] & 0x80 == 0 || data[2] != 0x04 {
        return ServerChoice::Rejected;
    }

    let version = u16::from_be_bytes([data[5], data[6]]);
    let cert_len = u16::from_be_bytes([data[7], data[8]]) as usize;
    let specs_len = u16::from_be_bytes([data[9], data[10]]) as usize;
    let specs_start = 13 + cert_len;

    if specs_len < 3 || data.len() < specs_start + 3 {
        return ServerChoice::Rejected;
    }

    let spec = [data[specs_start], data[specs_start + 1], data[specs_start + 2]];
    ServerChoice::Accepted {
        version,
        cipher: sslv2_cipher_name(spec),
    }
}

/// Concatène les charges utiles des enregistrements Handshake (0x16).
///
/// `None` si le premier enregistrement est une alerte ou n'est pas du TLS.
fn collect_handshake_payloads(data: &[u8]) -> Option<Vec<u8>> {
    let mut handshake = Vec::new();
    let mut pos = 0;
    while pos + 5 <= data.len() {
        let content_type = data[pos];
        let len = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as usize;
        let end = (pos + 5 + len).min(data.len());
        match content_type {
            0x16 => handshake.extend_from_slice(&data[pos + 5..end]),
            0x15 if handshake.is_empty() => return None,
            0x14..=0x17 => {}
            _ => return None,
        }
        pos = end;
    }
    Some(handshake)
}

fn parse_tls_server_hello(data: &[u8]) -> ServerChoice {
    let Some(handshake) = collect_handshake_payloads(data) else {
        return ServerChoice::Rejected;
    };

    if handshake.len() < 4 || handshake[0] != 0x02 {
        return ServerChoice::Rejected;
    }
    let body_len = ((handshake[1] as usize) << 16)
        | ((handshake[2] as usize) << 8)
        | (handshake[3] as usize);
    let body = &handshake[4..(4 + body_len).min(handshake.len())];

    // version(2) + random(32) + session_id_len(1)
    if body.len() < 35 {
        return ServerChoice::Rejected;
    }
    let mut version = u16::from_be_bytes([body[0], body[1]]);
    let pos = 35 + body[34] as usize;
    if body.len() < pos + 3 {
        return ServerChoice::Rejected;
    }
    let suite = u16::from_be_bytes([body[pos], body[pos + 1]]);

    // supported_versions (0x002B) porte la vraie version en TLS 1.3
    let mut ext_pos = pos + 3;
    if body.len() >= ext_pos + 2 {
        let ext_total = u16::from_be_bytes([body[ext_pos], body[ext_pos + 1]]) as usize;
        ext_pos += 2;
        let ext_end = (ext_pos + ext_total).min(body.len());
        while ext_pos + 4 <= ext_end {
            let ext_type = u16::from_be_bytes([body[ext_pos], body[ext_pos + 1]]);
            let ext_len = u16::from_be_bytes([body[ext_pos + 2], body[ext_pos + 3]]) as usize;
            if ext_type == 0x002B && ext_len == 2 && ext_pos + 6 <= ext_end {
                version = u16::from_be_bytes([body[ext_pos + 4], body[ext_pos + 5]]);
            }
            ext_pos += 4 + ext_len;
        }
    }

    ServerChoice::Accepted {
        version,
        cipher: suite_name(suite),
    }
}

/// Vrai dès que la réponse permet de conclure (ServerHello complet ou alerte).
fn response_complete(protocol: TlsProtocol, data: &[u8]) -> bool {
    if protocol == TlsProtocol::SslV2 {
        if data.len() < 2 || data[0] & 0x80 == 0 {
            return !data.is_empty();
        }
        let len = ((data[0] as usize & 0x7F) << 8) | data[1] as usize;
        return data.len() >= 2 + len;
    }

    match collect_handshake_payloads(data) {
        None => data.len() >= 5,
        Some(handshake) => {
            if handshake.len() < 4 {
                return false;
            }
            let len = ((handshake[1] as usize) << 16)
                | ((handshake[2] as usize) << 8)
                | (handshake[3] as usize);
            handshake.len() >= 4 + len
        }
    }
}

/// Envoie un ClientHello `protocol` sur une connexion neuve et décode la réponse.
///
/// Bloquant : à exécuter dans le pool.
pub fn probe_protocol(
    addr: SocketAddr,
    server_name: Option<&str>,
    protocol: TlsProtocol,
    timeout: Duration,
) -> std::io::Result<ServerChoice> {
    let mut stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    stream.write_all(&build_client_hello(protocol, server_name))?;

    let deadline = Instant::now() + timeout;
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];

    while data.len() < MAX_RESPONSE && Instant::now() < deadline {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                data.extend_from_slice(&buf[..n]);
                if response_complete(protocol, &data) {
                    break;
                }
            }
            Err(e) => {
                debug!("{} probe on {}: read ended: {}", protocol, addr, e);
                break;
            }
        }
    }

    Ok(parse_server_response(protocol, &data))
}

/// Messages Handshake complets : (type, corps).
fn handshake_messages(handshake: &[u8]) -> Vec<(u8, &[u8])> {
    let mut messages = Vec::new();
    let mut pos = 0;
    while pos + 4 <= handshake.len() {
        let len = ((handshake[pos + 1] as usize) << 16)
            | ((handshake[pos + 2] as usize) << 8)
            | (handshake[pos + 3] as usize);
        let end = pos + 4 + len;
        if end > handshake.len() {
            break;
        }
        messages.push((handshake[pos], &handshake[pos + 4..end]));
        pos = end;
    }
    messages
}

/// Extrait le certificat terminal (DER) du message Certificate.
///
/// Corps : longueur de liste (3 octets), puis pour chaque certificat sa
/// longueur (3 octets) et son DER. Seul le premier est retenu.
pub fn leaf_certificate(data: &[u8]) -> Option<Vec<u8>> {
    let handshake = collect_handshake_payloads(data)?;
    let (_, body) = handshake_messages(&handshake)
        .into_iter()
        .find(|(kind, _)| *kind == HANDSHAKE_CERTIFICATE)?;

    if body.len() < 6 {
        return None;
    }
    let cert_len = ((body[3] as usize) << 16) | ((body[4] as usize) << 8) | (body[5] as usize);
    if cert_len == 0 || body.len() < 6 + cert_len {
        return None;
    }
    Some(body[6..6 + cert_len].to_vec())
}

/// Vrai quand le serveur a fini sa volée (ServerHelloDone) ou a refusé.
fn certificate_flight_complete(data: &[u8]) -> bool {
    match collect_handshake_payloads(data) {
        None => data.len() >= 5,
        Some(handshake) => handshake_messages(&handshake)
            .iter()
            .any(|(kind, _)| *kind == HANDSHAKE_SERVER_HELLO_DONE),
    }
}

/// Récupère le certificat terminal par un handshake brut `protocol`.
///
/// Sert aux serveurs que rustls ne sait pas joindre (TLS 1.0/1.1, échange RSA,
/// suites CBC ou RC4). `Ok(None)` si le serveur refuse ou ne présente pas de
/// certificat ; une erreur d'E/S signale un échec de connexion.
/// Bloquant : à exécuter dans le pool.
pub fn fetch_certificate(
    addr: SocketAddr,
    server_name: Option<&str>,
    protocol: TlsProtocol,
    timeout: Duration,
) -> std::io::Result<Option<Vec<u8>>> {
    let mut stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    stream.write_all(&build_client_hello(protocol, server_name))?;

    let deadline = Instant::now() + timeout;
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];

    while data.len() < MAX_CERTIFICATE_RESPONSE && Instant::now() < deadline {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                data.extend_from_slice(&buf[..n]);
                if certificate_flight_complete(&data) {
                    break;
                }
            }
            Err(e) => {
                debug!("{} certificate fetch on {}: read ended: {}", protocol, addr, e);
                break;
            }
        }
    }

    Ok(leaf_certificate(&data))
}
