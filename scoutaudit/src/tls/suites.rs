//! Noms IANA des suites de chiffrement et des versions de protocole.

use serde::{Deserialize, Serialize};

/// Versions essayées lors de l'énumération, de la plus ancienne à la plus récente
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TlsProtocol {
    #[serde(rename = "SSLv2")]
    SslV2,
    #[serde(rename = "SSLv3")]
    SslV3,
    #[serde(rename = "TLSv1.0")]
    TlsV1_0,
    #[serde(rename = "TLSv1.1")]
    TlsV1_1,
    #[serde(rename = "TLSv1.2")]
    TlsV1_2,
    #[serde(rename = "TLSv1.3")]
    TlsV1_3,
}

impl TlsProtocol {
    pub const ALL: [TlsProtocol; 6] = [
        TlsProtocol::SslV2,
        TlsProtocol::SslV3,
        TlsProtocol::TlsV1_0,
        TlsProtocol::TlsV1_1,
        TlsProtocol::TlsV1_2,
        TlsProtocol::TlsV1_3,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TlsProtocol::SslV2 => "SSLv2",
            TlsProtocol::SslV3 => "SSLv3",
            TlsProtocol::TlsV1_0 => "TLSv1.0",
            TlsProtocol::TlsV1_1 => "TLSv1.1",
            TlsProtocol::TlsV1_2 => "TLSv1.2",
            TlsProtocol::TlsV1_3 => "TLSv1.3",
        }
    }

    /// Valeur `ProtocolVersion` sur le fil
    pub fn wire_version(self) -> u16 {
        match self {
            TlsProtocol::SslV2 => 0x0002,
            TlsProtocol::SslV3 => 0x0300,
            TlsProtocol::TlsV1_0 => 0x0301,
            TlsProtocol::TlsV1_1 => 0x0302,
            TlsProtocol::TlsV1_2 => 0x0303,
            TlsProtocol::TlsV1_3 => 0x0304,
        }
    }

    pub fn from_wire(version: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.wire_version() == version)
    }

    /// Protocoles dont la simple disponibilité est une vulnérabilité
    pub fn is_insecure(self) -> bool {
        matches!(
            self,
            TlsProtocol::SslV2 | TlsProtocol::SslV3 | TlsProtocol::TlsV1_0
        )
    }
}

impl std::fmt::Display for TlsProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Suites proposées dans les ClientHello SSLv3..TLSv1.2, anciennes et faibles comprises
pub const OFFERED_SUITES: &[u16] = &[
    0xC02F, 0xC030, 0xC02B, 0xC02C, 0xCCA8, 0xCCA9, 0xC013, 0xC014, 0xC009, 0xC00A, 0x009E,
    0x009F, 0x0033, 0x0039, 0x009C, 0x009D, 0x003C, 0x003D, 0x002F, 0x0035, 0xC012, 0x0016,
    0x000A, 0xC011, 0x0005, 0x0004, 0x0009, 0x0015, 0x0008, 0x0003, 0x0006, 0x0014, 0x0002,
    0x0001, 0x003B,
];

/// Suites TLS 1.3
pub const TLS13_SUITES: &[u16] = &[0x1301, 0x1302, 0x1303];

const SUITE_NAMES: &[(u16, &str)] = &[
    (0x0001, "TLS_RSA_WITH_NULL_MD5"),
    (0x0002, "TLS_RSA_WITH_NULL_SHA"),
    (0x0003, "TLS_RSA_EXPORT_WITH_RC4_40_MD5"),
    (0x0004, "TLS_RSA_WITH_RC4_128_MD5"),
    (0x0005, "TLS_RSA_WITH_RC4_128_SHA"),
    (0x0006, "TLS_RSA_EXPORT_WITH_RC2_CBC_40_MD5"),
    (0x0008, "TLS_RSA_EXPORT_WITH_DES40_CBC_SHA"),
    (0x0009, "TLS_RSA_WITH_DES_CBC_SHA"),
    (0x000A, "TLS_RSA_WITH_3DES_EDE_CBC_SHA"),
    (0x0014, "TLS_DHE_RSA_EXPORT_WITH_DES40_CBC_SHA"),
    (0x0015, "TLS_DHE_RSA_WITH_DES_CBC_SHA"),
    (0x0016, "TLS_DHE_RSA_WITH_3DES_EDE_CBC_SHA"),
    (0x002F, "TLS_RSA_WITH_AES_128_CBC_SHA"),
    (0x0033, "TLS_DHE_RSA_WITH_AES_128_CBC_SHA"),
    (0x0035, "TLS_RSA_WITH_AES_256_CBC_SHA"),
    (0x0039, "TLS_DHE_RSA_WITH_AES_256_CBC_SHA"),
    (0x003B, "TLS_RSA_WITH_NULL_SHA256"),
    (0x003C, "TLS_RSA_WITH_AES_128_CBC_SHA256"),
    (0x003D, "TLS_RSA_WITH_AES_256_CBC_SHA256"),
    (0x009C, "TLS_RSA_WITH_AES_128_GCM_SHA256"),
    (0x009D, "TLS_RSA_WITH_AES_256_GCM_SHA384"),
    (0x009E, "TLS_DHE_RSA_WITH_AES_128_GCM_SHA256"),
    (0x009F, "TLS_DHE_RSA_WITH_AES_256_GCM_SHA384"),
    (0x1301, "TLS_AES_128_GCM_SHA256"),
    (0x1302, "TLS_AES_256_GCM_SHA384"),
    (0x1303, "TLS_CHACHA20_POLY1305_SHA256"),
    (0xC009, "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA"),
    (0xC00A, "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA"),
    (0xC011, "TLS_ECDHE_RSA_WITH_RC4_128_SHA"),
    (0xC012, "TLS_ECDHE_RSA_WITH_3DES_EDE_CBC_SHA"),
    (0xC013, "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA"),
    (0xC014, "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA"),
    (0xC023, "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256"),
    (0xC024, "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384"),
    (0xC027, "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256"),
    (0xC028, "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA384"),
    (0xC02B, "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256"),
    (0xC02C, "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384"),
    (0xC02F, "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256"),
    (0xC030, "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384"),
    (0xCCA8, "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256"),
    (0xCCA9, "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256"),
];

/// Spécifications de chiffrement SSLv2 (3 octets)
pub const SSLV2_CIPHER_SPECS: &[([u8; 3], &str)] = &[
    ([0x01, 0x00, 0x80], "SSL_CK_RC4_128_WITH_MD5"),
    ([0x02, 0x00, 0x80], "SSL_CK_RC4_128_EXPORT40_WITH_MD5"),
    ([0x03, 0x00, 0x80], "SSL_CK_RC2_128_CBC_WITH_MD5"),
    ([0x04, 0x00, 0x80], "SSL_CK_RC2_128_CBC_EXPORT40_WITH_MD5"),
    ([0x05, 0x00, 0x80], "SSL_CK_IDEA_128_CBC_WITH_MD5"),
    ([0x06, 0x00, 0x40], "SSL_CK_DES_64_CBC_WITH_MD5"),
    ([0x07, 0x00, 0xC0], "SSL_CK_DES_192_EDE3_CBC_WITH_MD5"),
];

/// Nom IANA d'une suite, ou `UNKNOWN_0xXXXX`
pub fn suite_name(id: u16) -> String {
    SUITE_NAMES
        .iter()
        .find(|(suite, _)| *suite == id)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("UNKNOWN_0x{:04X}", id))
}

pub fn sslv2_cipher_name(spec: [u8; 3]) -> String {
    SSLV2_CIPHER_SPECS
        .iter()
        .find(|(s, _)| *s == spec)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("SSL_CK_UNKNOWN_0x{:02X}{:02X}{:02X}", spec[0], spec[1], spec[2]))
}

/// Suite faible : RC4, DES (3DES compris), MD5, NULL ou EXPORT dans le nom
pub fn is_weak_cipher(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    ["RC4", "DES", "MD5", "NULL", "EXPORT"]
        .iter()
        .any(|marker| upper.contains(marker))
}
