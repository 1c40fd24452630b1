//! Audit complet d'un hôte : ports ouverts, TLS, RTSP, score.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use scoutconfig::Config;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::AuditError;
use crate::pool::BlockingPool;
use crate::rtsp::{self, DEFAULT_RTSP_PATHS, RtspProbeResult};
use crate::score::security_score;
use crate::tls::{CertificateAnalysis, CipherScanResult, scan_certificate, scan_ciphers};

/// Paramètres d'un audit
#[derive(Debug, Clone)]
pub struct AuditOptions {
    /// Ports sondés pour la surface exposée
    pub ports: Vec<u16>,
    /// Ports ouverts soumis à l'audit TLS
    pub https_ports: Vec<u16>,
    /// Ports ouverts soumis à la sonde RTSP
    pub rtsp_ports: Vec<u16>,
    pub timeout: Duration,
    /// Taille du pool bloquant et du parallélisme de connexion
    pub max_workers: usize,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            ports: vec![80, 443, 554, 8000, 8008, 8080, 8443, 8554, 1400, 49152],
            https_ports: vec![443, 8443, 1400],
            rtsp_ports: vec![554, 8554],
            timeout: Duration::from_secs(5),
            max_workers: 16,
        }
    }
}

impl AuditOptions {
    /// Options lues dans la section `audit` de la configuration
    pub fn from_config(config: &Config) -> Result<Self, AuditError> {
        let ports = config.get_audit_ports().map_err(invalid_config)?;
        if ports.is_empty() {
            return Err(AuditError::InvalidConfig("audit.ports is empty".to_string()));
        }

        let timeout = config.get_audit_timeout_secs();
        if timeout == 0 {
            return Err(AuditError::InvalidConfig(
                "audit.timeout_secs must be positive".to_string(),
            ));
        }

        Ok(Self {
            ports,
            https_ports: config.get_https_ports().map_err(invalid_config)?,
            rtsp_ports: config.get_rtsp_ports().map_err(invalid_config)?,
            timeout: Duration::from_secs(timeout),
            max_workers: config.get_audit_max_workers().max(1),
        })
    }
}

fn invalid_config(e: impl std::fmt::Display) -> AuditError {
    AuditError::InvalidConfig(e.to_string())
}

/// Résultats TLS d'un port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpsFindings {
    pub certificate: CertificateAnalysis,
    pub ciphers: CipherScanResult,
}

/// Bilan de sécurité d'un hôte
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityAssessment {
    pub host: String,
    pub scan_time: String,
    /// Ports ouverts, triés
    pub open_ports: Vec<u16>,
    pub https: BTreeMap<u16, HttpsFindings>,
    pub rtsp: BTreeMap<u16, RtspProbeResult>,
    pub vulnerabilities: Vec<String>,
    /// Absent quand `error` est renseigné
    pub score: Option<u8>,
    pub error: Option<String>,
}

/// Audite `host`.
///
/// Un hôte injoignable donne un bilan complet mais vide. Seul un échec de
/// résolution renseigne `error` et laisse le score absent.
pub async fn assess(host: &str, options: &AuditOptions) -> SecurityAssessment {
    let mut assessment = SecurityAssessment {
        host: host.to_string(),
        scan_time: Utc::now().to_rfc3339(),
        ..Default::default()
    };

    let ip = match scoututils::resolve_host(host).await {
        Ok(ip) => ip,
        Err(e) => {
            warn!("Assessment of {} aborted: {}", host, e);
            assessment.error = Some(e.to_string());
            return assessment;
        }
    };

    info!("🔍 Assessing {} ({})", host, ip);

    assessment.open_ports =
        scoututils::open_ports(ip, &options.ports, options.timeout, options.max_workers).await;

    let pool = BlockingPool::new(options.max_workers);

    let https_ports: Vec<u16> = assessment
        .open_ports
        .iter()
        .copied()
        .filter(|p| options.https_ports.contains(p))
        .collect();
    let rtsp_ports: Vec<u16> = assessment
        .open_ports
        .iter()
        .copied()
        .filter(|p| options.rtsp_ports.contains(p))
        .collect();

    let https_results = join_all(
        https_ports
            .iter()
            .map(|&port| audit_https_port(host, port, options.timeout, &pool)),
    )
    .await;
    for (port, findings) in https_ports.into_iter().zip(https_results) {
        assessment
            .vulnerabilities
            .extend(findings.certificate.vulnerabilities.iter().cloned());
        assessment
            .vulnerabilities
            .extend(findings.ciphers.vulnerabilities.iter().cloned());
        assessment.https.insert(port, findings);
    }

    let rtsp_results = join_all(
        rtsp_ports
            .iter()
            .map(|&port| rtsp::probe(host, port, DEFAULT_RTSP_PATHS, options.timeout, &pool)),
    )
    .await;
    // Les flux ouverts pèsent dans le score via `rtsp`, pas via `vulnerabilities`
    for (port, result) in rtsp_ports.into_iter().zip(rtsp_results) {
        assessment.rtsp.insert(port, result);
    }

    let score = security_score(&assessment);
    assessment.score = Some(score);
    info!(
        "🛡️ {} : score {}/100, {} vulnerability(ies)",
        host,
        score,
        assessment.vulnerabilities.len()
    );

    assessment
}

async fn audit_https_port(
    host: &str,
    port: u16,
    timeout: Duration,
    pool: &BlockingPool,
) -> HttpsFindings {
    let cert_host = host.to_string();
    let certificate = pool
        .run(move || scan_certificate(&cert_host, port, timeout))
        .await
        .unwrap_or_else(|e| CertificateAnalysis::failed(host, port, e.to_string()));
    let ciphers = scan_ciphers(host, port, timeout, pool).await;

    HttpsFindings {
        certificate,
        ciphers,
    }
}

/// Audite plusieurs hôtes en parallèle ; un hôte en échec n'arrête pas les autres.
pub async fn assess_many(hosts: &[String], options: &AuditOptions) -> Vec<SecurityAssessment> {
    join_all(hosts.iter().map(|host| assess(host, options))).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let config = Config::from_yaml_str(
            "audit:\n  ports: [443, 554]\n  https_ports: [443]\n  timeout_secs: 2\n  max_workers: 0\n",
        )
        .unwrap();
        let options = AuditOptions::from_config(&config).unwrap();
        assert_eq!(options.ports, vec![443, 554]);
        assert_eq!(options.https_ports, vec![443]);
        assert_eq!(options.rtsp_ports, vec![554, 8554]);
        assert_eq!(options.timeout, Duration::from_secs(2));
        assert_eq!(options.max_workers, 1);
    }

    #[test]
    fn test_options_from_config_rejects_bad_ports() {
        let config = Config::from_yaml_str("audit:\n  ports: [80, \"http\"]\n").unwrap();
        assert!(matches!(
            AuditOptions::from_config(&config),
            Err(AuditError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_default_options_match_embedded_config() {
        let from_config = AuditOptions::from_config(&Config::from_yaml_str("{}").unwrap()).unwrap();
        let defaults = AuditOptions::default();
        assert_eq!(from_config.ports, defaults.ports);
        assert_eq!(from_config.https_ports, defaults.https_ports);
        assert_eq!(from_config.timeout, defaults.timeout);
    }

    #[tokio::test]
    async fn test_assess_unresolvable_host_has_no_score() {
        let assessment = assess("", &AuditOptions::default()).await;
        assert!(assessment.error.is_some());
        assert!(assessment.score.is_none());
        assert!(assessment.open_ports.is_empty());
    }
}
