//! Score de sécurité : fonction pure du bilan, de 0 (critique) à 100.

use crate::assessment::SecurityAssessment;

/// Pénalité par vulnérabilité, et plafond de ce terme
const VULNERABILITY_PENALTY: i32 = 10;
const VULNERABILITY_CAP: i32 = 50;
/// Nombre de ports ouverts tolérés sans pénalité
const FREE_OPEN_PORTS: usize = 5;
const OPEN_PORT_PENALTY: i32 = 5;
const EXPIRED_CERT_PENALTY: i32 = 20;
const SELF_SIGNED_PENALTY: i32 = 10;
const WEAK_CIPHER_PENALTY: i32 = 5;
const OPEN_STREAM_PENALTY: i32 = 10;

pub fn security_score(assessment: &SecurityAssessment) -> u8 {
    let mut score: i32 = 100;

    let vulns = assessment.vulnerabilities.len().min(i32::MAX as usize) as i32;
    score -= vulns.saturating_mul(VULNERABILITY_PENALTY).min(VULNERABILITY_CAP);

    let extra_ports = assessment.open_ports.len().saturating_sub(FREE_OPEN_PORTS);
    score -= (extra_ports as i32).saturating_mul(OPEN_PORT_PENALTY);

    for findings in assessment.https.values() {
        if findings.certificate.is_expired {
            score -= EXPIRED_CERT_PENALTY;
        }
        if findings.certificate.is_self_signed {
            score -= SELF_SIGNED_PENALTY;
        }
        score -= (findings.ciphers.weak_ciphers.len() as i32).saturating_mul(WEAK_CIPHER_PENALTY);
    }

    for result in assessment.rtsp.values() {
        score -= (result.available.len() as i32).saturating_mul(OPEN_STREAM_PENALTY);
    }

    score.clamp(0, 100) as u8
}

/// Libellé de la tranche de score
pub fn score_band(score: u8) -> &'static str {
    match score {
        80.. => "good",
        60..=79 => "moderate",
        40..=59 => "poor",
        _ => "critical",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::HttpsFindings;
    use crate::rtsp::{RtspProbeResult, RtspStatus, RtspStreamProbe};
    use crate::tls::{CertificateAnalysis, CipherScanResult};

    fn stream(path: &str) -> RtspStreamProbe {
        RtspStreamProbe {
            url: format!("rtsp://10.0.0.9:554{}", path),
            path: path.to_string(),
            status: RtspStatus::Available,
            methods: None,
            server: None,
            auth_method: None,
            response: None,
            error: None,
        }
    }

    fn worst_case() -> SecurityAssessment {
        let mut assessment = SecurityAssessment {
            host: "10.0.0.9".to_string(),
            open_ports: vec![21, 22, 23, 80, 443, 554, 1400, 8080, 8443, 49152],
            vulnerabilities: (0..20).map(|i| format!("vuln {}", i)).collect(),
            ..Default::default()
        };
        assessment.https.insert(
            443,
            HttpsFindings {
                certificate: CertificateAnalysis {
                    is_expired: true,
                    is_self_signed: true,
                    ..Default::default()
                },
                ciphers: CipherScanResult {
                    weak_ciphers: vec!["RC4".into(), "DES".into(), "NULL".into()],
                    ..Default::default()
                },
            },
        );
        assessment.rtsp.insert(
            554,
            RtspProbeResult {
                available: vec![stream("/live"), stream("/stream1")],
                ..Default::default()
            },
        );
        assessment
    }

    #[test]
    fn test_clean_host_scores_100() {
        let assessment = SecurityAssessment {
            open_ports: vec![80, 443],
            ..Default::default()
        };
        assert_eq!(security_score(&assessment), 100);
    }

    #[test]
    fn test_worst_case_clamps_to_zero() {
        assert_eq!(security_score(&worst_case()), 0);
    }

    #[test]
    fn test_vulnerability_term_is_capped() {
        let mut assessment = SecurityAssessment::default();
        assessment.vulnerabilities = vec!["a".into(); 3];
        assert_eq!(security_score(&assessment), 70);
        assessment.vulnerabilities = vec!["a".into(); 12];
        assert_eq!(security_score(&assessment), 50);
    }

    #[test]
    fn test_open_ports_beyond_five() {
        let assessment = SecurityAssessment {
            open_ports: (1..=8).collect(),
            ..Default::default()
        };
        assert_eq!(security_score(&assessment), 85);
    }

    #[test]
    fn test_per_port_penalties() {
        let mut assessment = worst_case();
        assessment.vulnerabilities.clear();
        assessment.open_ports.truncate(5);
        // 100 - 20 - 10 - 15 - 20
        assert_eq!(security_score(&assessment), 35);
    }

    #[test]
    fn test_adding_vulnerabilities_never_raises_score() {
        let mut assessment = SecurityAssessment {
            open_ports: vec![80],
            ..Default::default()
        };
        let mut previous = security_score(&assessment);
        for i in 0..12 {
            assessment.vulnerabilities.push(format!("vuln {}", i));
            let current = security_score(&assessment);
            assert!(current <= previous);
            previous = current;
        }
    }

    #[test]
    fn test_score_bands() {
        assert_eq!(score_band(100), "good");
        assert_eq!(score_band(80), "good");
        assert_eq!(score_band(79), "moderate");
        assert_eq!(score_band(60), "moderate");
        assert_eq!(score_band(45), "poor");
        assert_eq!(score_band(39), "critical");
        assert_eq!(score_band(0), "critical");
    }
}
