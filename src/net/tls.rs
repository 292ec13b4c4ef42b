//! TLS configuration and certificate loading.
//!
//! Two directions are covered: the browser-facing listener (certificate and
//! key) and outbound connections to the backend (trusted CA and minimum
//! version). The outbound [`rustls::ClientConfig`] is shared by the reverse
//! proxy and the websocket relay.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig, SupportedProtocolVersion};

use crate::config::{BackendTlsConfig, ListenerTlsConfig, MinTlsVersion};

/// Error type for TLS material.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(String),
    #[error("no private key found in {0}")]
    NoPrivateKey(String),
    #[error("listener TLS requires both cert_path and key_path")]
    Incomplete,
    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Protocol versions allowed for a configured minimum.
pub fn protocol_versions(min: Option<MinTlsVersion>) -> &'static [&'static SupportedProtocolVersion] {
    static ALL: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13, &rustls::version::TLS12];
    static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];
    match min {
        Some(MinTlsVersion::Tls13) => TLS13_ONLY,
        Some(MinTlsVersion::Tls12) | None => ALL,
    }
}

fn open(path: &str) -> Result<BufReader<File>, TlsError> {
    File::open(Path::new(path))
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            path: path.to_string(),
            source,
        })
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: path.to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_string()));
    }
    Ok(certs)
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Read {
            path: path.to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_string()))
}

/// Client TLS configuration for reaching the backend.
///
/// Returns `None` when no CA is configured, in which case the backend is
/// reached over plain http/ws.
pub fn backend_client_config(config: &BackendTlsConfig) -> Result<Option<ClientConfig>, TlsError> {
    let Some(ca_path) = config.ca_path.as_deref() else {
        return Ok(None);
    };

    let mut roots = RootCertStore::empty();
    for cert in load_certs(ca_path)? {
        roots.add(cert)?;
    }

    let client = ClientConfig::builder_with_provider(provider())
        .with_protocol_versions(protocol_versions(config.min_tls))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Some(client))
}

/// Load TLS configuration for the browser-facing listener.
pub async fn load_listener_tls(config: &ListenerTlsConfig) -> Result<RustlsConfig, TlsError> {
    let (Some(cert_path), Some(key_path)) = (config.cert_path.as_deref(), config.key_path.as_deref())
    else {
        return Err(TlsError::Incomplete);
    };

    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let mut server = ServerConfig::builder_with_provider(provider())
        .with_protocol_versions(protocol_versions(config.min_tls))?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    server.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(RustlsConfig::from_config(Arc::new(server)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_ca_means_plain_transport() {
        let config = BackendTlsConfig::default();
        assert!(backend_client_config(&config).unwrap().is_none());
    }

    #[test]
    fn missing_ca_file_is_reported() {
        let config = BackendTlsConfig {
            ca_path: Some("/nonexistent/ca.pem".into()),
            min_tls: None,
        };
        assert!(matches!(backend_client_config(&config), Err(TlsError::Read { .. })));
    }

    #[test]
    fn ca_file_without_certificates_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = BackendTlsConfig {
            ca_path: Some(file.path().to_string_lossy().into_owned()),
            min_tls: None,
        };
        assert!(matches!(backend_client_config(&config), Err(TlsError::NoCertificates(_))));
    }

    #[test]
    fn minimum_version_restricts_protocols() {
        assert_eq!(protocol_versions(None).len(), 2);
        assert_eq!(protocol_versions(Some(MinTlsVersion::Tls12)).len(), 2);
        assert_eq!(protocol_versions(Some(MinTlsVersion::Tls13)).len(), 1);
    }
}
