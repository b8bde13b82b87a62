use std::sync::Arc;

use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ServerConfig, SupportedCipherSuite};
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

use crate::config::TlsSettings;

/// ECDHE and TLS 1.3 AEAD suites only. rustls has no anonymous, NULL or
/// finite-field DHE suites to exclude.
pub const DEFAULT_CIPHERS: &[&str] = &[
    "TLS13_AES_256_GCM_SHA384",
    "TLS13_AES_128_GCM_SHA256",
    "TLS13_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
];

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("could not read certificate file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificate found in {0}")]
    NoCertificate(String),
    #[error("no private key found in {0}")]
    NoPrivateKey(String),
    #[error("unknown or unsupported cipher suite: {0}")]
    UnknownCipher(String),
    #[error("cipher list leaves no usable suite")]
    NoCiphers,
    #[error("tls configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),
}

pub fn suite_name(suite: &SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}

/// map cipher suite names onto the suites the ring provider implements
pub fn permitted_suites(names: &[String]) -> Result<Vec<SupportedCipherSuite>, TlsError> {
    let available = ring::default_provider().cipher_suites;
    let mut chosen: Vec<SupportedCipherSuite> = Vec::new();

    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        let suite = available
            .iter()
            .find(|s| suite_name(s).eq_ignore_ascii_case(name))
            .ok_or_else(|| TlsError::UnknownCipher(name.to_string()))?;
        if !chosen.iter().any(|c| suite_name(c) == suite_name(suite)) {
            chosen.push(*suite);
        }
    }

    if chosen.is_empty() {
        return Err(TlsError::NoCiphers);
    }
    Ok(chosen)
}

/// build the acceptor from a PEM holding both the certificate chain and key
pub fn load_acceptor(settings: &TlsSettings) -> Result<TlsAcceptor, TlsError> {
    let suites = permitted_suites(&settings.ciphers)?;
    let path = settings.cert_path.display().to_string();

    let pem = std::fs::read(&settings.cert_path).map_err(|source| TlsError::Read {
        path: path.clone(),
        source,
    })?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<_, _>>()
        .map_err(|source| TlsError::Read {
            path: path.clone(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificate(path));
    }
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|source| TlsError::Read {
            path: path.clone(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.clone()))?;

    let provider = CryptoProvider {
        cipher_suites: suites,
        ..ring::default_provider()
    };
    let mut config = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    tracing::debug!(
        "TLS ready with {} cipher suite(s) from {}",
        config.crypto_provider().cipher_suites.len(),
        path
    );
    Ok(TlsAcceptor::from(Arc::new(config)))
}
