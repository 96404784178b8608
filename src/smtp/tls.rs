//! STARTTLS certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{self, ServerConfig};
use tokio_rustls::TlsAcceptor;

use crate::config::TlsConfig;
use crate::{EphemailError, Result};

/// Build a TLS acceptor from the PEM files named in `config`.
pub fn load_acceptor(config: &TlsConfig) -> Result<TlsAcceptor> {
    // Fails harmlessly when a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut cert_reader = BufReader::new(File::open(&config.cert_file)?);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EphemailError::Tls(format!("invalid certificate: {e}")))?;
    if certs.is_empty() {
        return Err(EphemailError::Tls(format!(
            "no certificate found in {}",
            config.cert_file
        )));
    }

    let mut key_reader = BufReader::new(File::open(&config.key_file)?);
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| EphemailError::Tls(format!("invalid private key: {e}")))?
        .ok_or_else(|| {
            EphemailError::Tls(format!("no private key found in {}", config.key_file))
        })?;

    let server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| EphemailError::Tls(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}
