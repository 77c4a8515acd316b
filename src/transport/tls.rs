//! Client TLS configuration from PEM files.

use crate::connection::TlsMaterial;
use crate::error::{Error, Result};
use rustls::crypto::{CryptoProvider, ring::default_provider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

/// Builds a client config from the descriptor's TLS material.
///
/// Returns `None` when no material is configured. A CA bundle is required
/// whenever TLS is used; a client certificate and key must come as a pair.
pub fn client_config(tls: &TlsMaterial) -> Result<Option<Arc<rustls::ClientConfig>>> {
    if !tls.is_configured() {
        return Ok(None);
    }
    let _ = CryptoProvider::install_default(default_provider());

    let ca_file = tls
        .ca_file
        .as_deref()
        .ok_or_else(|| Error::Tls("a CA certificate is required for TLS connections".into()))?;
    let mut roots = rustls::RootCertStore::empty();
    for cert in read_certs(ca_file)? {
        roots
            .add(cert)
            .map_err(|e| Error::Tls(format!("invalid CA certificate {}: {e}", ca_file.display())))?;
    }

    let builder = rustls::ClientConfig::builder().with_root_certificates(roots);
    let config = match (&tls.cert_file, &tls.key_file) {
        (Some(cert), Some(key)) => builder
            .with_client_auth_cert(read_certs(cert)?, read_key(key)?)
            .map_err(|e| Error::Tls(format!("invalid client certificate: {e}")))?,
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(Error::Tls(
                "client certificate and key must be configured together".into(),
            ));
        }
    };
    Ok(Some(Arc::new(config)))
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| Error::Tls(format!("failed to open {}: {e}", path.display())))
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("failed to parse {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(Error::Tls(format!("no certificates found in {}", path.display())));
    }
    Ok(certs)
}

fn read_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|e| Error::Tls(format!("failed to parse {}: {e}", path.display())))?
        .ok_or_else(|| Error::Tls(format!("no private key found in {}", path.display())))
}
