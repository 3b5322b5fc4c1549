//! TLS connection to the push gateway.
//!
//! The gateway authenticates clients by certificate, so the TLS config
//! always carries a client identity. Server verification uses the webpki
//! root set.

use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::{ClientConfig as RustlsConfig, RootCertStore};

use super::Connector;
use crate::error::{ApnsError, Result};

/// Client certificate chain and private key used to authenticate to the
/// gateway.
pub struct TlsIdentity {
    /// Certificate chain, leaf first.
    pub certs: Vec<CertificateDer<'static>>,
    /// Private key for the leaf certificate.
    pub key: PrivateKeyDer<'static>,
}

impl TlsIdentity {
    /// Parse an identity from PEM-encoded certificate and key bytes.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let certs = rustls_pemfile::certs(&mut &*cert_pem).collect::<io::Result<Vec<_>>>()?;
        let key = rustls_pemfile::private_key(&mut &*key_pem)?.ok_or(ApnsError::MissingPrivateKey)?;
        Ok(Self { certs, key })
    }

    /// Load an identity from PEM files on disk.
    pub fn from_files(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        let cert_pem = std::fs::read(cert_path)?;
        let key_pem = std::fs::read(key_path)?;
        Self::from_pem(&cert_pem, &key_pem)
    }
}

/// Connector that dials TCP and wraps the stream in TLS.
pub struct TlsConnector {
    gateway: String,
    server_name: ServerName<'static>,
    inner: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    /// Build a connector for `gateway` (a `host:port` pair) authenticating
    /// with the given identity.
    pub fn new(gateway: impl Into<String>, identity: TlsIdentity) -> Result<Self> {
        let gateway = gateway.into();
        let server_name = server_name_for(&gateway)?;

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = RustlsConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(identity.certs, identity.key)?;

        Ok(Self {
            gateway,
            server_name,
            inner: tokio_rustls::TlsConnector::from(Arc::new(config)),
        })
    }
}

#[async_trait]
impl Connector for TlsConnector {
    type Stream = TlsStream<TcpStream>;

    async fn connect(&self) -> io::Result<Self::Stream> {
        let tcp = TcpStream::connect(&self.gateway).await?;
        self.inner.connect(self.server_name.clone(), tcp).await
    }
}

/// Extract the host from a `host:port` pair for SNI and verification.
fn server_name_for(gateway: &str) -> Result<ServerName<'static>> {
    let host = gateway
        .rsplit_once(':')
        .map(|(host, _)| host)
        .filter(|host| !host.is_empty())
        .ok_or_else(|| ApnsError::InvalidGateway(gateway.to_string()))?;

    ServerName::try_from(host.to_string())
        .map_err(|_| ApnsError::InvalidGateway(gateway.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_name_from_gateway_pair() {
        assert!(server_name_for("gateway.push.apple.com:2195").is_ok());
        assert!(server_name_for("127.0.0.1:2195").is_ok());
    }

    #[test]
    fn test_rejects_gateway_without_port() {
        assert!(matches!(
            server_name_for("gateway.push.apple.com"),
            Err(ApnsError::InvalidGateway(_))
        ));
        assert!(matches!(
            server_name_for(":2195"),
            Err(ApnsError::InvalidGateway(_))
        ));
    }

    #[test]
    fn test_identity_requires_a_private_key() {
        // Valid-but-empty PEM input parses to no key at all.
        let result = TlsIdentity::from_pem(b"", b"");
        assert!(matches!(result, Err(ApnsError::MissingPrivateKey)));
    }
}
