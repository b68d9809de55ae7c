//! TLS support using rustls
//!
//! Provides a [`TlsListener`] that wraps a TCP listener with TLS termination,
//! implementing [`axum::serve::Listener`] for seamless integration with axum's server.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use crate::config::TlsConfig;
use crate::error::Result;

/// A TLS-enabled listener wrapping a [`TcpListener`] with a [`TlsAcceptor`].
///
/// Implements [`axum::serve::Listener`] so it can be used as a drop-in
/// replacement for `TcpListener` when calling `axum::serve()`.
pub struct TlsListener {
    tcp: TcpListener,
    acceptor: TlsAcceptor,
}

impl TlsListener {
    /// Create a new TLS listener from an existing TCP listener and server config.
    pub fn new(tcp: TcpListener, server_config: Arc<ServerConfig>) -> Self {
        Self {
            tcp,
            acceptor: TlsAcceptor::from(server_config),
        }
    }
}

impl axum::serve::Listener for TlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    fn accept(&mut self) -> impl std::future::Future<Output = (Self::Io, Self::Addr)> + Send {
        let acceptor = self.acceptor.clone();
        let tcp = &mut self.tcp;

        async move {
            loop {
                // Accept a TCP connection using the tokio TcpListener method (not
                // the axum Listener trait method, which handles errors internally).
                let (stream, addr) = match TcpListener::accept(tcp).await {
                    Ok((stream, addr)) => (stream, addr),
                    Err(e) => {
                        tracing::error!("TCP accept error: {}", e);
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        continue;
                    }
                };

                // Perform TLS handshake. On failure, log and try the next connection.
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => return (tls_stream, addr),
                    Err(e) => {
                        tracing::warn!("TLS handshake failed from {}: {}", addr, e);
                        continue;
                    }
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.tcp.local_addr()
    }
}

/// Load a rustls [`ServerConfig`] from PEM certificate and key files.
///
/// Reads the certificate chain and private key from disk and constructs
/// a server configuration with no client authentication required.
pub fn load_server_config(tls_config: &TlsConfig) -> Result<Arc<ServerConfig>> {
    use rustls_pemfile::{certs, private_key};
    use std::fs::File;
    use std::io::BufReader;
    use tokio_rustls::rustls;

    // Read certificate chain
    let cert_file = File::open(&tls_config.cert_path).map_err(|e| {
        crate::error::Error::Internal(format!(
            "Failed to open TLS cert file '{}': {}",
            tls_config.cert_path.display(),
            e
        ))
    })?;
    let mut cert_reader = BufReader::new(cert_file);
    let cert_chain: Vec<rustls::pki_types::CertificateDer<'static>> = certs(&mut cert_reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            crate::error::Error::Internal(format!("Failed to parse TLS certificates: {}", e))
        })?;

    if cert_chain.is_empty() {
        return Err(crate::error::Error::Internal(
            "TLS cert file contains no certificates".to_string(),
        ));
    }

    // Read private key
    let key_file = File::open(&tls_config.key_path).map_err(|e| {
        crate::error::Error::Internal(format!(
            "Failed to open TLS key file '{}': {}",
            tls_config.key_path.display(),
            e
        ))
    })?;
    let mut key_reader = BufReader::new(key_file);
    let key = private_key(&mut key_reader)
        .map_err(|e| {
            crate::error::Error::Internal(format!("Failed to parse TLS private key: {}", e))
        })?
        .ok_or_else(|| {
            crate::error::Error::Internal("TLS key file contains no private key".to_string())
        })?;

    // Build server config. When `require_client_cert` is set, agents must
    // present a certificate signed by the hub's own CA (see `issue_agent_cert`)
    // to complete the handshake at all — mTLS replaces bearer-token auth on
    // the `/ws/agent` transport in that mode (spec §6).
    let config = if tls_config.require_client_cert {
        let ca_cert = std::fs::read(&tls_config.ca_cert_path).map_err(|e| {
            crate::error::Error::Internal(format!(
                "Failed to read client CA cert '{}': {}",
                tls_config.ca_cert_path.display(),
                e
            ))
        })?;
        let mut ca_reader = BufReader::new(ca_cert.as_slice());
        let ca_certs: Vec<rustls::pki_types::CertificateDer<'static>> = certs(&mut ca_reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| crate::error::Error::Internal(format!("Failed to parse client CA cert: {e}")))?;

        let mut roots = rustls::RootCertStore::empty();
        for ca in ca_certs {
            roots.add(ca).map_err(|e| {
                crate::error::Error::Internal(format!("Failed to add client CA to root store: {e}"))
            })?;
        }
        let verifier = rustls::server::WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| crate::error::Error::Internal(format!("Failed to build client verifier: {e}")))?;

        ServerConfig::builder()
            .with_client_cert_verifier(verifier)
            .with_single_cert(cert_chain, key.into())
            .map_err(|e| crate::error::Error::Internal(format!("Failed to build TLS server config: {e}")))?
    } else {
        ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(cert_chain, key.into())
            .map_err(|e| crate::error::Error::Internal(format!("Failed to build TLS server config: {e}")))?
    };

    Ok(Arc::new(config))
}

/// A freshly minted CA, as PEM-encoded cert and private key bytes.
pub struct GeneratedCa {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Generates a self-signed CA the hub uses to sign per-agent client
/// certificates at enrollment time (spec §6 mTLS enrollment). rcgen only
/// generates keys for the algorithms `ring` supports key generation for,
/// so the CA and every agent cert use ECDSA P-256 rather than RSA — noted
/// in the design ledger as a deliberate deviation.
pub fn generate_ca(common_name: &str) -> Result<GeneratedCa> {
    use rcgen::{BasicConstraints, DistinguishedName, DnType, IsCa, KeyPair, KeyUsagePurpose};

    let mut params = rcgen::CertificateParams::new(Vec::<String>::new())
        .map_err(|e| crate::error::Error::Internal(format!("failed to build CA params: {e}")))?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

    let key_pair = KeyPair::generate()
        .map_err(|e| crate::error::Error::Internal(format!("failed to generate CA key: {e}")))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| crate::error::Error::Internal(format!("failed to self-sign CA cert: {e}")))?;

    Ok(GeneratedCa {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
    })
}

/// A freshly issued agent client certificate, as PEM-encoded cert and key.
pub struct IssuedAgentCert {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Issues a client certificate for `agent_name` (CN = the agent's name),
/// signed by the CA loaded from `ca_cert_pem`/`ca_key_pem`, valid for one
/// year from issuance (spec §6 enrollment flow).
pub fn issue_agent_cert(agent_name: &str, ca_cert_pem: &str, ca_key_pem: &str) -> Result<IssuedAgentCert> {
    use rcgen::{DistinguishedName, DnType, ExtendedKeyUsagePurpose, Issuer, KeyPair, KeyUsagePurpose};

    let ca_key_pair = KeyPair::from_pem(ca_key_pem)
        .map_err(|e| crate::error::Error::Internal(format!("invalid CA private key: {e}")))?;
    let ca_params = rcgen::CertificateParams::from_ca_cert_pem(ca_cert_pem)
        .map_err(|e| crate::error::Error::Internal(format!("invalid CA certificate: {e}")))?;
    let issuer = Issuer::new(ca_params, ca_key_pair);

    let mut params = rcgen::CertificateParams::new(Vec::<String>::new())
        .map_err(|e| crate::error::Error::Internal(format!("failed to build agent cert params: {e}")))?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, agent_name);
    params.distinguished_name = dn;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    params.not_after = time::OffsetDateTime::now_utc() + time::Duration::days(365);

    let agent_key_pair = KeyPair::generate()
        .map_err(|e| crate::error::Error::Internal(format!("failed to generate agent key: {e}")))?;
    let cert = params
        .signed_by(&agent_key_pair, &issuer)
        .map_err(|e| crate::error::Error::Internal(format!("failed to sign agent cert: {e}")))?;

    Ok(IssuedAgentCert {
        cert_pem: cert.pem(),
        key_pem: agent_key_pair.serialize_pem(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ca_is_well_formed_pem() {
        let ca = generate_ca("sonde-hub CA").unwrap();
        assert!(ca.cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(ca.key_pem.contains("PRIVATE KEY"));
    }

    #[test]
    fn issued_agent_cert_is_signed_by_the_ca() {
        let ca = generate_ca("sonde-hub CA").unwrap();
        let agent_cert = issue_agent_cert("web-01", &ca.cert_pem, &ca.key_pem).unwrap();
        assert!(agent_cert.cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(agent_cert.key_pem.contains("PRIVATE KEY"));
    }
}
