//! TLS policies and server public keys referenced by name from a DSN.

use std::sync::Arc;

use tokio_rustls::rustls::{
    self, ClientConfig, RootCertStore,
    pki_types::{CertificateDer, ServerName},
};

use crate::error::{MdbError, MdbResult};

/// TLS settings for a connection.
///
/// The presets `true`, `skip-verify` and `preferred` produce a default policy
/// (with or without verification); custom policies are registered by name in a
/// [`Registry`](super::Registry).
///
/// # Example
/// ```ignore
/// let policy = TlsPolicy {
///     ca_cert_pem: Some(include_bytes!("ca.crt").to_vec()),
///     client_cert_pem: Some(include_bytes!("client.crt").to_vec()),
///     client_key_pem: Some(include_bytes!("client.key").to_vec()),
///     ..Default::default()
/// };
/// registry.register_tls_config("internal", policy)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsPolicy {
    /// Name checked against the server certificate; filled from the address
    /// host during normalization when empty.
    pub server_name: Option<String>,
    pub insecure_skip_verify: bool,
    /// CA certificate(s) in PEM; system roots are used when absent.
    pub ca_cert_pem: Option<Vec<u8>>,
    pub client_cert_pem: Option<Vec<u8>>,
    pub client_key_pem: Option<Vec<u8>>,
}

impl TlsPolicy {
    /// Policy that verifies the server against the system roots.
    pub fn verified() -> Self {
        Self::default()
    }

    /// Policy that accepts any server certificate.
    pub fn skip_verify() -> Self {
        Self {
            insecure_skip_verify: true,
            ..Self::default()
        }
    }

    /// Build a rustls client configuration for this policy.
    pub fn client_config(&self) -> MdbResult<ClientConfig> {
        let builder = if self.insecure_skip_verify {
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoCertVerifier))
        } else {
            ClientConfig::builder().with_root_certificates(self.root_store()?)
        };

        match (&self.client_cert_pem, &self.client_key_pem) {
            (Some(cert_pem), Some(key_pem)) => {
                let certs: Vec<CertificateDer<'static>> =
                    rustls_pemfile::certs(&mut cert_pem.as_slice())
                        .filter_map(|r| r.ok())
                        .collect();
                let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
                    .map_err(|e| MdbError::config(format!("invalid client key: {}", e)))?
                    .ok_or_else(|| MdbError::config("no private key found in PEM"))?;
                builder
                    .with_client_auth_cert(certs, key)
                    .map_err(|e| MdbError::config(format!("invalid client cert/key: {}", e)))
            }
            (None, None) => Ok(builder.with_no_client_auth()),
            _ => Err(MdbError::config(
                "client certificate and key must be configured together",
            )),
        }
    }

    /// Server name to present during the handshake.
    pub fn server_name(&self) -> MdbResult<ServerName<'static>> {
        let name = self
            .server_name
            .clone()
            .ok_or_else(|| MdbError::config("TLS policy has no server name"))?;
        ServerName::try_from(name)
            .map_err(|_| MdbError::config("invalid hostname for TLS"))
    }

    fn root_store(&self) -> MdbResult<RootCertStore> {
        let mut roots = RootCertStore::empty();
        if let Some(ca_pem) = &self.ca_cert_pem {
            for cert in rustls_pemfile::certs(&mut ca_pem.as_slice()).filter_map(|r| r.ok()) {
                roots
                    .add(cert)
                    .map_err(|e| MdbError::config(format!("invalid CA certificate: {}", e)))?;
            }
        } else {
            let certs = rustls_native_certs::load_native_certs();
            for cert in certs.certs {
                let _ = roots.add(cert);
            }
        }
        Ok(roots)
    }
}

/// Server public key (DER-encoded SubjectPublicKeyInfo) used for
/// password exchange over plaintext channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPubKey {
    der: Vec<u8>,
}

impl ServerPubKey {
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        Self { der: der.into() }
    }

    pub fn as_der(&self) -> &[u8] {
        &self.der
    }
}

/// Certificate verifier that accepts any certificate (`tls=skip-verify`).
#[derive(Debug)]
struct NoCertVerifier;

impl rustls::client::danger::ServerCertVerifier for NoCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
