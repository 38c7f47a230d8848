//! Mutual TLS for the plugin channel
//!
//! go-plugin's AutoMTLS: the client generates a throwaway certificate and
//! hands its PEM to the plugin in `PLUGIN_CLIENT_CERT`. The plugin only
//! accepts connections presenting that certificate, and announces its own
//! self-signed certificate as the sixth handshake field (base64 DER).
//!
//! Both certificates are self-signed CAs used as leaves, which WebPKI path
//! validation rejects, so the server certificate is pinned byte for byte and
//! only the handshake signatures are verified against it. go-plugin signs with
//! P-521, hence the aws-lc-rs provider.

use crate::error::{PluginError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;

/// Name both sides put in their certificates
pub const PLUGIN_SERVER_NAME: &str = "localhost";

/// An ephemeral self-signed certificate and its private key
pub struct PluginCertificate {
    pem: String,
    der: CertificateDer<'static>,
    key: PrivatePkcs8KeyDer<'static>,
}

impl PluginCertificate {
    /// Generate a certificate shaped like go-plugin's own: a CA valid for
    /// `localhost` and usable for both client and server auth.
    pub fn generate() -> Result<Self> {
        let key_pair = KeyPair::generate().map_err(tls_error)?;

        let mut params =
            CertificateParams::new(vec![PLUGIN_SERVER_NAME.to_string()]).map_err(tls_error)?;
        params
            .distinguished_name
            .push(DnType::OrganizationName, "terradozer");
        params
            .distinguished_name
            .push(DnType::CommonName, PLUGIN_SERVER_NAME);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::KeyAgreement,
            KeyUsagePurpose::KeyCertSign,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];

        let cert = params.self_signed(&key_pair).map_err(tls_error)?;
        Ok(Self {
            pem: cert.pem(),
            der: cert.der().clone(),
            key: PrivatePkcs8KeyDer::from(key_pair.serialize_der()),
        })
    }

    /// PEM encoding, as passed in `PLUGIN_CLIENT_CERT`
    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }

    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(self.key.clone_key())
    }
}

/// Decode the certificate field of a handshake line.
///
/// go-plugin writes unpadded standard base64; padding is tolerated.
pub fn decode_server_cert(encoded: &str) -> Result<CertificateDer<'static>> {
    let der = STANDARD_NO_PAD
        .decode(encoded.trim().trim_end_matches('='))
        .map_err(|e| PluginError::Tls(format!("invalid server certificate: {}", e)))?;
    Ok(CertificateDer::from(der))
}

/// Client configuration that presents `client` and trusts only `server_cert`
pub fn client_config(
    client: &PluginCertificate,
    server_cert: CertificateDer<'static>,
) -> Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let verifier = PinnedServerCert {
        cert: server_cert,
        provider: provider.clone(),
    };

    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(tls_error)?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_client_auth_cert(vec![client.der().clone()], client.private_key())
        .map_err(tls_error)?;
    config.alpn_protocols = vec![b"h2".to_vec()];
    Ok(config)
}

/// Accepts exactly one certificate
#[derive(Debug)]
struct PinnedServerCert {
    cert: CertificateDer<'static>,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for PinnedServerCert {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        if end_entity.as_ref() == self.cert.as_ref() {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn tls_error(err: impl std::fmt::Display) -> PluginError {
    PluginError::Tls(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Generated certificates are PEM for the plugin and DER for rustls
    #[test]
    fn test_generate_certificate() {
        let cert = PluginCertificate::generate().unwrap();
        assert!(cert.pem().starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(!cert.der().as_ref().is_empty());

        let other = PluginCertificate::generate().unwrap();
        assert_ne!(cert.der(), other.der());
    }

    /// The handshake field decodes with or without padding
    #[test]
    fn test_decode_server_cert() {
        let cert = PluginCertificate::generate().unwrap();
        let unpadded = STANDARD_NO_PAD.encode(cert.der());
        let padded = base64::engine::general_purpose::STANDARD.encode(cert.der());

        assert_eq!(&decode_server_cert(&unpadded).unwrap(), cert.der());
        assert_eq!(&decode_server_cert(&padded).unwrap(), cert.der());
        assert!(matches!(
            decode_server_cert("not base64!"),
            Err(PluginError::Tls(_))
        ));
    }

    /// Only the pinned certificate is accepted
    #[test]
    fn test_pinned_server_cert() {
        let pinned = PluginCertificate::generate().unwrap();
        let other = PluginCertificate::generate().unwrap();
        let verifier = PinnedServerCert {
            cert: pinned.der().clone(),
            provider: Arc::new(rustls::crypto::aws_lc_rs::default_provider()),
        };
        let name = ServerName::try_from(PLUGIN_SERVER_NAME).unwrap();

        assert!(
            verifier
                .verify_server_cert(pinned.der(), &[], &name, &[], UnixTime::now())
                .is_ok()
        );
        assert!(
            verifier
                .verify_server_cert(other.der(), &[], &name, &[], UnixTime::now())
                .is_err()
        );
    }

    /// The client config accepts the generated key and negotiates h2
    #[test]
    fn test_client_config() {
        let client = PluginCertificate::generate().unwrap();
        let server = PluginCertificate::generate().unwrap();

        let config = client_config(&client, server.der().clone()).unwrap();

        assert_eq!(config.alpn_protocols, vec![b"h2".to_vec()]);
    }
}
