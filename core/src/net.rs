/*
 * net.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Postiglione, a networking toolkit.
 *
 * Postiglione is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Postiglione is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Postiglione.  If not, see <http://www.gnu.org/licenses/>.
 */

//! TLS helpers: rustls client configuration and the TLS handshake over an open TcpStream.
//!
//! Without a certificate validator the platform roots are used (webpki-roots as fallback).
//! With one, the caller decides whether a presented chain is acceptable; handshake signatures
//! are still checked with the crypto provider.

use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::client::ResolvesClientCert;
use tokio_rustls::rustls::client::ClientConfig;
use tokio_rustls::rustls::crypto::{self, CryptoProvider};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{self, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;

/// Decides whether the certificate chain presented by `host` is accepted.
/// `chain[0]` is the end-entity certificate, followed by any intermediates.
pub trait CertificateValidator: Send + Sync {
    fn validate(&self, host: &str, chain: &[CertificateDer<'_>]) -> bool;
}

impl<F> CertificateValidator for F
where
    F: Fn(&str, &[CertificateDer<'_>]) -> bool + Send + Sync,
{
    fn validate(&self, host: &str, chain: &[CertificateDer<'_>]) -> bool {
        self(host, chain)
    }
}

/// TLS settings of a client: optional validator and optional client-certificate selector.
#[derive(Clone, Default)]
pub struct TlsOptions {
    pub validator: Option<Arc<dyn CertificateValidator>>,
    pub client_cert: Option<Arc<dyn ResolvesClientCert>>,
}

impl fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsOptions")
            .field("validator", &self.validator.is_some())
            .field("client_cert", &self.client_cert.is_some())
            .finish()
    }
}

/// Build a root certificate store: platform native certs first, then webpki-roots as fallback.
fn build_root_store() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            for cert in certs {
                let _ = root_store.add(cert);
            }
        }
        Err(e) => tracing::debug!(error = %e, "could not load native certificates"),
    }
    if root_store.is_empty() {
        root_store.roots = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    }
    root_store
}

fn provider() -> Arc<CryptoProvider> {
    match CryptoProvider::get_default() {
        Some(p) => p.clone(),
        None => Arc::new(crypto::aws_lc_rs::default_provider()),
    }
}

/// Adapts a `CertificateValidator` to rustls' verifier interface.
struct CallbackVerifier {
    validator: Arc<dyn CertificateValidator>,
    provider: Arc<CryptoProvider>,
}

impl fmt::Debug for CallbackVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallbackVerifier")
    }
}

impl ServerCertVerifier for CallbackVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let mut chain = Vec::with_capacity(1 + intermediates.len());
        chain.push(end_entity.clone());
        chain.extend(intermediates.iter().cloned());
        let host = server_name.to_str();
        if self.validator.validate(&host, &chain) {
            Ok(ServerCertVerified::assertion())
        } else {
            tracing::warn!(host = %host, "server certificate rejected by validator");
            Err(rustls::Error::General(format!(
                "certificate for {} rejected by validator",
                host
            )))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(
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
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(
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

/// TLS client config for HTTP/1.1 (ALPN `http/1.1`) honouring the given options.
pub fn http_client_config(options: &TlsOptions) -> io::Result<Arc<ClientConfig>> {
    let provider = provider();
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let builder = match &options.validator {
        Some(validator) => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(CallbackVerifier {
                validator: validator.clone(),
                provider,
            })),
        None => builder.with_root_certificates(build_root_store()),
    };
    let mut config = match &options.client_cert {
        Some(resolver) => builder.with_client_cert_resolver(resolver.clone()),
        None => builder.with_no_client_auth(),
    };
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// Perform the TLS handshake for `host` over an established TCP stream.
pub async fn handshake(
    config: Arc<ClientConfig>,
    host: &str,
    tcp: TcpStream,
) -> io::Result<TlsStream<TcpStream>> {
    let unbracketed = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    let server_name = ServerName::try_from(unbracketed.to_string())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid host name"))?;
    TlsConnector::from(config)
        .connect(server_name, tcp)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::ConnectionRefused, e))
}
