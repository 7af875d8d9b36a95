//! TLS client configuration.
//!
//! A [`TlsContext`] is an immutable, shareable `rustls` client configuration. It is built
//! from one of several inputs, which [`resolve`] picks in a fixed order of precedence:
//!
//! 1. a caller supplied context
//! 2. client certificate, client key and CA certificate (mutual TLS)
//! 3. a CA certificate alone (server verification against that CA)
//! 4. the insecure flag (no server verification at all)
//! 5. nothing, in which case `https` URLs are verified against the bundled web PKI roots
//!
//! Supplying a client certificate without its key, or a key without a CA, is a configuration
//! error rather than a silent downgrade.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, warn};

use crate::error::{ClientError, ConfigurationError, TlsError};
use crate::options::TlsOptions;

/// Where a [`TlsContext`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsSource {
    Provided,
    MutualTls,
    CaOnly,
    Insecure,
    DefaultRoots,
}

#[derive(Debug, Clone)]
pub struct TlsContext {
    config: Arc<ClientConfig>,
    source: TlsSource,
}

impl TlsContext {
    /// Wraps a configuration built elsewhere.
    pub fn from_client_config(config: Arc<ClientConfig>) -> Self {
        Self { config, source: TlsSource::Provided }
    }

    /// Presents `cert`/`key` as client identity and trusts only the certificates in `ca`.
    pub fn from_mutual_tls<C: Read, K: Read, A: Read>(cert: C, key: K, ca: A) -> Result<Self, TlsError> {
        let chain = read_certificates(cert, "client certificate")?;
        let key = read_private_key(key)?;
        let roots = read_root_store(ca)?;

        let config = builder()?.with_root_certificates(roots).with_client_auth_cert(chain, key)?;
        Ok(Self { config: Arc::new(config), source: TlsSource::MutualTls })
    }

    /// Trusts only the certificates in `ca`, without a client identity.
    pub fn from_ca_only<A: Read>(ca: A) -> Result<Self, TlsError> {
        let roots = read_root_store(ca)?;
        let config = builder()?.with_root_certificates(roots).with_no_client_auth();
        Ok(Self { config: Arc::new(config), source: TlsSource::CaOnly })
    }

    /// Accepts any server certificate for any host name. Handshake signatures are still checked.
    pub fn insecure() -> Result<Self, TlsError> {
        let provider = provider();
        let verifier = AcceptAnyServerCert { algorithms: provider.signature_verification_algorithms };
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();
        Ok(Self { config: Arc::new(config), source: TlsSource::Insecure })
    }

    /// Verifies servers against the Mozilla root program, as bundled by `webpki-roots`.
    pub fn with_default_roots() -> Result<Self, TlsError> {
        let roots = RootCertStore { roots: webpki_roots::TLS_SERVER_ROOTS.to_vec() };
        let config = builder()?.with_root_certificates(roots).with_no_client_auth();
        Ok(Self { config: Arc::new(config), source: TlsSource::DefaultRoots })
    }

    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.config)
    }

    pub fn source(&self) -> TlsSource {
        self.source
    }
}

/// Picks the TLS context for a request, see the module docs for the order.
pub fn resolve(options: TlsOptions) -> Result<Option<TlsContext>, ClientError> {
    let TlsOptions { context, cert, key, ca_cert, insecure } = options;

    if let Some(context) = context {
        return Ok(Some(context));
    }

    let context = match (cert, key, ca_cert) {
        (Some(cert), Some(key), Some(ca)) => {
            debug!(cert = %cert.display(), ca = %ca.display(), "using mutual tls");
            TlsContext::from_mutual_tls(open(&cert, "client certificate")?, open(&key, "client key")?, open(&ca, "ca certificate")?)?
        }
        (None, None, Some(ca)) => {
            debug!(ca = %ca.display(), "using custom ca");
            TlsContext::from_ca_only(open(&ca, "ca certificate")?)?
        }
        (None, None, None) if insecure => {
            warn!("server certificate verification is disabled");
            TlsContext::insecure()?
        }
        (None, None, None) => return Ok(None),
        (Some(_), None, _) => return Err(incomplete("client certificate given without client key")),
        (None, Some(_), _) => return Err(incomplete("client key given without client certificate")),
        (Some(_), Some(_), None) => return Err(incomplete("client certificate and key given without ca certificate")),
    };
    Ok(Some(context))
}

fn incomplete(reason: &'static str) -> ClientError {
    ConfigurationError::IncompleteTlsCredentials { reason }.into()
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn builder() -> Result<rustls::ConfigBuilder<ClientConfig, rustls::WantsVerifier>, TlsError> {
    Ok(ClientConfig::builder_with_provider(provider()).with_safe_default_protocol_versions()?)
}

fn open(path: &Path, what: &'static str) -> Result<File, TlsError> {
    File::open(path).map_err(|e| TlsError::credential_parse(what, format!("{}: {e}", path.display())))
}

fn read_certificates<R: Read>(reader: R, what: &'static str) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = CertificateDer::pem_reader_iter(BufReader::new(reader))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::credential_parse(what, e))?;
    if certs.is_empty() {
        return Err(TlsError::credential_parse(what, "no certificate found"));
    }
    Ok(certs)
}

fn read_private_key<R: Read>(reader: R) -> Result<PrivateKeyDer<'static>, TlsError> {
    PrivateKeyDer::from_pem_reader(BufReader::new(reader)).map_err(|e| TlsError::credential_parse("client key", e))
}

fn read_root_store<R: Read>(reader: R) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in read_certificates(reader, "ca certificate")? {
        roots.add(cert)?;
    }
    Ok(roots)
}

struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl fmt::Debug for AcceptAnyServerCert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AcceptAnyServerCert")
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
