//! TLS contexts: an acceptor terminating the victim's TLS with the proxy
//! certificate, and a connector towards the real server that accepts any
//! certificate (the proxy is not in the business of trusting its target).

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use tokio_rustls::rustls::{Certificate, ClientConfig, PrivateKey, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};

pub fn make_acceptor(cert_path: &Path, key_path: &Path) -> anyhow::Result<TlsAcceptor> {
    let certs = load_certs(cert_path).with_context(|| format!("loading certificate {}", cert_path.display()))?;
    let key = load_key(key_path).with_context(|| format!("loading private key {}", key_path.display()))?;

    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid certificate/key pair")?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

pub fn make_connector() -> TlsConnector {
    let mut config = ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(danger::NoCertificateVerification))
        .with_no_client_auth();

    // This adds support for the SSLKEYLOGFILE env variable
    // (https://wiki.wireshark.org/TLS#using-the-pre-master-secret)
    config.key_log = Arc::new(tokio_rustls::rustls::KeyLogFile::new());

    TlsConnector::from(Arc::new(config))
}

fn load_certs(path: &Path) -> io::Result<Vec<Certificate>> {
    let file = std::fs::File::open(path)?;
    let mut reader = io::BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)?;
    if certs.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "no certificate found"));
    }

    Ok(certs.into_iter().map(Certificate).collect())
}

fn load_key(path: &Path) -> io::Result<PrivateKey> {
    let file = std::fs::File::open(path)?;
    let mut reader = io::BufReader::new(file);

    for item in rustls_pemfile::read_all(&mut reader)? {
        match item {
            rustls_pemfile::Item::PKCS8Key(key)
            | rustls_pemfile::Item::RSAKey(key)
            | rustls_pemfile::Item::ECKey(key) => return Ok(PrivateKey(key)),
            _ => continue,
        }
    }

    Err(io::Error::new(io::ErrorKind::InvalidData, "no private key found"))
}

mod danger {
    use std::time::SystemTime;

    use tokio_rustls::rustls::client::{ServerCertVerified, ServerCertVerifier};
    use tokio_rustls::rustls::{Certificate, Error, ServerName};

    pub(super) struct NoCertificateVerification;

    impl ServerCertVerifier for NoCertificateVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &Certificate,
            _intermediates: &[Certificate],
            _server_name: &ServerName,
            _scts: &mut dyn Iterator<Item = &[u8]>,
            _ocsp_response: &[u8],
            _now: SystemTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }
    }
}
