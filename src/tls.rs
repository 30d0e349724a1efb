//! TLS client configuration built from the command-line inputs.
//!
//! Policy: if any of cert/key/CA is supplied, the client cert+key must load
//! as a pair or startup fails. The CA is best-effort — a load failure only
//! downgrades server verification to the default trust store.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{EventReporter, ProxyEvent};

/// Build the shared TLS client configuration used by every dial.
pub fn build_client_config(
    config: &Config,
    reporter: &dyn EventReporter,
) -> Result<Arc<ClientConfig>> {
    let wants_identity =
        config.client_cert.is_some() || config.client_key.is_some() || config.ca_cert.is_some();

    let identity = if wants_identity {
        Some(load_identity(
            config.client_cert.as_deref(),
            config.client_key.as_deref(),
        )?)
    } else {
        None
    };

    let roots = match &config.ca_cert {
        Some(path) => match load_ca_roots(path) {
            Ok(roots) => roots,
            Err(e) => {
                reporter.report(ProxyEvent::CaCertWarning {
                    path: path.clone(),
                    error: e.to_string(),
                });
                default_roots()
            }
        },
        None => default_roots(),
    };

    let builder = if config.no_verify {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(danger::NoVerify))
    } else {
        ClientConfig::builder().with_root_certificates(roots)
    };

    let tls_config = match identity {
        Some((certs, key)) => builder
            .with_client_auth_cert(certs, key)
            .map_err(|e| Error::Tls(format!("failed to build TLS client config: {e}")))?,
        None => builder.with_no_client_auth(),
    };

    Ok(Arc::new(tls_config))
}

/// Parse the client certificate chain and private key PEM files as a pair.
fn load_identity(
    cert_path: Option<&Path>,
    key_path: Option<&Path>,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let (Some(cert_path), Some(key_path)) = (cert_path, key_path) else {
        return Err(Error::Config(
            "client certificate and key must be supplied together".into(),
        ));
    };

    let cert_file = File::open(cert_path).map_err(|e| {
        Error::CertParse(format!(
            "failed to open certificate {}: {e}",
            cert_path.display()
        ))
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            Error::CertParse(format!(
                "failed to parse certificate {}: {e}",
                cert_path.display()
            ))
        })?;

    if certs.is_empty() {
        return Err(Error::CertParse(format!(
            "no certificates found in {}",
            cert_path.display()
        )));
    }

    let key_file = File::open(key_path).map_err(|e| {
        Error::CertParse(format!(
            "failed to open private key {}: {e}",
            key_path.display()
        ))
    })?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| {
            Error::CertParse(format!(
                "failed to parse private key {}: {e}",
                key_path.display()
            ))
        })?
        .ok_or_else(|| {
            Error::CertParse(format!("no private key found in {}", key_path.display()))
        })?;

    Ok((certs, key))
}

/// Parse a CA certificate PEM file into a root store.
fn load_ca_roots(path: &Path) -> Result<RootCertStore> {
    let file = File::open(path).map_err(|e| {
        Error::CertParse(format!("failed to open CA certificate {}: {e}", path.display()))
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            Error::CertParse(format!(
                "failed to parse CA certificate {}: {e}",
                path.display()
            ))
        })?;

    let mut roots = RootCertStore::empty();
    let (added, _) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(Error::CertParse(format!(
            "no usable certificates in {}",
            path.display()
        )));
    }

    Ok(roots)
}

/// Mozilla root store. rustls has no implicit system trust store, so this is
/// the fallback whenever no custom CA is in effect.
fn default_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

mod danger {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, SignatureScheme};

    /// Accepts any server certificate. Installed only for `--no-verify`.
    #[derive(Debug)]
    pub(super) struct NoVerify;

    impl ServerCertVerifier for NoVerify {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> std::result::Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            rustls::crypto::aws_lc_rs::default_provider()
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;
    use crate::config::LogFormat;
    use crate::events::test_support::RecordingReporter;

    fn test_config(
        no_verify: bool,
        cert: Option<PathBuf>,
        key: Option<PathBuf>,
        ca: Option<PathBuf>,
    ) -> Config {
        Config {
            remote_addr: "localhost:8443".into(),
            remote_host: "localhost".into(),
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            no_verify,
            ca_cert: ca,
            client_cert: cert,
            client_key: key,
            idle_timeout: None,
            log_format: LogFormat::Pretty,
        }
    }

    /// Write a self-signed cert and key as PEM files, returning their paths.
    fn write_identity(dir: &TempDir) -> (PathBuf, PathBuf) {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .self_signed(&key_pair)
            .unwrap();

        let cert_path = dir.path().join("client.crt");
        let key_path = dir.path().join("client.key");
        fs::write(&cert_path, cert.pem()).unwrap();
        fs::write(&key_path, key_pair.serialize_pem()).unwrap();
        (cert_path, key_path)
    }

    fn ca_warnings(reporter: &RecordingReporter) -> usize {
        reporter.count(|e| matches!(e, ProxyEvent::CaCertWarning { .. }))
    }

    #[test]
    fn builds_without_any_paths() {
        let reporter = RecordingReporter::new();
        let config = test_config(false, None, None, None);
        build_client_config(&config, &reporter).unwrap();
        assert!(reporter.events().is_empty());
    }

    #[test]
    fn builds_with_no_verify() {
        let reporter = RecordingReporter::new();
        let config = test_config(true, None, None, None);
        build_client_config(&config, &reporter).unwrap();
    }

    #[test]
    fn cert_without_key_is_fatal() {
        let dir = TempDir::new().unwrap();
        let (cert_path, _) = write_identity(&dir);

        let reporter = RecordingReporter::new();
        let config = test_config(false, Some(cert_path), None, None);
        let err = build_client_config(&config, &reporter).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn key_without_cert_is_fatal() {
        let dir = TempDir::new().unwrap();
        let (_, key_path) = write_identity(&dir);

        let reporter = RecordingReporter::new();
        let config = test_config(false, None, Some(key_path), None);
        let err = build_client_config(&config, &reporter).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn ca_alone_still_requires_identity() {
        let dir = TempDir::new().unwrap();
        let (ca_path, _) = write_identity(&dir);

        let reporter = RecordingReporter::new();
        let config = test_config(false, None, None, Some(ca_path));
        let err = build_client_config(&config, &reporter).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn valid_identity_builds_without_warning() {
        let dir = TempDir::new().unwrap();
        let (cert_path, key_path) = write_identity(&dir);

        let reporter = RecordingReporter::new();
        let config = test_config(false, Some(cert_path), Some(key_path), None);
        build_client_config(&config, &reporter).unwrap();
        assert_eq!(ca_warnings(&reporter), 0);
    }

    #[test]
    fn missing_ca_degrades_with_warning() {
        let dir = TempDir::new().unwrap();
        let (cert_path, key_path) = write_identity(&dir);
        let bogus_ca = dir.path().join("does-not-exist.pem");

        let reporter = RecordingReporter::new();
        let config = test_config(false, Some(cert_path), Some(key_path), Some(bogus_ca));
        build_client_config(&config, &reporter).unwrap();
        assert_eq!(ca_warnings(&reporter), 1);
    }

    #[test]
    fn unparseable_ca_degrades_with_warning() {
        let dir = TempDir::new().unwrap();
        let (cert_path, key_path) = write_identity(&dir);
        let junk_ca = dir.path().join("junk.pem");
        fs::write(&junk_ca, "not a certificate").unwrap();

        let reporter = RecordingReporter::new();
        let config = test_config(false, Some(cert_path), Some(key_path), Some(junk_ca));
        build_client_config(&config, &reporter).unwrap();
        assert_eq!(ca_warnings(&reporter), 1);
    }

    #[test]
    fn valid_ca_loads_without_warning() {
        let dir = TempDir::new().unwrap();
        let (cert_path, key_path) = write_identity(&dir);

        let reporter = RecordingReporter::new();
        let config = test_config(
            false,
            Some(cert_path.clone()),
            Some(key_path),
            Some(cert_path),
        );
        build_client_config(&config, &reporter).unwrap();
        assert_eq!(ca_warnings(&reporter), 0);
    }

    #[test]
    fn unparseable_certificate_is_fatal() {
        let dir = TempDir::new().unwrap();
        let (_, key_path) = write_identity(&dir);
        let junk_cert = dir.path().join("junk.crt");
        fs::write(&junk_cert, "not a certificate").unwrap();

        let reporter = RecordingReporter::new();
        let config = test_config(false, Some(junk_cert), Some(key_path), None);
        let err = build_client_config(&config, &reporter).unwrap_err();
        assert!(matches!(err, Error::CertParse(_)));
    }
}
