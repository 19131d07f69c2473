//! TLS wrapping for server connections, available behind the `ssl` feature.
use Error::DefaultError;
use Result;

use connstring::ConnectionString;
use openssl::ssl::{SslConnector, SslFiletype, SslMethod, SslStream, SslVerifyMode};
use std::net::TcpStream;

/// TLS parameters taken from the connection settings.
#[derive(Clone, Debug)]
pub struct SslConfig {
    /// Path to a file containing the list of trusted CA certificates.
    pub ca_file: Option<String>,
    /// Path to a PEM file containing the client certificate and private key.
    pub pem_key_file: Option<String>,
    /// Whether the peer certificate should be verified.
    pub verify_peer: bool,
}

impl SslConfig {
    pub fn from_connection_string(config: &ConnectionString) -> SslConfig {
        SslConfig {
            ca_file: config.ssl_ca_file.clone(),
            pem_key_file: config.ssl_pem_key_file.clone(),
            verify_peer: config.ssl_verify_certificate,
        }
    }
}

/// Performs the TLS handshake over an established TCP stream.
pub fn connect(
    host_name: &str,
    stream: TcpStream,
    config: &SslConfig,
) -> Result<SslStream<TcpStream>> {
    let mut builder = SslConnector::builder(SslMethod::tls())
        .map_err(|err| DefaultError(format!("could not initialize TLS: {}", err)))?;

    if let Some(ref ca_file) = config.ca_file {
        builder
            .set_ca_file(ca_file)
            .map_err(|err| DefaultError(format!("could not load CA file: {}", err)))?;
    }
    if let Some(ref pem_file) = config.pem_key_file {
        builder
            .set_certificate_file(pem_file, SslFiletype::PEM)
            .and_then(|_| builder.set_private_key_file(pem_file, SslFiletype::PEM))
            .map_err(|err| DefaultError(format!("could not load PEM key file: {}", err)))?;
    }
    if !config.verify_peer {
        builder.set_verify(SslVerifyMode::NONE);
    }

    let connector = builder.build();
    let mut session = connector
        .configure()
        .map_err(|err| DefaultError(format!("could not configure TLS: {}", err)))?;
    session.set_verify_hostname(config.verify_peer);

    session
        .connect(host_name, stream)
        .map_err(|err| DefaultError(format!("TLS handshake with {} failed: {}", host_name, err)))
}
