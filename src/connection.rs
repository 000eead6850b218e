//! Internal module for opening TLS streams to IMAP servers.

use crate::error::{Error, Result};
use rustls::ClientConfig;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument};
use webpki_roots::TLS_SERVER_ROOTS;

/// A TLS stream over TCP, used for IMAP communication.
pub(crate) type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Opens a TCP connection to `host:port` and performs the TLS handshake (implicit TLS).
#[instrument(name = "connection::establish_tls", skip_all, fields(imap_host = %host, port))]
pub(crate) async fn establish_tls_connection(host: &str, port: u16) -> Result<TlsStream> {
    let target = format!("{host}:{port}");
    let server_name = parse_server_name(host)?;

    debug!(target = %target, "Opening TCP connection");
    let tcp_stream = TcpStream::connect(&target)
        .await
        .map_err(|source| Error::TcpConnect {
            target: target.clone(),
            source,
        })?;

    debug!("Performing TLS handshake");
    tls_connector()
        .connect(server_name, tcp_stream)
        .await
        .map_err(|source| Error::TlsConnect { target, source })
}

/// TLS connector trusting the webpki root store.
fn tls_connector() -> TlsConnector {
    let mut roots = rustls::RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|ta| {
        rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));

    let tls_config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(tls_config))
}

/// Parses server name for TLS SNI.
fn parse_server_name(host: &str) -> Result<rustls::ServerName> {
    rustls::ServerName::try_from(host).map_err(|source| Error::InvalidDnsName {
        host: host.to_string(),
        source,
    })
}
