// src/server/listener.rs

//! The TLS-terminating listener used when `USE_SSL` is enabled.

use crate::config::Config;
use crate::core::errors::RampartError;
use axum::extract::connect_info::Connected;
use axum::serve::{IncomingStream, Listener};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::server::TlsStream;
use tokio_rustls::{TlsAcceptor, rustls};
use tracing::warn;

/// Accepts TCP connections and performs the TLS handshake before handing
/// the stream to the HTTP server. Handshake failures are logged and the
/// connection dropped; the accept loop never stops.
pub struct TlsListener {
    inner: TcpListener,
    acceptor: TlsAcceptor,
}

impl TlsListener {
    pub fn new(inner: TcpListener, acceptor: TlsAcceptor) -> Self {
        Self { inner, acceptor }
    }
}

impl Listener for TlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.inner.accept().await {
                Ok((stream, addr)) => match self.acceptor.accept(stream).await {
                    Ok(tls_stream) => return (tls_stream, addr),
                    Err(e) => warn!("TLS handshake failed from {}: {}", addr, e),
                },
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

/// Peer address handed to extractors via `ConnectInfo`. A local newtype is
/// required because `axum`'s blanket `Connected` impls only cover its own
/// listener types, and the orphan rules forbid implementing a foreign trait
/// for a foreign type against our custom `TlsListener`.
#[derive(Clone, Copy, Debug)]
pub struct ClientAddr(pub SocketAddr);

impl Connected<IncomingStream<'_, TlsListener>> for ClientAddr {
    fn connect_info(target: IncomingStream<'_, TlsListener>) -> Self {
        ClientAddr(*target.remote_addr())
    }
}

impl Connected<IncomingStream<'_, TcpListener>> for ClientAddr {
    fn connect_info(target: IncomingStream<'_, TcpListener>) -> Self {
        ClientAddr(*target.remote_addr())
    }
}

/// Builds the TLS acceptor from the configured certificate and key files.
pub fn build_acceptor(config: &Config) -> Result<TlsAcceptor, RampartError> {
    let certs = load_certs(&config.ssl_cert)?;
    let key = load_key(&config.ssl_key)?;
    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| RampartError::Config(format!("invalid TLS certificate/key pair: {e}")))?;
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

/// Loads TLS certificates from a PEM file.
fn load_certs(path: &str) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>, RampartError> {
    let cert_file = File::open(path)
        .map_err(|e| RampartError::Config(format!("failed to open certificate file '{path}': {e}")))?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RampartError::Config(format!("failed to parse certificates in '{path}': {e}")))?;
    if certs.is_empty() {
        return Err(RampartError::Config(format!(
            "no certificates found in '{path}'"
        )));
    }
    Ok(certs)
}

/// Loads a private key from a PEM file.
fn load_key(path: &str) -> Result<rustls::pki_types::PrivateKeyDer<'static>, RampartError> {
    let key_file = File::open(path)
        .map_err(|e| RampartError::Config(format!("failed to open private key file '{path}': {e}")))?;
    let mut key_reader = BufReader::new(key_file);
    rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| RampartError::Config(format!("failed to parse private key in '{path}': {e}")))?
        .ok_or_else(|| RampartError::Config(format!("no private key found in '{path}'")))
}
