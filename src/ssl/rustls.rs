use super::{Error, Result};
use rustls::{
    Certificate, ClientConfig, ClientConnection, Connection, OwnedTrustAnchor, PrivateKey,
    RootCertStore, ServerConfig, ServerConnection, ServerName,
};
use std::convert::TryFrom as _;
use std::io::{self, Write as _};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

const TLS_READ_BUFFER_SIZE: usize = 16 * 1024;

fn certs(pem: &[u8]) -> Result<Vec<Certificate>> {
    Ok(rustls_pemfile::certs(&mut io::BufReader::new(pem))?
        .into_iter()
        .map(Certificate)
        .collect())
}

fn private_key(pem: &[u8]) -> Result<PrivateKey> {
    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut io::BufReader::new(pem))?;
    if keys.is_empty() {
        keys = rustls_pemfile::rsa_private_keys(&mut io::BufReader::new(pem))?;
    }
    keys.into_iter()
        .next()
        .map(PrivateKey)
        .ok_or_else(|| Error("no private key found".into()))
}

/// TLS configuration for the client-facing leg, presenting `cert_chain_pem`.
pub fn server_config(cert_chain_pem: &[u8], private_key_pem: &[u8]) -> Result<Arc<ServerConfig>> {
    let certs = certs(cert_chain_pem)?;
    if certs.is_empty() {
        return Err(Error("no certificate found".into()));
    }
    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, private_key(private_key_pem)?)?;
    Ok(Arc::new(config))
}

fn root_store(extra_roots_pem: Option<&[u8]>) -> Result<RootCertStore> {
    let mut root_store = RootCertStore::empty();
    root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));

    if let Some(pem) = extra_roots_pem {
        for c in certs(pem)? {
            root_store.add(&c).map_err(|e| Error(e.to_string()))?;
        }
    }

    Ok(root_store)
}

/// TLS configuration for the target-facing leg. Trusts the webpki roots plus
/// any certificates in `extra_roots_pem`.
pub fn client_config(extra_roots_pem: Option<&[u8]>) -> Result<Arc<ClientConfig>> {
    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store(extra_roots_pem)?)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Completes a TLS handshake as the server on `socket`.
pub fn accept(socket: TcpStream, config: Arc<ServerConfig>) -> Result<TlsSession> {
    let conn = ServerConnection::new(config)?;
    TlsSession::handshake(Connection::Server(conn), socket)
}

/// Completes a TLS handshake as the client of `server_name` on `socket`.
pub fn connect(socket: TcpStream, server_name: &str, config: Arc<ClientConfig>) -> Result<TlsSession> {
    let name = ServerName::try_from(server_name)?;
    let conn = ClientConnection::new(config, name)?;
    TlsSession::handshake(Connection::Client(conn), socket)
}

/// An established TLS connection over a TCP stream.
pub struct TlsSession {
    conn: Connection,
    socket: TcpStream,
}

impl TlsSession {
    fn handshake(mut conn: Connection, mut socket: TcpStream) -> Result<Self> {
        'outer: while conn.is_handshaking() {
            while conn.wants_write() {
                conn.write_tls(&mut socket)?;
            }

            while conn.is_handshaking() && conn.wants_read() {
                if conn.read_tls(&mut socket)? == 0 {
                    break 'outer;
                }
                if let Err(e) = conn.process_new_packets() {
                    // Let the peer know why.
                    let _ = conn.write_tls(&mut socket);
                    return Err(e.into());
                }
            }
        }

        if conn.is_handshaking() {
            return Err(Error("SSL handshake failed".into()));
        }

        while conn.wants_write() {
            conn.write_tls(&mut socket)?;
        }

        trace!(peer = ?socket.peer_addr().ok(), "TLS handshake complete");
        Ok(Self { conn, socket })
    }

    /// The SNI host name the client asked for, on server-side sessions.
    pub fn server_name(&self) -> Option<&str> {
        match &self.conn {
            Connection::Server(conn) => conn.server_name(),
            Connection::Client(_) => None,
        }
    }

    /// Splits the session so that one thread can read from it while another
    /// writes to it.
    pub fn split(self) -> (TlsReader, TlsWriter) {
        let shared = Arc::new(Shared {
            conn: Mutex::new(self.conn),
            socket: self.socket,
            writing: Mutex::new(()),
        });
        let reader = TlsReader {
            shared: shared.clone(),
            incoming: vec![0; TLS_READ_BUFFER_SIZE],
            start: 0,
            end: 0,
        };
        (reader, TlsWriter { shared })
    }
}

struct Shared {
    conn: Mutex<Connection>,
    socket: TcpStream,
    // Held while records go out so they reach the socket in the order they
    // were produced.
    writing: Mutex<()>,
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "TLS session lock poisoned")
}

impl Shared {
    fn session(&self) -> io::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| poisoned())
    }

    /// Sends the records `conn` has queued. The session lock is released
    /// before the socket write so the reading side is never stuck behind it.
    fn send_pending(&self, mut conn: MutexGuard<'_, Connection>) -> io::Result<()> {
        let mut records = Vec::new();
        while conn.wants_write() {
            conn.write_tls(&mut records)?;
        }
        if records.is_empty() {
            return Ok(());
        }
        let _writing = self.writing.lock().map_err(|_| poisoned())?;
        drop(conn);
        (&self.socket).write_all(&records)
    }

    fn shutdown(&self, how: Shutdown) {
        if let Err(e) = self.socket.shutdown(how) {
            trace!(?how, error = %e, "socket shutdown failed");
        }
    }
}

/// Plaintext reading half of a [`TlsSession`].
pub struct TlsReader {
    shared: Arc<Shared>,
    incoming: Vec<u8>,
    start: usize,
    end: usize,
}

impl TlsReader {
    /// Stops reading from the peer.
    pub fn close(&self) {
        self.shared.shutdown(Shutdown::Read);
    }

    /// Tears down the whole connection, unblocking its other half.
    pub fn abort(&self) {
        self.shared.shutdown(Shutdown::Both);
    }
}

impl io::Read for TlsReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match io::Read::read(&mut self.shared.session()?.reader(), buf) {
                Ok(read) => return Ok(read),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }

            if self.start == self.end {
                let received = io::Read::read(&mut &self.shared.socket, &mut self.incoming)?;
                if received == 0 {
                    debug!("peer closed the connection without close_notify");
                    return Ok(0);
                }
                self.start = 0;
                self.end = received;
            }

            let mut conn = self.shared.session()?;
            let mut tls = &self.incoming[self.start..self.end];
            self.start += conn.read_tls(&mut tls)?;
            let processed = conn.process_new_packets();
            self.shared.send_pending(conn)?;
            if let Err(e) = processed {
                return Err(io::Error::new(io::ErrorKind::InvalidData, e));
            }
        }
    }
}

/// Plaintext writing half of a [`TlsSession`].
pub struct TlsWriter {
    shared: Arc<Shared>,
}

impl TlsWriter {
    /// Sends close_notify and shuts down the write side of the socket.
    pub fn close(&mut self) {
        match self.shared.session() {
            Ok(mut conn) => {
                conn.send_close_notify();
                if let Err(e) = self.shared.send_pending(conn) {
                    trace!(error = %e, "failed to send close_notify");
                }
            }
            Err(e) => trace!(error = %e, "failed to send close_notify"),
        }
        self.shared.shutdown(Shutdown::Write);
    }

    /// Tears down the whole connection, unblocking its other half.
    pub fn abort(&self) {
        self.shared.shutdown(Shutdown::Both);
    }
}

impl io::Write for TlsWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut conn = self.shared.session()?;
        let written = conn.writer().write(buf)?;
        self.shared.send_pending(conn)?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut conn = self.shared.session()?;
        conn.writer().flush()?;
        self.shared.send_pending(conn)
    }
}

impl From<rustls::client::InvalidDnsNameError> for Error {
    fn from(e: rustls::client::InvalidDnsNameError) -> Self {
        Self(e.to_string())
    }
}

impl From<rustls::Error> for Error {
    fn from(e: rustls::Error) -> Self {
        Self(e.to_string())
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self(e.to_string())
    }
}
