//! The intercepting forward proxy.
//!
//! Clients send a plaintext `CONNECT host:port` request. The proxy asks its
//! [`ConnectionInterceptor`] whether and where to connect, answers
//! `200 Connection Established`, then terminates TLS with the client and
//! opens its own TLS connection to the target. The decrypted traffic is
//! parsed in both directions, shown to the interceptor and forwarded.
//!
//! Each client connection gets its own thread, which pumps responses while a
//! second, scoped thread pumps requests.
use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::interceptor::{ConnectionInfo, ConnectionInterceptor};
use crate::parser::{BodyBytesType, Http1MessageParser, MessageListener, RequestQueue};
use crate::pipe::pipe;
use crate::protocol::{HttpMessage, HttpMessageType, HttpRequest};
use crate::ssl::{self, TlsReader, TlsWriter};
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";
const METHOD_NOT_ALLOWED: &[u8] = b"HTTP/1.1 405 Method Not Allowed\r\n\r\n";
const VERSION_NOT_SUPPORTED: &[u8] = b"HTTP/1.1 505 HTTP Version Not Supported\r\n\r\n";

pub struct InterceptingProxy {
    address: SocketAddr,
    running: Arc<AtomicBool>,
    acceptor: Option<thread::JoinHandle<()>>,
}

impl InterceptingProxy {
    /// Binds the listening socket and starts accepting clients.
    pub fn start<I: ConnectionInterceptor>(config: ProxyConfig, interceptor: I) -> Result<Self> {
        let listener = TcpListener::bind(config.socket_address())?;
        let address = listener.local_addr()?;
        let running = Arc::new(AtomicBool::new(true));

        let acceptor = {
            let running = running.clone();
            let config = Arc::new(config);
            let interceptor: Arc<dyn ConnectionInterceptor> = Arc::new(interceptor);
            thread::Builder::new()
                .name("proxy-acceptor-thread".into())
                .spawn(move || accept_loop(listener, &running, config, interceptor))?
        };

        info!(%address, "intercepting proxy started");
        Ok(InterceptingProxy {
            address,
            running,
            acceptor: Some(acceptor),
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Blocks until the acceptor thread exits.
    pub fn wait(mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            if acceptor.join().is_err() {
                error!("acceptor thread panicked");
            }
        }
    }

    /// Stops accepting new clients. Connections already being intercepted
    /// run until either side closes them.
    pub fn close(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        // The acceptor only notices the flag once accept returns.
        let mut wake_address = self.address;
        if wake_address.ip().is_unspecified() {
            wake_address.set_ip(match wake_address.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            });
        }
        match TcpStream::connect(wake_address) {
            Ok(_) => {
                if let Some(acceptor) = self.acceptor.take() {
                    if acceptor.join().is_err() {
                        error!("acceptor thread panicked");
                    }
                }
            }
            Err(e) => warn!(error = %e, "failed to wake the acceptor thread"),
        }
        info!(address = %self.address, "intercepting proxy closed");
    }
}

impl Drop for InterceptingProxy {
    fn drop(&mut self) {
        self.close();
    }
}

fn accept_loop(
    listener: TcpListener,
    running: &AtomicBool,
    config: Arc<ProxyConfig>,
    interceptor: Arc<dyn ConnectionInterceptor>,
) {
    for stream in listener.incoming() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let client = match stream {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "error while waiting for a client");
                continue;
            }
        };

        let config = config.clone();
        let interceptor = interceptor.clone();
        let spawned = thread::Builder::new()
            .name("proxy-connection".into())
            .spawn(move || {
                if let Err(e) = handle_client(client, &config, &*interceptor) {
                    warn!(error = %e, "error while handling a client");
                }
            });
        if let Err(e) = spawned {
            error!(error = %e, "failed to spawn a connection thread");
        }
    }
    debug!("acceptor thread exiting");
}

#[derive(Default)]
struct ConnectHead {
    request: Option<HttpRequest>,
    ended: bool,
}

impl MessageListener for ConnectHead {
    fn on_headers(&mut self, message: &mut HttpMessage) -> Result<()> {
        self.request = message.as_request().cloned();
        Ok(())
    }

    fn on_body_bytes(&mut self, _: &HttpMessage, _: BodyBytesType, _: &[u8]) -> Result<()> {
        Ok(())
    }

    fn on_message_ended(&mut self, _: &HttpMessage) -> Result<()> {
        self.ended = true;
        Ok(())
    }

    fn on_error(&mut self, _: &HttpMessage, _: &Error) {}
}

/// Reads the plaintext request a client opens with, one byte at a time so
/// that nothing after it is consumed. `None` if the client closed first.
fn read_connect_head(client: &TcpStream, max_bytes: usize) -> Result<Option<HttpRequest>> {
    let mut parser = Http1MessageParser::new(HttpMessageType::Request, RequestQueue::new());
    let mut head = ConnectHead::default();
    let mut source = client;
    let mut byte = [0u8; 1];
    let mut read = 0;
    while !head.ended {
        match source.read(&mut byte) {
            Ok(0) => {
                parser.eof(&mut head)?;
                return Ok(None);
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
        read += 1;
        if read > max_bytes {
            return Err(Error::TokenTooLong(max_bytes));
        }
        parser.feed(&byte, &mut head)?;
    }
    Ok(head.request)
}

fn handle_client(
    client: TcpStream,
    config: &ProxyConfig,
    interceptor: &dyn ConnectionInterceptor,
) -> Result<()> {
    let peer = client.peer_addr()?;
    client.set_read_timeout(config.read_timeout)?;

    let request = match read_connect_head(&client, config.max_connect_head_bytes)? {
        Some(request) => request,
        None => {
            debug!(%peer, "client closed without sending a request");
            return Ok(());
        }
    };
    info!(%peer, method = %request.method, upstream = %request.url, "handling client");

    let info = match interceptor.accept_connection(
        peer,
        &request.method,
        &request.url,
        &request.http_version,
    ) {
        Some(info) => info,
        None => {
            debug!(%peer, upstream = %request.url, "connection rejected");
            return Ok(());
        }
    };

    if request.http_version != "HTTP/1.1" && request.http_version != "HTTP/1.0" {
        (&client).write_all(VERSION_NOT_SUPPORTED)?;
        return Ok(());
    }
    if request.method != "CONNECT" {
        (&client).write_all(METHOD_NOT_ALLOWED)?;
        return Ok(());
    }

    intercept(client, &info, config, interceptor)
}

fn intercept(
    client: TcpStream,
    info: &ConnectionInfo,
    config: &ProxyConfig,
    interceptor: &dyn ConnectionInterceptor,
) -> Result<()> {
    let target = TcpStream::connect(info.target())?;
    target.set_read_timeout(config.read_timeout)?;
    (&client).write_all(CONNECTION_ESTABLISHED)?;

    let client_tls = ssl::accept(client, info.server_tls())?;
    let server_name = match client_tls.server_name() {
        Some(name) if config.proxy_server_names => name.to_owned(),
        _ => info.target().host().to_owned(),
    };
    let target_tls = ssl::connect(target, &server_name, info.client_tls())?;
    debug!(upstream = %info.target(), %server_name, "TLS established with client and target");

    let (client_reader, client_writer) = client_tls.split();
    let (target_reader, target_writer) = target_tls.split();
    let queue = RequestQueue::new();

    let (client_to_target, target_to_client) = thread::scope(|scope| {
        let requests = scope.spawn(|| {
            forward_requests(info, interceptor, queue.clone(), client_reader, target_writer)
        });
        let responses =
            forward_responses(info, interceptor, queue.clone(), target_reader, client_writer);
        let requests = requests.join().unwrap_or_else(|_| {
            Err(Error::IoError(io::Error::new(
                io::ErrorKind::Other,
                "request forwarding thread panicked",
            )))
        });
        (requests, responses)
    });

    info!(upstream = %info.target(), "connection ended");
    interceptor.on_connection_ended(
        info,
        client_to_target.as_ref().err(),
        target_to_client.as_ref().err(),
    );
    Ok(())
}

/// Closes the legs a finished direction was using. On failure the whole
/// connection goes down so the other direction stops too.
fn finish(
    direction: &str,
    result: Result<()>,
    source: &TlsReader,
    destination: &mut TlsWriter,
) -> Result<()> {
    match &result {
        Ok(()) => {
            debug!(direction, "stream ended");
            source.close();
            destination.close();
        }
        Err(error) => {
            debug!(direction, %error, "stream failed");
            source.abort();
            destination.abort();
        }
    }
    result
}

fn forward_requests(
    info: &ConnectionInfo,
    interceptor: &dyn ConnectionInterceptor,
    queue: RequestQueue,
    mut source: TlsReader,
    destination: TlsWriter,
) -> Result<()> {
    let mut parser = Http1MessageParser::new(HttpMessageType::Request, queue);
    let mut forwarder = RequestForwarder {
        info,
        interceptor,
        destination: io::BufWriter::new(destination),
    };
    let result = pipe(&mut source, &mut parser, &mut forwarder);
    finish(
        "client to target",
        result,
        &source,
        forwarder.destination.get_mut(),
    )
}

fn forward_responses(
    info: &ConnectionInfo,
    interceptor: &dyn ConnectionInterceptor,
    queue: RequestQueue,
    mut source: TlsReader,
    destination: TlsWriter,
) -> Result<()> {
    let mut parser = Http1MessageParser::new(HttpMessageType::Response, queue);
    let mut forwarder = ResponseForwarder {
        info,
        interceptor,
        destination: io::BufWriter::new(destination),
    };
    let result = pipe(&mut source, &mut parser, &mut forwarder);
    finish(
        "target to client",
        result,
        &source,
        forwarder.destination.get_mut(),
    )
}

struct RequestForwarder<'a> {
    info: &'a ConnectionInfo,
    interceptor: &'a dyn ConnectionInterceptor,
    destination: io::BufWriter<TlsWriter>,
}

impl MessageListener for RequestForwarder<'_> {
    fn on_headers(&mut self, message: &mut HttpMessage) -> Result<()> {
        if let HttpMessage::Request(request) = message {
            self.interceptor.on_request_headers_ready(self.info, request);
        }
        message.write_to(&mut self.destination)?;
        Ok(())
    }

    fn on_body_bytes(
        &mut self,
        message: &HttpMessage,
        kind: BodyBytesType,
        bytes: &[u8],
    ) -> Result<()> {
        if let HttpMessage::Request(request) = message {
            self.interceptor
                .on_request_body_bytes(self.info, request, kind, bytes);
        }
        self.destination.write_all(bytes)?;
        Ok(())
    }

    fn on_message_ended(&mut self, message: &HttpMessage) -> Result<()> {
        if let HttpMessage::Request(request) = message {
            self.interceptor.on_request_ended(self.info, request);
        }
        Ok(())
    }

    fn on_error(&mut self, message: &HttpMessage, error: &Error) {
        if let HttpMessage::Request(request) = message {
            // Nothing to report when the stream broke between requests.
            if !request.method.is_empty() {
                self.interceptor.on_request_error(self.info, request, error);
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.destination.flush()?;
        Ok(())
    }
}

struct ResponseForwarder<'a> {
    info: &'a ConnectionInfo,
    interceptor: &'a dyn ConnectionInterceptor,
    destination: io::BufWriter<TlsWriter>,
}

impl MessageListener for ResponseForwarder<'_> {
    fn on_headers(&mut self, message: &mut HttpMessage) -> Result<()> {
        if let HttpMessage::Response(response) = message {
            if response.status_code != 100 {
                let request = response.request.take();
                if let Some(request) = &request {
                    self.interceptor
                        .on_response_headers_ready(self.info, request, response);
                }
                response.request = request;
            }
        }
        message.write_to(&mut self.destination)?;
        Ok(())
    }

    fn on_body_bytes(
        &mut self,
        message: &HttpMessage,
        kind: BodyBytesType,
        bytes: &[u8],
    ) -> Result<()> {
        if let HttpMessage::Response(response) = message {
            if let Some(request) = &response.request {
                self.interceptor
                    .on_response_body_bytes(self.info, request, response, kind, bytes);
            }
        }
        self.destination.write_all(bytes)?;
        Ok(())
    }

    fn on_message_ended(&mut self, message: &HttpMessage) -> Result<()> {
        if let HttpMessage::Response(response) = message {
            if let Some(request) = &response.request {
                self.interceptor
                    .on_response_ended(self.info, request, response);
            }
        }
        Ok(())
    }

    fn on_error(&mut self, message: &HttpMessage, error: &Error) {
        if let HttpMessage::Response(response) = message {
            if !response.http_version.is_empty() {
                self.interceptor.on_response_error(
                    self.info,
                    response.request.as_ref(),
                    response,
                    error,
                );
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.destination.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod connect_head_tests {
    use super::*;

    fn read_head(input: &'static [u8], max_bytes: usize) -> (Result<Option<HttpRequest>>, Vec<u8>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        client.write_all(input).unwrap();
        client.shutdown(std::net::Shutdown::Write).unwrap();
        let result = read_connect_head(&server, max_bytes);
        let mut rest = Vec::new();
        (&server).read_to_end(&mut rest).unwrap();
        (result, rest)
    }

    #[test]
    fn reads_exactly_the_head() {
        let (result, rest) = read_head(
            b"CONNECT example.org:443 HTTP/1.1\r\nhost: example.org:443\r\n\r\n\x16\x03\x01",
            8192,
        );
        let request = result.unwrap().unwrap();
        assert_eq!(request.method, "CONNECT");
        assert_eq!(request.url, "example.org:443");
        assert_eq!(request.http_version, "HTTP/1.1");
        assert_eq!(request.headers.get("host"), Some("example.org:443"));
        assert_eq!(rest, b"\x16\x03\x01");
    }

    #[test]
    fn closed_before_anything() {
        let (result, _) = read_head(b"", 8192);
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn truncated_head() {
        let (result, _) = read_head(b"CONNECT example.org:443 HTTP/1.1\r\n", 8192);
        assert!(result.unwrap_err().is_eof());
    }

    #[test]
    fn head_too_long() {
        let (result, _) = read_head(b"CONNECT example.org:443 HTTP/1.1\r\n\r\n", 10);
        assert!(matches!(result, Err(Error::TokenTooLong(10))));
    }

    #[test]
    fn garbage() {
        let (result, _) = read_head(b"\x16\x03\x01\x02\x00", 8192);
        assert!(matches!(result, Err(Error::ParseError { .. })));
    }
}
