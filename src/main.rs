use clap::Parser;
use intercepting_proxy::config::ProxyConfig;
use intercepting_proxy::error::{Error, Result};
use intercepting_proxy::interceptor::{ConnectionInfo, ConnectionInterceptor, TargetAddress};
use intercepting_proxy::parser::BodyBytesType;
use intercepting_proxy::protocol::{HttpRequest, HttpResponse};
use intercepting_proxy::proxy::InterceptingProxy;
use intercepting_proxy::ssl::{self, ClientConfig, ServerConfig};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Intercepting HTTPS forward proxy that logs the traffic it relays")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,

    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// PEM certificate chain presented to clients
    #[arg(long)]
    cert: PathBuf,

    /// PEM private key for `--cert`
    #[arg(long)]
    key: PathBuf,

    /// Extra PEM root certificates trusted for targets
    #[arg(long)]
    upstream_ca: Option<PathBuf>,

    /// Send the client's SNI name to the target instead of the CONNECT host
    #[arg(long)]
    proxy_server_names: bool,

    /// Read timeout in seconds for both legs (0 = none)
    #[arg(long, default_value_t = 0)]
    read_timeout_secs: u64,

    #[arg(long, default_value_t = 8 * 1024)]
    max_connect_head_bytes: usize,
}

/// Intercepts every well-formed CONNECT target and logs what it sees.
struct LoggingInterceptor {
    server_tls: Arc<ServerConfig>,
    client_tls: Arc<ClientConfig>,
}

impl ConnectionInterceptor for LoggingInterceptor {
    fn accept_connection(
        &self,
        client: SocketAddr,
        method: &str,
        request_target: &str,
        _http_version: &str,
    ) -> Option<ConnectionInfo> {
        match TargetAddress::parse(request_target) {
            Ok(target) => {
                info!(%client, method, upstream = %target, "accepting connection");
                Some(ConnectionInfo::new(
                    target,
                    self.server_tls.clone(),
                    self.client_tls.clone(),
                ))
            }
            Err(e) => {
                warn!(%client, error = %e, "rejecting connection");
                None
            }
        }
    }

    fn on_request_headers_ready(&self, connection: &ConnectionInfo, request: &mut HttpRequest) {
        info!(
            upstream = %connection.target(),
            method = %request.method,
            url = %request.url,
            "request"
        );
    }

    fn on_request_error(&self, connection: &ConnectionInfo, request: &HttpRequest, error: &Error) {
        warn!(upstream = %connection.target(), url = %request.url, %error, "request failed");
    }

    fn on_response_headers_ready(
        &self,
        connection: &ConnectionInfo,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) {
        info!(
            upstream = %connection.target(),
            url = %request.url,
            status = response.status_code,
            "response"
        );
    }

    fn on_response_body_bytes(
        &self,
        connection: &ConnectionInfo,
        request: &HttpRequest,
        _response: &HttpResponse,
        kind: BodyBytesType,
        bytes: &[u8],
    ) {
        if kind == BodyBytesType::Content {
            tracing::debug!(
                upstream = %connection.target(),
                url = %request.url,
                bytes = bytes.len(),
                "response content"
            );
        }
    }

    fn on_response_error(
        &self,
        connection: &ConnectionInfo,
        request: Option<&HttpRequest>,
        _response: &HttpResponse,
        error: &Error,
    ) {
        let url = request.map(|r| r.url.as_str()).unwrap_or("-");
        warn!(upstream = %connection.target(), url, %error, "response failed");
    }

    fn on_connection_ended(
        &self,
        connection: &ConnectionInfo,
        client_to_target_error: Option<&Error>,
        target_to_client_error: Option<&Error>,
    ) {
        info!(
            upstream = %connection.target(),
            client_to_target = ?client_to_target_error,
            target_to_client = ?target_to_client_error,
            "connection ended"
        );
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let server_tls = ssl::server_config(&fs::read(&args.cert)?, &fs::read(&args.key)?)?;
    let upstream_ca = args.upstream_ca.as_ref().map(|path| fs::read(path)).transpose()?;
    let client_tls = ssl::client_config(upstream_ca.as_deref())?;

    let read_timeout = match args.read_timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let config = ProxyConfig::new()
        .with_bind_address(args.bind)
        .with_port(args.port)
        .with_max_connect_head_bytes(args.max_connect_head_bytes)
        .with_proxy_server_names(args.proxy_server_names)
        .with_read_timeout(read_timeout);

    let proxy = InterceptingProxy::start(
        config,
        LoggingInterceptor {
            server_tls,
            client_tls,
        },
    )?;
    info!(address = %proxy.address(), "listening");
    proxy.wait();
    Ok(())
}
