use std::net::SocketAddr;
use std::sync::Arc;

use tenant_http::connection::HttpConnection;
use tenant_http::handler::ConnectionInfo;
use tenant_http::protocol::Scheme;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::sni::SniResolver;
use super::{Binding, Shared};
use crate::error::ServerError;

const ALPN_HTTP_11: &[u8] = b"http/1.1";

/// A bound listener, not yet accepting.
pub(crate) struct BoundListener {
    pub(crate) binding: Binding,
    pub(crate) local_addr: SocketAddr,
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
}

fn tls_acceptor(shared: &Arc<Shared>) -> Result<TlsAcceptor, ServerError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(SniResolver::new(Arc::clone(shared))));
    config.alpn_protocols = vec![ALPN_HTTP_11.to_vec()];
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Binds every endpoint, failing on the first that can't be bound.
pub(crate) async fn bind_all(bindings: &[Binding], shared: &Arc<Shared>) -> Result<Vec<BoundListener>, ServerError> {
    let mut bound = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let listener = TcpListener::bind(binding.addr).await.map_err(|source| ServerError::Bind { addr: binding.addr, source })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind { addr: binding.addr, source })?;
        let tls = binding.scheme.is_secure().then(|| tls_acceptor(shared)).transpose()?;

        info!(addr = %local_addr, scheme = ?binding.scheme, "listening");
        bound.push(BoundListener { binding: *binding, local_addr, listener, tls });
    }
    Ok(bound)
}

/// Accepts connections until cancelled.
pub(crate) async fn serve(bound: BoundListener, shared: Arc<Shared>, token: CancellationToken) {
    loop {
        let (tcp_stream, peer) = tokio::select! {
            () = token.cancelled() => break,
            accepted = bound.listener.accept() => match accepted {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(addr = %bound.local_addr, cause = %e, "failed to accept");
                    continue;
                }
            },
        };

        // applications are bound to the configured address, which may use port 0
        let info = ConnectionInfo::new(bound.binding.addr, peer, bound.binding.scheme);
        let shared = Arc::clone(&shared);
        let tls = bound.tls.clone();
        let token = token.child_token();

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => debug!(peer = %peer, "connection cancelled by shutdown"),
                () = handle_stream(tcp_stream, tls, info, shared) => {}
            }
        });
    }
    info!(addr = %bound.local_addr, "listener stopped");
}

async fn handle_stream(tcp_stream: TcpStream, tls: Option<TlsAcceptor>, info: ConnectionInfo, shared: Arc<Shared>) {
    if let Err(e) = tcp_stream.set_nodelay(true) {
        debug!(peer = %info.peer, cause = %e, "can't set nodelay");
    }

    match tls {
        None => {
            let (reader, writer) = tcp_stream.into_split();
            run_connection(reader, writer, info, shared).await;
        }
        Some(acceptor) => match acceptor.accept(tcp_stream).await {
            Ok(tls_stream) => {
                let (reader, writer) = tokio::io::split(tls_stream);
                run_connection(reader, writer, ConnectionInfo { scheme: Scheme::Https, ..info }, shared).await;
            }
            Err(e) => warn!(peer = %info.peer, cause = %e, "tls handshake failed"),
        },
    }
}

async fn run_connection<R, W>(reader: R, writer: W, info: ConnectionInfo, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let connection = HttpConnection::new(reader, writer, info);
    if let Err(e) = connection.process(shared).await {
        error!(peer = %info.peer, cause = %e, "service has error, connection shutdown");
    }
}
