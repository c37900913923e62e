use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::codec::BodySource;
use crate::protocol::Scheme;

/// Where a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub local: SocketAddr,
    pub peer: SocketAddr,
    pub scheme: Scheme,
}

impl ConnectionInfo {
    pub fn new(local: SocketAddr, peer: SocketAddr, scheme: Scheme) -> Self {
        Self { local, peer, scheme }
    }
}

/// Bytes to send back, and whether the connection closes afterwards.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub bytes: Bytes,
    pub close: bool,
}

impl Reply {
    pub fn new(bytes: Bytes, close: bool) -> Self {
        Self { bytes, close }
    }
}

/// Turns the bytes of one inbound message into the bytes of its reply.
///
/// `source` yields further bytes of the same connection, for bodies that did not fit in
/// the first read.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, conn: &ConnectionInfo, data: Bytes, source: &mut (dyn BodySource + '_)) -> Reply;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn call(&self, conn: &ConnectionInfo, data: Bytes, source: &mut (dyn BodySource + '_)) -> Reply {
        (**self).call(conn, data, source).await
    }
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(ConnectionInfo, Bytes) -> Fut + Send + Sync,
    Fut: Future<Output = Reply> + Send,
{
    async fn call(&self, conn: &ConnectionInfo, data: Bytes, _source: &mut (dyn BodySource + '_)) -> Reply {
        (self.f)(*conn, data).await
    }
}

/// Wraps an async function that only needs the first read of each message.
pub fn make_handler<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(ConnectionInfo, Bytes) -> Fut,
    Fut: Future<Output = Reply>,
{
    HandlerFn { f }
}
