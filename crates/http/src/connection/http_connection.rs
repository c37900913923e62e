use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info};

use crate::codec::{MessageFramer, ReadSource};
use crate::handler::{ConnectionInfo, Handler};
use crate::protocol::{HttpError, SendError};

/// Initial capacity of the read buffer, which is also the head size limit.
const READ_CAPACITY: usize = 8 * 1024;

/// One accepted connection.
///
/// `HttpConnection` reads messages with a [`MessageFramer`], hands each one to a
/// [`Handler`] together with a body source over the same stream, and writes the reply.
/// The connection ends when the handler asks for it, the peer hangs up or I/O fails.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
#[derive(Debug)]
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, MessageFramer>,
    writer: W,
    info: ConnectionInfo,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, info: ConnectionInfo) -> Self {
        Self { framed_read: FramedRead::with_capacity(reader, MessageFramer::new(), READ_CAPACITY), writer, info }
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler + ?Sized,
    {
        loop {
            match self.framed_read.next().await {
                Some(Ok(data)) => {
                    let reply = {
                        let mut source = ReadSource::new(self.framed_read.get_mut());
                        handler.call(&self.info, data, &mut source).await
                    };

                    self.writer.write_all(&reply.bytes).await.map_err(SendError::io)?;
                    self.writer.flush().await.map_err(SendError::io)?;

                    if reply.close {
                        if let Err(e) = self.writer.shutdown().await {
                            debug!(cause = %e, "shutdown after close reply failed");
                        }
                        info!(peer = %self.info.peer, "reply asked to close, connection shutdown");
                        return Ok(());
                    }
                }

                Some(Err(e)) => {
                    error!(peer = %self.info.peer, cause = %e, "can't receive next request");
                    return Err(e.into());
                }

                None => {
                    info!(peer = %self.info.peer, "cant read more request, break this connection down");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Reply, make_handler};
    use crate::protocol::Scheme;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, duplex};

    fn info() -> ConnectionInfo {
        ConnectionInfo::new("127.0.0.1:8080".parse().unwrap(), "127.0.0.1:50000".parse().unwrap(), Scheme::Http)
    }

    #[tokio::test]
    async fn echo_until_close() {
        let (client, server) = duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);

        let handler = Arc::new(make_handler(|_conn, data: Bytes| async move {
            let close = data.starts_with(b"BYE");
            Reply::new(Bytes::from([&b"echo:"[..], &data[..]].concat()), close)
        }));

        let server = tokio::spawn(HttpConnection::new(server_read, server_write, info()).process(handler));

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(b"HI / HTTP/1.1\r\n\r\n").await.unwrap();

        let mut buf = vec![0; 64];
        let n = client_read.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"echo:HI / HTTP/1.1\r\n\r\n");

        client_write.write_all(b"BYE / HTTP/1.1\r\n\r\n").await.unwrap();
        let mut rest = Vec::new();
        client_read.read_to_end(&mut rest).await.unwrap();
        assert_eq!(&rest[..], b"echo:BYE / HTTP/1.1\r\n\r\n");

        assert!(server.await.unwrap().is_ok());
    }
}
