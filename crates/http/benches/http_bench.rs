use bytes::Bytes;
use criterion::{Criterion, criterion_group, criterion_main};
use futures::executor::block_on;
use std::hint::black_box;
use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tenant_http::codec::{RequestDecoder, ResponseEncoder};
use tenant_http::connection::HttpConnection;
use tenant_http::handler::{ConnectionInfo, Reply, make_handler};
use tenant_http::protocol::{ConnectionType, Response, Scheme};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

// Mock IO for testing
#[derive(Clone)]
struct MockIO {
    read_data: Vec<u8>,
    write_data: Vec<u8>,
    read_pos: usize,
}

impl MockIO {
    fn new(read_data: Vec<u8>) -> Self {
        Self { read_data, write_data: Vec::new(), read_pos: 0 }
    }
}

impl AsyncRead for MockIO {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let remaining = &self.read_data[self.read_pos..];
        let amt = std::cmp::min(remaining.len(), buf.remaining());
        buf.put_slice(&remaining[..amt]);
        self.read_pos += amt;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockIO {
    fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize, io::Error>> {
        self.write_data.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }
}

const SIMPLE_REQUEST: &[u8] = b"GET /index.html?lang=en HTTP/1.1\r\nHost: localhost:8080\r\nUser-Agent: bench\r\n\r\n";

const FORM_REQUEST: &[u8] = b"POST /login HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 29\r\n\r\nuser=alice&password=s3cr3t%21";

const MULTIPART_REQUEST: &[u8] = b"POST /upload HTTP/1.1\r\nHost: localhost\r\nContent-Type: multipart/form-data; boundary=B\r\nContent-Length: 131\r\n\r\n--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--B\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x.txt\"\r\n\r\nxyz\r\n--B--\r\n";

fn bench_request_decoder(c: &mut Criterion) {
    let decoder = RequestDecoder::new(Scheme::Http);

    for (name, request) in
        [("decode_simple_request", SIMPLE_REQUEST), ("decode_form_request", FORM_REQUEST), ("decode_multipart_request", MULTIPART_REQUEST)]
    {
        c.bench_function(name, |b| {
            b.iter(|| black_box(decoder.decode(Bytes::from_static(request))));
        });
    }
}

fn bench_response_encoder(c: &mut Criterion) {
    let mut response = Response::new();
    response.set_header("Server", "bench Application Server");
    response.set_connection(ConnectionType::KeepAlive);
    response.write_str(&"<p>Hello World!</p>".repeat(64));

    c.bench_function("encode_simple_response", |b| {
        let mut encoder = ResponseEncoder::new();
        b.iter(|| black_box(encoder.encode_to_bytes(&response).unwrap()));
    });

    let mut compressed = response.clone();
    compressed.set_compressed(true);
    c.bench_function("encode_gzip_response", |b| {
        let mut encoder = ResponseEncoder::new();
        b.iter(|| black_box(encoder.encode_to_bytes(&compressed).unwrap()));
    });
}

fn bench_http_connection(c: &mut Criterion) {
    let info = ConnectionInfo::new(([127, 0, 0, 1], 8080).into(), ([127, 0, 0, 1], 50000).into(), Scheme::Http);
    let handler = Arc::new(make_handler(|_conn, data: Bytes| async move {
        let decoded = RequestDecoder::new(Scheme::Http).decode(data);
        let mut request = decoded.request;
        request.response_mut().write_str("Hello World!");
        let bytes = ResponseEncoder::new().encode_to_bytes(request.response()).unwrap_or_default();
        Reply::new(bytes, false)
    }));

    c.bench_function("process_simple_request", |b| {
        b.iter(|| {
            let mock_io = MockIO::new(SIMPLE_REQUEST.to_vec());
            let (reader, writer) = (mock_io.clone(), mock_io);
            let connection = HttpConnection::new(reader, writer, info);
            black_box(block_on(connection.process(handler.clone())).unwrap());
        });
    });
}

criterion_group!(benches, bench_request_decoder, bench_response_encoder, bench_http_connection);
criterion_main!(benches);
