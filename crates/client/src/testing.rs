//! Local servers for exchange tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::tls::tests::fixture;

/// Answers one connection per response and returns the raw requests it read.
pub(crate) async fn serve(responses: Vec<&'static [u8]>) -> (SocketAddr, JoinHandle<Vec<String>>) {
    serve_with(None, responses).await
}

pub(crate) async fn serve_tls(acceptor: TlsAcceptor, responses: Vec<&'static [u8]>) -> (SocketAddr, JoinHandle<Vec<String>>) {
    serve_with(Some(acceptor), responses).await
}

/// Accepts a connection and never answers.
pub(crate) async fn serve_silent() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = vec![];
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

/// Answers one connection with `parts`, pausing `pause` after each of them.
pub(crate) async fn serve_slowly(parts: Vec<&'static [u8]>, pause: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else { return };
        read_request(&mut stream).await;
        for part in parts {
            if stream.write_all(part).await.is_err() {
                return;
            }
            tokio::time::sleep(pause).await;
        }
        let _ = stream.shutdown().await;
    });
    addr
}

/// Server side TLS with the test certificates, optionally requiring a client certificate.
pub(crate) fn tls_acceptor(client_auth: bool) -> TlsAcceptor {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let chain = CertificateDer::pem_file_iter(fixture("server.pem")).unwrap().collect::<Result<Vec<_>, _>>().unwrap();
    let key = PrivateKeyDer::from_pem_file(fixture("server.key")).unwrap();

    let builder = ServerConfig::builder_with_provider(Arc::clone(&provider)).with_safe_default_protocol_versions().unwrap();
    let config = if client_auth {
        let mut roots = RootCertStore::empty();
        for cert in CertificateDer::pem_file_iter(fixture("ca.pem")).unwrap() {
            roots.add(cert.unwrap()).unwrap();
        }
        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider).build().unwrap();
        builder.with_client_cert_verifier(verifier).with_single_cert(chain, key).unwrap()
    } else {
        builder.with_no_client_auth().with_single_cert(chain, key).unwrap()
    };
    TlsAcceptor::from(Arc::new(config))
}

async fn serve_with(acceptor: Option<TlsAcceptor>, responses: Vec<&'static [u8]>) -> (SocketAddr, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut requests = vec![];
        for response in responses {
            let Ok((stream, _)) = listener.accept().await else { break };
            let request = match &acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(mut stream) => answer(&mut stream, response).await,
                    Err(_) => continue,
                },
                None => {
                    let mut stream = stream;
                    answer(&mut stream, response).await
                }
            };
            requests.push(request);
        }
        requests
    });
    (addr, handle)
}

async fn answer<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S, response: &[u8]) -> String {
    let request = read_request(stream).await;
    let _ = stream.write_all(response).await;
    let _ = stream.shutdown().await;
    // give the client time to read before the socket goes away
    tokio::time::sleep(Duration::from_millis(20)).await;
    request
}

async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> String {
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    while !request_complete(&received) {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => received.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&received).into_owned()
}

fn request_complete(received: &[u8]) -> bool {
    let text = String::from_utf8_lossy(received);
    let Some(head_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let head = text[..head_end].to_ascii_lowercase();
    let body = &text[head_end + 4..];
    if head.contains("transfer-encoding: chunked") {
        return body.ends_with("0\r\n\r\n");
    }
    match head.lines().find_map(|line| line.strip_prefix("content-length: ")) {
        Some(length) => body.len() >= length.trim().parse().unwrap_or(0),
        None => true,
    }
}
