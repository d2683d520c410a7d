//! Loopback fake Redis server for client tests
//!
//! Accepts one connection, decodes each request with the crate's own RESP
//! decoder and answers from a script. Replies can be split into small
//! packets to exercise reassembly on the client side.

use crate::resp;
use keyscope_core::RespValue;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub(crate) enum Reply {
    /// Write these packets in order, pausing briefly between them
    Packets(Vec<Vec<u8>>),
    /// Read the request but never answer it
    Silent,
    /// Hang up without answering
    Close,
}

/// Whole reply in one packet
pub(crate) fn reply(bytes: &[u8]) -> Reply {
    Reply::Packets(vec![bytes.to_vec()])
}

/// Reply split into packets of at most `size` bytes
pub(crate) fn fragmented(bytes: &[u8], size: usize) -> Reply {
    Reply::Packets(bytes.chunks(size).map(<[u8]>::to_vec).collect())
}

/// Start the server; the handle resolves to every request received, once
/// the client disconnects
pub(crate) async fn spawn(script: Vec<Reply>) -> (u16, JoinHandle<Vec<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.set_nodelay(true).unwrap();

        let mut script = script.into_iter();
        let mut requests = Vec::new();
        let mut buf = Vec::new();

        'serve: loop {
            let request = loop {
                if let Some((value, used)) = resp::parse(&buf).unwrap() {
                    buf.drain(..used);
                    break value;
                }
                let mut chunk = [0u8; 4096];
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break 'serve,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            };
            requests.push(request_parts(request));

            match script.next() {
                Some(Reply::Packets(packets)) => {
                    for packet in packets {
                        if socket.write_all(&packet).await.is_err() {
                            break 'serve;
                        }
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                }
                Some(Reply::Silent) | None => {}
                Some(Reply::Close) => break 'serve,
            }
        }

        requests
    });

    (port, handle)
}

fn request_parts(value: RespValue) -> Vec<String> {
    value
        .into_array()
        .unwrap_or_default()
        .into_iter()
        .filter_map(RespValue::into_text)
        .collect()
}
