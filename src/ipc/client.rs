//! Child side of the rendezvous protocol.
//!
//! Harnesses written in Rust can use these to fetch their instructions and
//! hand results back; runtimes in other languages implement the same frames.

use super::{write_frame, ExecutionOutcome, Frame};
use crate::payload::ExecutionRequest;
use std::io::{Error, ErrorKind};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

/// Fetch the request registered under `key`.
pub async fn fetch_request(port: u16, key: &str) -> std::io::Result<ExecutionRequest> {
    match exchange(
        port,
        Frame::Fetch {
            key: key.to_string(),
        },
    )
    .await?
    {
        Frame::Request { request } => Ok(request),
        other => Err(unexpected(other)),
    }
}

/// Deposit the outcome for `key` and wait for the acknowledgement.
pub async fn deposit_outcome(
    port: u16,
    key: &str,
    outcome: ExecutionOutcome,
) -> std::io::Result<()> {
    match exchange(
        port,
        Frame::Respond {
            key: key.to_string(),
            outcome,
        },
    )
    .await?
    {
        Frame::Ack => Ok(()),
        other => Err(unexpected(other)),
    }
}

async fn exchange(port: u16, frame: Frame) -> std::io::Result<Frame> {
    let stream = TcpStream::connect(("127.0.0.1", port)).await?;
    let (reader, mut writer) = stream.into_split();
    write_frame(&mut writer, &frame).await?;

    let mut lines = BufReader::new(reader).lines();
    let line = lines
        .next_line()
        .await?
        .ok_or_else(|| Error::new(ErrorKind::UnexpectedEof, "rendezvous closed without reply"))?;
    Ok(serde_json::from_str(&line)?)
}

fn unexpected(frame: Frame) -> Error {
    match frame {
        Frame::Error { message } => Error::new(ErrorKind::Other, message),
        other => Error::new(
            ErrorKind::InvalidData,
            format!("unexpected rendezvous reply: {:?}", other),
        ),
    }
}
