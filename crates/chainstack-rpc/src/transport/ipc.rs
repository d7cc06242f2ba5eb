//! Local socket connector (Unix domain socket or Windows named pipe).

use std::path::PathBuf;

use async_trait::async_trait;
use futures::{sink, stream};
use interprocess::local_socket::tokio::{prelude::*, RecvHalf, SendHalf, Stream};
use interprocess::local_socket::GenericFilePath;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::stream::{Connection, Connector};
use crate::error::{Result, RpcError};

const READ_BUF_SIZE: usize = 8 * 1024;

/// Connects to a node's IPC endpoint. Each frame is written followed by a
/// newline.
#[derive(Debug, Clone)]
pub struct IpcConnector {
    path: PathBuf,
}

impl IpcConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Connector for IpcConnector {
    async fn connect(&self) -> Result<Connection> {
        let name = self
            .path
            .clone()
            .to_fs_name::<GenericFilePath>()
            .map_err(|e| RpcError::InvalidConfig(format!("invalid socket path: {e}")))?;
        let socket = Stream::connect(name)
            .await
            .map_err(|e| RpcError::InvalidConnection(format!("{}: {e}", self.path.display())))?;
        let (reader, writer) = socket.split();

        Ok(Connection {
            sink: Box::pin(frame_sink(writer)),
            stream: Box::pin(frame_stream(reader)),
        })
    }

    fn endpoint(&self) -> String {
        self.path.display().to_string()
    }
}

fn frame_sink(writer: SendHalf) -> impl futures::Sink<String, Error = RpcError> + Send {
    sink::unfold(writer, |mut writer, frame: String| async move {
        let io = async {
            writer.write_all(frame.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        io.await
            .map_err(|e| RpcError::InvalidConnection(e.to_string()))?;
        Ok(writer)
    })
}

struct ReadState {
    reader: RecvHalf,
    buf: Vec<u8>,
    /// Bytes of a UTF-8 sequence split across reads.
    carry: Vec<u8>,
}

fn frame_stream(reader: RecvHalf) -> impl futures::Stream<Item = Result<String>> + Send {
    let state = ReadState {
        reader,
        buf: vec![0; READ_BUF_SIZE],
        carry: Vec::new(),
    };
    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        loop {
            let n = match state.reader.read(&mut state.buf).await {
                Ok(0) => return None,
                Ok(n) => n,
                Err(e) => {
                    return Some((Err(RpcError::InvalidConnection(e.to_string())), None));
                }
            };
            state.carry.extend_from_slice(&state.buf[..n]);
            let valid_up_to = match std::str::from_utf8(&state.carry) {
                Ok(_) => state.carry.len(),
                Err(e) if e.error_len().is_none() => e.valid_up_to(),
                Err(e) => {
                    state.carry.clear();
                    return Some((
                        Err(RpcError::InvalidResponse(e.to_string().into())),
                        Some(state),
                    ));
                }
            };
            if valid_up_to == 0 {
                continue;
            }
            let rest = state.carry.split_off(valid_up_to);
            let text = String::from_utf8_lossy(&state.carry).into_owned();
            state.carry = rest;
            return Some((Ok(text), Some(state)));
        }
    })
}
