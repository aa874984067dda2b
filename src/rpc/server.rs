//! TCP RPC server: accept loop and per-connection handler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::{accept_with_backoff, ProtocolServer};
use crate::rpc::codec::{encode_msgpack, read_frame, write_frame, MSG_ERROR, MSG_RESPONSE};
use crate::rpc::router::route_request;
use crate::service::ConvertService;
use crate::types::{Error, Result, RpcConfig};

/// RPC front end for the conversion service.
#[derive(Debug)]
pub struct RpcServer {
    service: ConvertService,
    config: RpcConfig,
}

impl RpcServer {
    pub fn new(service: ConvertService, config: RpcConfig) -> Self {
        Self { service, config }
    }
}

#[async_trait]
impl ProtocolServer for RpcServer {
    fn protocol(&self) -> &'static str {
        "rpc"
    }

    fn address(&self) -> String {
        self.config.address()
    }

    /// Accept until `shutdown`, then wait for every connection to finish the
    /// request it is handling. Connection tasks live in a `JoinSet`, so
    /// aborting this future abandons them too.
    async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let max_connections = self.config.max_connections;
        let conn_semaphore = Arc::new(Semaphore::new(max_connections));
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "rpc_connection_task_failed");
                    }
                }
                (stream, peer) = accept_with_backoff(&listener, "rpc") => {
                    let permit = match Arc::clone(&conn_semaphore).try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::warn!(%peer, max_connections, "rpc_connection_rejected");
                            drop(stream);
                            continue;
                        }
                    };

                    tracing::debug!(
                        %peer,
                        active = max_connections - conn_semaphore.available_permits(),
                        "rpc_connection_accepted"
                    );
                    let service = self.service.clone();
                    let shutdown = shutdown.clone();
                    let config = self.config.clone();
                    connections.spawn(async move {
                        if let Err(e) = handle_connection(stream, service, shutdown, config, permit).await {
                            tracing::warn!(%peer, error = %e, "rpc_connection_error");
                        }
                    });
                }
            }
        }

        drop(listener);
        tracing::info!(active = connections.len(), "rpc_draining");
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "rpc_connection_task_failed");
            }
        }
        Ok(())
    }
}

/// Request frame payload.
#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: String,
    #[serde(default)]
    method: String,
    #[serde(default)]
    body: Value,
}

fn error_payload(id: &str, err: &Error) -> Value {
    json!({
        "id": id,
        "ok": false,
        "error": {
            "code": err.to_rpc_error_code(),
            "message": err.to_string(),
        }
    })
}

/// Handle a single TCP connection: read frames → route → write responses.
async fn handle_connection(
    stream: TcpStream,
    service: ConvertService,
    shutdown: CancellationToken,
    config: RpcConfig,
    _permit: OwnedSemaphorePermit, // held for connection lifetime
) -> std::io::Result<()> {
    let (mut reader, mut writer) = stream.into_split();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            frame_result = tokio::time::timeout(config.timeout, read_frame(&mut reader, config.max_recv_msg_size)) => {
                let frame = match frame_result {
                    Err(_elapsed) => {
                        tracing::debug!(timeout = ?config.timeout, "rpc_idle_timeout");
                        break;
                    }
                    Ok(result) => match result? {
                        Some(frame) => frame,
                        None => break, // clean EOF
                    },
                };

                let RpcRequest { id: request_id, method, body } = match frame.decode_request() {
                    Ok(request) => request,
                    Err(err) => {
                        let encoded = encode_msgpack(&error_payload("", &err))?;
                        timed_write(&mut writer, MSG_ERROR, &encoded, config.write_timeout).await?;
                        continue;
                    }
                };

                let (msg_type, encoded) = match route_request(&service, &method, body).await {
                    Ok(response_body) => {
                        let response = json!({
                            "id": request_id,
                            "ok": true,
                            "body": response_body,
                        });
                        (MSG_RESPONSE, encode_msgpack(&response)?)
                    }
                    Err(err) => {
                        if !err.is_client_error() {
                            tracing::warn!(method = %method, error = %err, "rpc_request_failed");
                        }
                        (MSG_ERROR, encode_msgpack(&error_payload(&request_id, &err))?)
                    }
                };

                if u32::try_from(encoded.len()).map_or(true, |len| len > config.max_send_msg_size) {
                    let err = Error::resource_exhausted(format!(
                        "response is {} bytes, exceeds limit of {} bytes",
                        encoded.len(),
                        config.max_send_msg_size
                    ));
                    let encoded = encode_msgpack(&error_payload(&request_id, &err))?;
                    timed_write(&mut writer, MSG_ERROR, &encoded, config.write_timeout).await?;
                    continue;
                }
                timed_write(&mut writer, msg_type, &encoded, config.write_timeout).await?;
            }
        }
    }

    Ok(())
}

/// Write a frame with a timeout so slow consumers cannot hold a connection
/// open indefinitely.
async fn timed_write<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg_type: u8,
    payload: &[u8],
    timeout: Duration,
) -> std::io::Result<()> {
    tokio::time::timeout(timeout, write_frame(writer, msg_type, payload))
        .await
        .map_err(|_| {
            tracing::warn!(timeout = ?timeout, "rpc_write_timeout");
            std::io::Error::new(std::io::ErrorKind::TimedOut, "write timeout")
        })?
}
