//! Line-delimited JSON request/response over TCP.
//!
//! Each connection carries a strict sequence of request line, response
//! line. A client that needs concurrent calls to one peer opens one
//! [`RpcClient`] per concurrent caller.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info};

use crate::error::{Error, ErrorKind, RemoteError, Result};

#[derive(Debug)]
struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    async fn open(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }
}

/// A connection to one remote peer.
///
/// Calls are serialized. If a call fails or is cancelled half way the
/// connection is discarded and the next call dials again.
#[derive(Debug)]
pub struct RpcClient {
    addr: String,
    conn: Mutex<Option<Connection>>,
}

impl RpcClient {
    /// Dial `addr` now, so an unreachable peer is reported up front.
    pub async fn connect(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        let conn = Connection::open(&addr).await?;
        Ok(Self {
            addr,
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Create a client that dials on its first call.
    pub fn lazy(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one request and wait for its response.
    pub async fn call<Req, Resp>(&self, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let mut slot = self.conn.lock().await;
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => Connection::open(&self.addr).await?,
        };

        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        conn.writer.write_all(line.as_bytes()).await?;

        line.clear();
        if conn.reader.read_line(&mut line).await? == 0 {
            return Err(Error::ConnectionClosed(self.addr.clone()));
        }
        let response: std::result::Result<Resp, RemoteError> = serde_json::from_str(&line)?;

        *slot = Some(conn);
        Ok(response?)
    }
}

/// The server side of a peer: turns one decoded request into one response.
pub trait Service: Send + Sync + 'static {
    type Request: DeserializeOwned + Send + 'static;

    /// Handle a request. The returned value is written back verbatim, so
    /// it should come from [`reply`].
    fn handle(self: Arc<Self>, request: Self::Request) -> impl Future<Output = Value> + Send;
}

/// Encode a handler's outcome as a response document.
pub fn reply<T: Serialize>(result: std::result::Result<T, RemoteError>) -> Value {
    serde_json::to_value(&result).unwrap_or_else(|e| {
        json!({ "Err": RemoteError::new(ErrorKind::Invalid, e.to_string()) })
    })
}

/// Accept connections until `shutdown` is notified.
///
/// Use [`Notify::notify_one`] so a signal raised between two accepts is
/// not lost. Connections already open keep being served.
pub async fn serve<S: Service>(listener: TcpListener, service: Arc<S>, shutdown: Arc<Notify>) {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on {}", addr);
    }

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                info!("Listener shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let service = Arc::clone(&service);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, service).await {
                            debug!("Connection from {} ended: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection<S: Service>(stream: TcpStream, service: Arc<S>) -> Result<()> {
    stream.set_nodelay(true)?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<S::Request>(&line) {
            Ok(request) => Arc::clone(&service).handle(request).await,
            Err(e) => reply::<()>(Err(RemoteError::new(
                ErrorKind::Invalid,
                format!("Invalid request: {}", e),
            ))),
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug, Deserialize, Serialize)]
    #[serde(tag = "method", rename_all = "snake_case")]
    enum CounterRequest {
        Add { amount: u64 },
        Fail,
    }

    #[derive(Default)]
    struct Counter {
        total: std::sync::Mutex<u64>,
    }

    impl Service for Counter {
        type Request = CounterRequest;

        async fn handle(self: Arc<Self>, request: CounterRequest) -> Value {
            match request {
                CounterRequest::Add { amount } => {
                    let mut total = self.total.lock().unwrap();
                    *total += amount;
                    reply(Ok(*total))
                }
                CounterRequest::Fail => reply::<u64>(Err(RemoteError::new(
                    ErrorKind::Sequencing,
                    "not now",
                ))),
            }
        }
    }

    async fn start() -> (String, Arc<Notify>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let shutdown = Arc::new(Notify::new());
        tokio::spawn(serve(listener, Arc::new(Counter::default()), shutdown.clone()));
        (addr, shutdown)
    }

    #[tokio::test]
    async fn calls_share_one_connection() {
        let (addr, _shutdown) = start().await;
        let client = assert_ok!(RpcClient::connect(&addr).await);

        let first: u64 = assert_ok!(client.call(&CounterRequest::Add { amount: 2 }).await);
        let second: u64 = assert_ok!(client.call(&CounterRequest::Add { amount: 3 }).await);
        assert_eq!(first, 2);
        assert_eq!(second, 5);
    }

    #[tokio::test]
    async fn remote_errors_keep_their_kind() {
        let (addr, _shutdown) = start().await;
        let client = RpcClient::lazy(&addr);

        let err = assert_err!(client.call::<_, u64>(&CounterRequest::Fail).await);
        assert_eq!(err.kind(), ErrorKind::Sequencing);

        // The connection survives an error reply
        let total: u64 = assert_ok!(client.call(&CounterRequest::Add { amount: 1 }).await);
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn malformed_requests_are_invalid() {
        let (addr, _shutdown) = start().await;
        let client = RpcClient::lazy(&addr);

        let err = assert_err!(client.call::<_, u64>(&json!({ "method": "nope" })).await);
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[tokio::test]
    async fn unreachable_peer_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = assert_err!(RpcClient::connect(&addr).await);
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
