//! Async LysKOM Protocol A client.
//!
//! [`Client`] owns a TCP connection to a LysKOM server and pipelines
//! requests over it: every call is tagged with a reference number, so many
//! can be outstanding at once, and each resolves independently when its
//! reply (or error reply) arrives. Asynchronous server messages are
//! delivered to registered handlers, interleaved with replies in arrival
//! order.
//!
//! The wire handling lives in the sans-io [`protocol_lyskom`] crate; this
//! crate adds the socket, the reader task and the request futures.
//!
//! # Example
//!
//! ```no_run
//! use lyskom_client::{Client, Value};
//!
//! # async fn example() -> Result<(), lyskom_client::Error> {
//! let client = Client::connect("kom.lysator.liu.se").await?;
//! client.on_async("send-message", |msg| {
//!     println!("message from {:?}", msg.get("sender"));
//! })?;
//! client.login(4711, "h\u{e4}mligt", false).await?;
//! let session = client.who_am_i().await?;
//! println!("session {session}");
//! client.close().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod dispatch;
mod events;

pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_PORT};
pub use protocol_lyskom::{catalog, FormatError, ParseError, Value};

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use bytes::Bytes;
use protocol_lyskom::latin1;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{debug, warn};

use crate::dispatch::{Dispatcher, Signal};
use crate::events::Events;

/// Errors returned by the LysKOM client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The connection is closed (or was closed before the reply arrived).
    #[error("connection closed")]
    Closed,

    /// The server answered this request with an error reply.
    #[error("request failed: {name} (status {status})")]
    Request {
        /// Protocol error code.
        code: u32,
        /// Symbolic name of the code, or `error-<code>` for unlisted codes.
        name: String,
        /// Call-specific status value.
        status: u32,
    },

    /// The server sent an out-of-band `%%` error message.
    #[error("server error: {0}")]
    Server(String),

    /// The byte stream violated the protocol. Fatal for the connection.
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// Caller-supplied parameters were rejected before anything was sent.
    #[error("invalid request parameters: {0}")]
    Format(#[from] FormatError),

    /// The reply value did not have the shape the typed method expected.
    #[error("unexpected response")]
    UnexpectedResponse,

    /// No such call in the catalogue.
    #[error("unknown call: {0}")]
    UnknownCall(String),

    /// No such asynchronous message in the catalogue.
    #[error("unknown asynchronous event: {0}")]
    UnknownAsync(String),

    /// The in-flight limit was reached; retry after replies drain.
    #[error("too many requests in flight")]
    TooManyInFlight,

    /// Connect or handshake timed out.
    #[error("connect timed out")]
    ConnectTimeout,

    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(&'static str),

    /// I/O error on the connection.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

struct Shared {
    dispatch: StdMutex<Dispatcher>,
    writer: AsyncMutex<Option<OwnedWriteHalf>>,
    events: Events,
}

impl Shared {
    fn dispatch(&self) -> MutexGuard<'_, Dispatcher> {
        self.dispatch.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A connection to a LysKOM server.
///
/// Cheap to clone; all clones share the connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Shared>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Connect to `host` on the standard port with default configuration.
    /// Resolves once the server handshake has been received.
    pub async fn connect(host: &str) -> Result<Client, Error> {
        Self::connect_with(host, ClientConfig::default()).await
    }

    /// Connect with explicit configuration.
    pub async fn connect_with(host: &str, config: ClientConfig) -> Result<Client, Error> {
        config.validate()?;

        let connect = TcpStream::connect((host, config.port));
        let stream = match config.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, connect).await {
                Ok(result) => result?,
                Err(_) => return Err(Error::ConnectTimeout),
            },
            None => connect.await?,
        };
        stream.set_nodelay(config.tcp_nodelay)?;
        let local_host = stream.local_addr()?.ip().to_string();
        let user = config
            .user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("LOGNAME").ok())
            .unwrap_or_else(|| "unknown".to_string());

        let (read_half, mut write_half) = stream.into_split();
        let hello = protocol_lyskom::encode_handshake(&user, &local_host)?;
        write_half.write_all(&hello).await?;
        debug!(host, port = config.port, user = %user, "client handshake sent");

        let inner = Arc::new(Shared {
            dispatch: StdMutex::new(Dispatcher::new(config.token_limits, config.max_in_flight)),
            writer: AsyncMutex::new(Some(write_half)),
            events: Events::default(),
        });
        let (handshake_tx, handshake_rx) = oneshot::channel();
        tokio::spawn(read_loop(Arc::clone(&inner), read_half, handshake_tx));

        let handshake = match config.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, handshake_rx).await {
                Ok(result) => result,
                Err(_) => return Err(Error::ConnectTimeout),
            },
            None => handshake_rx.await,
        };
        match handshake {
            Ok(Ok(())) => Ok(Client { inner }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Closed),
        }
    }

    /// Issue a call by catalogue name and await its reply.
    ///
    /// Unknown names, parameter validation failures and the in-flight bound
    /// all fail synchronously without touching the wire.
    pub async fn call(&self, name: &str, params: Value) -> Result<Value, Error> {
        let (ref_no, bytes, rx) = self.inner.dispatch().start_call(name, &params)?;
        {
            let mut writer = self.inner.writer.lock().await;
            let Some(write_half) = writer.as_mut() else {
                self.inner.dispatch().abort_call(ref_no);
                return Err(Error::Closed);
            };
            if let Err(e) = write_half.write_all(&bytes).await {
                self.inner.dispatch().abort_call(ref_no);
                return Err(Error::Io(e));
            }
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Closed),
        }
    }

    /// Register a handler for a named asynchronous message.
    ///
    /// Handlers run synchronously on the reader task; keep them short.
    pub fn on_async(
        &self,
        event: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Result<(), Error> {
        let desc = catalog::async_by_name(event)
            .ok_or_else(|| Error::UnknownAsync(event.to_string()))?;
        self.inner.events.subscribe_async(desc.name, Box::new(handler));
        Ok(())
    }

    /// Register a handler for connection-level errors (out-of-band server
    /// errors and fatal protocol or I/O failures).
    pub fn on_error(&self, handler: impl Fn(&Error) + Send + Sync + 'static) {
        self.inner.events.subscribe_error(Box::new(handler));
    }

    /// Register a handler invoked when the connection opens.
    pub fn on_connect(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.inner.events.subscribe_connect(Box::new(handler));
    }

    /// Register a handler invoked once when the connection closes.
    pub fn on_close(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.inner.events.subscribe_close(Box::new(handler));
    }

    /// Close the connection. Idempotent; pending requests fail with
    /// [`Error::Closed`].
    pub async fn close(&self) {
        self.inner.dispatch().close();
        let mut writer = self.inner.writer.lock().await;
        if let Some(mut write_half) = writer.take() {
            let _ = write_half.shutdown().await;
        }
        drop(writer);
        self.inner.events.emit_close();
    }

    // ── Typed calls ─────────────────────────────────────────────────────

    /// Log in as `person`. The password is Latin-1 encoded on the wire.
    pub async fn login(&self, person: u32, passwd: &str, invisible: bool) -> Result<(), Error> {
        self.call(
            "login",
            Value::structure([
                ("person", person.into()),
                ("passwd", passwd.into()),
                ("invisible", invisible.into()),
            ]),
        )
        .await
        .map(drop)
    }

    /// Log out without closing the connection.
    pub async fn logout(&self) -> Result<(), Error> {
        self.call("logout", Value::Empty).await.map(drop)
    }

    /// Send a short message to a conference or person.
    pub async fn send_message(&self, recipient: u32, message: &str) -> Result<(), Error> {
        self.call(
            "send-message",
            Value::structure([
                ("recipient", recipient.into()),
                ("message", message.into()),
            ]),
        )
        .await
        .map(drop)
    }

    /// Tell the server which asynchronous messages to deliver.
    pub async fn accept_async(&self, requests: &[u32]) -> Result<(), Error> {
        self.call(
            "accept-async",
            Value::structure([(
                "requestList",
                Value::array(requests.iter().map(|&n| n.into())),
            )]),
        )
        .await
        .map(drop)
    }

    /// Ask which asynchronous messages the server currently delivers.
    pub async fn query_async(&self) -> Result<Vec<u32>, Error> {
        let reply = self.call("query-async", Value::Empty).await?;
        reply
            .as_array()
            .ok_or(Error::UnexpectedResponse)?
            .iter()
            .map(|v| v.as_u32().ok_or(Error::UnexpectedResponse))
            .collect()
    }

    /// The session number of this connection.
    pub async fn who_am_i(&self) -> Result<u32, Error> {
        self.call("who-am-i", Value::Empty)
            .await?
            .as_u32()
            .ok_or(Error::UnexpectedResponse)
    }

    /// Server wall-clock time as a `Time` record.
    pub async fn get_time(&self) -> Result<Value, Error> {
        self.call("get-time", Value::Empty).await
    }

    /// Fetch (part of) a text body. The bytes are returned verbatim.
    pub async fn get_text(&self, text: u32, start: u32, end: u32) -> Result<Bytes, Error> {
        let reply = self
            .call(
                "get-text",
                Value::structure([
                    ("text", text.into()),
                    ("startChar", start.into()),
                    ("endChar", end.into()),
                ]),
            )
            .await?;
        reply
            .as_bytes()
            .cloned()
            .ok_or(Error::UnexpectedResponse)
    }

    /// Update the "what am I doing" string shown to other sessions.
    pub async fn change_what_i_am_doing(&self, what: &str) -> Result<(), Error> {
        self.call(
            "change-what-i-am-doing",
            Value::structure([("what", what.into())]),
        )
        .await
        .map(drop)
    }

    /// Report this session as active.
    pub async fn user_active(&self) -> Result<(), Error> {
        self.call("user-active", Value::Empty).await.map(drop)
    }

    /// Identify the client software to the server.
    pub async fn set_client_version(&self, name: &str, version: &str) -> Result<(), Error> {
        self.call(
            "set-client-version",
            Value::structure([
                ("clientName", name.into()),
                ("clientVersion", version.into()),
            ]),
        )
        .await
        .map(drop)
    }

    /// Look up conferences and persons by name pattern. Returns the raw
    /// `ConfZInfo` array.
    pub async fn lookup_z_name(
        &self,
        name: &str,
        want_pers: bool,
        want_confs: bool,
    ) -> Result<Value, Error> {
        self.call(
            "lookup-z-name",
            Value::structure([
                ("name", name.into()),
                ("wantPers", want_pers.into()),
                ("wantConfs", want_confs.into()),
            ]),
        )
        .await
    }

    /// Server and protocol version information.
    pub async fn get_version_info(&self) -> Result<Value, Error> {
        self.call("get-version-info", Value::Empty).await
    }
}

/// Reads the socket and drives the dispatcher until end of stream or a
/// fatal error.
async fn read_loop(
    inner: Arc<Shared>,
    mut read_half: OwnedReadHalf,
    handshake_tx: oneshot::Sender<Result<(), Error>>,
) {
    let mut handshake_tx = Some(handshake_tx);
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        let read = read_half.read(&mut buf).await;
        let mut signals = Vec::new();
        let outcome = match read {
            Ok(0) => inner.dispatch().finish(&mut signals).map(|()| true),
            Ok(n) => inner.dispatch().feed(&buf[..n], &mut signals).map(|()| false),
            Err(e) => Err(Error::Io(e)),
        };
        deliver(&inner, signals, &mut handshake_tx);
        match outcome {
            Ok(false) => continue,
            Ok(true) => {
                debug!("server closed the connection");
                shutdown(&inner, None, handshake_tx.take()).await;
                return;
            }
            Err(error) => {
                shutdown(&inner, Some(error), handshake_tx.take()).await;
                return;
            }
        }
    }
}

fn deliver(
    inner: &Shared,
    signals: Vec<Signal>,
    handshake_tx: &mut Option<oneshot::Sender<Result<(), Error>>>,
) {
    for signal in signals {
        match signal {
            Signal::Connected => {
                if let Some(tx) = handshake_tx.take() {
                    let _ = tx.send(Ok(()));
                }
                inner.events.emit_connect();
            }
            Signal::AsyncEvent { name, value } => inner.events.emit_async(name, &value),
            Signal::ServerError(text) => {
                inner.events.emit_error(&Error::Server(latin1::decode(&text)));
            }
        }
    }
}

async fn shutdown(
    inner: &Shared,
    error: Option<Error>,
    handshake_tx: Option<oneshot::Sender<Result<(), Error>>>,
) {
    inner.dispatch().close();
    if let Some(error) = error {
        warn!(%error, "connection failed");
        inner.events.emit_error(&error);
        if let Some(tx) = handshake_tx {
            let _ = tx.send(Err(error));
        }
    } else if let Some(tx) = handshake_tx {
        let _ = tx.send(Err(Error::Closed));
    }
    let mut writer = inner.writer.lock().await;
    if let Some(mut write_half) = writer.take() {
        let _ = write_half.shutdown().await;
    }
    drop(writer);
    inner.events.emit_close();
}
