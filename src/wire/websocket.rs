// SPDX-License-Identifier: MIT OR Apache-2.0

//! Websocket wire.
//!
//! The client dials `{host}:{port}/{id}`; the server derives the room id
//! from the request path. Messages travel as binary frames; anything else
//! is a protocol error and is dropped. The underlying session is not
//! re-entrant for concurrent senders, so sends are serialized by a lock.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async, connect_async};
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, warn};

use crate::channel::{Channel, ChannelError};
use crate::client::{Client, ConnectOptions};
use crate::config::ServerConfig;
use crate::error::Error;
use crate::registry::WireRegistry;
use crate::room::RoomManager;
use crate::server::{BindOptions, Server};
use crate::wire::{ServerWireOptions, WireOptions};

pub(crate) fn register(registry: &WireRegistry) {
    registry.register_client(
        "websocket",
        Arc::new(|options| Box::pin(connect_websocket(options))),
    );
    registry.register_server(
        "websocket",
        Arc::new(|options| Box::pin(bind_websocket(options))),
    );
}

/// Client options for the websocket wire.
#[derive(Debug, Clone)]
pub struct WebSocketOptions {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) cookies: Option<String>,
}

impl WebSocketOptions {
    /// Returns options dialing the given host (URL scheme and host, for
    /// instance `ws://localhost`) and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            cookies: None,
        }
    }

    /// Sends the given cookies with the connection request.
    pub fn cookies(mut self, cookies: impl Into<String>) -> Self {
        self.cookies = Some(cookies.into());
        self
    }
}

/// Server options for the websocket wire.
#[derive(Debug, Clone)]
pub struct WebSocketServerOptions {
    pub(crate) host: String,
    pub(crate) port: u16,
}

impl WebSocketServerOptions {
    /// Returns options binding a listener on the given interface and
    /// port. Port 0 picks a free port, observable through
    /// [`Server::local_addr`].
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl From<ServerConfig> for WebSocketServerOptions {
    fn from(config: ServerConfig) -> Self {
        Self::new(config.host, config.port)
    }
}

async fn connect_websocket(options: ConnectOptions) -> Result<Client, Error> {
    let ConnectOptions {
        id,
        document,
        auto_push,
        auto_pull,
        wire,
    } = options;
    let WireOptions::WebSocket(websocket) = wire else {
        return Err(Error::InvalidWireOptions("websocket"));
    };

    let url = format!("{}:{}/{}", websocket.host, websocket.port, id);
    let mut request = url
        .into_client_request()
        .map_err(|err| ChannelError::Transport(err.to_string()))?;
    if let Some(cookies) = websocket.cookies {
        let cookies = HeaderValue::from_str(&cookies)
            .map_err(|err| ChannelError::Transport(err.to_string()))?;
        request.headers_mut().insert(COOKIE, cookies);
    }

    let (socket, _response) = connect_async(request)
        .await
        .map_err(|err| ChannelError::Transport(err.to_string()))?;

    let document = document.unwrap_or_default();
    let channel = Arc::new(WebSocketChannel::new(socket));
    Client::start(document, channel, auto_push, auto_pull).await
}

async fn bind_websocket(options: BindOptions) -> Result<Server, Error> {
    let ServerWireOptions::WebSocket(websocket) = options.wire else {
        return Err(Error::InvalidWireOptions("websocket"));
    };

    let listener = TcpListener::bind((websocket.host.as_str(), websocket.port)).await?;
    let local_addr = listener.local_addr()?;
    debug!(%local_addr, "websocket server listening");

    let cancel = CancellationToken::new();
    let room_manager = Arc::new(RoomManager::new(options.room_factory, cancel.clone()));

    let accept_cancel = cancel.clone();
    let accept_manager = room_manager.clone();
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = accept_cancel.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!(%err, "failed to accept connection");
                            continue;
                        }
                    };
                    let manager = accept_manager.clone();
                    tokio::spawn(async move {
                        let mut path = String::new();
                        let socket = match accept_hdr_async(stream, |request: &Request, response: Response| {
                            path = request.uri().path().to_owned();
                            Ok(response)
                        })
                        .await
                        {
                            Ok(socket) => socket,
                            Err(err) => {
                                debug!(%remote_addr, %err, "websocket handshake failed");
                                return;
                            }
                        };
                        let id = path.trim_start_matches('/').to_owned();
                        let channel = Arc::new(WebSocketChannel::new(socket));
                        manager.serve(id, channel).await;
                    });
                }
            }
        }
    });

    Ok(Server::listening(
        room_manager,
        cancel,
        local_addr,
        AbortOnDropHandle::new(task),
    ))
}

/// Channel adapter over a websocket session.
struct WebSocketChannel<S> {
    sink: Mutex<SplitSink<WebSocketStream<S>, WsMessage>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
}

impl<S> WebSocketChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(socket: WebSocketStream<S>) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

fn transport_error(err: WsError) -> ChannelError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => ChannelError::Closed,
        other => ChannelError::Transport(other.to_string()),
    }
}

#[async_trait]
impl<S> Channel for WebSocketChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, message: Vec<u8>) -> Result<(), ChannelError> {
        self.sink
            .lock()
            .await
            .send(WsMessage::Binary(message))
            .await
            .map_err(transport_error)
    }

    async fn recv(&self) -> Result<Vec<u8>, ChannelError> {
        let mut stream = self.stream.lock().await;
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(WsMessage::Binary(data)) => return Ok(data),
                Ok(WsMessage::Close(_)) => return Err(ChannelError::Closed),
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => continue,
                Ok(other) => {
                    warn!(kind = %frame_kind(&other), "dropping non-binary frame");
                    continue;
                }
                Err(err) => return Err(transport_error(err)),
            }
        }
        Err(ChannelError::Closed)
    }
}

fn frame_kind(message: &WsMessage) -> &'static str {
    match message {
        WsMessage::Text(_) => "text",
        WsMessage::Binary(_) => "binary",
        WsMessage::Ping(_) => "ping",
        WsMessage::Pong(_) => "pong",
        WsMessage::Close(_) => "close",
        WsMessage::Frame(_) => "frame",
    }
}
