//! Message channels to a running kernel.
//!
//! Socket pairing per channel: DEALER for shell/stdin/control, SUB
//! (subscribed to everything) for iopub. The heartbeat channel is ping/echo
//! rather than messages and lives in [`super::heartbeat`].

use bytes::Bytes;
use zeromq::{DealerSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use crate::connection::{ChannelKind, ConnectionInfo};
use crate::session::Session;
use crate::wire::codec::{self, WireError};
use crate::wire::protocol::Message;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect {channel} channel: {source}")]
    Connect {
        channel: ChannelKind,
        source: zeromq::ZmqError,
    },

    #[error("transport error: {0}")]
    Transport(#[from] zeromq::ZmqError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("{kind} channel does not support {op}")]
    Unsupported { kind: ChannelKind, op: &'static str },

    #[error("heartbeat timed out after {0:?}")]
    PingTimeout(std::time::Duration),

    #[error("no {0} reply within {1:?}")]
    ReplyTimeout(&'static str, std::time::Duration),

    #[error("protocol error: {0}")]
    Protocol(String),
}

enum ChannelSocket {
    Dealer(DealerSocket),
    Sub(SubSocket),
}

/// One connected kernel channel.
pub struct Channel {
    kind: ChannelKind,
    session: Session,
    socket: ChannelSocket,
}

impl Channel {
    /// Connect a message channel from the connection record.
    pub async fn open(
        kind: ChannelKind,
        info: &ConnectionInfo,
        session: Session,
    ) -> Result<Self, ClientError> {
        let url = info.url(kind);
        let socket = match kind {
            ChannelKind::Shell | ChannelKind::Stdin | ChannelKind::Control => {
                let mut socket = DealerSocket::new();
                socket
                    .connect(&url)
                    .await
                    .map_err(|source| ClientError::Connect {
                        channel: kind,
                        source,
                    })?;
                ChannelSocket::Dealer(socket)
            }
            ChannelKind::Iopub => {
                let mut socket = SubSocket::new();
                socket
                    .connect(&url)
                    .await
                    .map_err(|source| ClientError::Connect {
                        channel: kind,
                        source,
                    })?;
                socket.subscribe("").await?;
                ChannelSocket::Sub(socket)
            }
            ChannelKind::Hb => {
                return Err(ClientError::Unsupported {
                    kind,
                    op: "messages",
                });
            }
        };

        tracing::debug!(channel = kind.as_str(), url = %url, "Channel connected");
        Ok(Self {
            kind,
            session,
            socket,
        })
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub async fn send(&mut self, msg: &Message) -> Result<(), ClientError> {
        let frames = codec::encode(msg, &self.session)?;
        let zmsg = to_zmq(frames)?;
        match &mut self.socket {
            ChannelSocket::Dealer(socket) => socket.send(zmsg).await?,
            ChannelSocket::Sub(_) => {
                return Err(ClientError::Unsupported {
                    kind: self.kind,
                    op: "send",
                });
            }
        }

        tracing::trace!(
            channel = self.kind.as_str(),
            msg_type = msg.header.msg_type.as_str(),
            msg_id = %msg.header.msg_id,
            "Sent message"
        );
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<Message, ClientError> {
        let zmsg = match &mut self.socket {
            ChannelSocket::Dealer(socket) => socket.recv().await?,
            ChannelSocket::Sub(socket) => socket.recv().await?,
        };

        let msg = codec::decode(zmsg.into_vec(), &self.session)?;
        tracing::trace!(
            channel = self.kind.as_str(),
            msg_type = msg.header.msg_type.as_str(),
            msg_id = %msg.header.msg_id,
            "Received message"
        );
        Ok(msg)
    }
}

fn to_zmq(frames: Vec<Bytes>) -> Result<ZmqMessage, ClientError> {
    let mut iter = frames.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| ClientError::Protocol("message encoded to zero frames".to_string()))?;
    let mut zmsg = ZmqMessage::from(first.to_vec());
    for frame in iter {
        zmsg.push_back(frame);
    }
    Ok(zmsg)
}
