//! Kernel heartbeat: ping/echo over the hb channel.

use std::time::{Duration, Instant};

use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use crate::connection::{ChannelKind, ConnectionInfo};

use super::channel::ClientError;

/// REQ-side of the kernel's heartbeat echo socket.
///
/// REQ sockets alternate send/recv strictly, so a timed-out cycle leaves the
/// socket stuck mid-conversation. The socket is dropped on timeout and
/// rebuilt on the next ping.
pub struct Heartbeat {
    url: String,
    socket: Option<ReqSocket>,
}

impl Heartbeat {
    pub fn new(info: &ConnectionInfo) -> Self {
        Self {
            url: info.url(ChannelKind::Hb),
            socket: None,
        }
    }

    /// Ping the kernel, returning the round-trip time.
    pub async fn ping(&mut self, deadline: Duration) -> Result<Duration, ClientError> {
        let start = Instant::now();

        let mut socket = match self.socket.take() {
            Some(socket) => socket,
            None => {
                let mut socket = ReqSocket::new();
                socket
                    .connect(&self.url)
                    .await
                    .map_err(|source| ClientError::Connect {
                        channel: ChannelKind::Hb,
                        source,
                    })?;
                socket
            }
        };

        let cycle = async {
            socket.send(ZmqMessage::from("ping")).await?;
            socket.recv().await
        };

        match tokio::time::timeout(deadline, cycle).await {
            Ok(Ok(_echo)) => {
                let rtt = start.elapsed();
                tracing::trace!(?rtt, "Heartbeat echo");
                self.socket = Some(socket);
                Ok(rtt)
            }
            Ok(Err(e)) => Err(ClientError::Transport(e)),
            Err(_elapsed) => Err(ClientError::PingTimeout(deadline)),
        }
    }
}
