//! Client side of a running kernel: channels, requests, heartbeat.

mod channel;
mod heartbeat;

pub use channel::{Channel, ClientError};
pub use heartbeat::Heartbeat;

use std::time::Duration;

use serde::Serialize;

use crate::connection::{ChannelKind, ConnectionInfo};
use crate::session::Session;
use crate::wire::codec::WireError;
use crate::wire::protocol::{
    ExecuteRequest, InterruptRequest, KernelInfoReply, KernelInfoRequest, Message, MsgType,
    ShutdownRequest,
};

/// Connected client for one kernel.
///
/// Owns the four message channels plus the heartbeat. Requests go out on
/// shell (or control for lifecycle operations); callers drain replies with
/// [`KernelClient::recv_shell`] and [`KernelClient::recv_iopub`].
pub struct KernelClient {
    session: Session,
    shell: Channel,
    iopub: Channel,
    stdin: Channel,
    control: Channel,
    hb: Heartbeat,
}

impl KernelClient {
    /// Connect using the key from the connection record.
    pub async fn connect(info: &ConnectionInfo) -> Result<Self, ClientError> {
        Self::connect_with_session(info, Session::from_key(info.key.clone())).await
    }

    pub async fn connect_with_session(
        info: &ConnectionInfo,
        session: Session,
    ) -> Result<Self, ClientError> {
        let shell = Channel::open(ChannelKind::Shell, info, session.clone()).await?;
        let iopub = Channel::open(ChannelKind::Iopub, info, session.clone()).await?;
        let stdin = Channel::open(ChannelKind::Stdin, info, session.clone()).await?;
        let control = Channel::open(ChannelKind::Control, info, session.clone()).await?;
        let hb = Heartbeat::new(info);

        tracing::info!(ip = %info.ip, session = session.id(), "Kernel client connected");
        Ok(Self {
            session,
            shell,
            iopub,
            stdin,
            control,
            hb,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn request(&self, msg_type: MsgType, content: impl Serialize) -> Result<Message, ClientError> {
        let content = serde_json::to_value(content).map_err(WireError::from)?;
        Ok(Message::new(self.session.header(msg_type), content))
    }

    /// Send an `execute_request` for `code`; returns the request msg_id.
    pub async fn execute(&mut self, code: &str) -> Result<String, ClientError> {
        self.execute_request(ExecuteRequest::new(code)).await
    }

    pub async fn execute_request(&mut self, request: ExecuteRequest) -> Result<String, ClientError> {
        let msg = self.request(MsgType::ExecuteRequest, request)?;
        let msg_id = msg.header.msg_id.clone();
        self.shell.send(&msg).await?;
        Ok(msg_id)
    }

    /// Send a `kernel_info_request`; returns the request msg_id.
    pub async fn kernel_info(&mut self) -> Result<String, ClientError> {
        let msg = self.request(MsgType::KernelInfoRequest, KernelInfoRequest {})?;
        let msg_id = msg.header.msg_id.clone();
        self.shell.send(&msg).await?;
        Ok(msg_id)
    }

    /// Ask the kernel to shut down, via the control channel.
    pub async fn shutdown_request(&mut self, restart: bool) -> Result<String, ClientError> {
        let msg = self.request(MsgType::ShutdownRequest, ShutdownRequest { restart })?;
        let msg_id = msg.header.msg_id.clone();
        self.control.send(&msg).await?;
        Ok(msg_id)
    }

    /// Ask the kernel to interrupt the running cell, via the control channel.
    pub async fn interrupt_request(&mut self) -> Result<String, ClientError> {
        let msg = self.request(MsgType::InterruptRequest, InterruptRequest {})?;
        let msg_id = msg.header.msg_id.clone();
        self.control.send(&msg).await?;
        Ok(msg_id)
    }

    pub async fn recv_shell(&mut self) -> Result<Message, ClientError> {
        self.shell.recv().await
    }

    pub async fn recv_iopub(&mut self) -> Result<Message, ClientError> {
        self.iopub.recv().await
    }

    pub async fn recv_stdin(&mut self) -> Result<Message, ClientError> {
        self.stdin.recv().await
    }

    pub async fn recv_control(&mut self) -> Result<Message, ClientError> {
        self.control.recv().await
    }

    pub async fn ping(&mut self, deadline: Duration) -> Result<Duration, ClientError> {
        self.hb.ping(deadline).await
    }

    /// Full handshake: `kernel_info_request`, then wait for the matching
    /// reply on shell, discarding unrelated traffic.
    pub async fn handshake(&mut self, deadline: Duration) -> Result<KernelInfoReply, ClientError> {
        let msg_id = self.kernel_info().await?;

        let wait = async {
            loop {
                let msg = self.shell.recv().await?;
                if msg.msg_type() == MsgType::KernelInfoReply && msg.is_reply_to(&msg_id) {
                    return msg.content_as::<KernelInfoReply>().map_err(ClientError::from);
                }
                tracing::debug!(
                    msg_type = msg.msg_type().as_str(),
                    "Ignoring shell message during handshake"
                );
            }
        };

        tokio::time::timeout(deadline, wait)
            .await
            .map_err(|_| ClientError::ReplyTimeout("kernel_info", deadline))?
    }
}
