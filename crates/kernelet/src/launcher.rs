//! Kernel launcher - manages kernel subprocess lifecycle.
//!
//! Flow:
//! 1. Resolve the kernel spec
//! 2. Allocate the five channel ports and a session key
//! 3. Write the connection file, render argv, spawn the kernel
//! 4. Optionally wait for the first heartbeat echo
//!
//! Dropping a [`KernelManager`] leaves the kernel running; only
//! [`KernelManager::shutdown`] and [`KernelManager::kill`] reap the process
//! and remove the connection file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};

use crate::client::{Channel, ClientError, Heartbeat};
use crate::connection::{
    pick_ports, ChannelKind, ConnectionError, ConnectionInfo, ConnectionSummary,
};
use crate::kernelspec::{self, InterruptMode, KernelSpecError, ResolvedSpec, DEFAULT_KERNEL};
use crate::session::Session;
use crate::wire::codec::WireError;
use crate::wire::protocol::{InterruptRequest, Message, MsgType, ShutdownRequest};

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("spawn failed: {0}")]
    Other(String),
}

/// Extension point for different kernel spawn strategies.
pub trait KernelSpawner: Send + Sync {
    fn spawn(&self, argv: &[String], env: &HashMap<String, String>) -> Result<Child, SpawnError>;
}

/// Default spawner: run the rendered kernelspec argv directly.
pub struct CommandSpawner;

impl KernelSpawner for CommandSpawner {
    fn spawn(&self, argv: &[String], env: &HashMap<String, String>) -> Result<Child, SpawnError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SpawnError::Other("kernel spec argv is empty".to_string()))?;

        let child = Command::new(program)
            .args(args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;
        Ok(child)
    }
}

pub struct LaunchConfig {
    kernel_name: String,
    ip: String,
    connection_dir: Option<PathBuf>,
    kernel_dirs: Option<Vec<PathBuf>>,
    startup_timeout: Duration,
    spawner: Arc<dyn KernelSpawner>,
}

impl LaunchConfig {
    pub fn new() -> Self {
        Self {
            kernel_name: DEFAULT_KERNEL.to_string(),
            ip: "127.0.0.1".to_string(),
            connection_dir: None,
            kernel_dirs: None,
            startup_timeout: Duration::from_secs(60),
            spawner: Arc::new(CommandSpawner),
        }
    }

    pub fn with_kernel(mut self, name: impl Into<String>) -> Self {
        self.kernel_name = name.into();
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
        self
    }

    /// Directory for the connection file (default: a per-process directory
    /// under the system temp dir).
    pub fn with_connection_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.connection_dir = Some(dir.into());
        self
    }

    /// Override the Jupyter data directories searched for kernel specs.
    pub fn with_kernel_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.kernel_dirs = Some(dirs);
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn KernelSpawner>) -> Self {
        self.spawner = spawner;
        self
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error(transparent)]
    KernelSpec(#[from] KernelSpecError),

    #[error("failed to allocate channel ports: {0}")]
    Ports(#[source] std::io::Error),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error("kernel did not answer heartbeat within {0:?}")]
    StartupTimeout(Duration),

    #[error("kernel exited during startup ({0})")]
    DiedAtStartup(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("failed to signal kernel: {0}")]
    Signal(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A launched kernel: child process plus its connection parameters.
pub struct KernelManager {
    kernel_id: String,
    child: Child,
    spec: ResolvedSpec,
    connection: ConnectionInfo,
    connection_file: PathBuf,
    session: Session,
    startup_timeout: Duration,
}

impl KernelManager {
    /// Resolve, provision, and spawn a kernel.
    pub async fn start(config: LaunchConfig) -> Result<Self, LaunchError> {
        let spec = match &config.kernel_dirs {
            Some(dirs) => kernelspec::find_in(dirs, &config.kernel_name)?,
            None => kernelspec::find(&config.kernel_name)?,
        };
        tracing::info!(
            kernel = %config.kernel_name,
            display_name = %spec.spec.display_name,
            "Resolved kernel spec"
        );

        let ports = pick_ports(&config.ip).map_err(LaunchError::Ports)?;
        let session = Session::new();
        let connection = ConnectionInfo::new(
            config.ip.as_str(),
            ports,
            session.key(),
            config.kernel_name.as_str(),
        );

        let kernel_id = uuid::Uuid::new_v4().to_string();
        let dir = match &config.connection_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir().join(format!("kernelet-{}", std::process::id())),
        };
        std::fs::create_dir_all(&dir)?;
        let connection_file = dir.join(format!("kernel-{kernel_id}.json"));
        connection.write(&connection_file)?;
        tracing::debug!(path = %connection_file.display(), "Wrote connection file");

        let argv = spec.spec.render_argv(&connection_file, &spec.resource_dir);
        tracing::info!(argv = ?argv, "Spawning kernel subprocess");
        let child = match config.spawner.spawn(&argv, &spec.spec.env) {
            Ok(child) => child,
            Err(e) => {
                // The connection file holds a live session key.
                remove_connection_file(&connection_file);
                return Err(e.into());
            }
        };
        tracing::info!(pid = ?child.id(), kernel_id = %kernel_id, "Kernel spawned");

        Ok(Self {
            kernel_id,
            child,
            spec,
            connection,
            connection_file,
            session,
            startup_timeout: config.startup_timeout,
        })
    }

    pub fn kernel_id(&self) -> &str {
        &self.kernel_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn spec(&self) -> &ResolvedSpec {
        &self.spec
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.connection
    }

    pub fn connection_file(&self) -> &Path {
        &self.connection_file
    }

    /// The `{key, ports}` record reported on stdout by the launcher.
    pub fn summary(&self) -> ConnectionSummary {
        self.connection.summary()
    }

    pub fn is_alive(&mut self) -> std::io::Result<bool> {
        Ok(self.child.try_wait()?.is_none())
    }

    /// Block until the kernel answers its first heartbeat, or the configured
    /// startup timeout elapses. Returns the time the kernel took to come up.
    pub async fn wait_ready(&mut self) -> Result<Duration, LaunchError> {
        let timeout = self.startup_timeout;
        let start = Instant::now();
        let mut hb = Heartbeat::new(&self.connection);

        loop {
            if start.elapsed() >= timeout {
                return Err(LaunchError::StartupTimeout(timeout));
            }
            if let Some(status) = self.child.try_wait()? {
                return Err(LaunchError::DiedAtStartup(status.to_string()));
            }

            match hb.ping(Duration::from_millis(500)).await {
                Ok(rtt) => {
                    tracing::debug!(?rtt, elapsed = ?start.elapsed(), "Kernel heartbeat answered");
                    return Ok(start.elapsed());
                }
                Err(ClientError::PingTimeout(_)) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Heartbeat error during startup");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Interrupt the running cell, honoring the spec's `interrupt_mode`.
    pub async fn interrupt(&mut self) -> Result<(), LaunchError> {
        match self.spec.spec.interrupt_mode {
            InterruptMode::Signal => self.signal_interrupt(),
            InterruptMode::Message => {
                let msg = self.control_message(MsgType::InterruptRequest, InterruptRequest {})?;
                self.send_control(msg).await
            }
        }
    }

    #[cfg(unix)]
    fn signal_interrupt(&self) -> Result<(), LaunchError> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = self
            .child
            .id()
            .ok_or_else(|| LaunchError::Signal("kernel already exited".to_string()))?;
        kill(Pid::from_raw(pid as i32), Signal::SIGINT)
            .map_err(|e| LaunchError::Signal(e.to_string()))?;
        tracing::debug!(pid, "Sent SIGINT to kernel");
        Ok(())
    }

    #[cfg(not(unix))]
    fn signal_interrupt(&self) -> Result<(), LaunchError> {
        Err(LaunchError::Signal(
            "signal interrupts are not supported on this platform".to_string(),
        ))
    }

    /// Graceful shutdown: `shutdown_request` on the control channel, then
    /// kill if the kernel has not exited within `grace`.
    pub async fn shutdown(&mut self, grace: Duration) -> Result<(), LaunchError> {
        let msg = self.control_message(
            MsgType::ShutdownRequest,
            ShutdownRequest { restart: false },
        )?;
        if let Err(e) = self.send_control(msg).await {
            tracing::warn!(error = %e, "Failed to send shutdown_request, killing kernel");
            return self.kill().await;
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                tracing::info!(%status, "Kernel exited");
            }
            Err(_) => {
                tracing::warn!(grace = ?grace, "Kernel ignored shutdown_request, killing");
                self.child.start_kill()?;
                self.child.wait().await?;
            }
        }

        self.cleanup();
        Ok(())
    }

    /// Kill the kernel without the shutdown handshake.
    pub async fn kill(&mut self) -> Result<(), LaunchError> {
        self.child.start_kill()?;
        let status = self.child.wait().await?;
        tracing::info!(%status, "Kernel killed");
        self.cleanup();
        Ok(())
    }

    fn control_message(
        &self,
        msg_type: MsgType,
        content: impl serde::Serialize,
    ) -> Result<Message, LaunchError> {
        let content = serde_json::to_value(content).map_err(WireError::from).map_err(ClientError::from)?;
        Ok(Message::new(self.session.header(msg_type), content))
    }

    async fn send_control(&self, msg: Message) -> Result<(), LaunchError> {
        let mut control =
            Channel::open(ChannelKind::Control, &self.connection, self.session.clone()).await?;
        control.send(&msg).await?;
        Ok(())
    }

    fn cleanup(&self) {
        remove_connection_file(&self.connection_file);
    }
}

fn remove_connection_file(path: &Path) {
    if path.exists()
        && let Err(e) = std::fs::remove_file(path)
    {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "Failed to remove connection file"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = LaunchConfig::new();
        assert_eq!(config.kernel_name, DEFAULT_KERNEL);
        assert_eq!(config.ip, "127.0.0.1");
        assert_eq!(config.startup_timeout, Duration::from_secs(60));
        assert!(config.connection_dir.is_none());
        assert!(config.kernel_dirs.is_none());
    }

    #[test]
    fn config_builders_override_fields() {
        let config = LaunchConfig::new()
            .with_kernel("stub")
            .with_ip("0.0.0.0")
            .with_connection_dir("/tmp/conn")
            .with_kernel_dirs(vec![PathBuf::from("/opt/jupyter")])
            .with_startup_timeout(Duration::from_secs(5));

        assert_eq!(config.kernel_name, "stub");
        assert_eq!(config.ip, "0.0.0.0");
        assert_eq!(config.connection_dir, Some(PathBuf::from("/tmp/conn")));
        assert_eq!(config.kernel_dirs, Some(vec![PathBuf::from("/opt/jupyter")]));
        assert_eq!(config.startup_timeout, Duration::from_secs(5));
    }

    #[test]
    fn empty_argv_is_a_spawn_error() {
        let err = CommandSpawner
            .spawn(&[], &HashMap::new())
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, SpawnError::Other(_)));
    }
}
