//! Connection parameters for a running kernel.
//!
//! A kernel is addressed over five named channels, each on its own TCP port.
//! The full record (`ConnectionInfo`) round-trips through the standard
//! `kernel-<id>.json` connection file so third-party clients can attach; the
//! compact `ConnectionSummary` is the `{key, ports}` blob the launcher prints
//! on stdout.

use std::io;
use std::net::TcpListener;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Signature scheme advertised in connection files.
pub const SIGNATURE_SCHEME: &str = "hmac-sha256";

/// The five kernel channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Shell,
    Stdin,
    Iopub,
    Hb,
    Control,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 5] = [
        ChannelKind::Shell,
        ChannelKind::Stdin,
        ChannelKind::Iopub,
        ChannelKind::Hb,
        ChannelKind::Control,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Shell => "shell",
            ChannelKind::Stdin => "stdin",
            ChannelKind::Iopub => "iopub",
            ChannelKind::Hb => "hb",
            ChannelKind::Control => "control",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Port assignment for the five channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPorts {
    pub shell: u16,
    pub stdin: u16,
    pub iopub: u16,
    pub hb: u16,
    pub control: u16,
}

impl ChannelPorts {
    pub fn get(&self, kind: ChannelKind) -> u16 {
        match kind {
            ChannelKind::Shell => self.shell,
            ChannelKind::Stdin => self.stdin,
            ChannelKind::Iopub => self.iopub,
            ChannelKind::Hb => self.hb,
            ChannelKind::Control => self.control,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelKind, u16)> + '_ {
        ChannelKind::ALL.into_iter().map(|k| (k, self.get(k)))
    }
}

/// Allocate five OS-assigned ports on `ip`.
///
/// All five listeners are held open simultaneously, so the returned set is
/// internally distinct and disjoint from any port a concurrently running
/// kernel already owns. The listeners are released on return; the window
/// until the kernel binds them is the same one `jupyter_client` accepts.
pub(crate) fn pick_ports(ip: &str) -> io::Result<ChannelPorts> {
    let listeners: Vec<TcpListener> = (0..5)
        .map(|_| TcpListener::bind((ip, 0)))
        .collect::<io::Result<_>>()?;

    let mut ports = [0u16; 5];
    for (slot, listener) in ports.iter_mut().zip(&listeners) {
        *slot = listener.local_addr()?.port();
    }

    Ok(ChannelPorts {
        shell: ports[0],
        stdin: ports[1],
        iopub: ports[2],
        hb: ports[3],
        control: ports[4],
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("failed to access connection file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed connection file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Full connection record in the standard Jupyter connection-file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub transport: String,
    pub ip: String,
    pub shell_port: u16,
    pub iopub_port: u16,
    pub stdin_port: u16,
    pub control_port: u16,
    pub hb_port: u16,
    pub key: String,
    pub signature_scheme: String,
    #[serde(default)]
    pub kernel_name: String,
}

impl ConnectionInfo {
    pub fn new(
        ip: impl Into<String>,
        ports: ChannelPorts,
        key: impl Into<String>,
        kernel_name: impl Into<String>,
    ) -> Self {
        Self {
            transport: "tcp".to_string(),
            ip: ip.into(),
            shell_port: ports.shell,
            iopub_port: ports.iopub,
            stdin_port: ports.stdin,
            control_port: ports.control,
            hb_port: ports.hb,
            key: key.into(),
            signature_scheme: SIGNATURE_SCHEME.to_string(),
            kernel_name: kernel_name.into(),
        }
    }

    pub fn port(&self, kind: ChannelKind) -> u16 {
        match kind {
            ChannelKind::Shell => self.shell_port,
            ChannelKind::Stdin => self.stdin_port,
            ChannelKind::Iopub => self.iopub_port,
            ChannelKind::Hb => self.hb_port,
            ChannelKind::Control => self.control_port,
        }
    }

    pub fn ports(&self) -> ChannelPorts {
        ChannelPorts {
            shell: self.shell_port,
            stdin: self.stdin_port,
            iopub: self.iopub_port,
            hb: self.hb_port,
            control: self.control_port,
        }
    }

    /// Connection URL for one channel, e.g. `tcp://127.0.0.1:51234`.
    pub fn url(&self, kind: ChannelKind) -> String {
        format!("{}://{}:{}", self.transport, self.ip, self.port(kind))
    }

    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            key: self.key.clone(),
            ports: self.ports(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), ConnectionError> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConnectionError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn read(path: &Path) -> Result<Self, ConnectionError> {
        let raw = std::fs::read(path).map_err(|source| ConnectionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// The launcher's stdout report: session key plus the five channel ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub key: String,
    pub ports: ChannelPorts,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ports() -> ChannelPorts {
        ChannelPorts {
            shell: 50001,
            stdin: 50002,
            iopub: 50003,
            hb: 50004,
            control: 50005,
        }
    }

    #[test]
    fn picked_ports_are_distinct_and_nonzero() {
        let ports = pick_ports("127.0.0.1").unwrap();
        let mut all: Vec<u16> = ports.iter().map(|(_, p)| p).collect();
        assert!(all.iter().all(|&p| p > 0));
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn summary_has_exactly_key_and_five_ports() {
        let info = ConnectionInfo::new("127.0.0.1", sample_ports(), "secret", "python3");
        let value = serde_json::to_value(info.summary()).unwrap();

        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["key"], "secret");

        let ports = obj["ports"].as_object().unwrap();
        assert_eq!(ports.len(), 5);
        for kind in ChannelKind::ALL {
            assert!(
                ports[kind.as_str()].as_u64().is_some_and(|p| p > 0),
                "missing port for {kind}"
            );
        }
    }

    #[test]
    fn connection_file_roundtrips() {
        let info = ConnectionInfo::new("127.0.0.1", sample_ports(), "secret", "python3");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel-test.json");

        info.write(&path).unwrap();
        let loaded = ConnectionInfo::read(&path).unwrap();

        assert_eq!(loaded.key, "secret");
        assert_eq!(loaded.signature_scheme, SIGNATURE_SCHEME);
        assert_eq!(loaded.ports(), info.ports());
        assert_eq!(loaded.kernel_name, "python3");
    }

    #[test]
    fn connection_file_uses_standard_field_names() {
        let info = ConnectionInfo::new("127.0.0.1", sample_ports(), "secret", "python3");
        let value = serde_json::to_value(&info).unwrap();
        let obj = value.as_object().unwrap();

        for field in [
            "transport",
            "ip",
            "shell_port",
            "iopub_port",
            "stdin_port",
            "control_port",
            "hb_port",
            "key",
            "signature_scheme",
            "kernel_name",
        ] {
            assert!(obj.contains_key(field), "missing field {field}");
        }
        assert_eq!(obj["transport"], "tcp");
    }

    #[test]
    fn url_formats_channel_endpoint() {
        let info = ConnectionInfo::new("127.0.0.1", sample_ports(), "secret", "python3");
        assert_eq!(info.url(ChannelKind::Shell), "tcp://127.0.0.1:50001");
        assert_eq!(info.url(ChannelKind::Hb), "tcp://127.0.0.1:50004");
    }

    #[test]
    fn missing_kernel_name_defaults_to_empty() {
        let raw = serde_json::json!({
            "transport": "tcp",
            "ip": "127.0.0.1",
            "shell_port": 1,
            "iopub_port": 2,
            "stdin_port": 3,
            "control_port": 4,
            "hb_port": 5,
            "key": "k",
            "signature_scheme": "hmac-sha256"
        });
        let info: ConnectionInfo = serde_json::from_value(raw).unwrap();
        assert_eq!(info.kernel_name, "");
    }
}
