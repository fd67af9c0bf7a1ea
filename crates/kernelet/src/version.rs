//! Version information for kernelet.

/// Kernelet version from Cargo.toml
pub const KERNELET_VERSION: &str = env!("CARGO_PKG_VERSION");
