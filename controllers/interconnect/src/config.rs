//! Controller configuration: command-line flags and timing constants.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

/// Floor of the per-key failure rate limiter
pub const RATE_LIMIT_BASE: Duration = Duration::from_millis(10);
/// Ceiling of the per-key failure rate limiter
pub const RATE_LIMIT_MAX: Duration = Duration::from_secs(5);
/// Requeue delay after a stale site was removed in `Configuring`
pub const CONFIGURING_RECHECK: Duration = Duration::from_secs(10);
/// Requeue delay while waiting on asynchronously propagated labels
pub const LABEL_WAIT: Duration = Duration::from_secs(10);
/// Requeue delay while a referenced object has not been created yet
pub const DEPENDENCY_WAIT: Duration = Duration::from_secs(10);
/// Full re-list period of member-cluster Service watches
pub const MEMBER_RESYNC_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);
/// Poll interval while a member-cluster Service watch is not yet available
pub const MEMBER_SYNC_POLL: Duration = Duration::from_secs(10);

/// Where cluster connections come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// In-cluster connection for every cluster id
    Dev,
    /// Kubeconfigs fetched from the deployment manager
    Prod,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Plain,
    Json,
}

/// Interconnect fabric controller
#[derive(Debug, Clone, Parser)]
#[command(name = "interconnect-controller", version, about)]
pub struct Args {
    /// Cluster access mode
    #[arg(short = 'm', long, value_enum, default_value = "prod", env = "INTERCONNECT_MODE")]
    pub mode: Mode,

    /// Health probe bind address
    #[arg(long, default_value = "0.0.0.0:8083", env = "PROBE_ADDR")]
    pub probe_addr: SocketAddr,

    /// Log output format
    #[arg(long, value_enum, default_value = "plain", env = "LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Concurrent reconciles per controller
    #[arg(long, default_value_t = 3, env = "CONCURRENCY")]
    pub concurrency: u16,
}
