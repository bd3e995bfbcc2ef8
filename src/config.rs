//! Command-line and environment configuration

use clap::{Args, Parser, Subcommand};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::paths::get_default_snapshot_path;

pub const DEFAULT_UI_PORT: u16 = 4444;

/// Time a stopped process group gets between SIGTERM and SIGKILL
pub const DEFAULT_KILL_GRACE_MS: u64 = 5000;

/// Launch and supervise local dev servers on the ports you choose
#[derive(Parser, Debug, Clone)]
#[command(name = "dev-runner", version, about)]
pub struct Settings {
    /// Port the web UI and API listen on
    #[arg(env = "UI_PORT", default_value_t = DEFAULT_UI_PORT)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Snapshot file (defaults to ~/.dev-runner/apps.json)
    #[arg(long, env = "DEV_RUNNER_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Directory of UI assets served for non-API paths
    #[arg(long, env = "DEV_RUNNER_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// Milliseconds between SIGTERM and SIGKILL when stopping a process (0 disables SIGKILL)
    #[arg(long, env = "DEV_RUNNER_KILL_GRACE_MS", default_value_t = DEFAULT_KILL_GRACE_MS)]
    pub kill_grace_ms: u64,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Detect the stack in a directory, pick a free port and run it in the foreground
    Detect(DetectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
    /// Project directory
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Only print the detected framework, command and PORT
    #[arg(long)]
    pub print: bool,

    /// Preferred port (defaults to the stack's conventional port)
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,
}

impl Settings {
    pub fn snapshot_path(&self) -> Result<PathBuf, String> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => get_default_snapshot_path(),
        }
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// ============================================================================
// TESTS
// ============================================================================
