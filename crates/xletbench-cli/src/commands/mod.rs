pub mod analyze;
pub mod inlet;
pub mod outlet;
pub mod run;

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use clap::{ArgAction, Args};
use xletbench_core::{Error, Result, Role, RunConfig};

/// Flags shared by the outlet and inlet of one run.
#[derive(Args, Debug, Clone)]
pub struct XletArgs {
    /// Run id pairing this xlet with its counterpart
    #[arg(long)]
    pub id: u32,

    /// Stream datatype
    #[arg(long, default_value = "counter", value_parser = ["counter", "airsignal"])]
    pub datatype: String,

    /// Platform label recorded in the log file name
    #[arg(long, default_value = std::env::consts::OS)]
    pub platform: String,

    /// Multi-threaded runtime (true) or a single-threaded one (false)
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub multiproc: bool,

    /// Nominal sample rate in Hz
    #[arg(long, default_value_t = 1000)]
    pub fs: u32,

    /// Inlet window size in samples
    #[arg(long, default_value_t = 1)]
    pub window: usize,

    /// Outlet host (the outlet binds it, the inlet connects to it)
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 17_000)]
    pub port: u16,

    /// Directory for the run's log file
    #[arg(long, default_value = "logs")]
    pub log_dir: String,

    /// Capacity of the internal task channels
    #[arg(long, default_value_t = 1024)]
    pub capacity: usize,
}

impl XletArgs {
    /// Run configuration for one side; validated before anything is opened.
    pub fn config(&self, role: Role, kind: &str) -> Result<RunConfig> {
        let mut config = RunConfig {
            log_dir: PathBuf::from(&self.log_dir),
            channel_capacity: self.capacity,
            ..RunConfig::default()
        };
        let meta = &mut config.meta;
        meta.id = self.id;
        meta.datatype = self.datatype.parse()?;
        meta.platform = self.platform.clone();
        meta.multiproc = self.multiproc;
        meta.sample_rate = self.fs;
        meta.window_size = self.window;
        match role {
            Role::Outlet => meta.outlet_kind = kind.to_string(),
            Role::Inlet => meta.inlet_kind = kind.to_string(),
        }
        config.validate()?;
        Ok(config)
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| Error::config(format!("cannot resolve {}:{}: {e}", self.host, self.port)))?
            .next()
            .ok_or_else(|| Error::config(format!("{}:{} resolves to no address", self.host, self.port)))
    }
}

/// Print an error and exit with status 1.
pub fn exit_with(context: &str, err: impl fmt::Display) -> ! {
    eprintln!("Error: {context}: {err}");
    std::process::exit(1);
}

/// Seconds with microsecond resolution, or `-` when absent.
pub fn fmt_secs(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.6}"),
        _ => "-".to_string(),
    }
}
