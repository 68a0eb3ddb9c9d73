//! CLI for xletbench: stream a numbered counter between an outlet and an
//! inlet process, sweep configurations, and analyze the logs they leave.

mod commands;

use clap::{Parser, Subcommand};

use commands::XletArgs;

#[derive(Parser)]
#[command(name = "xletbench")]
#[command(about = "xletbench: outlet/inlet streaming benchmark with offline loss and latency analysis")]
#[command(version = xletbench_core::VERSION)]
struct Cli {
    /// Debug-level logging (RUST_LOG still takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce the counter stream for one run and log every sample sent
    Outlet {
        #[command(flatten)]
        xlet: XletArgs,

        /// How samples are handed to the bus
        #[arg(long, default_value = "tcpsample", value_parser = ["tcpsample", "tcpchunk"])]
        kind: String,

        /// Samples to produce before end-of-stream
        #[arg(long, default_value_t = 10_000)]
        total_count: u64,

        /// Seconds to wait for the first inlet before streaming (0 = don't wait)
        #[arg(long, default_value_t = 5)]
        subscriber_wait_secs: u64,
    },

    /// Receive one run's stream, batch it into windows and log them
    Inlet {
        #[command(flatten)]
        xlet: XletArgs,

        /// How items are taken off the bus
        #[arg(long, default_value = "tcppull", value_parser = ["tcppull", "tcppoll"])]
        kind: String,

        /// What to do with a final window that never filled up
        #[arg(long, default_value = "flush", value_parser = ["flush", "drop"])]
        tail_policy: String,

        /// Seconds to keep trying to reach the outlet
        #[arg(long, default_value_t = 30)]
        ready_timeout_secs: u64,

        /// Abort when nothing arrives for this many seconds
        #[arg(long)]
        idle_timeout_secs: Option<u64>,
    },

    /// Run every outlet/inlet combination of a sweep plan as child processes
    Run {
        /// Platform label recorded in every log file name
        #[arg(long)]
        platform: String,

        /// Stream datatype
        #[arg(long, default_value = "counter", value_parser = ["counter", "airsignal"])]
        datatype: String,

        /// Sweep plan JSON (defaults apply to missing fields)
        #[arg(long)]
        plan: Option<String>,

        /// Directory for run logs and sweep.json
        #[arg(long, default_value = "logs")]
        log_dir: String,

        /// Print the runs without executing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Pair, verify and summarize every run in a log directory
    Analyze {
        /// Directory holding the run logs
        #[arg(long, default_value = "logs")]
        dir: String,

        /// Write the full report as JSON to this path
        #[arg(long)]
        output: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Outlet {
            xlet,
            kind,
            total_count,
            subscriber_wait_secs,
        } => commands::outlet::run(&xlet, &kind, total_count, subscriber_wait_secs),
        Commands::Inlet {
            xlet,
            kind,
            tail_policy,
            ready_timeout_secs,
            idle_timeout_secs,
        } => commands::inlet::run(commands::inlet::InletCommandConfig {
            xlet: &xlet,
            kind: &kind,
            tail_policy: &tail_policy,
            ready_timeout_secs,
            idle_timeout_secs,
        }),
        Commands::Run {
            platform,
            datatype,
            plan,
            log_dir,
            dry_run,
        } => commands::run::run(&platform, &datatype, plan.as_deref(), &log_dir, dry_run, cli.verbose),
        Commands::Analyze { dir, output } => commands::analyze::run(&dir, output.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_inlet_flags() {
        let cli = Cli::try_parse_from([
            "xletbench", "inlet", "--id", "4", "--kind", "tcppoll", "--multiproc", "false",
            "--window", "60", "--idle-timeout-secs", "3", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Inlet {
                xlet,
                kind,
                tail_policy,
                idle_timeout_secs,
                ..
            } => {
                assert_eq!(xlet.id, 4);
                assert!(!xlet.multiproc);
                assert_eq!(xlet.window, 60);
                assert_eq!(kind, "tcppoll");
                assert_eq!(tail_policy, "flush");
                assert_eq!(idle_timeout_secs, Some(3));
            }
            _ => panic!("expected inlet command"),
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(Cli::try_parse_from(["xletbench", "outlet", "--id", "0", "--kind", "pylsl"]).is_err());
    }
}
