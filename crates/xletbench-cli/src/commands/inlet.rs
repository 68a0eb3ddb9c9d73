use std::sync::Arc;
use std::time::Duration;

use xletbench_bus::{ConnectOptions, ReceiveMode, TcpInlet, build_runtime, run_consumer};
use xletbench_core::{Clock, ConsumerLogWriter, LocalClock, Result, Role, RunConfig, WindowAccumulator};

use super::{XletArgs, exit_with};

pub struct InletCommandConfig<'a> {
    pub xlet: &'a XletArgs,
    pub kind: &'a str,
    pub tail_policy: &'a str,
    pub ready_timeout_secs: u64,
    pub idle_timeout_secs: Option<u64>,
}

pub fn run(cmd: InletCommandConfig<'_>) {
    let mode: ReceiveMode = cmd.kind.parse().unwrap_or_else(|e| exit_with("inlet", e));
    let mut config = cmd
        .xlet
        .config(Role::Inlet, mode.kind())
        .unwrap_or_else(|e| exit_with("inlet", e));
    config.tail_policy = cmd.tail_policy.parse().unwrap_or_else(|e| exit_with("inlet", e));
    config.ready_timeout = Duration::from_secs(cmd.ready_timeout_secs);
    config.idle_timeout = cmd.idle_timeout_secs.map(Duration::from_secs);

    let rt = build_runtime(config.meta.multiproc).unwrap_or_else(|e| exit_with("inlet runtime", e));
    if let Err(e) = rt.block_on(receive(cmd.xlet, &config, mode)) {
        log::error!("inlet run {} failed: {e}", config.meta.id);
        exit_with("inlet", e);
    }
}

async fn receive(xlet: &XletArgs, config: &RunConfig, mode: ReceiveMode) -> Result<()> {
    let accumulator = WindowAccumulator::new(config.meta.window_size, config.tail_policy)?;
    // Created before connecting so a failed run still leaves its (empty) log.
    let consumer_log = ConsumerLogWriter::create(config.log_path(Role::Inlet)?)?;

    let clock: Arc<dyn Clock> = Arc::new(LocalClock);
    let addr = xlet.addr()?;
    let opts = ConnectOptions {
        ready_timeout: config.ready_timeout,
        ..ConnectOptions::default()
    };
    let inlet = TcpInlet::connect(addr, clock.as_ref(), &opts).await?;
    log::info!(
        "inlet {} ({}) subscribed to {addr}: window {}, tail {}, round trip {:.6}s",
        config.meta.id,
        mode,
        config.meta.window_size,
        config.tail_policy,
        inlet.round_trip()
    );

    let stats = run_consumer(
        inlet,
        clock,
        accumulator,
        consumer_log,
        mode,
        config.channel_capacity,
        config.idle_timeout,
    )
    .await?;

    println!(
        "inlet {}: received {} records in {} windows ({} dropped) -> {}",
        config.meta.id,
        stats.records,
        stats.windows,
        stats.records_dropped,
        stats.log_path.display()
    );
    Ok(())
}
