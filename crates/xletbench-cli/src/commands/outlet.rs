use std::sync::Arc;
use std::time::Duration;

use xletbench_bus::{SendMode, TcpOutlet, build_runtime, run_producer};
use xletbench_core::{
    Clock, Datatype, Error, LocalClock, ProducerLogWriter, Result, Role, RunConfig, SampleGenerator,
};

use super::{XletArgs, exit_with};

pub fn run(xlet: &XletArgs, kind: &str, total_count: u64, subscriber_wait_secs: u64) {
    let mode: SendMode = kind.parse().unwrap_or_else(|e| exit_with("outlet", e));
    let mut config = xlet
        .config(Role::Outlet, mode.kind())
        .unwrap_or_else(|e| exit_with("outlet", e));
    config.total_count = total_count;
    config.subscriber_wait = (subscriber_wait_secs > 0).then(|| Duration::from_secs(subscriber_wait_secs));
    if let Err(e) = config.validate() {
        exit_with("outlet", e);
    }

    let rt = build_runtime(config.meta.multiproc).unwrap_or_else(|e| exit_with("outlet runtime", e));
    if let Err(e) = rt.block_on(stream(xlet, &config, mode)) {
        log::error!("outlet run {} failed: {e}", config.meta.id);
        exit_with("outlet", e);
    }
}

async fn stream(xlet: &XletArgs, config: &RunConfig, mode: SendMode) -> Result<()> {
    if config.meta.datatype == Datatype::Airsignal {
        return Err(Error::config("the airsignal datatype has no generator; use counter"));
    }
    let generator = SampleGenerator::new(config.meta.sample_rate, config.total_count)?;
    let clock: Arc<dyn Clock> = Arc::new(LocalClock);

    let mut outlet = TcpOutlet::bind(xlet.addr()?, Arc::clone(&clock)).await?;
    log::info!(
        "outlet {} ({}) listening on {}: {} samples at {} Hz",
        config.meta.id,
        mode,
        outlet.local_addr(),
        config.total_count,
        config.meta.sample_rate
    );

    if let Some(wait) = config.subscriber_wait {
        if !outlet.wait_for_subscriber(wait).await {
            log::warn!("no inlet subscribed within {wait:?}; streaming anyway");
        }
    }

    let producer_log = ProducerLogWriter::create(config.log_path(Role::Outlet)?)?;
    let stats = run_producer(
        &mut outlet,
        generator,
        clock,
        producer_log,
        mode,
        config.channel_capacity,
    )
    .await?;

    println!(
        "outlet {}: sent {} samples in {} sends -> {}",
        config.meta.id,
        stats.samples_sent,
        stats.sends,
        stats.log_path.display()
    );
    Ok(())
}
