//! Integration tests for xletbench-core.
//!
//! These drive the producer and consumer halves without a transport:
//! generator → producer log, and records → accumulator → consumer log, then
//! pair the two files back by name.

use xletbench_core::{
    ConsumerLogWriter, DeliveryRecord, ManualClock, ProducerLogWriter, Role, RunConfig,
    SampleGenerator, StreamItem, TailPolicy, Window, WindowAccumulator, group_runs, pair_run,
    read_consumer_log, read_producer_log,
};

fn write_run(dir: &std::path::Path, window_size: usize, skip: usize) -> RunConfig {
    let mut config = RunConfig {
        log_dir: dir.to_path_buf(),
        total_count: 25,
        ..RunConfig::default()
    };
    config.meta.id = 3;
    config.meta.window_size = window_size;

    let clock = ManualClock::new(10.0);
    let mut generator = SampleGenerator::new(1000, config.total_count).unwrap();
    let mut producer = ProducerLogWriter::create(config.log_path(Role::Outlet).unwrap()).unwrap();
    let mut consumer = ConsumerLogWriter::create(config.log_path(Role::Inlet).unwrap()).unwrap();
    let mut acc = WindowAccumulator::new(window_size, TailPolicy::Flush).unwrap();

    let mut seen = 0;
    while !generator.is_finished() {
        for item in generator.poll(&clock) {
            match item {
                StreamItem::Data(sample) => {
                    producer.write_sample(&sample).unwrap();
                    seen += 1;
                    if seen <= skip {
                        continue;
                    }
                    let record = DeliveryRecord::new(sample, 0.0, sample.t_generated + 0.002);
                    if let Some(w) = acc.push(record).unwrap() {
                        consumer.write_window(&w).unwrap();
                    }
                }
                StreamItem::EndOfStream { .. } => {
                    if let Some(w) = acc.finish().unwrap() {
                        consumer.write_window(&w).unwrap();
                    }
                }
            }
        }
        clock.advance(0.004);
    }

    producer.finish().unwrap();
    consumer.finish().unwrap();
    config
}

#[test]
fn producer_and_consumer_logs_pair_up() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_run(tmp.path(), 10, 3);

    let runs = group_runs(tmp.path()).unwrap();
    assert_eq!(runs.len(), 1);
    let pair = pair_run(3, &runs[&3]).unwrap();
    assert_eq!(pair.meta, config.meta);

    let sent: Vec<i64> = read_producer_log(&pair.outlet)
        .unwrap()
        .iter()
        .map(|s| s.value)
        .collect();
    assert_eq!(sent, (0..25).collect::<Vec<_>>());

    let windows = read_consumer_log(&pair.inlet).unwrap();
    let sizes: Vec<usize> = windows.iter().map(Window::len).collect();
    assert_eq!(sizes, vec![10, 10, 2]);
    assert_eq!(windows[0].first().value, 3);
    assert_eq!(windows[2].last().value, 24);
}

#[test]
fn unwindowed_consumer_log_has_one_row_per_sample() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_run(tmp.path(), 1, 0);

    let inlet = config.log_path(Role::Inlet).unwrap();
    let content = std::fs::read_to_string(&inlet).unwrap();
    assert_eq!(content.lines().count(), 26);
    assert!(!content.contains(';'));
}
