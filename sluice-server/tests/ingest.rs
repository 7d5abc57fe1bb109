use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use similar_asserts::assert_eq;
use sluice_config::{Config, StatsdConfig};
use sluice_metrics::{MetricRegistry, MetricType, MetricValue};
use sluice_server::{IngressCounters, IngressSnapshot, Server, StatsdSampler};

/// Resolves every metric and keeps a textual log of recorded updates.
#[derive(Debug, Default)]
struct RecordingRegistry {
    updates: Mutex<Vec<String>>,
}

impl RecordingRegistry {
    fn sorted(&self) -> Vec<String> {
        let mut updates = self.updates.lock().unwrap().clone();
        updates.sort();
        updates
    }
}

impl MetricRegistry for RecordingRegistry {
    type Handle = (String, MetricType);

    fn lookup(&self, key: &str, ty: MetricType) -> Option<Self::Handle> {
        Some((key.to_owned(), ty))
    }

    fn record(&self, handle: &Self::Handle, value: MetricValue<'_>, sample_rate: f64) {
        let (key, ty) = handle;
        let update = format!("{key}:{value}|{ty}|@{sample_rate}");
        self.updates.lock().unwrap().push(update);
    }
}

fn statsd_config(workers: usize, multimsg: usize) -> StatsdConfig {
    StatsdConfig {
        workers,
        multimsg,
        ..StatsdConfig::new("127.0.0.1".parse().unwrap(), 0)
    }
}

fn send(addr: SocketAddr, payloads: &[&str]) {
    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    for payload in payloads {
        client.send_to(payload.as_bytes(), addr).unwrap();
    }
}

fn wait_for_lines(stats: &IngressCounters, lines: u64) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let snapshot = stats.snapshot();
        if snapshot.lines >= lines {
            return;
        }
        assert!(Instant::now() < deadline, "timed out at {snapshot:?}");
        thread::sleep(Duration::from_millis(10));
    }
}

/// Sends `payloads` to a fresh sampler and shuts it down once `lines` lines were observed.
fn run_sampler(
    config: StatsdConfig,
    payloads: &[&str],
    lines: u64,
) -> (Vec<String>, IngressSnapshot) {
    sluice_log::init_test!();

    let registry = Arc::new(RecordingRegistry::default());
    let stats = Arc::new(IngressCounters::new());
    let sampler =
        StatsdSampler::start(&config, Arc::clone(&registry), Arc::clone(&stats)).unwrap();

    send(sampler.local_addr(), payloads);
    wait_for_lines(&stats, lines);

    assert_eq!(sampler.inflow(), payloads.len() as u64);
    // Joining the workers lets them finish the lines they are processing.
    sampler.shutdown();

    (registry.sorted(), stats.snapshot())
}

#[test]
fn test_single_receive() {
    let (updates, stats) = run_sampler(
        statsd_config(1, 1),
        &["gorets:1|c", "gaugor:333|g\nuniques:765|s", "sample: -5.5|ms"],
        4,
    );

    assert_eq!(
        updates,
        [
            "gaugor:333|g|@1",
            "gorets:1|c|@1",
            "sample:-5.5|ms|@1",
            "uniques:765|s|@1",
        ]
    );
    assert_eq!(
        stats,
        IngressSnapshot {
            datagrams: 3,
            lines: 4,
            dropped: 0,
        }
    );
}

#[test]
fn test_batched_receive() {
    let payloads: Vec<String> = (0..20).map(|i| format!("batch.{i}:{i}|h|@0.5")).collect();
    let payloads: Vec<&str> = payloads.iter().map(String::as_str).collect();

    let (updates, stats) = run_sampler(statsd_config(2, 8), &payloads, 20);

    assert_eq!(updates.len(), 20);
    assert!(updates.contains(&"batch.7:7|h|@0.5".to_owned()));
    assert_eq!(stats.datagrams, 20);
    assert_eq!(stats.dropped, 0);
}

#[test]
fn test_bad_lines_dropped() {
    let (updates, stats) = run_sampler(
        statsd_config(2, 1),
        &["bad:1|x\nmy key:1|c\n", "trailing.:1|c", "rate:1|c|@2"],
        4,
    );

    assert_eq!(updates, ["my_key:1|c|@1"]);
    assert_eq!(
        stats,
        IngressSnapshot {
            datagrams: 3,
            lines: 4,
            dropped: 3,
        }
    );
}

#[test]
fn test_truncated_datagram() {
    let config = StatsdConfig {
        max_packet_size: 16,
        ..statsd_config(1, 4)
    };

    let (updates, stats) = run_sampler(config, &["ok:1|c\ncut.off:12345|c"], 2);

    assert_eq!(updates, ["ok:1|c|@1"]);
    assert_eq!(stats.dropped, 1);
}

#[test]
fn test_server_shutdown_while_idle() {
    sluice_log::init_test!();

    let config = Config::from_json_value(serde_json::json!({
        "samplers": [
            {"type": "statsd", "address": "127.0.0.1", "port": 0, "workers": 4, "multimsg": 16},
            {"type": "statsd", "address": "127.0.0.1", "port": 0, "workers": 2, "multisock": true},
        ]
    }))
    .unwrap();

    let server = Server::start(&config, Arc::new(RecordingRegistry::default())).unwrap();
    assert_eq!(server.samplers().len(), 2);

    let started = Instant::now();
    server.shutdown();
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_server_counts_all_samplers() {
    sluice_log::init_test!();

    let config = Config::from_json_value(serde_json::json!({
        "samplers": [
            {"type": "statsd", "address": "127.0.0.1", "port": 0, "workers": 1},
            {"type": "statsd", "address": "127.0.0.1", "port": 0, "workers": 1},
        ]
    }))
    .unwrap();

    let registry = Arc::new(RecordingRegistry::default());
    let server = Server::start(&config, Arc::clone(&registry)).unwrap();

    for sampler in server.samplers() {
        send(sampler.local_addr(), &["hits:1|c"]);
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while server.stats().lines < 2 {
        assert!(Instant::now() < deadline, "timed out");
        thread::sleep(Duration::from_millis(10));
    }

    server.shutdown();
    assert_eq!(registry.sorted(), ["hits:1|c|@1", "hits:1|c|@1"]);
}
