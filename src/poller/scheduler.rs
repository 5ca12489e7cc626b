use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::time::interval;
use tracing::{error, info};

use crate::poller::engine::{HostStats, PollEngine};
use crate::registry::HostRegistry;

// Keeps a large host list from opening every session at once.
const MAX_CONCURRENT_POLLS: usize = 16;

/// Drives read cycles on a fixed interval until shutdown.
pub struct Scheduler {
    engine: Arc<PollEngine>,
    hosts: Arc<HostRegistry>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(engine: Arc<PollEngine>, hosts: Arc<HostRegistry>, interval: Duration) -> Self {
        Self {
            engine,
            hosts,
            interval,
        }
    }

    /// Runs cycles until the shutdown future resolves. The first cycle
    /// starts immediately.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut ticker = interval(self.interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = &mut shutdown => {
                    info!("shutdown requested, stopping scheduler");
                    break;
                }
            }
        }
    }

    /// One read cycle: every host is polled on a blocking worker, capped
    /// by a semaphore so a large fleet does not flood the runtime.
    pub async fn run_cycle(&self) -> HostStats {
        if self.hosts.is_empty() {
            info!("no hosts configured");
            return HostStats::default();
        }

        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_POLLS));
        let mut tasks = Vec::with_capacity(self.hosts.len());
        for host in self.hosts.iter() {
            let engine = self.engine.clone();
            let host = host.clone();
            let permit = semaphore.clone();

            tasks.push(tokio::spawn(async move {
                // The semaphore is never closed, acquire cannot fail.
                let _permit = permit.acquire().await.unwrap();
                tokio::task::spawn_blocking(move || engine.poll_host(&host)).await
            }));
        }

        let mut total = HostStats::default();
        for task in tasks {
            match task.await {
                Ok(Ok(stats)) => total.merge(stats),
                Ok(Err(e)) => error!("poll worker failed: {e}"),
                Err(e) => error!("poll task failed: {e}"),
            }
        }

        info!(
            "cycle finished in {:?}: {} hosts, {} samples, {} definitions failed",
            started.elapsed(),
            self.hosts.len(),
            total.samples,
            total.definitions_failed
        );
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::binder::bind;
    use crate::config::parse_str;
    use crate::metrics::BufferSink;
    use crate::oid::Oid;
    use crate::registry::HostDefinition;
    use crate::schema::SchemaRegistry;
    use crate::snmp::{
        DeviceSession, Transport, TransportError, TransportResult, WireValue,
    };
    use crate::value::SlotValue;

    struct EmptySession;

    impl DeviceSession for EmptySession {
        fn get_many(&mut self, _oids: &[Oid]) -> TransportResult<Vec<(Oid, WireValue)>> {
            Ok(Vec::new())
        }
        fn get_next(&mut self, _oid: &Oid) -> TransportResult<Vec<(Oid, WireValue)>> {
            Ok(Vec::new())
        }
    }

    struct EmptyTransport;

    impl Transport for EmptyTransport {
        fn open(&self, _host: &HostDefinition) -> TransportResult<Box<dyn DeviceSession>> {
            Ok(Box::new(EmptySession))
        }
    }

    struct DownTransport;

    impl Transport for DownTransport {
        fn open(&self, host: &HostDefinition) -> TransportResult<Box<dyn DeviceSession>> {
            Err(TransportError::SessionOpen {
                address: host.address.clone(),
                detail: "connection refused".to_string(),
            })
        }
    }

    fn scheduler_with(transport: Arc<dyn Transport>, config: &str) -> (Scheduler, Arc<BufferSink>) {
        let items = parse_str(config, "test").unwrap();
        let mut schemas = SchemaRegistry::with_builtins();
        let (data, hosts, _) = bind(&items, &mut schemas);
        let sink = Arc::new(BufferSink::new());
        let engine = Arc::new(PollEngine::new(
            Arc::new(data),
            Arc::new(schemas),
            transport,
            sink.clone(),
        ));
        (
            Scheduler::new(engine, Arc::new(hosts), Duration::from_secs(60)),
            sink,
        )
    }

    const TWO_HOSTS: &str = r#"
[data.d]
type = "gauge"
instance = "x"
values = ["1.3.6.1.1"]

[host.a]
address = "192.0.2.1"
community = "public"

[host.b]
address = "192.0.2.2"
community = "public"

collect = [["a", "d"], ["b", "d"]]
"#;

    #[tokio::test]
    async fn test_cycle_with_no_hosts() {
        let (scheduler, sink) = scheduler_with(Arc::new(EmptyTransport), "");
        let stats = scheduler.run_cycle().await;
        assert_eq!(stats, HostStats::default());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_polls_every_host() {
        let (scheduler, sink) = scheduler_with(Arc::new(EmptyTransport), TWO_HOSTS);
        let stats = scheduler.run_cycle().await;
        assert_eq!(stats.definitions_polled, 2);
        assert_eq!(stats.samples, 2);

        // No response varbinds, so the gauge slot stays absent.
        let samples = sink.drain();
        assert_eq!(samples.len(), 2);
        assert!(matches!(samples[0].values[0].value, SlotValue::Gauge(g) if g.is_nan()));
    }

    #[tokio::test]
    async fn test_cycle_counts_unreachable_hosts() {
        let (scheduler, sink) = scheduler_with(Arc::new(DownTransport), TWO_HOSTS);
        let stats = scheduler.run_cycle().await;
        assert_eq!(stats.definitions_failed, 2);
        assert_eq!(stats.samples, 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (scheduler, _sink) = scheduler_with(Arc::new(EmptyTransport), "");
        let done = tokio::time::timeout(Duration::from_secs(5), scheduler.run(async {})).await;
        assert!(done.is_ok());
    }
}
