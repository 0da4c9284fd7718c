//! Reachability tracking. A cheap HEAD probe answers "are we online right
//! now", and a watch channel lets the sync engine observe the
//! disconnected-to-connected transition that triggers a flush.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use tokio::sync::watch;

use crate::config::EngineConfig;

#[async_trait]
pub trait Connectivity: Send + Sync {
    /// Current reachability. Implementations may serve a cached result;
    /// a probe that fails or times out counts as offline.
    async fn is_online(&self) -> bool;

    /// Receiver observing reachability transitions.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

#[derive(Clone, Copy)]
struct ProbeResult {
    at: Instant,
    online: bool,
}

pub struct ConnectivityMonitor {
    client: reqwest::Client,
    probe_url: String,
    min_probe_gap: Duration,
    last_probe: Mutex<Option<ProbeResult>>,
    online_tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()
            .context("failed to build connectivity probe client")?;

        // Assume offline until the first probe says otherwise; the safe
        // default routes captures into the durable queue.
        let (online_tx, _) = watch::channel(false);

        Ok(Self {
            client,
            probe_url: config.probe_url.clone(),
            min_probe_gap: config.min_probe_gap,
            last_probe: Mutex::new(None),
            online_tx,
        })
    }

    async fn probe(&self) -> bool {
        match self.client.head(&self.probe_url).send().await {
            Ok(response) => {
                let status = response.status();
                status.is_success() || status.is_redirection()
            }
            Err(err) => {
                debug!("connectivity probe failed: {err}");
                false
            }
        }
    }

    fn cached(&self) -> Option<bool> {
        let guard = self.last_probe.lock().unwrap();
        guard
            .filter(|probe| probe.at.elapsed() < self.min_probe_gap)
            .map(|probe| probe.online)
    }

    fn record(&self, online: bool) {
        {
            let mut guard = self.last_probe.lock().unwrap();
            *guard = Some(ProbeResult {
                at: Instant::now(),
                online,
            });
        }
        // Only a real change wakes subscribers.
        self.online_tx.send_if_modified(|current| {
            if *current != online {
                *current = online;
                true
            } else {
                false
            }
        });
    }
}

#[async_trait]
impl Connectivity for ConnectivityMonitor {
    async fn is_online(&self) -> bool {
        if let Some(online) = self.cached() {
            return online;
        }
        let online = self.probe().await;
        self.record(online);
        online
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.online_tx.subscribe()
    }
}
