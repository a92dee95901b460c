//! services/offline/src/adapters/connectivity.rs
//!
//! Connectivity sources: a watch-channel source that anything can feed, and a
//! probe task that feeds it by periodically reaching for the upstream API.

use futures::stream;
use std::sync::Arc;
use std::time::Duration;
use story_offline_core::domain::{Connectivity, HttpRequest};
use story_offline_core::ports::{ConnectivitySource, ConnectivityStream, NetworkClient};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

//=========================================================================================
// Watch-channel Source
//=========================================================================================

/// A `ConnectivitySource` whose state is set explicitly, either by the probe or by
/// a caller injecting synthetic signals.
pub struct WatchConnectivity {
    tx: watch::Sender<Connectivity>,
}

impl WatchConnectivity {
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Reports a connectivity value. Returns true when it differs from the last one.
    pub fn set(&self, connectivity: Connectivity) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == connectivity {
                false
            } else {
                *current = connectivity;
                true
            }
        })
    }
}

impl ConnectivitySource for WatchConnectivity {
    fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    fn signals(&self) -> ConnectivityStream {
        let rx = self.tx.subscribe();
        Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.changed().await.ok()?;
            let value = *rx.borrow_and_update();
            Some((value, rx))
        }))
    }
}

//=========================================================================================
// Reachability Probe
//=========================================================================================

/// Periodically issues a `HEAD` against the upstream API. Any HTTP answer counts
/// as online; a transport failure or a timeout counts as offline.
pub struct ConnectivityProbe {
    network: Arc<dyn NetworkClient>,
    target: Url,
    connectivity: Arc<WatchConnectivity>,
    interval: Duration,
    timeout: Duration,
}

impl ConnectivityProbe {
    pub fn new(
        network: Arc<dyn NetworkClient>,
        target: Url,
        connectivity: Arc<WatchConnectivity>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            network,
            target,
            connectivity,
            interval,
            timeout,
        }
    }

    /// Probes once and reports the result.
    pub async fn probe_once(&self) -> Connectivity {
        let request = HttpRequest::head(self.target.clone());
        let observed = match tokio::time::timeout(self.timeout, self.network.fetch(&request)).await
        {
            Ok(Ok(_)) => Connectivity::Online,
            Ok(Err(e)) => {
                debug!("Connectivity probe failed: {}", e);
                Connectivity::Offline
            }
            Err(_) => {
                debug!("Connectivity probe timed out after {:?}.", self.timeout);
                Connectivity::Offline
            }
        };
        if self.connectivity.set(observed) {
            info!("Connectivity probe observed {:?}.", observed);
        }
        observed
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.probe_once().await;
                }
            }
        }
        debug!("Connectivity probe stopped.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_signals_only_report_changes() {
        let source = WatchConnectivity::new(Connectivity::Online);
        let mut signals = source.signals();

        assert!(!source.set(Connectivity::Online));
        assert!(source.set(Connectivity::Offline));
        assert_eq!(source.current(), Connectivity::Offline);
        assert_eq!(signals.next().await, Some(Connectivity::Offline));

        assert!(source.set(Connectivity::Online));
        assert_eq!(signals.next().await, Some(Connectivity::Online));
    }
}
