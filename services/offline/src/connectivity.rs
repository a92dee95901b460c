//! services/offline/src/connectivity.rs
//!
//! The connectivity monitor: a two-state machine driven by platform signals.
//! Going offline raises a notice. Coming back online raises a notice and, after
//! a short debounce, asks the submission queue to flush.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use story_offline_core::domain::{Connectivity, Notice};
use story_offline_core::ports::{ConnectivitySource, ConnectivityStream, Notifier};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::queue::FlushTrigger;

/// What a signal did to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    WentOffline,
    CameOnline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
    current: Connectivity,
}

impl ConnectivityState {
    pub fn new(initial: Connectivity) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> Connectivity {
        self.current
    }

    pub fn apply(&mut self, signal: Connectivity) -> Transition {
        let transition = match (self.current, signal) {
            (Connectivity::Online, Connectivity::Offline) => Transition::WentOffline,
            (Connectivity::Offline, Connectivity::Online) => Transition::CameOnline,
            _ => Transition::Unchanged,
        };
        self.current = signal;
        transition
    }
}

pub struct ConnectivityMonitor {
    signals: ConnectivityStream,
    state: ConnectivityState,
    flusher: Arc<dyn FlushTrigger>,
    notifier: Arc<dyn Notifier>,
    debounce: Duration,
    periodic: Option<Duration>,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl ConnectivityMonitor {
    /// Subscribes to `source` immediately so no signal sent after construction is missed.
    pub fn new(
        source: &dyn ConnectivitySource,
        flusher: Arc<dyn FlushTrigger>,
        notifier: Arc<dyn Notifier>,
        debounce: Duration,
        periodic: Option<Duration>,
    ) -> Self {
        let signals = source.signals();
        Self {
            signals,
            state: ConnectivityState::new(source.current()),
            flusher,
            notifier,
            debounce,
            periodic,
        }
    }

    pub fn state(&self) -> Connectivity {
        self.state.current()
    }

    /// Drives the state machine until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Connectivity monitor started ({:?}).", self.state.current());

        let mut flush_at: Option<Instant> = None;
        let mut signals_open = true;
        let mut periodic = self.periodic.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                signal = self.signals.next(), if signals_open => {
                    let Some(signal) = signal else {
                        debug!("Connectivity signal stream ended.");
                        signals_open = false;
                        continue;
                    };
                    match self.state.apply(signal) {
                        Transition::WentOffline => {
                            info!("Connection lost.");
                            flush_at = None;
                            self.notifier.notify(Notice::WentOffline);
                        }
                        Transition::CameOnline => {
                            info!("Connection restored.");
                            flush_at = Some(Instant::now() + self.debounce);
                            self.notifier.notify(Notice::BackOnline);
                        }
                        Transition::Unchanged => {}
                    }
                }

                _ = wait_until(flush_at) => {
                    flush_at = None;
                    debug!("Debounce elapsed; flushing pending submissions.");
                    self.flusher.trigger_flush().await;
                }

                _ = next_tick(&mut periodic) => {
                    if self.state.current().is_online() {
                        debug!("Periodic flush.");
                        self.flusher.trigger_flush().await;
                    }
                }
            }
        }

        info!("Connectivity monitor stopped.");
    }
}
