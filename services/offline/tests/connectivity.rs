mod common;

use common::{CountingFlush, RecordingNotifier};
use offline_lib::adapters::WatchConnectivity;
use offline_lib::connectivity::ConnectivityMonitor;
use std::sync::Arc;
use std::time::Duration;
use story_offline_core::domain::{Connectivity, Notice};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const DEBOUNCE: Duration = Duration::from_millis(500);

struct Harness {
    source: Arc<WatchConnectivity>,
    flush: Arc<CountingFlush>,
    notifier: Arc<RecordingNotifier>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

fn start(initial: Connectivity, periodic: Option<Duration>) -> Harness {
    let source = Arc::new(WatchConnectivity::new(initial));
    let flush = Arc::new(CountingFlush::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = ConnectivityMonitor::new(
        source.as_ref(),
        flush.clone(),
        notifier.clone(),
        DEBOUNCE,
        periodic,
    );
    let cancel = CancellationToken::new();
    let task = tokio::spawn(monitor.run(cancel.clone()));
    Harness {
        source,
        flush,
        notifier,
        cancel,
        task,
    }
}

async fn pause(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_flushes_once_after_debounce() {
    let h = start(Connectivity::Offline, None);

    h.source.set(Connectivity::Online);
    pause(100).await;
    assert_eq!(h.flush.count(), 0);

    pause(500).await;
    assert_eq!(h.flush.count(), 1);
    assert_eq!(h.notifier.notices(), vec![Notice::BackOnline]);

    pause(5_000).await;
    assert_eq!(h.flush.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_flapping_coalesces_into_one_flush() {
    let h = start(Connectivity::Offline, None);

    for signal in [
        Connectivity::Online,
        Connectivity::Offline,
        Connectivity::Online,
        Connectivity::Offline,
        Connectivity::Online,
    ] {
        h.source.set(signal);
        pause(50).await;
    }
    pause(2_000).await;

    assert_eq!(h.flush.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_going_offline_cancels_pending_flush() {
    let h = start(Connectivity::Offline, None);

    h.source.set(Connectivity::Online);
    pause(100).await;
    h.source.set(Connectivity::Offline);
    pause(2_000).await;

    assert_eq!(h.flush.count(), 0);
    assert_eq!(
        h.notifier.notices(),
        vec![Notice::BackOnline, Notice::WentOffline]
    );
}

#[tokio::test(start_paused = true)]
async fn test_going_offline_only_notifies() {
    let h = start(Connectivity::Online, None);

    h.source.set(Connectivity::Offline);
    pause(2_000).await;

    assert_eq!(h.flush.count(), 0);
    assert_eq!(h.notifier.notices(), vec![Notice::WentOffline]);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_flush_runs_only_while_online() {
    let h = start(Connectivity::Online, Some(Duration::from_secs(60)));

    pause(130_000).await;
    assert_eq!(h.flush.count(), 2);

    h.source.set(Connectivity::Offline);
    pause(120_000).await;
    assert_eq!(h.flush.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_the_monitor() {
    let h = start(Connectivity::Online, None);
    h.cancel.cancel();
    h.task.await.unwrap();

    h.source.set(Connectivity::Offline);
    pause(1_000).await;
    assert!(h.notifier.notices().is_empty());
}
