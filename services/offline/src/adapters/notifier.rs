//! services/offline/src/adapters/notifier.rs
//!
//! A `Notifier` that surfaces user-facing notices through the log. A UI shell
//! can swap in its own toast implementation behind the same port.

use story_offline_core::domain::Notice;
use story_offline_core::ports::Notifier;
use tracing::{info, warn};

#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::WentOffline => warn!("Offline mode - limited features available."),
            Notice::BackOnline => info!("Back online - syncing data..."),
            Notice::SubmissionStoredOffline { key } => {
                info!("Story saved offline as {}; it will be sent when back online.", key)
            }
            Notice::SubmissionsSynced {
                delivered,
                retained,
            } => info!(
                "Offline sync finished: {} sent, {} still waiting.",
                delivered, retained
            ),
        }
    }
}
