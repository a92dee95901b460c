pub mod domain;
pub mod ports;

pub use domain::{
    Bookmark, CachedResponse, Connectivity, HttpRequest, HttpResponse, Notice,
    PendingSubmission, RequestMode, Story, SubmissionPayload, SubmissionReceipt,
};
pub use ports::{
    ConnectivitySource, ConnectivityStream, HttpCache, KeyValueStore, NetworkClient, Notifier,
    PortError, PortResult, Record,
};
