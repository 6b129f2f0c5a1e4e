//! Control-plane half of AuthLink: the policy cache (G), the watcher/
//! subscriber fan-out (H), and the per-subscriber discovery-stream lifecycle
//! (I). The wire transport (gRPC) is out of scope; this crate stops at an
//! ordered, per-subscriber message receiver.

pub mod cache;
pub mod discovery;
pub mod watcher;

pub use cache::{labels_match, LabelSet, Policy, PolicyCache};
pub use discovery::{DiscoverySubscription, PolicySnapshotMessage, DEFAULT_STREAM_DEADLINE};
pub use watcher::{ClientId, Listener, PolicyWatcher, WatchError};
