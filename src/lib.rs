//! Layered Files: filesystem overlay merge engine
//!
//! Merges an ordered set of layer directories into one output tree. Layers come
//! from a local `layers/` root and from remote sources fetched into a cache;
//! later layers overwrite earlier ones at identical relative paths. In
//! development runs the local layers are watched and re-merged on change.

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod fetch;
pub mod host;
pub mod logging;
pub mod overlay;
pub mod paths;
pub mod source;
pub mod watch;

pub use coordinator::{FetchPolicy, MergeCoordinator, MergeOptions, MergePhase, MergeScheduler};
pub use discovery::{Layer, LayerOrigin, MergePlan};
pub use error::{ConfigError, FetchError, FetchErrorKind, MergeError};
pub use fetch::{LayerFetcher, SourceFetcher};
pub use host::{initial_merge, HostOptions, RunMode, WatchHandle};
pub use overlay::{MergeReport, OverrideInfo};
pub use paths::LayerPaths;
pub use source::{LayerSource, SourceDescriptor};
