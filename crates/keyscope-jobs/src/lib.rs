//! Keyscope Jobs - long-running, cancellable work against a connected server
//!
//! A job is registered in a [`JobRegistry`], runs on the tokio runtime and
//! reports through a stream of [`JobEvent`]s: any number of `progress`
//! events followed by exactly one `done` event.
//!
//! - [`KeyDiscoveryJob`] walks the key space with `SCAN`
//! - [`InspectorJob`] previews a single key of any Redis type
//!
//! ```ignore
//! let registry = JobRegistry::new();
//! let mut events = KeyDiscoveryJob::new(executor, DiscoveryRequest::default())
//!     .spawn(&registry);
//! while let Some(event) = events.next().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! ```

mod discovery;
mod events;
mod handle;
mod inspector;
mod pattern;
mod registry;

pub use discovery::*;
pub use events::*;
pub use handle::JobHandle;
pub use inspector::*;
pub use pattern::build_scan_match_pattern;
pub use registry::*;
