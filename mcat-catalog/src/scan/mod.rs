//! Scan/reconcile
//!
//! Device media index capability, exclusion rules, path normalization and
//! the [`ScanService`] orchestrating them into the catalog store.

pub mod color_cache;
pub mod exclusion;
pub mod fs_index;
pub mod media_index;
pub mod normalize;
pub mod policy;
mod service;

pub use color_cache::{ColorCache, KvColorCache, MemoryColorCache};
pub use exclusion::ExclusionFilter;
pub use fs_index::FsMediaIndex;
pub use media_index::{MediaIndex, RawTrackDescriptor, SortOrder};
pub use normalize::{normalize_path, track_id};
pub use policy::PersistMode;
pub use service::{PersistTask, ScanPage, ScanService};
