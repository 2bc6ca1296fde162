//! mcat-catalog library
//!
//! Local music catalog: a persisted track/playlist store, a scan/reconcile
//! service bridging the device media index into that store, and a chunked
//! ephemeral read cache for instant cold starts.
//!
//! Every collaborator is constructed explicitly by the composition root
//! (see `main.rs`) and passed in; nothing here is a process-wide global.

pub mod boundary;
pub mod cache;
pub mod scan;
pub mod store;

pub use boundary::CatalogReads;
pub use cache::{CachedSong, KeyValueStore, MemoryKvStore, SongCache, SqliteKvStore};
pub use scan::{
    ColorCache, ExclusionFilter, FsMediaIndex, MediaIndex, PersistMode, PersistTask,
    RawTrackDescriptor, ScanPage, ScanService,
};
pub use store::CatalogStore;
