//! Ephemeral read cache and the key-value storage it sits on

mod kv;
mod song_cache;

pub use kv::{KeyValueStore, MemoryKvStore, SqliteKvStore};
pub use song_cache::{CachedSong, SongCache};
