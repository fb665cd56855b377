//! Local persistence for SkyCast: a JSON key-value cache with expiry.

pub mod backend;
pub mod cache;
pub mod clock;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use cache::{PersistentCache, Storage, StorageEvent};
pub use clock::{Clock, ManualClock, SystemClock};
