//! Preference stores backing a session's persisted selection

pub mod disk;
pub mod memory;

pub use disk::DiskPreferenceStore;
pub use memory::MemoryPreferenceStore;
