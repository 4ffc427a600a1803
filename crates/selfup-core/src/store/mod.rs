// # Key-Value Store Implementations
//
// Implementations of the KeyValueStore trait for different persistence
// strategies.

pub mod file;
pub mod memory;

pub use file::FileKeyValueStore;
pub use memory::MemoryKeyValueStore;
