pub mod file_store;
pub mod queue;
pub mod store;

pub use file_store::JsonFileStore;
pub use queue::{action_key, ActionType, OfflineAction, OfflineQueue, ReplayReport};
pub use store::{KvStore, MemoryStore};
