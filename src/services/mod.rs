pub mod discovery;
pub mod generator;
pub mod session;
pub mod storage;
pub mod store;

// 重新导出常用类型
pub use generator::{GenerationError, StoryGenerator};
pub use session::{SessionId, SessionRegistry, SessionTokens};
pub use storage::{JsonFileStorage, MemoryStorage, Storage, StorageError};
pub use store::Store;
