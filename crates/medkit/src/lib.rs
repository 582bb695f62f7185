mod config;
mod inventory;
pub mod logging;

pub use config::Config;
pub use inventory::Inventory;

pub use medkit_backup::{
    BackupFormat, CriticalBackup, FullBackup, ImportFailure, ImportOptions, ImportReport,
};
pub use medkit_core::*;
pub use medkit_pool::{
    Connection, ConnectionPool, Lock, LockConfig, LockGuard, LockManager, Operation, PoolConfig,
    PoolStats,
};

#[cfg(target_arch = "wasm32")]
pub use medkit_indexed_db::{BrowserSessionStorage, IndexedDbStore};
