mod config;
mod lock;
mod pool;

pub use config::*;
pub use lock::{Lock, LockGuard, LockManager, Operation};
pub use pool::{Connection, ConnectionPool, PoolStats};
