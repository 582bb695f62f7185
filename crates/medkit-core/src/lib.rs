mod bootstrap;
mod check_string;
mod classify;
mod clock;
mod error;
mod filter;
mod ids;
mod location_tree;
mod record;
mod session;
mod store;
mod summary;
mod timestamp;

pub mod timer;

pub use bootstrap::*;
pub use check_string::*;
pub use classify::*;
pub use clock::*;
pub use error::*;
pub use filter::*;
pub use ids::*;
pub use location_tree::*;
pub use record::*;
pub use session::*;
pub use store::*;
pub use summary::*;
pub use timestamp::*;
