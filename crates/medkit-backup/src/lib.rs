mod export;
mod format;
mod import;


pub use export::{export_critical, export_full};
pub use format::*;
pub use import::{import_backup, import_value, ImportFailure, ImportOptions, ImportReport};
