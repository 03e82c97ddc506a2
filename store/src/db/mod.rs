//! Database module for SQLite persistence.

mod edits;
mod pool;
mod records;
mod watermarks;

pub use edits::*;
pub use pool::*;
pub use records::*;
pub use watermarks::*;
