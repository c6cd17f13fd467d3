//! Command implementations.

mod inspect;
mod serve;
mod validate;

pub use inspect::run_inspect;
pub use serve::run_serve;
pub use validate::run_validate;
