pub mod commands;
pub mod frame;

pub use commands::*;
pub use frame::*;
