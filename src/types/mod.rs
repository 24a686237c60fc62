pub mod config;
pub mod device;
pub mod track;

pub use config::*;
pub use device::*;
pub use track::*;
