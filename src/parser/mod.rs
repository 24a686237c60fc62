pub mod point;
pub mod stream;

pub use point::*;
pub use stream::*;
