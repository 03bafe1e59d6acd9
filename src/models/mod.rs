pub mod measurement;
pub mod severity;

pub use measurement::*;
pub use severity::*;
