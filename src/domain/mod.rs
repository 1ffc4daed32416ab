pub mod batch;
pub mod point;

pub use batch::Batch;
pub use point::{Point, PointError};
