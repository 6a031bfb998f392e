pub mod bounding_box;
pub mod constants;
pub mod detection;
pub mod frame;
