pub mod image;
pub mod model;
