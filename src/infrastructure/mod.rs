pub mod staging;
pub mod transcoders;
