pub mod cleanup;
pub mod staging;
pub mod transcoder;
