pub mod byte_source;
pub mod dictionary;
pub mod error;
pub mod primitive;
pub mod transcoder;
