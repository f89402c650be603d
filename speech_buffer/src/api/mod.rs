pub mod accumulator;
pub mod codec;
pub mod encoding_buffer;
pub mod error;
pub mod items;
pub mod logger;
pub mod pump;
mod constants;
