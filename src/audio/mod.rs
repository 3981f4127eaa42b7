//! Audio input and stem output

pub mod decoder;
pub mod writer;

pub use decoder::decode;
pub use writer::WavStemWriter;
