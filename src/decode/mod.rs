//! The layered decoder: range coder, LZMA probabilistic symbol
//! decoder, and the LZMA2 chunk-stream control layer built on top of
//! them.

pub(crate) mod rangecoder;
pub mod lzma;
pub mod lzma2;
