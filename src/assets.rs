//! Asset identity, decoding, and batched repository resolution.

pub mod decode;
pub mod key;
pub mod resolve;
