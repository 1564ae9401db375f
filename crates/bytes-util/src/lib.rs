//! Small bit-level helpers shared by the codec crates.
//!
//! Both [`BitReader`] and [`BitWriter`] work MSB-first, which is the bit order
//! used by every ISO/IEC 14496 syntax structure parsed in this workspace.
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

mod bit_read;
mod bit_write;

pub use bit_read::BitReader;
pub use bit_write::BitWriter;
