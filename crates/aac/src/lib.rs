//! A crate for decoding and encoding the MPEG-4 `AudioSpecificConfig`.
//!
//! Supports:
//! - Parsing the leading fields of an `AudioSpecificConfig` (ISO/IEC 14496-3 §1.6.2.1)
//! - The sampling-frequency index table
//! - Building the explicit hierarchical SBR signalling form of an AAC-LC config
//!
//! ## License
//!
//! This project is licensed under the [MIT](./LICENSE.MIT) or
//! [Apache-2.0](./LICENSE.Apache-2.0) license. You can choose between one of
//! them if you use this work.
//!
//! `SPDX-License-Identifier: MIT OR Apache-2.0`
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(unsafe_code)]

mod config;
mod error;

pub use config::{AudioObjectType, AudioSpecificConfig, SAMPLING_FREQUENCIES, sampling_frequency};
pub use error::{AacError, Result};
