//! A 7z archive folder decoder written in pure Rust.
//!
//! This crate parses 7z archive headers, reconstructs the folder (solid
//! block) coder graph described by the format, and decodes it into
//! plaintext bytes. It is decode-only: there is no encoder.
//!
//! ## Supported codecs & filters
//!
//! | Codec / filter                                  | Decode |
//! |--------------------------------------------------|--------|
//! | COPY                                              | ✓ |
//! | LZMA                                              | ✓ |
//! | LZMA2                                             | ✓ |
//! | PPMD (*)                                          | ✓ |
//! | ZSTD (*)                                          | ✓ |
//! | DELTA                                             | ✓ |
//! | BCJ x86/ARM/ARM64/ARM_THUMB/PPC/IA64/SPARC/RISCV  | ✓ |
//! | BCJ2                                              | ✓ |
//! | AES-256 + SHA-256 KDF (*)                         | ✓ |
//!
//! (*) Require an optional cargo feature.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

mod encryption;
mod error;
mod reader;

pub(crate) mod archive;
pub(crate) mod bitset;
pub(crate) mod block;
mod config;
pub(crate) mod decoder;
pub(crate) mod folder;
mod look_in_stream;
mod password_store;
mod time;

#[cfg(feature = "util")]
mod util;

pub use archive::*;
pub use block::*;
pub use config::Config;
pub use encryption::Password;
pub use error::Error;
pub use look_in_stream::{BufLookStream, LookInStream};
pub use password_store::PasswordStore;
pub use reader::{ArchiveReader, BlockDecoder, StreamingDecoder};
pub use time::NtTime;
#[cfg(feature = "util")]
pub use util::decompress::*;
