//! unpiz reads and extracts Zip archives the way three decades of producers
//! have actually written them: not just STORED and INFLATE, but SHRINK,
//! IMPLODE, Deflate64, ZipCrypto-encrypted members, and both the classic
//! and Zip64 central-directory layouts. It's built for untrusted input --
//! every member's claimed byte range is tracked so that overlapping or
//! otherwise amplifying ("zip bomb") structures are rejected rather than
//! decompressed.
//!
//! The low-level API mirrors a plain file read:
//!
//! ```no_run
//! # use std::fs;
//! # use unpiz::*;
//! let bytes = fs::read("foo.zip")?;
//! let archive = ZipArchive::new(&bytes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//! Memory-map larger files instead of reading them whole:
//! ```no_run
//! # use std::fs::File;
//! # use memmap2::Mmap;
//! # use unpiz::*;
//! #
//! let zip_file = File::open("foo.zip")?;
//! let mapping = unsafe { Mmap::map(&zip_file)? };
//! let archive = ZipArchive::new(&mapping)?;
//!
//! // ZIP doesn't guarantee entries are ordered, free of duplicates, or
//! // carry valid paths, so build a checked tree of files and folders first.
//! let tree = read::as_tree(archive.entries())?;
//! let metadata = tree.lookup("some/specific/file")?;
//! let mut reader = archive.read(metadata)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! For whole-archive work -- extract everything, verify everything, or just
//! list what's inside -- [`extract::extract`], [`extract::test`], and
//! [`extract::list`] drive the full per-entry pipeline: signature
//! validation, decryption, decoding, CRC-32 verification, and (for
//! extraction) writing to disk with overlap detection guarding every write.
//! Independent entries within a batch are decoded in parallel with `rayon`.
//!
//! Zip is an interesting archive format: unlike compressed tarballs often
//! seen in Linux land (`*.tar.gz`, `*.tar.zst`, ...), each file in a Zip
//! archive is compressed independently, with a central directory telling us
//! where to find each file. This allows extracting multiple files
//! simultaneously so long as we can read from multiple places at once.

pub mod extract;
pub mod read;
pub mod result;

pub use read::CompressionMethod;
pub use read::ZipArchive;

mod arch;
mod bitstream;
mod codec;
mod cover;
mod crc_reader;
mod crypto;
mod extra_field;
mod huffman;
mod matcher;
mod spec;
mod window;
