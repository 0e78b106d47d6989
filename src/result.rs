//! Error types, severity ordering, and the process exit-code taxonomy.

use camino::Utf8PathBuf;
use thiserror::Error;

pub type ZipResult<T> = Result<T, ZipError>;

#[derive(Debug, Error)]
pub enum ZipError {
    /// An error from underlying I/O
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    /// The ZIP archive contained invalid data.
    #[error("Invalid Zip archive: {0}")]
    InvalidArchive(&'static str),

    /// Decoding a UTF-8 name or comment failed
    #[error("Invalid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    /// The ZIP archive uses an unsupported feature
    #[error("Unsupported Zip archive: {0}")]
    UnsupportedArchive(String),

    /// The ZIP archive is prepended some unknown bytes.
    /// (Use [`crate::read::ZipArchive::with_prepended_data()`] if this is okay.)
    #[error("Archive prepended with {0} unknown bytes")]
    PrependedWithUnknownBytes(usize),

    /// The ZIP archive contained a nonsensical file hierarchy
    /// (duplicate entries, bad paths, etc.)
    #[error("Archive contained a strange file hierarchy: {0}")]
    Hierarchy(String),

    /// A file wasn't found at the provided path
    #[error("No file in the archive with the path {0}")]
    NoSuchFile(Utf8PathBuf),

    /// A user-provided path (not one from a ZIP archive) was invalid.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A cast from a 64-bit int to a usize failed while mapping the file,
    /// probably on a 32-bit system.
    #[error("Zip archive too large for address space")]
    InsufficientAddressSpace,

    // --- Structural ---
    /// Ran out of archive bytes while a structure or bitstream needed more.
    #[error("Unexpected end of archive data")]
    Truncated,

    /// A record didn't start with the signature its format requires.
    #[error("Bad signature: expected {expected}, found one member's header at offset {offset}")]
    BadSignature {
        expected: &'static str,
        offset: usize,
    },

    /// A fixed-size header's fields were self-contradictory.
    #[error("Bad header: {0}")]
    BadHeader(&'static str),

    /// An extra field was malformed or internally inconsistent.
    #[error("Inconsistent extra field: {0}")]
    InconsistentExtraField(&'static str),

    /// `compression_method` isn't one this engine implements.
    #[error("Unsupported compression method {0}")]
    UnsupportedMethod(u16),

    /// `version_needed_to_extract` is beyond what this engine implements.
    #[error("Unsupported version needed to extract: {0}")]
    UnsupportedVersion(u16),

    /// None of the four candidate data-descriptor lengths matched.
    #[error("Data descriptor did not match any known length/encoding")]
    BadDescriptor,

    // --- Content ---
    /// The CRC-32 of the decompressed bytes didn't match the declared one.
    #[error("Bad CRC-32 for {0}: expected {1:#010x}, got {2:#010x}")]
    BadCrc(Utf8PathBuf, u32, u32),

    /// The compressed bit stream was self-contradictory (invalid code, bad
    /// stored-block length complement, etc).
    #[error("Invalid compressed data: {0}")]
    InvalidCompressedData(&'static str),

    /// A Huffman code table did not fill its Kraft budget and the caller
    /// considered that fatal for this tree.
    #[error("Incomplete Huffman code table: {0}")]
    IncompleteHuffman(&'static str),

    // --- Security ---
    /// An overlap was detected between two claimed byte spans, or a leading
    /// prefix was implausibly large -- a hallmark of a crafted "zip bomb".
    #[error("Overlapping or amplifying archive structure detected: {0}")]
    Bomb(&'static str),

    /// An extra-field "extra attribute" sub-blob's CRC didn't match.
    #[error("Bad CRC in extra-field attribute data")]
    BadEaCrc,

    // --- Crypto ---
    /// The archive uses an encryption scheme this engine doesn't implement
    /// (e.g. WinZip AES).
    #[error("Encrypted with an unsupported scheme: {0}")]
    EncryptedNotSupported(&'static str),

    /// The supplied password's checksum byte didn't match.
    #[error("Wrong password for {0}")]
    WrongPassword(Utf8PathBuf),

    /// The archive is encrypted, and no password was supplied.
    #[error("No password supplied for encrypted entry {0}")]
    NoPassword(Utf8PathBuf),

    // --- Resource ---
    /// An internal allocation failed (growing the overlap cover, a Huffman
    /// table arena, etc).
    #[error("Out of memory")]
    Oom,

    /// The output sink reported that its backing disk/volume is full.
    #[error("Disk full while writing {0}")]
    DiskFull(Utf8PathBuf),

    /// The output sink reported a user-requested cancellation.
    #[error("Extraction cancelled")]
    Cancelled,

    // --- Filter ---
    /// An include pattern given on the command line matched nothing.
    #[error("Pattern matched no files: {0}")]
    PatternUnmatched(String),
}

/// A monotone "how bad is this" ordering, folded over every per-entry
/// result by the central-directory driver to produce the final
/// [`ExitCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Ok,
    Warn,
    Err,
    BadErr,
    Mem,
    BadZip,
    Param,
    Find,
    Bomb,
    Disk,
    CtrlC,
    Unsup,
    BadPwd,
}

impl ZipError {
    /// Classifies this error for the "worst error so far" accumulation.
    pub fn severity(&self) -> Severity {
        use ZipError::*;
        match self {
            Cancelled => Severity::CtrlC,
            DiskFull(_) => Severity::Disk,
            WrongPassword(_) | NoPassword(_) => Severity::BadPwd,
            EncryptedNotSupported(_) | UnsupportedMethod(_) | UnsupportedVersion(_)
            | UnsupportedArchive(_) => Severity::Unsup,
            Bomb(_) => Severity::Bomb,
            PatternUnmatched(_) | NoSuchFile(_) => Severity::Find,
            InvalidPath(_) => Severity::Param,
            Oom | InsufficientAddressSpace => Severity::Mem,
            Truncated
            | BadSignature { .. }
            | BadHeader(_)
            | InconsistentExtraField(_)
            | BadDescriptor
            | InvalidArchive(_)
            | InvalidCompressedData(_)
            | IncompleteHuffman(_)
            | BadEaCrc
            | Hierarchy(_)
            | PrependedWithUnknownBytes(_) => Severity::BadZip,
            BadCrc(..) => Severity::Err,
            Io(_) | Encoding(_) => Severity::BadErr,
        }
    }
}

/// The process exit-code taxonomy. These values are part of the external
/// interface contract and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Ok = 0,
    Warn = 1,
    Err = 2,
    BadErr = 3,
    Mem = 4,
    BadZip = 9,
    Param = 10,
    Find = 11,
    Bomb = 12,
    Disk = 50,
    CtrlC = 80,
    Unsup = 81,
    BadPwd = 82,
}

impl From<Severity> for ExitCode {
    fn from(s: Severity) -> Self {
        match s {
            Severity::Ok => ExitCode::Ok,
            Severity::Warn => ExitCode::Warn,
            Severity::Err => ExitCode::Err,
            Severity::BadErr => ExitCode::BadErr,
            Severity::Mem => ExitCode::Mem,
            Severity::BadZip => ExitCode::BadZip,
            Severity::Param => ExitCode::Param,
            Severity::Find => ExitCode::Find,
            Severity::Bomb => ExitCode::Bomb,
            Severity::Disk => ExitCode::Disk,
            Severity::CtrlC => ExitCode::CtrlC,
            Severity::Unsup => ExitCode::Unsup,
            Severity::BadPwd => ExitCode::BadPwd,
        }
    }
}

/// Accumulates the worst [`Severity`] seen so far across a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorstError(Option<Severity>);

impl WorstError {
    pub fn new() -> Self {
        WorstError(None)
    }

    pub fn record(&mut self, severity: Severity) {
        self.0 = Some(match self.0 {
            Some(current) => current.max(severity),
            None => severity,
        });
    }

    pub fn record_err(&mut self, e: &ZipError) {
        self.record(e.severity());
    }

    pub fn severity(&self) -> Severity {
        self.0.unwrap_or(Severity::Ok)
    }

    pub fn exit_code(&self) -> ExitCode {
        self.severity().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_error_is_monotone() {
        let mut w = WorstError::new();
        assert_eq!(w.exit_code(), ExitCode::Ok);
        w.record(Severity::Warn);
        w.record(Severity::Find);
        w.record(Severity::Warn);
        assert_eq!(w.exit_code(), ExitCode::Find);
        w.record(Severity::Bomb);
        assert_eq!(w.exit_code(), ExitCode::Bomb);
    }
}
