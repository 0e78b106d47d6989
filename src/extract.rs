//! The per-entry extractor and central-directory driver: the part of the
//! engine that turns a parsed [`crate::read::ZipArchive`] into files on
//! disk (or, in test mode, into nothing but a pass/fail verdict).
//!
//! The state machine per entry is `SeekLH -> ValidateLH -> (Decrypt?) ->
//! RunCodec -> VerifyCRC -> (ConsumeDD?) -> CommitSpan`, with terminal
//! states `Committed`, `Skipped`, `Bomb`, `Fatal`. Entries are processed in
//! fixed-size batches (`DIR_BLKSIZ`); within a batch, independent entries
//! are fanned out with `rayon`'s parallel iterators, keeping the overlap
//! cover behind a mutex.

use std::fs;
use std::io::Write as _;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use log::*;
use rayon::prelude::*;

use crate::codec;
use crate::cover::{AddOutcome, Cover};
use crate::crypto::{self, CryptCheck};
use crate::extra_field;
use crate::matcher;
use crate::read::{CompressionMethod, FileMetadata, ZipArchive};
use crate::result::*;
use crate::spec;
use crate::window::{NullSink, Sink, VecSink};

/// Number of central directory entries processed per batch: small enough to
/// stay cache-friendly, without introducing a tuning knob nobody asked for.
const DIR_BLKSIZ: usize = 256;

/// What to do when an extraction target already exists on disk.
///
/// The interactive `Prompt` variant is modeled here but not wired to a TTY
/// read loop -- the CLI treats it the same as `Never`, since adding an
/// interactive prompt would introduce a dependency this crate doesn't
/// otherwise need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    Never,
    Always,
    Skip,
    Prompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverwriteDecision {
    Write,
    Skip,
}

fn decide_overwrite(policy: OverwritePolicy, exists: bool) -> OverwriteDecision {
    if !exists {
        return OverwriteDecision::Write;
    }
    match policy {
        OverwritePolicy::Always => OverwriteDecision::Write,
        OverwritePolicy::Never | OverwritePolicy::Skip | OverwritePolicy::Prompt => {
            OverwriteDecision::Skip
        }
    }
}

/// Supplies a password for an encrypted member, if one is available.
///
/// `scope` is the member's path, letting a provider offer per-file
/// passwords; the simple providers below ignore it.
pub trait PasswordProvider: Sync {
    fn get_password(&self, scope: &Utf8Path) -> Option<Vec<u8>>;
}

/// The conforming "no password available" provider -- every encrypted
/// member is reported as `NoPassword`.
pub struct NoPasswordProvider;

impl PasswordProvider for NoPasswordProvider {
    fn get_password(&self, _scope: &Utf8Path) -> Option<Vec<u8>> {
        None
    }
}

/// Offers the same password (e.g. from `--password`) for every member.
pub struct FixedPasswordProvider(pub Vec<u8>);

impl PasswordProvider for FixedPasswordProvider {
    fn get_password(&self, _scope: &Utf8Path) -> Option<Vec<u8>> {
        Some(self.0.clone())
    }
}

/// Options controlling a single extract/test/list run.
pub struct RunOptions<'p> {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub case_insensitive: bool,
    pub overwrite: OverwritePolicy,
    pub passwords: &'p dyn PasswordProvider,
    pub parallel: bool,
}

impl Default for RunOptions<'static> {
    fn default() -> Self {
        RunOptions {
            include: Vec::new(),
            exclude: Vec::new(),
            case_insensitive: false,
            overwrite: OverwritePolicy::Never,
            passwords: &NoPasswordProvider,
            parallel: true,
        }
    }
}

/// The result of a full extract/test run: how many members were handled
/// and the worst error severity seen, folded using the monotone
/// [`WorstError`] accumulator.
#[derive(Debug, Default)]
pub struct RunReport {
    pub committed: usize,
    pub skipped: usize,
    pub worst: WorstError,
}

impl RunReport {
    fn record(&mut self, result: &ZipResult<()>) {
        match result {
            Ok(()) => self.committed += 1,
            Err(e) => {
                self.skipped += 1;
                self.worst.record_err(e);
            }
        }
    }
}

/// Applies include/exclude glob filters to the archive's entries, tracking
/// which patterns actually matched something, and returns the retained
/// subset in original (central-directory) order.
///
/// An include pattern that never matched anything is a hard error
/// (`PATTERN_UNMATCHED`); an exclude pattern that never matched anything
/// is a warning only.
pub fn filter_entries<'a>(
    entries: &'a [FileMetadata<'a>],
    include: &[String],
    exclude: &[String],
    case_insensitive: bool,
) -> ZipResult<Vec<&'a FileMetadata<'a>>> {
    let mut include_matched = vec![false; include.len()];
    let mut exclude_matched = vec![false; exclude.len()];

    let mut retained = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = entry.path.as_str();

        let included = if include.is_empty() {
            true
        } else {
            let mut any = false;
            for (pat, seen) in include.iter().zip(include_matched.iter_mut()) {
                if matcher::glob_match(pat, name, case_insensitive) {
                    any = true;
                    *seen = true;
                }
            }
            any
        };
        if !included {
            continue;
        }

        let mut excluded = false;
        for (pat, seen) in exclude.iter().zip(exclude_matched.iter_mut()) {
            if matcher::glob_match(pat, name, case_insensitive) {
                excluded = true;
                *seen = true;
            }
        }
        if excluded {
            continue;
        }

        retained.push(entry);
    }

    let unmatched: Vec<&str> = include
        .iter()
        .zip(include_matched.iter())
        .filter(|(_, seen)| !**seen)
        .map(|(p, _)| p.as_str())
        .collect();
    if !unmatched.is_empty() {
        return Err(ZipError::PatternUnmatched(unmatched.join(", ")));
    }
    for (pat, seen) in exclude.iter().zip(exclude_matched.iter()) {
        if !seen {
            warn!("exclude pattern `{}` never matched an entry", pat);
        }
    }

    Ok(retained)
}

/// A symlink whose creation is deferred until every regular file has been
/// materialized, so a symlink's target is guaranteed to already exist if
/// it points elsewhere inside the archive.
struct DeferredSymlink {
    link_path: Utf8PathBuf,
    target: Vec<u8>,
}

/// A directory whose timestamp application is deferred until every member
/// (file, symlink, and nested directory) has materialized, applied
/// deepest-first so a child's creation doesn't clobber its parent's mtime.
struct DeferredDirectory {
    path: Utf8PathBuf,
    modified: chrono::NaiveDateTime,
}

/// Sink that writes decoded bytes straight into a freshly-created file.
struct FsSink {
    file: fs::File,
    path: Utf8PathBuf,
}

impl Sink for FsSink {
    fn write(&mut self, buf: &[u8]) -> ZipResult<()> {
        self.file.write_all(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::WriteZero
                || e.raw_os_error() == Some(libc_enospc())
            {
                ZipError::DiskFull(self.path.clone())
            } else {
                ZipError::Io(e)
            }
        })
    }
}

/// `ENOSPC` on the platforms we reasonably expect to run on. A constant
/// rather than a `libc` dependency this crate has no other use for.
fn libc_enospc() -> i32 {
    28
}

/// Computes a running CRC-32 over everything that passes through,
/// forwarding each chunk unchanged to the wrapped sink.
struct CrcSink<'s, S: Sink + ?Sized> {
    inner: &'s mut S,
    hasher: crc32fast::Hasher,
}

impl<'s, S: Sink + ?Sized> CrcSink<'s, S> {
    fn new(inner: &'s mut S) -> Self {
        CrcSink {
            inner,
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn finish(self) -> u32 {
        self.hasher.finalize()
    }
}

impl<'s, S: Sink + ?Sized> Sink for CrcSink<'s, S> {
    fn write(&mut self, buf: &[u8]) -> ZipResult<()> {
        self.hasher.update(buf);
        self.inner.write(buf)
    }
}

/// Applies Unix permission bits from `unix_mode`, if present, to an
/// already-created path. A no-op on non-Unix targets.
#[cfg(unix)]
fn apply_unix_mode(path: &Utf8Path, unix_mode: Option<u32>) -> ZipResult<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = unix_mode {
        let perms = fs::Permissions::from_mode(mode & 0o7777);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_unix_mode(_path: &Utf8Path, _unix_mode: Option<u32>) -> ZipResult<()> {
    Ok(())
}

fn set_modified(path: &Utf8Path, modified: chrono::NaiveDateTime) -> ZipResult<()> {
    let file = fs::File::open(path)?;
    let system_time = std::time::UNIX_EPOCH
        + std::time::Duration::from_secs(modified.and_utc().timestamp().max(0) as u64);
    // Symlinks can't have their time set this way; the caller skips them.
    file.set_modified(system_time)?;
    Ok(())
}

/// Everything the per-entry extractor threads through a single run.
struct RunContext<'p> {
    cover: Mutex<Cover>,
    dest_dir: Utf8PathBuf,
    overwrite: OverwritePolicy,
    passwords: &'p dyn PasswordProvider,
    symlinks: Mutex<Vec<DeferredSymlink>>,
    directories: Mutex<Vec<DeferredDirectory>>,
    test_only: bool,
}

/// Runs the four-candidate data-descriptor check against the bytes right
/// after a member's compressed payload, purely as a structural
/// cross-check -- the sizes/CRC used to drive decoding always come from
/// the central directory, which carries the authoritative values even
/// when the local header's copies are zeroed (flag bit 3).
fn verify_trailing_descriptor(mapping: &[u8], payload_end: usize, metadata: &FileMetadata) -> ZipResult<usize> {
    if !metadata.data_descriptor_present {
        return Ok(payload_end);
    }
    let lookahead_end = (payload_end + 24).min(mapping.len());
    if payload_end > mapping.len() {
        return Err(ZipError::Truncated);
    }
    let lookahead = &mapping[payload_end..lookahead_end];
    match spec::parse_data_descriptor(
        lookahead,
        metadata.crc32,
        metadata.compressed_size as u64,
        metadata.size as u64,
    ) {
        Some(dd) => Ok(payload_end + dd.consumed),
        None => Err(ZipError::BadDescriptor),
    }
}

/// Decrypts (if needed) and decodes one member's payload into `sink`,
/// verifying its CRC-32 against the central directory's declared value.
/// Returns the archive offset immediately past the member's data
/// (including its data descriptor, if any) for the overlap cover.
fn run_codec_chain(
    mapping: &[u8],
    metadata: &FileMetadata,
    passwords: &dyn PasswordProvider,
    sink: &mut dyn Sink,
) -> ZipResult<usize> {
    let local_header_start = metadata.header_offset;
    let mut cursor = &mapping[local_header_start..];
    let local_header = spec::LocalFileHeader::parse_and_consume(&mut cursor).map_err(|e| match e {
        ZipError::BadSignature { expected, .. } => ZipError::BadSignature {
            expected,
            offset: local_header_start,
        },
        other => other,
    })?;
    let payload_start = mapping.len() - cursor.len();

    let payload_end = payload_start + metadata.compressed_size;
    if payload_end > mapping.len() {
        return Err(ZipError::Truncated);
    }
    let payload = &mapping[payload_start..payload_end];

    let mut decrypted_owned;
    let (input, effective_method_size): (&[u8], Option<usize>) = if metadata.encrypted {
        let password = passwords
            .get_password(&metadata.path)
            .ok_or_else(|| ZipError::NoPassword(metadata.path.clone().into_owned()))?;

        let check_byte = if metadata.data_descriptor_present {
            (metadata.crc32 >> 24) as u8
        } else {
            (local_header.last_modified_time >> 8) as u8
        };

        let (mut cipher, ciphertext, check) = crypto::open(&password, payload, check_byte)?;
        if check == CryptCheck::WrongPassword {
            return Err(ZipError::WrongPassword(metadata.path.clone().into_owned()));
        }
        decrypted_owned = crypto::decrypt_rest(&mut cipher, ciphertext);

        // APPNOTE's STORED+encrypted quirk: the declared uncompressed size
        // can be stale, so the true size is "whatever's left after the
        // encryption header."
        let effective_size = if metadata.compression_method == CompressionMethod::Stored {
            Some(decrypted_owned.len())
        } else {
            None
        };
        (decrypted_owned.as_slice(), effective_size)
    } else {
        (payload, None)
    };

    let mut crc_sink = CrcSink::new(sink);
    let uncompressed_size = effective_method_size.unwrap_or(metadata.size);
    codec::decode(metadata.compression_method, input, uncompressed_size, &mut crc_sink)?;
    let actual_crc = crc_sink.finish();

    if actual_crc != metadata.crc32 {
        return Err(ZipError::BadCrc(
            metadata.path.clone().into_owned(),
            metadata.crc32,
            actual_crc,
        ));
    }

    verify_trailing_descriptor(mapping, payload_end, metadata)
}

/// Drives one entry through the full state machine, committing its span
/// to the shared cover on success.
fn extract_one(mapping: &[u8], metadata: &FileMetadata, ctx: &RunContext) -> ZipResult<()> {
    if ctx.test_only {
        let mut sink = NullSink;
        let cursor_after = run_codec_chain(mapping, metadata, ctx.passwords, &mut sink)?;
        extra_field::validate_member_extra_field(metadata)?;
        return commit_span(ctx, metadata.header_offset as u64, cursor_after as u64);
    }

    if metadata.is_dir() {
        let dir_path = ctx.dest_dir.join(&metadata.path);
        fs::create_dir_all(&dir_path)?;
        let mut sink = NullSink;
        let cursor_after = run_codec_chain(mapping, metadata, ctx.passwords, &mut sink)?;
        ctx.directories.lock().unwrap().push(DeferredDirectory {
            path: dir_path,
            modified: metadata.last_modified,
        });
        return commit_span(ctx, metadata.header_offset as u64, cursor_after as u64);
    }

    if metadata.is_symlink() {
        let mut sink = VecSink::default();
        let cursor_after = run_codec_chain(mapping, metadata, ctx.passwords, &mut sink)?;
        let link_path = ctx.dest_dir.join(&metadata.path);
        ctx.symlinks.lock().unwrap().push(DeferredSymlink {
            link_path,
            target: sink.0,
        });
        return commit_span(ctx, metadata.header_offset as u64, cursor_after as u64);
    }

    let dest_path = ctx.dest_dir.join(&metadata.path);
    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let exists = dest_path.exists();
    if decide_overwrite(ctx.overwrite, exists) == OverwriteDecision::Skip {
        debug!("skipping existing file {}", dest_path);
        return Ok(());
    }

    let file = fs::File::create(&dest_path)?;
    let mut sink = FsSink {
        file,
        path: dest_path.clone(),
    };
    let cursor_after = run_codec_chain(mapping, metadata, ctx.passwords, &mut sink)?;
    sink.file.flush().map_err(ZipError::Io)?;
    drop(sink);

    apply_unix_mode(&dest_path, metadata.unix_mode)?;
    set_modified(&dest_path, metadata.last_modified)?;

    commit_span(ctx, metadata.header_offset as u64, cursor_after as u64)
}

fn commit_span(ctx: &RunContext, beg: u64, end: u64) -> ZipResult<()> {
    let mut cover = ctx.cover.lock().unwrap();
    match cover.add(beg, end)? {
        AddOutcome::Ok => Ok(()),
        AddOutcome::Overlap => Err(ZipError::Bomb(
            "member's local header/payload overlaps another member's span",
        )),
    }
}

/// Drains the deferred symlink queue, creating each link only after every
/// regular file has already been written (so same-archive targets exist).
#[cfg(unix)]
fn drain_symlinks(symlinks: Vec<DeferredSymlink>) -> WorstError {
    use std::os::unix::fs::symlink;
    use std::path::PathBuf;
    let mut worst = WorstError::new();
    for link in symlinks {
        let target = PathBuf::from(String::from_utf8_lossy(&link.target).into_owned());
        if let Err(e) = symlink(&target, &link.link_path) {
            worst.record_err(&ZipError::Io(e));
        }
    }
    worst
}

#[cfg(not(unix))]
fn drain_symlinks(symlinks: Vec<DeferredSymlink>) -> WorstError {
    let mut worst = WorstError::new();
    if !symlinks.is_empty() {
        warn!(
            "{} symlink member(s) skipped: symlinks aren't supported on this platform",
            symlinks.len()
        );
        worst.record(Severity::Warn);
    }
    worst
}

/// Applies deferred directory timestamps deepest-first, so creating a
/// child doesn't bump its parent's mtime after the parent's own timestamp
/// has already been set.
fn drain_directory_timestamps(mut directories: Vec<DeferredDirectory>) -> WorstError {
    directories.sort_by_key(|d| std::cmp::Reverse(d.path.components().count()));
    let mut worst = WorstError::new();
    for dir in directories {
        if let Err(e) = set_modified(&dir.path, dir.modified) {
            worst.record_err(&e);
        }
    }
    worst
}

/// Extracts (or, with `ctx.test_only` behavior folded in by the caller's
/// choice of entry point, tests) the retained entries from `archive`,
/// batching `DIR_BLKSIZ` at a time and fanning each batch out across
/// threads when `opts.parallel` is set.
fn run(archive: &ZipArchive, dest_dir: &Utf8Path, opts: &RunOptions, test_only: bool) -> ZipResult<RunReport> {
    let retained = filter_entries(
        archive.entries(),
        &opts.include,
        &opts.exclude,
        opts.case_insensitive,
    )?;

    let ctx = RunContext {
        cover: Mutex::new(archive.seed_cover()?),
        dest_dir: dest_dir.to_owned(),
        overwrite: opts.overwrite,
        passwords: opts.passwords,
        symlinks: Mutex::new(Vec::new()),
        directories: Mutex::new(Vec::new()),
        test_only,
    };

    let mapping = archive.data();
    let mut report = RunReport::default();

    for batch in retained.chunks(DIR_BLKSIZ) {
        let results: Vec<ZipResult<()>> = if opts.parallel {
            batch
                .par_iter()
                .map(|entry| extract_one(mapping, entry, &ctx))
                .collect()
        } else {
            batch.iter().map(|entry| extract_one(mapping, entry, &ctx)).collect()
        };
        for result in &results {
            if let Err(e) = result {
                debug!("member failed: {e}");
            }
            report.record(result);
        }
    }

    if !test_only {
        let symlinks = ctx.symlinks.into_inner().unwrap();
        let symlink_worst = drain_symlinks(symlinks);
        report.worst.record(symlink_worst.severity());

        let directories = ctx.directories.into_inner().unwrap();
        let dir_worst = drain_directory_timestamps(directories);
        report.worst.record(dir_worst.severity());
    }

    Ok(report)
}

/// Extracts every retained entry from `archive` into `dest_dir`.
pub fn extract(archive: &ZipArchive, dest_dir: &Utf8Path, opts: &RunOptions) -> ZipResult<RunReport> {
    fs::create_dir_all(dest_dir)?;
    run(archive, dest_dir, opts, false)
}

/// Decodes every retained entry and validates its CRC-32 (and, for
/// members carrying one, its extended-attribute extra field) without
/// writing anything to disk.
pub fn test(archive: &ZipArchive, opts: &RunOptions) -> ZipResult<RunReport> {
    run(archive, Utf8Path::new("."), opts, true)
}

/// Returns the retained entries for listing, in central-directory order.
pub fn list<'a>(
    archive: &'a ZipArchive,
    include: &[String],
    exclude: &[String],
    case_insensitive: bool,
) -> ZipResult<Vec<&'a FileMetadata<'a>>> {
    filter_entries(archive.entries(), include, exclude, case_insensitive)
}
