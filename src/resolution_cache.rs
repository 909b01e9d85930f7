//! Durable store of conflict resolutions, keyed by conflict signature.
//!
//! # Layout
//!
//! ```text
//! <cache-dir>/
//!   entries/<signature>.json   current resolution per signature
//!   journal.jsonl              append-only log of every record
//!   .lock                      held exclusively while writing
//! ```
//!
//! The directory is created on the first [`ResolutionCache::record`];
//! lookups against a missing directory simply miss. Entries are never
//! removed by braid. The journal keeps every resolution ever recorded, with
//! its time and origin, so changes to an entry can be audited.
//!
//! An entry stores, per conflict region, the region as the signature saw it
//! and the text that replaced it. Replaying splices those replacements into
//! the file being resolved now, so text outside the regions (which the
//! signature does not cover) is never taken from the recorded run. File
//! content is kept as raw bytes, base64 in the JSON.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use braid_git::{ConflictedFile, ResolvedFile};
use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::durable;
use crate::fingerprint::hex;
use crate::model::CommitId;

// ---------------------------------------------------------------------------
// ConflictSignature
// ---------------------------------------------------------------------------

const MARKERS: [&str; 4] = ["<<<<<<<", "|||||||", "=======", ">>>>>>>"];

/// Content-derived key of a conflict.
///
/// SHA-256 over the conflicting regions of every conflicted file, files
/// ordered by path. Marker labels (`<<<<<<< HEAD`, `>>>>>>> 1a2b3c4 (msg)`)
/// are stripped so the same clash produced by different commits, or by a
/// later run, yields the same signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictSignature(String);

impl ConflictSignature {
    /// Signature of a set of conflicted files.
    #[must_use]
    pub fn of(files: &[ConflictedFile]) -> Self {
        let mut sorted: Vec<&ConflictedFile> = files.iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));

        let mut hasher = Sha256::new();
        for file in sorted {
            hasher.update(file.path.as_bytes());
            hasher.update([0]);
            let text = ConflictText::parse(&file.content);
            if text.regions.is_empty() {
                // modify/delete and friends: no markers, key on the content.
                hasher.update(&file.content);
            } else {
                for region in &text.regions {
                    hasher.update(region);
                }
            }
            hasher.update([0]);
        }
        Self(hex(&hasher.finalize()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConflictSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A conflicted file cut at its conflict regions.
struct ConflictText<'a> {
    /// The text around the regions, `regions.len() + 1` stretches.
    context: Vec<&'a [u8]>,
    /// Each region with marker lines reduced to the bare marker and every
    /// line newline-terminated.
    regions: Vec<Vec<u8>>,
}

impl<'a> ConflictText<'a> {
    fn parse(content: &'a [u8]) -> Self {
        let mut context = Vec::new();
        let mut regions = Vec::new();
        let mut current: Option<Vec<u8>> = None;
        let mut context_start = 0;
        let mut offset = 0;

        for raw in content.split_inclusive(|&b| b == b'\n') {
            let line_start = offset;
            offset += raw.len();
            let line = trim_eol(raw);
            let marker = MARKERS
                .iter()
                .find(|m| line.starts_with(m.as_bytes()))
                .map(|m| m.as_bytes());

            if current.is_none() {
                if marker != Some(MARKERS[0].as_bytes()) {
                    continue;
                }
                context.push(&content[context_start..line_start]);
            }
            let region = current.get_or_insert_with(Vec::new);
            region.extend_from_slice(marker.unwrap_or(line));
            region.push(b'\n');
            if marker == Some(MARKERS[3].as_bytes()) {
                regions.extend(current.take());
                context_start = offset;
            }
        }
        // An unterminated region runs to the end of the file.
        if let Some(region) = current {
            regions.push(region);
            context_start = content.len();
        }
        context.push(&content[context_start..]);
        Self { context, regions }
    }

    /// What `resolved` put in place of each region, if it kept the
    /// surrounding text intact.
    fn postimages(&self, resolved: &[u8]) -> Option<Vec<Vec<u8>>> {
        let (first, rest) = self.context.split_first()?;
        let (last, middle) = rest.split_last()?;
        let mut body = resolved.strip_prefix(*first)?.strip_suffix(*last)?;

        let mut posts = Vec::with_capacity(self.regions.len());
        for ctx in middle {
            let at = find(body, ctx)?;
            posts.push(body[..at].to_vec());
            body = &body[at + ctx.len()..];
        }
        posts.push(body.to_vec());
        Some(posts)
    }

    /// The file with region `i` replaced by `posts[i]`.
    fn splice<'p>(&self, posts: impl IntoIterator<Item = &'p [u8]>) -> Vec<u8> {
        let mut posts = posts.into_iter();
        let mut out = Vec::new();
        for ctx in &self.context {
            out.extend_from_slice(ctx);
            if let Some(post) = posts.next() {
                out.extend_from_slice(post);
            }
        }
        out
    }
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ---------------------------------------------------------------------------
// Entries and journal
// ---------------------------------------------------------------------------

/// Byte strings stored as standard base64.
mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// One conflict region and what the resolution put in its place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionResolution {
    /// The region as it appeared, normalized the way the signature sees it.
    #[serde(rename = "preimage_base64", with = "base64_bytes")]
    pub preimage: Vec<u8>,
    /// The replacement text, exactly as resolved.
    #[serde(rename = "postimage_base64", with = "base64_bytes")]
    pub postimage: Vec<u8>,
}

/// How one conflicted file was resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileResolution {
    /// Per-region replacements, spliced into whatever surrounds the regions
    /// when replayed.
    Regions { regions: Vec<RegionResolution> },
    /// The whole file. Only for conflicts without markers, whose signature
    /// covers the full content.
    Whole {
        #[serde(rename = "content_base64", with = "base64_bytes")]
        content: Vec<u8>,
    },
    /// The resolution deletes the file.
    Deleted,
}

/// One file of a stored resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
    pub path: String,
    pub resolution: FileResolution,
}

/// A resolution that cannot be stored as a replayable entry.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LearnError {
    /// The resolution says nothing about a conflicted path.
    #[error("no resolved content for conflicted path {path}")]
    MissingFile { path: String },

    /// The resolution also changed text outside the conflict regions.
    #[error("resolution of {path} edits text outside the conflict regions")]
    OutsideConflict { path: String },
}

/// The stored resolution for one signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub signature: ConflictSignature,
    pub files: Vec<CachedFile>,
    /// The commit whose resolution this is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_commit: Option<CommitId>,
}

impl CacheEntry {
    /// Learn how `resolved` settled `conflicts`.
    ///
    /// # Errors
    /// A conflicted path has no resolved counterpart, or its resolution
    /// changed text outside the conflict regions.
    pub fn learn(
        signature: ConflictSignature,
        conflicts: &[ConflictedFile],
        resolved: &[ResolvedFile],
        source_commit: Option<CommitId>,
    ) -> Result<Self, LearnError> {
        let files: Vec<CachedFile> = conflicts
            .iter()
            .map(|conflict| {
                let path = conflict.path.clone();
                let Some(outcome) = resolved.iter().find(|r| r.path == conflict.path) else {
                    return Err(LearnError::MissingFile { path });
                };
                let Some(content) = &outcome.content else {
                    return Ok(CachedFile {
                        path,
                        resolution: FileResolution::Deleted,
                    });
                };
                let text = ConflictText::parse(&conflict.content);
                if text.regions.is_empty() {
                    return Ok(CachedFile {
                        path,
                        resolution: FileResolution::Whole {
                            content: content.clone(),
                        },
                    });
                }
                let Some(posts) = text.postimages(content) else {
                    return Err(LearnError::OutsideConflict { path });
                };
                let regions = text
                    .regions
                    .into_iter()
                    .zip(posts)
                    .map(|(preimage, postimage)| RegionResolution {
                        preimage,
                        postimage,
                    })
                    .collect();
                Ok(CachedFile {
                    path,
                    resolution: FileResolution::Regions { regions },
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            signature,
            files,
            source_commit,
        })
    }

    /// Apply the stored resolution to the conflicted files of the current
    /// run, keeping each file's own text around the regions.
    ///
    /// `None` if the files no longer line up with the entry: a path or a
    /// region differs.
    #[must_use]
    pub fn replay(&self, current: &[ConflictedFile]) -> Option<Vec<ResolvedFile>> {
        if current
            .iter()
            .any(|c| !self.files.iter().any(|f| f.path == c.path))
        {
            return None;
        }
        self.files
            .iter()
            .map(|cached| {
                let conflict = current.iter().find(|c| c.path == cached.path)?;
                let content = match &cached.resolution {
                    FileResolution::Deleted => None,
                    FileResolution::Whole { content } => Some(content.clone()),
                    FileResolution::Regions { regions } => {
                        let text = ConflictText::parse(&conflict.content);
                        let lined_up = text.regions.len() == regions.len()
                            && text
                                .regions
                                .iter()
                                .zip(regions)
                                .all(|(have, stored)| *have == stored.preimage);
                        if !lined_up {
                            return None;
                        }
                        Some(text.splice(regions.iter().map(|r| r.postimage.as_slice())))
                    }
                };
                Some(ResolvedFile {
                    path: cached.path.clone(),
                    content,
                })
            })
            .collect()
    }
}

/// Who produced a recorded resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    /// An operator fixed the conflict during replay.
    Operator,
    /// Learned from a historical merge commit.
    Training,
}

/// One line of `journal.jsonl`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub recorded_at: DateTime<Utc>,
    pub origin: RecordOrigin,
    pub entry: CacheEntry,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The resolution cache could not be read or written.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure.
    #[error("resolution cache I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A stored entry is not valid JSON.
    #[error("corrupt resolution cache entry {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_owned(),
        source,
    }
}

// ---------------------------------------------------------------------------
// ResolutionCache
// ---------------------------------------------------------------------------

/// Directory-backed resolution cache.
#[derive(Clone, Debug)]
pub struct ResolutionCache {
    dir: PathBuf,
}

impl ResolutionCache {
    /// A cache rooted at `dir`. Nothing is created until the first record.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entries_dir(&self) -> PathBuf {
        self.dir.join("entries")
    }

    fn entry_path(&self, signature: &ConflictSignature) -> PathBuf {
        self.entries_dir().join(format!("{signature}.json"))
    }

    fn journal_path(&self) -> PathBuf {
        self.dir.join("journal.jsonl")
    }

    /// The stored resolution for `signature`, if any.
    ///
    /// # Errors
    /// I/O failures other than a missing entry, or an unparseable entry.
    pub fn lookup(&self, signature: &ConflictSignature) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(signature);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| CacheError::Corrupt { path, source }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    /// Store `entry` under its signature and journal it.
    ///
    /// An existing entry for the same signature is replaced; the journal
    /// keeps the previous one.
    ///
    /// # Errors
    /// Any filesystem failure while locking, writing or journaling.
    pub fn record(&self, entry: &CacheEntry, origin: RecordOrigin) -> Result<(), CacheError> {
        let entries_dir = self.entries_dir();
        fs::create_dir_all(&entries_dir).map_err(io_error(&entries_dir))?;

        let lock_path = self.dir.join(".lock");
        let lock = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(io_error(&lock_path))?;
        FileExt::lock_exclusive(&lock).map_err(io_error(&lock_path))?;

        let path = self.entry_path(&entry.signature);
        let json = serde_json::to_vec_pretty(entry).map_err(|source| CacheError::Corrupt {
            path: path.clone(),
            source,
        })?;
        durable::write_atomic(&path, &json).map_err(io_error(&path))?;

        let journal = self.journal_path();
        let record = JournalRecord {
            recorded_at: Utc::now(),
            origin,
            entry: entry.clone(),
        };
        durable::append_json_line(&journal, &record).map_err(io_error(&journal))?;

        // The lock is released when `lock` is closed.
        drop(lock);
        info!(signature = %entry.signature, ?origin, files = entry.files.len(), "recorded resolution");
        Ok(())
    }

    /// Every stored entry, ordered by signature.
    ///
    /// # Errors
    /// I/O failures or an unparseable entry.
    pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let dir = self.entries_dir();
        let listing = match fs::read_dir(&dir) {
            Ok(listing) => listing,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&dir)(e)),
        };

        let mut entries = Vec::new();
        for item in listing {
            let path = item.map_err(io_error(&dir))?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let bytes = fs::read(&path).map_err(io_error(&path))?;
            let entry: CacheEntry = serde_json::from_slice(&bytes)
                .map_err(|source| CacheError::Corrupt { path, source })?;
            entries.push(entry);
        }
        entries.sort_by(|a, b| a.signature.cmp(&b.signature));
        debug!(count = entries.len(), "listed resolution cache entries");
        Ok(entries)
    }

    /// Every journal record, oldest first.
    ///
    /// # Errors
    /// I/O failures or a corrupt journal line.
    pub fn journal(&self) -> Result<Vec<JournalRecord>, CacheError> {
        let path = self.journal_path();
        durable::read_json_lines(&path).map_err(io_error(&path))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use braid_git::GitOid;

    use super::*;

    fn conflicted_in(path: &str, header: &str, ours: &str, theirs: &str, label: &str) -> ConflictedFile {
        ConflictedFile {
            path: path.to_owned(),
            content: format!(
                "{header}\n<<<<<<< HEAD\n{ours}\n=======\n{theirs}\n>>>>>>> {label}\nfooter\n"
            )
            .into_bytes(),
        }
    }

    fn conflicted(path: &str, ours: &str, theirs: &str, label: &str) -> ConflictedFile {
        conflicted_in(path, "header", ours, theirs, label)
    }

    fn resolved(path: &str, content: Option<&str>) -> ResolvedFile {
        ResolvedFile {
            path: path.to_owned(),
            content: content.map(|c| c.as_bytes().to_vec()),
        }
    }

    fn learn(files: &[ConflictedFile], resolution: &[ResolvedFile]) -> CacheEntry {
        CacheEntry::learn(ConflictSignature::of(files), files, resolution, None).unwrap()
    }

    #[test]
    fn signature_ignores_labels_surroundings_and_file_order() {
        let a = [
            conflicted("b.txt", "x", "y", "1111111 (one)"),
            conflicted("a.txt", "p", "q", "1111111 (one)"),
        ];
        let b = [
            conflicted_in("a.txt", "different header", "p", "q", "2222222 (two)"),
            conflicted("b.txt", "x", "y", "2222222 (two)"),
        ];
        assert_eq!(ConflictSignature::of(&a), ConflictSignature::of(&b));
    }

    #[test]
    fn signature_depends_on_conflicting_lines_and_paths() {
        let base = ConflictSignature::of(&[conflicted("a.txt", "p", "q", "x")]);
        assert_ne!(base, ConflictSignature::of(&[conflicted("a.txt", "p", "r", "x")]));
        assert_ne!(base, ConflictSignature::of(&[conflicted("b.txt", "p", "q", "x")]));
    }

    #[test]
    fn diff3_base_section_is_part_of_the_region() {
        let text = ConflictText::parse(
            b"top\n<<<<<<< ours\na\n||||||| base\nb\n=======\nc\n>>>>>>> theirs\n",
        );
        assert_eq!(
            text.regions,
            vec![b"<<<<<<<\na\n|||||||\nb\n=======\nc\n>>>>>>>\n".to_vec()]
        );
        assert_eq!(text.context, vec![&b"top\n"[..], &b""[..]]);
    }

    #[test]
    fn unterminated_region_runs_to_the_end() {
        let text = ConflictText::parse(b"x\r\n<<<<<<< ours\r\na\r\n=======\r\nb");
        assert_eq!(text.regions, vec![b"<<<<<<<\na\n=======\nb\n".to_vec()]);
        assert_eq!(text.context, vec![&b"x\r\n"[..], &b""[..]]);
    }

    #[test]
    fn cached_region_keeps_the_current_surroundings() {
        let first = [conflicted_in("zshrc", "export EDITOR=vim", "a", "b", "one")];
        let entry = learn(
            &first,
            &[resolved("zshrc", Some("export EDITOR=vim\nmerged\nfooter\n"))],
        );

        // Same clash, different header: same signature, own header kept.
        let second = [conflicted_in("zshrc", "export EDITOR=nvim", "a", "b", "two")];
        assert_eq!(entry.signature, ConflictSignature::of(&second));
        assert_eq!(
            entry.replay(&second),
            Some(vec![resolved("zshrc", Some("export EDITOR=nvim\nmerged\nfooter\n"))])
        );
    }

    #[test]
    fn several_regions_are_resolved_independently() {
        let files = [ConflictedFile {
            path: "init.vim".into(),
            content: b"a\n<<<<<<< x\n1\n=======\n2\n>>>>>>> y\nb\n<<<<<<< x\n3\n=======\n4\n>>>>>>> y\nc\n"
                .to_vec(),
        }];
        let entry = learn(&files, &[resolved("init.vim", Some("a\none\nb\nthree\nfour\nc\n"))]);
        let FileResolution::Regions { regions } = &entry.files[0].resolution else {
            panic!("expected per-region resolution");
        };
        assert_eq!(regions[0].postimage, b"one\n");
        assert_eq!(regions[1].postimage, b"three\nfour\n");

        let moved = [ConflictedFile {
            path: "init.vim".into(),
            content: b"A\n<<<<<<< p\n1\n=======\n2\n>>>>>>> q\nB\nB\n<<<<<<< p\n3\n=======\n4\n>>>>>>> q\n"
                .to_vec(),
        }];
        assert_eq!(
            entry.replay(&moved),
            Some(vec![resolved("init.vim", Some("A\none\nB\nB\nthree\nfour\n"))])
        );
    }

    #[test]
    fn edits_outside_the_conflict_are_not_learned() {
        let files = [conflicted("zshrc", "a", "b", "x")];
        let err = CacheEntry::learn(
            ConflictSignature::of(&files),
            &files,
            &[resolved("zshrc", Some("rewritten header\nmerged\nfooter\n"))],
            None,
        )
        .unwrap_err();
        assert_eq!(err, LearnError::OutsideConflict { path: "zshrc".into() });

        let err = CacheEntry::learn(ConflictSignature::of(&files), &files, &[], None).unwrap_err();
        assert_eq!(err, LearnError::MissingFile { path: "zshrc".into() });
    }

    #[test]
    fn markerless_conflicts_store_whole_content_or_deletion() {
        let files = [
            ConflictedFile {
                path: "gone".into(),
                content: b"kept by them\n".to_vec(),
            },
            ConflictedFile {
                path: "kept".into(),
                content: b"modified\n".to_vec(),
            },
        ];
        let entry = learn(&files, &[resolved("gone", None), resolved("kept", Some("final\n"))]);
        assert_eq!(entry.files[0].resolution, FileResolution::Deleted);
        assert_eq!(
            entry.replay(&files),
            Some(vec![resolved("gone", None), resolved("kept", Some("final\n"))])
        );
    }

    #[test]
    fn replay_refuses_files_that_no_longer_line_up() {
        let files = [conflicted("f", "a", "b", "x")];
        let entry = learn(&files, &[resolved("f", Some("header\nab\nfooter\n"))]);
        assert_eq!(entry.replay(&[conflicted("f", "a", "c", "x")]), None);
        assert_eq!(entry.replay(&[conflicted("g", "a", "b", "x")]), None);
        assert_eq!(
            entry.replay(&[conflicted("f", "a", "b", "x"), conflicted("g", "a", "b", "x")]),
            None
        );
    }

    #[test]
    fn lookup_on_missing_directory_misses_without_creating_it() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::new(dir.path().join("cache"));
        let sig = ConflictSignature::of(&[conflicted("a", "1", "2", "x")]);
        assert_eq!(cache.lookup(&sig).unwrap(), None);
        assert!(cache.entries().unwrap().is_empty());
        assert!(!cache.dir().exists());
    }

    #[test]
    fn record_then_lookup_and_journal() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::new(dir.path().join("cache"));
        let files = [conflicted("a", "1", "2", "x")];
        let sig = ConflictSignature::of(&files);
        let commit: CommitId = GitOid::from_bytes([7; 20]).into();

        let merged = CacheEntry::learn(
            sig.clone(),
            &files,
            &[resolved("a", Some("header\nmerged\nfooter\n"))],
            Some(commit),
        )
        .unwrap();
        cache.record(&merged, RecordOrigin::Operator).unwrap();
        let deleted = learn(&files, &[resolved("a", None)]);
        cache.record(&deleted, RecordOrigin::Training).unwrap();

        let entry = cache.lookup(&sig).unwrap().unwrap();
        assert_eq!(entry, deleted);
        assert_eq!(entry.replay(&files), Some(vec![resolved("a", None)]));
        assert_eq!(cache.entries().unwrap(), vec![entry]);

        let journal = cache.journal().unwrap();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal[0].origin, RecordOrigin::Operator);
        assert_eq!(journal[0].entry, merged);
        assert_eq!(journal[1].origin, RecordOrigin::Training);
        assert!(cache.dir().join(".lock").exists());
    }

    #[test]
    fn non_utf8_resolution_survives_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::new(dir.path());
        let files = [ConflictedFile {
            path: "latin1.txt".into(),
            content: b"caf\xe9\n<<<<<<< a\n\xff\n=======\n\xfe\n>>>>>>> b\n".to_vec(),
        }];
        let resolution = [ResolvedFile {
            path: "latin1.txt".into(),
            content: Some(b"caf\xe9\n\xff\xfe\n".to_vec()),
        }];
        let entry = learn(&files, &resolution);
        cache.record(&entry, RecordOrigin::Operator).unwrap();

        let raw = fs::read_to_string(cache.entry_path(&entry.signature)).unwrap();
        assert!(raw.contains("\"postimage_base64\": \"//4K\""), "{raw}");
        let stored = cache.lookup(&entry.signature).unwrap().unwrap();
        assert_eq!(stored.replay(&files), Some(resolution.to_vec()));
    }

    #[test]
    fn corrupt_entry_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::new(dir.path());
        let sig = ConflictSignature::of(&[conflicted("a", "1", "2", "x")]);
        fs::create_dir_all(dir.path().join("entries")).unwrap();
        fs::write(cache.entry_path(&sig), "{not json").unwrap();
        assert!(matches!(cache.lookup(&sig), Err(CacheError::Corrupt { .. })));
    }
}
