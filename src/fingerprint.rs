//! Patch fingerprints and equivalence tracking.
//!
//! The same logical change often shows up in several source histories with
//! different hunk offsets, file emission order or function context. Patches
//! are normalized before hashing so that those differences disappear:
//!
//! 1. split into per-file sections at `diff --git`, `diff --cc` and
//!    `diff --combined` headers;
//! 2. order the sections by path;
//! 3. keep only `+`, `-` and `@` lines, dropping the `+++`/`---` headers;
//! 4. reduce every hunk header to its bare `@@`/`@@@` marker.
//!
//! Changes that carry no hunks survive through their extended headers:
//! mode lines, `new file`/`deleted file`, `rename`/`copy` and the body of a
//! `GIT binary patch`. `index` and similarity lines are dropped.
//!
//! The fingerprint is the SHA-256 of what remains.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::CommitId;

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// SHA-256 (lowercase hex) of a normalized patch.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of already-normalized patch text.
    #[must_use]
    pub fn of_normalized(normalized: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalized);
        Self(hex(&hasher.finalize()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Extended header lines that describe a change on their own.
const KEPT_HEADERS: [&[u8]; 9] = [
    b"old mode ",
    b"new mode ",
    b"new file mode ",
    b"deleted file mode ",
    b"rename from ",
    b"rename to ",
    b"copy from ",
    b"copy to ",
    b"Binary files ",
];

const BINARY_PATCH: &[u8] = b"GIT binary patch";

/// One file's part of a patch: its sort key and the kept lines.
struct Section<'a> {
    path: &'a [u8],
    lines: Vec<&'a [u8]>,
    binary: bool,
}

/// Normalize raw patch text. Empty output means the patch changes nothing.
#[must_use]
pub fn normalize_patch(patch: &[u8]) -> Vec<u8> {
    let mut sections: Vec<Section<'_>> = Vec::new();
    let mut preamble = Section {
        path: b"",
        lines: Vec::new(),
        binary: false,
    };

    for raw in patch.split(|&b| b == b'\n') {
        let line = raw.strip_suffix(b"\r").unwrap_or(raw);
        if let Some(path) = section_path(line) {
            sections.push(Section {
                path,
                lines: Vec::new(),
                binary: false,
            });
            continue;
        }
        let Some(&first) = line.first() else {
            continue;
        };
        let section = sections.last_mut().unwrap_or(&mut preamble);
        if section.binary {
            section.lines.push(line);
            continue;
        }
        let kept = match first {
            b'+' if line.starts_with(b"+++") => None,
            b'-' if line.starts_with(b"---") => None,
            b'+' | b'-' => Some(line),
            b'@' => Some(hunk_marker(line)),
            _ if line == BINARY_PATCH => {
                section.binary = true;
                Some(line)
            }
            _ if KEPT_HEADERS.iter().any(|h| line.starts_with(h)) => Some(line),
            _ => None,
        };
        if let Some(kept) = kept {
            section.lines.push(kept);
        }
    }

    // Stable: two sections for one path keep their relative order.
    sections.sort_by(|a, b| a.path.cmp(b.path));

    let mut out = Vec::new();
    for line in std::iter::once(&preamble)
        .chain(sections.iter())
        .flat_map(|s| s.lines.iter())
    {
        out.extend_from_slice(line);
        out.push(b'\n');
    }
    out
}

/// The path a `diff --git a/x b/x` / `diff --cc x` header introduces.
fn section_path(line: &[u8]) -> Option<&[u8]> {
    if let Some(rest) = line.strip_prefix(b"diff --git ") {
        // `a/<path> b/<path>`: sort on the post-image side.
        let split = rest
            .windows(3)
            .rposition(|w| w == b" b/")
            .map_or(rest, |i| &rest[i + 1..]);
        return Some(split);
    }
    line.strip_prefix(b"diff --cc ")
        .or_else(|| line.strip_prefix(b"diff --combined "))
}

/// Whether the patch has at least one per-file section.
fn has_sections(patch: &[u8]) -> bool {
    patch
        .split(|&b| b == b'\n')
        .any(|line| section_path(line).is_some())
}

/// `@@ -1,3 +1,4 @@ fn main()` → `@@`, `@@@ -1 -1 +1 @@@` → `@@@`.
fn hunk_marker(line: &[u8]) -> &[u8] {
    let ats = line.iter().take_while(|&&b| b == b'@').count();
    &line[..ats]
}

// ---------------------------------------------------------------------------
// Applied set
// ---------------------------------------------------------------------------

/// Outcome of checking a patch against the applied set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatchCheck {
    /// The patch touches no file.
    Empty,
    /// An equivalent patch was already applied by `original`.
    Duplicate {
        /// Fingerprint shared with the original.
        fingerprint: Fingerprint,
        /// The first commit that produced it.
        original: CommitId,
    },
    /// Not seen before.
    Fresh(Fingerprint),
}

/// Fingerprints of every applied patch, each mapped to the first commit
/// that produced it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppliedSet {
    seen: HashMap<Fingerprint, CommitId>,
}

impl AppliedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify raw patch text against the set. Does not modify the set.
    #[must_use]
    pub fn check(&self, patch: &[u8]) -> PatchCheck {
        let normalized = normalize_patch(patch);
        if normalized.is_empty() && !has_sections(patch) {
            return PatchCheck::Empty;
        }
        let fingerprint = Fingerprint::of_normalized(&normalized);
        match self.seen.get(&fingerprint) {
            Some(original) => PatchCheck::Duplicate {
                fingerprint,
                original: *original,
            },
            None => PatchCheck::Fresh(fingerprint),
        }
    }

    /// Record that `commit` applied a patch with `fingerprint`. The first
    /// commit recorded for a fingerprint is kept.
    pub fn record(&mut self, fingerprint: Fingerprint, commit: CommitId) {
        self.seen.entry(fingerprint).or_insert(commit);
    }

    /// The commit that first applied `fingerprint`.
    #[must_use]
    pub fn original_of(&self, fingerprint: &Fingerprint) -> Option<CommitId> {
        self.seen.get(fingerprint).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use braid_git::GitOid;

    use super::*;

    const PATCH_A: &str = "\
diff --git a/zsh/zshrc b/zsh/zshrc
index 1111111..2222222 100644
--- a/zsh/zshrc
+++ b/zsh/zshrc
@@ -10,3 +10,4 @@ export PATH
 context
-old
+new
+extra
";

    fn id(n: u8) -> CommitId {
        GitOid::from_bytes([n; 20]).into()
    }

    #[test]
    fn keeps_only_change_lines_and_bare_markers() {
        let normalized = normalize_patch(PATCH_A.as_bytes());
        assert_eq!(String::from_utf8(normalized).unwrap(), "@@\n-old\n+new\n+extra\n");
    }

    #[test]
    fn hunk_offsets_and_context_do_not_matter() {
        let shifted = PATCH_A
            .replace("@@ -10,3 +10,4 @@ export PATH", "@@ -42,5 +42,6 @@")
            .replace("index 1111111..2222222", "index abcdef0..1234567")
            .replace(" context\n", " other context\n");
        assert_eq!(
            Fingerprint::of_normalized(&normalize_patch(PATCH_A.as_bytes())),
            Fingerprint::of_normalized(&normalize_patch(shifted.as_bytes()))
        );
    }

    #[test]
    fn file_order_does_not_matter() {
        let vim = "diff --git a/vimrc b/vimrc\n--- a/vimrc\n+++ b/vimrc\n@@ -1 +1 @@\n-set nu\n+set rnu\n";
        let one = format!("{vim}{PATCH_A}");
        let two = format!("{PATCH_A}{vim}");
        assert_eq!(normalize_patch(one.as_bytes()), normalize_patch(two.as_bytes()));
    }

    #[test]
    fn combined_diff_markers_are_reduced() {
        let combined = "\
diff --cc init.lua
index 1,2..3
--- a/init.lua
+++ b/init.lua
@@@ -1,1 -1,1 +1,2 @@@ local M = {}
- a
 -b
++c
";
        let normalized = String::from_utf8(normalize_patch(combined.as_bytes())).unwrap();
        assert_eq!(normalized, "@@@\n- a\n++c\n");
    }

    #[test]
    fn different_content_differs() {
        let other = PATCH_A.replace("+extra", "+more");
        assert_ne!(
            normalize_patch(PATCH_A.as_bytes()),
            normalize_patch(other.as_bytes())
        );
    }

    #[test]
    fn only_a_patch_without_files_is_empty() {
        let set = AppliedSet::new();
        assert_eq!(set.check(b""), PatchCheck::Empty);
        assert_eq!(set.check(b"\n\n"), PatchCheck::Empty);

        let mode_change = "diff --git a/run.sh b/run.sh\nold mode 100644\nnew mode 100755\n";
        assert_eq!(
            String::from_utf8(normalize_patch(mode_change.as_bytes())).unwrap(),
            "old mode 100644\nnew mode 100755\n"
        );
        assert!(matches!(set.check(mode_change.as_bytes()), PatchCheck::Fresh(_)));
    }

    #[test]
    fn rename_without_content_change_is_fresh() {
        let rename = "\
diff --git a/bashrc b/shell/bashrc
similarity index 100%
rename from bashrc
rename to shell/bashrc
";
        let normalized = String::from_utf8(normalize_patch(rename.as_bytes())).unwrap();
        assert_eq!(normalized, "rename from bashrc\nrename to shell/bashrc\n");
        assert!(matches!(AppliedSet::new().check(rename.as_bytes()), PatchCheck::Fresh(_)));
    }

    #[test]
    fn binary_payload_is_part_of_the_fingerprint() {
        let binary = |payload: &str| {
            format!(
                "diff --git a/logo.png b/logo.png\n\
                 new file mode 100644\n\
                 index 0000000000000000000000000000000000000000..1111111111111111111111111111111111111111\n\
                 GIT binary patch\n\
                 literal 5\n\
                 {payload}\n\
                 \n\
                 literal 0\n\
                 HcmV?d00001\n\n"
            )
        };
        let one = binary("McmZ?d00001");
        let normalized = String::from_utf8(normalize_patch(one.as_bytes())).unwrap();
        assert_eq!(
            normalized,
            "new file mode 100644\nGIT binary patch\nliteral 5\nMcmZ?d00001\nliteral 0\nHcmV?d00001\n"
        );
        assert!(matches!(AppliedSet::new().check(one.as_bytes()), PatchCheck::Fresh(_)));
        assert_ne!(
            normalize_patch(one.as_bytes()),
            normalize_patch(binary("McmZ?d00002").as_bytes())
        );

        // A diff without --binary still names the file.
        let summary = "diff --git a/logo.png b/logo.png\nnew file mode 100644\nBinary files /dev/null and b/logo.png differ\n";
        assert!(matches!(AppliedSet::new().check(summary.as_bytes()), PatchCheck::Fresh(_)));
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        let fp = Fingerprint::of_normalized(b"");
        assert_eq!(
            fp.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn applied_set_reports_first_original() {
        let mut set = AppliedSet::new();
        let PatchCheck::Fresh(fp) = set.check(PATCH_A.as_bytes()) else {
            panic!("expected a fresh patch");
        };
        set.record(fp.clone(), id(1));
        set.record(fp.clone(), id(2));
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.check(PATCH_A.as_bytes()),
            PatchCheck::Duplicate {
                fingerprint: fp.clone(),
                original: id(1)
            }
        );
        assert_eq!(set.original_of(&fp), Some(id(1)));
    }
}
