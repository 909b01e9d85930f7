use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

use braid_git::{ApplyOutcome, GitCli, GitError, GitOid, ReplayRepo, ResolvedFile};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn git_raw(dir: &Path, args: &[&str], date: Option<&str>) -> Output {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(dir);
    if let Some(date) = date {
        cmd.env("GIT_AUTHOR_DATE", date).env("GIT_COMMITTER_DATE", date);
    }
    cmd.output().unwrap()
}

fn git(dir: &Path, args: &[&str]) -> String {
    let out = git_raw(dir, args, None);
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn init_source(root: &Path, name: &str) -> std::path::PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    git(&dir, &["-c", "init.defaultBranch=main", "init", "--quiet"]);
    git(&dir, &["config", "user.email", "test@test.com"]);
    git(&dir, &["config", "user.name", "Test User"]);
    dir
}

/// Write `path` with `content` and commit it at `date`. Returns the new OID.
fn commit_file(dir: &Path, path: &str, content: &str, date: &str) -> GitOid {
    fs::write(dir.join(path), content).unwrap();
    git(dir, &["add", path]);
    let out = git_raw(dir, &["commit", "--quiet", "-m", &format!("write {path}")], Some(date));
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    head(dir)
}

fn head(dir: &Path) -> GitOid {
    git(dir, &["rev-parse", "HEAD"]).trim().parse().unwrap()
}

struct Fixture {
    _sources: TempDir,
    _result: TempDir,
    port: GitCli,
    alpha: Vec<GitOid>,
    beta: Vec<GitOid>,
}

/// Two sources that both create `shared.txt` with different content.
fn conflicting_sources() -> Fixture {
    let sources = TempDir::new().unwrap();
    let alpha_dir = init_source(sources.path(), "alpha");
    let beta_dir = init_source(sources.path(), "beta");

    let alpha = vec![
        commit_file(&alpha_dir, "a.txt", "alpha\n", "2001-01-01T10:00:00+00:00"),
        commit_file(&alpha_dir, "shared.txt", "from alpha\n", "2001-01-03T10:00:00+00:00"),
    ];
    let beta = vec![
        commit_file(&beta_dir, "b.txt", "beta\n", "2001-01-02T10:00:00+00:00"),
        commit_file(&beta_dir, "shared.txt", "from beta\n", "2001-01-04T10:00:00+00:00"),
    ];

    let result = TempDir::new().unwrap();
    let port = GitCli::new(sources.path(), result.path().join("cake"), "main")
        .with_committer("Braid", "braid@example.com");
    port.init_result_history(&["alpha".to_owned(), "beta".to_owned()])
        .unwrap();

    Fixture {
        _sources: sources,
        _result: result,
        port,
        alpha,
        beta,
    }
}

fn result_log(port: &GitCli) -> Vec<String> {
    git(port.result_dir(), &["log", "--format=%s"])
        .lines()
        .map(str::to_owned)
        .collect()
}

// ===========================================================================
// Source inspection
// ===========================================================================

#[test]
fn ancestry_is_oldest_first_with_iso_dates() {
    let fx = conflicting_sources();
    let entries = fx.port.list_ancestry_metadata("alpha").unwrap();
    assert_eq!(
        entries.iter().map(|e| e.oid).collect::<Vec<_>>(),
        fx.alpha
    );
    assert_eq!(entries[0].author_date, "2001-01-01T10:00:00+00:00");
    assert_eq!(entries[1].commit_date, "2001-01-03T10:00:00+00:00");
}

#[test]
fn resolve_revision_accepts_prefix_and_rejects_garbage() {
    let fx = conflicting_sources();
    let prefix = fx.beta[1].short();
    assert_eq!(fx.port.resolve_revision("beta", &prefix).unwrap(), fx.beta[1]);
    assert!(matches!(
        fx.port.resolve_revision("beta", "no-such-ref"),
        Err(GitError::NotFound { .. })
    ));
}

#[test]
fn patch_of_root_and_regular_commits() {
    let fx = conflicting_sources();
    let root = String::from_utf8(fx.port.compute_patch("alpha", fx.alpha[0]).unwrap()).unwrap();
    assert!(root.contains("+alpha"));
    let second = String::from_utf8(fx.port.compute_patch("alpha", fx.alpha[1]).unwrap()).unwrap();
    assert!(second.contains("shared.txt"));
    assert!(!second.contains("a.txt"));
    assert!(!fx.port.is_merge_commit("alpha", fx.alpha[1]).unwrap());
}

#[test]
fn rename_mode_and_binary_commits_have_patch_text() {
    let sources = TempDir::new().unwrap();
    let dir = init_source(sources.path(), "delta");
    commit_file(&dir, "old.sh", "echo hi\n", "2003-01-01T00:00:00+00:00");

    git(&dir, &["mv", "old.sh", "new.sh"]);
    git(&dir, &["commit", "--quiet", "-m", "rename"]);
    let renamed = head(&dir);

    git(&dir, &["update-index", "--chmod=+x", "new.sh"]);
    git(&dir, &["commit", "--quiet", "-m", "mode"]);
    let mode = head(&dir);

    fs::write(dir.join("logo.bin"), [0u8, 159, 146, 150, 255]).unwrap();
    git(&dir, &["add", "logo.bin"]);
    git(&dir, &["commit", "--quiet", "-m", "binary"]);
    let binary = head(&dir);

    let port = GitCli::new(sources.path(), sources.path().join("cake"), "main");
    let text = |oid| String::from_utf8(port.compute_patch("delta", oid).unwrap()).unwrap();
    let rename = text(renamed);
    assert!(rename.contains("rename from old.sh"), "{rename}");
    assert!(rename.contains("rename to new.sh"), "{rename}");
    assert!(text(mode).contains("new mode 100755"));
    assert!(text(binary).contains("GIT binary patch"));
}

// ===========================================================================
// Applying
// ===========================================================================

#[test]
fn clean_commits_apply_in_order() {
    let fx = conflicting_sources();
    for (repo, oid) in [("alpha", fx.alpha[0]), ("beta", fx.beta[0])] {
        assert_eq!(fx.port.apply_patch(repo, oid).unwrap(), ApplyOutcome::Applied);
    }
    assert_eq!(result_log(&fx.port), vec!["write b.txt", "write a.txt"]);
}

#[test]
fn conflict_resolved_through_port() {
    let fx = conflicting_sources();
    fx.port.apply_patch("alpha", fx.alpha[1]).unwrap();

    let ApplyOutcome::Conflict(details) = fx.port.apply_patch("beta", fx.beta[1]).unwrap() else {
        panic!("expected a conflict");
    };
    assert_eq!(details.paths(), vec!["shared.txt".to_owned()]);
    assert!(details.files[0].content.starts_with(b"<<<<<<<"));

    // Markers still present: the application stays in progress.
    assert!(!fx.port.continue_apply().unwrap());

    fx.port
        .apply_resolution(&[ResolvedFile {
            path: "shared.txt".to_owned(),
            content: Some(b"from both\n".to_vec()),
        }])
        .unwrap();
    assert!(fx.port.continue_apply().unwrap());

    let content = fs::read_to_string(fx.port.result_dir().join("shared.txt")).unwrap();
    assert_eq!(content, "from both\n");
    assert_eq!(result_log(&fx.port).len(), 2);
    assert!(fx.port.conflicted_content().unwrap().is_empty());
}

#[test]
fn skipped_conflict_leaves_no_commit() {
    let fx = conflicting_sources();
    fx.port.apply_patch("alpha", fx.alpha[1]).unwrap();
    let outcome = fx.port.apply_patch("beta", fx.beta[1]).unwrap();
    assert!(matches!(outcome, ApplyOutcome::Conflict(_)));

    fx.port.skip_apply().unwrap();
    assert_eq!(result_log(&fx.port), vec!["write shared.txt"]);
    assert!(matches!(
        fx.port.continue_apply(),
        Err(GitError::NothingInProgress)
    ));
}

#[test]
fn abort_restores_previous_state() {
    let fx = conflicting_sources();
    fx.port.apply_patch("alpha", fx.alpha[1]).unwrap();
    fx.port.apply_patch("beta", fx.beta[1]).unwrap();

    fx.port.abort_apply().unwrap();
    let content = fs::read_to_string(fx.port.result_dir().join("shared.txt")).unwrap();
    assert_eq!(content, "from alpha\n");
    // A second abort has nothing to do.
    fx.port.abort_apply().unwrap();
}

#[test]
fn stale_pick_is_discarded_before_the_next_apply() {
    let fx = conflicting_sources();
    fx.port.apply_patch("alpha", fx.alpha[1]).unwrap();
    let outcome = fx.port.apply_patch("beta", fx.beta[1]).unwrap();
    assert!(matches!(outcome, ApplyOutcome::Conflict(_)));

    // A killed run leaves the conflict behind; the next apply starts clean.
    assert_eq!(
        fx.port.apply_patch("alpha", fx.alpha[0]).unwrap(),
        ApplyOutcome::Applied
    );
    assert_eq!(result_log(&fx.port), vec!["write a.txt", "write shared.txt"]);
    let content = fs::read_to_string(fx.port.result_dir().join("shared.txt")).unwrap();
    assert_eq!(content, "from alpha\n");
}

#[test]
fn non_utf8_resolution_is_committed_byte_for_byte() {
    let fx = conflicting_sources();
    fx.port.apply_patch("alpha", fx.alpha[1]).unwrap();
    fx.port.apply_patch("beta", fx.beta[1]).unwrap();

    let latin1 = b"caf\xe9 \xff\n".to_vec();
    fx.port
        .apply_resolution(&[ResolvedFile {
            path: "shared.txt".to_owned(),
            content: Some(latin1.clone()),
        }])
        .unwrap();
    let read = fx.port.read_worktree_files(&["shared.txt".to_owned()]).unwrap();
    assert_eq!(read[0].content.as_deref(), Some(latin1.as_slice()));
    assert!(fx.port.continue_apply().unwrap());
    assert_eq!(fs::read(fx.port.result_dir().join("shared.txt")).unwrap(), latin1);
}

#[test]
fn finalize_copies_author_dates_to_committer() {
    let fx = conflicting_sources();
    fx.port.apply_patch("alpha", fx.alpha[0]).unwrap();
    fx.port.apply_patch("beta", fx.beta[0]).unwrap();

    fx.port.finalize_history().unwrap();
    let dates = git(fx.port.result_dir(), &["log", "--format=%aI %cI"]);
    for line in dates.lines() {
        let (author, committer) = line.split_once(' ').unwrap();
        assert_eq!(author, committer);
    }
}

#[test]
fn finalize_of_empty_history_is_a_noop() {
    let fx = conflicting_sources();
    fx.port.finalize_history().unwrap();
}

// ===========================================================================
// Historical merges
// ===========================================================================

#[test]
fn replayed_merge_reports_conflict_and_original_resolution() {
    let sources = TempDir::new().unwrap();
    let dir = init_source(sources.path(), "gamma");
    commit_file(&dir, "f.txt", "base\n", "2002-01-01T00:00:00+00:00");
    git(&dir, &["checkout", "--quiet", "-b", "side"]);
    commit_file(&dir, "f.txt", "side\n", "2002-01-02T00:00:00+00:00");
    git(&dir, &["checkout", "--quiet", "main"]);
    commit_file(&dir, "f.txt", "main\n", "2002-01-03T00:00:00+00:00");
    let merged = git_raw(&dir, &["merge", "--quiet", "side"], None);
    assert!(!merged.status.success());
    fs::write(dir.join("f.txt"), "resolved\n").unwrap();
    git(&dir, &["add", "f.txt"]);
    git(&dir, &["commit", "--quiet", "--no-edit"]);
    let merge = head(&dir);

    let port = GitCli::new(sources.path(), sources.path().join("cake"), "main");
    assert_eq!(port.merge_commits("gamma").unwrap(), vec![merge]);
    assert!(port.is_merge_commit("gamma", merge).unwrap());

    let replayed = port.replay_merge("gamma", merge).unwrap().unwrap();
    assert_eq!(replayed.conflicts.len(), 1);
    assert_eq!(replayed.conflicts[0].path, "f.txt");
    assert_eq!(
        replayed.resolution,
        vec![ResolvedFile {
            path: "f.txt".to_owned(),
            content: Some(b"resolved\n".to_vec()),
        }]
    );

    // The scratch worktree is gone and the source checkout untouched.
    assert_eq!(head(&dir), merge);
    assert!(!git(&dir, &["worktree", "list"]).contains("merge"));
}
