//! One function per subcommand.

use anyhow::{Context, Result, bail};
use braid::checkpoint::CheckpointStore;
use braid::chunk::render_chunks;
use braid::loader::{export_log, load_histories};
use braid::replay::{FailFastOperator, Operator, ReplayEngine, ReplayState};
use braid::resolution_cache::ResolutionCache;
use braid::stats::Statistics;
use braid::{BraidConfig, CommitId, Timeline};
use braid_git::GitCli;
use tracing::info;

use crate::terminal::TerminalOperator;

fn git_port(config: &BraidConfig) -> GitCli {
    let port = GitCli::new(
        &config.sources.root,
        &config.result.path,
        config.result.branch.as_str(),
    );
    match config.result.committer() {
        Some((name, email)) => port.with_committer(name, email),
        None => port,
    }
}

fn load_timeline(config: &BraidConfig) -> Result<Timeline> {
    let histories = load_histories(config).context("failed to load commit logs")?;
    let timeline = Timeline::build(histories, &config.sources.absorbed)?;
    info!(commits = timeline.len(), "timeline built");
    Ok(timeline)
}

fn checkpoint_store(config: &BraidConfig) -> CheckpointStore {
    CheckpointStore::new(config.checkpoint_path(), config.ledger_path())
}

/// Replay `timeline` from `state`, printing progress and the summary.
fn replay(
    config: &BraidConfig,
    port: &GitCli,
    cache: &ResolutionCache,
    store: &mut CheckpointStore,
    timeline: &Timeline,
    mut state: ReplayState,
    non_interactive: bool,
) -> Result<()> {
    let mut terminal;
    let mut fail_fast = FailFastOperator;
    let operator: &mut dyn Operator = if non_interactive {
        &mut fail_fast
    } else {
        terminal = TerminalOperator::new(
            port.result_dir(),
            config.operator.shell.clone(),
            config.operator.timeout(),
        );
        &mut terminal
    };

    let mut engine = ReplayEngine::new(port, cache, store)
        .with_finalize(config.result.finalize)
        .on_progress(|progress| println!("{progress}"));
    let summary = engine.run(timeline, &mut state, operator)?;
    println!("{summary}");
    Ok(())
}

/// `braid run`: fresh start.
pub fn run(config: &BraidConfig, with_training: bool, non_interactive: bool) -> Result<()> {
    let timeline = load_timeline(config)?;
    println!("{} commits", timeline.len());

    let port = git_port(config);
    let cache = ResolutionCache::new(&config.cache.dir);
    let mut store = checkpoint_store(config);
    ReplayEngine::new(&port, &cache, &mut store).initialize(&config.sources.repos)?;
    println!("result history initialized at {}", port.result_dir().display());

    if with_training {
        let report = braid::train::train(&port, &cache, &config.sources.repos)?;
        println!("training: {report}");
    }

    replay(
        config,
        &port,
        &cache,
        &mut store,
        &timeline,
        ReplayState::fresh(),
        non_interactive,
    )
}

/// `braid resume [<hash>]`: continue after `hash`, or after the checkpoint.
pub fn resume(config: &BraidConfig, hash: Option<&str>, non_interactive: bool) -> Result<()> {
    let timeline = load_timeline(config)?;
    let mut store = checkpoint_store(config);
    let checkpoint = match hash {
        Some(spec) => resolve_in_timeline(&timeline, spec)?,
        None => store.load()?.with_context(|| {
            format!(
                "no checkpoint at {}; use `braid run` to start",
                store.path().display()
            )
        })?,
    };
    let ledger = store.load_ledger()?;
    let state = ReplayState::resume(&timeline, checkpoint, &ledger)?;
    println!(
        "resuming after {checkpoint}, {} of {} commits left",
        timeline.len() - state.position,
        timeline.len()
    );

    let port = git_port(config);
    let cache = ResolutionCache::new(&config.cache.dir);
    replay(
        config,
        &port,
        &cache,
        &mut store,
        &timeline,
        state,
        non_interactive,
    )
}

/// A full hash, or a prefix matching exactly one timeline commit.
fn resolve_in_timeline(timeline: &Timeline, spec: &str) -> Result<CommitId> {
    if let Ok(id) = spec.parse::<CommitId>() {
        return Ok(id);
    }
    let spec = spec.to_lowercase();
    let mut matches = timeline
        .iter()
        .map(braid::Commit::hash)
        .filter(|h| h.to_string().starts_with(&spec));
    match (matches.next(), matches.next()) {
        (Some(id), None) if !spec.is_empty() => Ok(id),
        (Some(_), Some(_)) => bail!("`{spec}` is ambiguous in the timeline"),
        _ => bail!("`{spec}` does not name a commit in the timeline"),
    }
}

/// `braid chunks`
pub fn chunks(config: &BraidConfig) -> Result<()> {
    let timeline = load_timeline(config)?;
    let port = git_port(config);
    print!("{}", render_chunks(timeline.commits(), &port)?);
    Ok(())
}

/// `braid stats`
pub fn stats(config: &BraidConfig) -> Result<()> {
    let histories = load_histories(config).context("failed to load commit logs")?;
    print!("{}", Statistics::collect(&histories));
    Ok(())
}

/// `braid train`
pub fn train(config: &BraidConfig) -> Result<()> {
    let port = git_port(config);
    let cache = ResolutionCache::new(&config.cache.dir);
    let report = braid::train::train(&port, &cache, &config.sources.repos)?;
    println!("{report}");
    Ok(())
}

/// `braid logs`
pub fn logs(config: &BraidConfig) -> Result<()> {
    let port = git_port(config);
    for repo in &config.sources.repos {
        let path = config.log_path(repo);
        let count = export_log(&port, repo, &path)?;
        println!("{repo}: {count} commits → {}", path.display());
    }
    Ok(())
}
