//! Active match code lookup
//!
//! The score sheet application logs a line when a match sheet is opened:
//!
//! ```text
//! 2024-03-09 14:02:11 ouverture feuille table coderenc=FABCDEG
//! ```
//!
//! [`LogFileLocator`] watches that log and reports the code of the most
//! recently opened sheet among the last few lines.

use futures::stream::{self, BoxStream, StreamExt};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, trace, warn};

use crate::config::VisionConfig;
use crate::types::MatchCode;
use crate::{Result, SyncError};

const MARKER: &str = "ouverture feuille table coderenc=";
const SCANNED_LINES: usize = 10;
const TAIL_BYTES: u64 = 16 * 1024;

/// Resolves which match is currently active.
#[async_trait::async_trait]
pub trait MatchCodeLocator: Send + Sync + 'static {
    /// Change notifications: one tick right away, then one per change.
    ///
    /// Fails with a `Discovery` error when the underlying resource does not
    /// exist. An `Err` item means watching broke and must be restarted.
    async fn watch(&self) -> Result<BoxStream<'static, Result<()>>>;

    /// Current match code, `None` when no match is open.
    async fn locate(&self) -> Result<Option<MatchCode>>;
}

/// Locator backed by the score sheet's log file.
#[derive(Debug, Clone)]
pub struct LogFileLocator {
    path: Option<PathBuf>,
    poll: Duration,
}

impl LogFileLocator {
    pub fn new<P: AsRef<Path>>(path: P, poll: Duration) -> Self {
        Self { path: Some(path.as_ref().to_path_buf()), poll }
    }

    /// Locator for the configured (or default) log file location.
    pub fn from_config(config: &VisionConfig) -> Self {
        Self { path: config.resolve_log_file(), poll: config.log_poll() }
    }

    fn path(&self) -> Result<&Path> {
        self.path.as_deref().ok_or_else(|| {
            SyncError::discovery("score sheet log", "no log file location configured")
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

impl Fingerprint {
    fn of(meta: &std::fs::Metadata) -> Self {
        Self { modified: meta.modified().ok(), len: meta.len() }
    }
}

struct WatchState {
    path: PathBuf,
    poll: Duration,
    last: Fingerprint,
    started: bool,
}

#[async_trait::async_trait]
impl MatchCodeLocator for LogFileLocator {
    async fn watch(&self) -> Result<BoxStream<'static, Result<()>>> {
        let path = self.path()?.to_path_buf();
        let meta = tokio::fs::metadata(&path).await.map_err(|e| {
            SyncError::discovery("score sheet log", format!("{}: {}", path.display(), e))
        })?;
        debug!("Watching score sheet log {}", path.display());

        let state =
            WatchState { path, poll: self.poll, last: Fingerprint::of(&meta), started: false };
        let changes = stream::unfold(state, |mut state| async move {
            if !state.started {
                state.started = true;
                return Some((Ok(()), state));
            }
            loop {
                tokio::time::sleep(state.poll).await;
                match tokio::fs::metadata(&state.path).await {
                    Ok(meta) => {
                        let current = Fingerprint::of(&meta);
                        if current != state.last {
                            trace!("Score sheet log changed");
                            state.last = current;
                            return Some((Ok(()), state));
                        }
                    }
                    Err(e) => {
                        let context = format!("watch {}", state.path.display());
                        return Some((Err(SyncError::transport(context, e)), state));
                    }
                }
            }
        });
        Ok(changes.boxed())
    }

    async fn locate(&self) -> Result<Option<MatchCode>> {
        let path = self.path()?;
        match read_tail(path).await {
            Ok(text) => Ok(find_match_code(&text)),
            Err(e) => {
                warn!("Failed to read score sheet log {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }
}

/// Last bytes of the file, starting on a line boundary.
async fn read_tail(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    let start = len.saturating_sub(TAIL_BYTES);
    file.seek(SeekFrom::Start(start)).await?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).await?;

    let text = String::from_utf8_lossy(&bytes);
    if start == 0 {
        return Ok(text.into_owned());
    }
    // Drop the partial first line
    Ok(text.split_once('\n').map(|(_, rest)| rest.to_string()).unwrap_or_default())
}

/// Most recent match code among the last lines of `log`.
fn find_match_code(log: &str) -> Option<MatchCode> {
    log.lines().rev().take(SCANNED_LINES).find_map(|line| {
        let (_, rest) = line.split_once(MARKER)?;
        let candidate = rest.get(..MatchCode::LEN)?;
        MatchCode::parse(candidate).ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const POLL: Duration = Duration::from_millis(10);

    #[test]
    fn most_recent_marker_wins() {
        let log = "\
10:00 ouverture feuille table coderenc=FAAAAAA
10:05 saisie but
10:30 ouverture feuille table coderenc=FBBBBBB
10:31 saisie but
";
        assert_eq!(find_match_code(log).unwrap().as_str(), "FBBBBBB");
    }

    #[test]
    fn markers_outside_the_scanned_tail_are_ignored() {
        let mut log = String::from("ouverture feuille table coderenc=FAAAAAA\n");
        for n in 0..SCANNED_LINES {
            log.push_str(&format!("line {n}\n"));
        }
        assert_eq!(find_match_code(&log), None);
    }

    #[test]
    fn malformed_codes_are_skipped() {
        let log = "\
ouverture feuille table coderenc=FAAAAAA
ouverture feuille table coderenc=fbbbbbb
ouverture feuille table coderenc=FBB
";
        assert_eq!(find_match_code(log).unwrap().as_str(), "FAAAAAA");
    }

    #[tokio::test]
    async fn locate_reads_the_log_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "start").unwrap();
        let locator = LogFileLocator::new(file.path(), POLL);
        assert_eq!(locator.locate().await.unwrap(), None);

        writeln!(file, "ouverture feuille table coderenc=FTESTAB").unwrap();
        assert_eq!(locator.locate().await.unwrap().unwrap().as_str(), "FTESTAB");
    }

    #[tokio::test]
    async fn locate_only_reads_the_tail_of_large_logs() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for _ in 0..2_000 {
            writeln!(file, "saisie evenement quelconque sur la feuille de match").unwrap();
        }
        writeln!(file, "ouverture feuille table coderenc=FLARGEA").unwrap();
        let locator = LogFileLocator::new(file.path(), POLL);
        assert_eq!(locator.locate().await.unwrap().unwrap().as_str(), "FLARGEA");
    }

    #[tokio::test]
    async fn missing_log_is_a_discovery_error() {
        let locator = LogFileLocator::new("/definitely/not/LogFeuille.log", POLL);
        let err = locator.watch().await.err().unwrap();
        assert!(matches!(err, SyncError::Discovery { .. }));

        let unconfigured = LogFileLocator { path: None, poll: POLL };
        assert!(matches!(unconfigured.watch().await.err().unwrap(), SyncError::Discovery { .. }));
    }

    #[tokio::test]
    async fn watch_ticks_immediately_and_on_change() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "start").unwrap();
        let locator = LogFileLocator::new(file.path(), POLL);
        let mut changes = locator.watch().await.unwrap();

        assert!(changes.next().await.unwrap().is_ok());

        writeln!(file, "ouverture feuille table coderenc=FTESTAB").unwrap();
        file.flush().unwrap();
        let tick = tokio::time::timeout(Duration::from_secs(5), changes.next()).await.unwrap();
        assert!(tick.unwrap().is_ok());
    }

    #[tokio::test]
    async fn deleted_log_breaks_the_watch() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let locator = LogFileLocator::new(file.path(), POLL);
        let mut changes = locator.watch().await.unwrap();
        assert!(changes.next().await.unwrap().is_ok());

        file.close().unwrap();
        let tick = tokio::time::timeout(Duration::from_secs(5), changes.next()).await.unwrap();
        assert!(matches!(tick, Some(Err(SyncError::Transport { .. }))));
    }
}
