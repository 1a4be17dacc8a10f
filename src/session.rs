//! Session loop: capture worker plus operator command handling.
//!
//! Two activities share state. The capture worker reads frames and prints them;
//! the command loop changes settings and the installed filter. Settings are
//! exchanged as whole immutable snapshots through [`SharedSettings`], and the
//! capture session sits behind a mutex that the worker only holds for the
//! duration of one read.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::io::{AsyncBufRead, Lines};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capture::{CaptureSession, CaptureSource};
use crate::console::Console;
use crate::error::{CaptureError, PacketWatchError};
use crate::format::format_segment;
use crate::model::RawFrame;
use crate::network::classify;
use crate::settings::{Settings, SettingsStore};
use crate::watch::{first_match, HighlightStyle};

pub const HELP: &str = "commands: filter <expr> | load [file] | reload [file] | save | help | quit";

/// Single-slot cell holding the current settings snapshot.
#[derive(Debug, Clone)]
pub struct SharedSettings {
    inner: Arc<RwLock<Arc<Settings>>>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    pub fn snapshot(&self) -> Arc<Settings> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn replace(&self, settings: Settings) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(settings);
    }
}

/// Operator command, parsed from one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Empty expression clears the filter
    Filter(String),
    /// Optional file, defaults to the program's settings file
    Load(Option<String>),
    Save,
    Help,
    Quit,
    Unknown(String),
}

/// Parse a command line. The command word is case-insensitive; blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    if word.is_empty() {
        return None;
    }

    let command = match word.to_lowercase().as_str() {
        "filter" => Command::Filter(rest.to_owned()),
        "load" | "reload" => Command::Load((!rest.is_empty()).then(|| rest.to_owned())),
        "save" => Command::Save,
        "help" => Command::Help,
        "quit" => Command::Quit,
        other => Command::Unknown(other.to_owned()),
    };
    Some(command)
}

/// Whether the command loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Classify, match and format one frame against a settings snapshot.
///
/// `None` when the frame is not a TCP segment with payload.
pub fn render_frame(frame: &RawFrame, settings: &Settings) -> Option<(Option<HighlightStyle>, String)> {
    let segment = classify(frame)?;
    let style = match first_match(segment.payload, &settings.watch_rules) {
        Some((index, rule)) => {
            debug!(rule = index, "watch rule matched");
            Some(HighlightStyle::from(rule))
        }
        None => None,
    };
    let text = format_segment(&segment, &settings.display)?;
    Some((style, text))
}

fn lock<S>(capture: &Mutex<CaptureSession<S>>) -> MutexGuard<'_, CaptureSession<S>> {
    capture.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read frames until `stop` is raised or the session closes.
pub fn capture_loop<S, W>(
    capture: Arc<Mutex<CaptureSession<S>>>,
    settings: SharedSettings,
    stop: Arc<AtomicBool>,
    mut console: Console<W>,
) where
    S: CaptureSource,
    W: Write,
{
    info!("capture worker started");
    while !stop.load(Ordering::SeqCst) {
        let frame = {
            let mut session = lock(&capture);
            if !session.is_open() {
                break;
            }
            session.next_frame()
        };

        match frame {
            Ok(Some(frame)) => {
                let snapshot = settings.snapshot();
                if let Some((style, text)) = render_frame(&frame, &snapshot) {
                    if let Err(e) = console.print_segment(style, &text) {
                        error!(error = %e, "failed to write packet line");
                        eprintln!("Error: packet output failed: {e}");
                        break;
                    }
                }
            }
            Ok(None) => std::thread::yield_now(),
            Err(e) => {
                error!(error = %e, "capture read failed");
                let notice = format!("{e}; capture stopped, type quit to exit");
                if let Err(write_err) = console.print_error(&notice) {
                    error!(error = %write_err, "failed to report capture failure");
                }
                break;
            }
        }
    }
    info!("capture worker stopped");
}

/// Command-loop side of a running inspection.
pub struct Session<S> {
    settings: SharedSettings,
    store: SettingsStore,
    capture: Arc<Mutex<CaptureSession<S>>>,
    stop: Arc<AtomicBool>,
}

impl<S: CaptureSource + 'static> Session<S> {
    pub fn new(settings: Settings, store: SettingsStore, capture: CaptureSession<S>) -> Self {
        Self {
            settings: SharedSettings::new(settings),
            store,
            capture: Arc::new(Mutex::new(capture)),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.snapshot()
    }

    pub fn installed_filter(&self) -> Option<String> {
        lock(&self.capture).installed_filter().map(str::to_owned)
    }

    /// Install the current snapshot's filter on the live session.
    pub async fn sync_filter(&self) -> Result<(), PacketWatchError> {
        let current = (*self.settings.snapshot()).clone();
        self.install(current).await
    }

    /// Spawn the capture worker on the blocking pool.
    pub fn spawn_capture<W>(&self, out: W) -> JoinHandle<()>
    where
        W: Write + Send + 'static,
    {
        let capture = Arc::clone(&self.capture);
        let settings = self.settings.clone();
        let stop = Arc::clone(&self.stop);
        tokio::task::spawn_blocking(move || capture_loop(capture, settings, stop, Console::new(out)))
    }

    /// Read commands until `quit` or end of input.
    ///
    /// Command failures are reported and the loop continues.
    pub async fn run_commands<R>(&self, lines: &mut Lines<R>) -> Result<(), PacketWatchError>
    where
        R: AsyncBufRead + Unpin,
    {
        while let Some(line) = lines.next_line().await? {
            let Some(command) = parse_command(&line) else {
                continue;
            };
            match self.handle(command).await {
                Ok(Flow::Quit) => return Ok(()),
                Ok(Flow::Continue) => {}
                Err(e) => {
                    warn!(error = %e, "command failed");
                    println!("Error: {e}");
                }
            }
        }
        info!("command input closed");
        Ok(())
    }

    /// Execute one command, auto-saving afterwards when enabled.
    pub async fn handle(&self, command: Command) -> Result<Flow, PacketWatchError> {
        debug!(?command, "handling command");
        match command {
            Command::Filter(expr) => {
                let mut next = (*self.settings.snapshot()).clone();
                next.filter = (!expr.is_empty()).then_some(expr);
                self.install(next).await?;
                println!("Filter set to '{}'", self.settings.snapshot().effective_filter());
            }
            Command::Load(file) => {
                let path = file
                    .map(PathBuf::from)
                    .unwrap_or_else(|| self.store.path().to_path_buf());
                let next = Settings::load(&path).await?;
                // Rules and display settings stay live even when the filter is rejected.
                let synced = self.install(next).await;
                println!("Settings loaded from {}!", path.display());
                synced?;
            }
            Command::Save => {
                self.store.save(&self.settings.snapshot()).await?;
                println!("Settings saved to {}!", self.store.path().display());
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return Ok(Flow::Quit),
            Command::Unknown(word) => {
                debug!(command = %word, "ignoring unrecognised command");
                return Ok(Flow::Continue);
            }
        }

        let current = self.settings.snapshot();
        if current.auto_save {
            self.store.save(&current).await?;
            debug!(path = %self.store.path().display(), "settings auto-saved");
        }
        Ok(Flow::Continue)
    }

    /// Re-synchronise the live filter with `next`, then publish `next` as the snapshot.
    ///
    /// The snapshot is published before the capture lock is released, so the
    /// first frame read under a new filter is rendered with the settings that
    /// carry it. When the filter is rejected the published snapshot carries the
    /// filter that is actually installed.
    async fn install(&self, mut next: Settings) -> Result<(), PacketWatchError> {
        let capture = Arc::clone(&self.capture);
        let settings = self.settings.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut session = lock(&capture);
            let outcome = if session.is_open() {
                session.apply_filter(next.effective_filter())
            } else {
                Ok(false)
            };
            if let Err(CaptureError::FilterRejected { .. }) = &outcome {
                next.filter = session
                    .installed_filter()
                    .filter(|f| !f.is_empty())
                    .map(str::to_owned);
            }
            settings.replace(next);
            outcome
        })
        .await
        .map_err(|e| PacketWatchError::Worker(e.to_string()))?;

        outcome.map(|_| ()).map_err(PacketWatchError::from)
    }

    /// Stop the worker, close the capture session and wait for the worker to exit.
    pub async fn shutdown(&self, worker: JoinHandle<()>) -> Result<(), PacketWatchError> {
        self.stop.store(true, Ordering::SeqCst);
        let capture = Arc::clone(&self.capture);
        tokio::task::spawn_blocking(move || lock(&capture).close())
            .await
            .map_err(|e| PacketWatchError::Worker(e.to_string()))?;
        worker
            .await
            .map_err(|e| PacketWatchError::Worker(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::tests::tcp_frame;
    use crate::settings::{ConsoleColor, DisplaySettings, WatchRule};

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_command("filter tcp port 443"),
            Some(Command::Filter("tcp port 443".to_owned()))
        );
        assert_eq!(parse_command("FILTER Host A"), Some(Command::Filter("Host A".to_owned())));
        assert_eq!(parse_command("filter"), Some(Command::Filter(String::new())));
        assert_eq!(parse_command("load"), Some(Command::Load(None)));
        assert_eq!(
            parse_command("reload other.json"),
            Some(Command::Load(Some("other.json".to_owned())))
        );
        assert_eq!(parse_command(" save "), Some(Command::Save));
        assert_eq!(parse_command("Quit"), Some(Command::Quit));
        assert_eq!(parse_command("help"), Some(Command::Help));
        assert_eq!(
            parse_command("bogus arg"),
            Some(Command::Unknown("bogus".to_owned()))
        );
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn shared_settings_swap_whole_snapshot() {
        let shared = SharedSettings::new(Settings::default());
        let before = shared.snapshot();
        shared.replace(Settings {
            filter: Some("tcp".to_owned()),
            ..Settings::default()
        });
        assert!(before.filter.is_none(), "old snapshot is untouched");
        assert_eq!(shared.snapshot().filter.as_deref(), Some("tcp"));
    }

    #[test]
    fn render_frame_highlights_and_formats() {
        let settings = Settings {
            watch_rules: vec![
                WatchRule {
                    leading_byte: Some(0x01),
                    foreground_color: Some(ConsoleColor::Red),
                    background_color: None,
                },
                WatchRule {
                    leading_byte: Some(0x16),
                    foreground_color: Some(ConsoleColor::Yellow),
                    background_color: None,
                },
            ],
            display: DisplaySettings {
                direction: true,
                ..DisplaySettings::default()
            },
            ..Settings::default()
        };
        let frame = tcp_frame([93, 184, 216, 34], [192, 168, 1, 20], &[0x16, 0x03]);
        let (style, text) = render_frame(&frame, &settings).unwrap();
        assert_eq!(style.and_then(|s| s.foreground), Some(ConsoleColor::Yellow));
        assert_eq!(text, "[S->C] \n16-03");
    }

    #[derive(Default)]
    struct Observed {
        reads_under_new_filter: usize,
        stale_snapshots: usize,
    }

    /// Checks on every read that the published snapshot matches the installed filter.
    struct SnapshotCheckingSource {
        settings: SharedSettings,
        filter: String,
        capturing: bool,
        observed: Arc<Mutex<Observed>>,
    }

    impl CaptureSource for SnapshotCheckingSource {
        fn start(&mut self) -> Result<(), CaptureError> {
            self.capturing = true;
            Ok(())
        }

        fn stop(&mut self) {
            self.capturing = false;
        }

        fn set_filter(&mut self, expr: &str) -> Result<(), CaptureError> {
            self.filter = expr.to_owned();
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
            if self.capturing {
                let snapshot = self.settings.snapshot();
                let mut observed = self.observed.lock().unwrap();
                if snapshot.effective_filter() != self.filter {
                    observed.stale_snapshots += 1;
                }
                if self.filter == "tcp port 80" {
                    observed.reads_under_new_filter += 1;
                }
            }
            Ok(None)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn snapshot_is_published_with_the_filter_it_carries() {
        let dir = tempfile::tempdir().unwrap();
        let shared = SharedSettings::new(Settings::default());
        let observed = Arc::new(Mutex::new(Observed::default()));
        let mut capture = CaptureSession::new();
        capture
            .open(SnapshotCheckingSource {
                settings: shared.clone(),
                filter: String::new(),
                capturing: false,
                observed: Arc::clone(&observed),
            })
            .unwrap();
        let session = Session {
            settings: shared,
            store: SettingsStore::new(dir.path().join("pw.json")),
            capture: Arc::new(Mutex::new(capture)),
            stop: Arc::new(AtomicBool::new(false)),
        };

        let worker = session.spawn_capture(Vec::new());
        session
            .handle(Command::Filter("tcp port 80".to_owned()))
            .await
            .unwrap();
        for _ in 0..200 {
            if observed.lock().unwrap().reads_under_new_filter > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        session.shutdown(worker).await.unwrap();

        let observed = observed.lock().unwrap();
        assert!(observed.reads_under_new_filter > 0);
        assert_eq!(observed.stale_snapshots, 0);
    }

    #[test]
    fn render_frame_skips_empty_segments() {
        let frame = tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], &[]);
        assert!(render_frame(&frame, &Settings::default()).is_none());
    }
}
