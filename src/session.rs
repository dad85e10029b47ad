//! Editing session: owns the foreground, background slot, undo/redo stacks
//! and history, and turns user commands into pipeline jobs.
//!
//! Every command runs synchronously and returns the jobs it needs executed.
//! Results come back through [`Session::apply`]. Each lane keeps the token of
//! its latest request; results carrying an older token are discarded.

use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::{
    background::{Background, BackgroundStack},
    blob_store::BlobStore,
    color::{Color, ColorError},
    history::HistoryStore,
    jobs::{Job, Outcome, Purpose, Token},
    loader::ImageSource,
    samples::Sample,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lane {
    /// Upload or sample selection producing the cutout.
    Foreground,
    /// Compositing after background changes.
    Composite,
}

impl Lane {
    fn index(self) -> usize {
        match self {
            Self::Foreground => 0,
            Self::Composite => 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No processed image to download!")]
    NoProcessedImage,
    #[error("invalid color: {0}")]
    InvalidColor(#[from] ColorError),
    #[error("unable to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// User-visible message, shown until dismissed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    ServiceFailure,
    NoProcessedImage,
    InvalidColor(String),
    ReadFailure(String),
    DownloadFailure,
    Downloaded(PathBuf),
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Self::ServiceFailure => "Background removal failed. Server error.".to_string(),
            Self::NoProcessedImage => "No processed image to download!".to_string(),
            Self::InvalidColor(spec) => format!("Unrecognized color: {spec}"),
            Self::ReadFailure(detail) => format!("Could not open image: {detail}"),
            Self::DownloadFailure => "Failed to generate combined image for download.".to_string(),
            Self::Downloaded(path) => format!("Saved {}", path.display()),
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Downloaded(_))
    }
}

impl From<&SessionError> for Notice {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::NoProcessedImage => Self::NoProcessedImage,
            SessionError::InvalidColor(err) => Self::InvalidColor(err.to_string()),
            SessionError::Read { path, source } => {
                Self::ReadFailure(format!("{}: {source}", path.display()))
            }
        }
    }
}

/// A sample cutout waiting for its simulated processing time to pass.
#[derive(Debug)]
struct PendingReveal {
    token: Token,
    result: ImageSource,
    due: Instant,
}

#[derive(Debug)]
pub struct Session {
    store: BlobStore,
    sample_delay: Duration,
    preview: Option<ImageSource>,
    foreground: Option<ImageSource>,
    result: Option<ImageSource>,
    backgrounds: BackgroundStack,
    selected: Option<Background>,
    history: HistoryStore,
    notice: Option<Notice>,
    next_token: Token,
    awaiting: [Option<Token>; 2],
    reveal: Option<PendingReveal>,
    last_download: Option<PathBuf>,
}

impl Session {
    pub fn new(store: BlobStore) -> Self {
        Self {
            store,
            sample_delay: crate::samples::DEFAULT_SAMPLE_DELAY,
            preview: None,
            foreground: None,
            result: None,
            backgrounds: BackgroundStack::new(),
            selected: None,
            history: HistoryStore::new(),
            notice: None,
            next_token: 0,
            awaiting: [None, None],
            reveal: None,
            last_download: None,
        }
    }

    pub fn with_sample_delay(mut self, delay: Duration) -> Self {
        self.sample_delay = delay;
        self
    }

    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    /// The photo being processed, as uploaded.
    pub fn preview(&self) -> Option<&ImageSource> {
        self.preview.as_ref()
    }

    /// The layer drawn on top of backgrounds: the cutout, or a restored result.
    pub fn foreground(&self) -> Option<&ImageSource> {
        self.foreground.as_ref()
    }

    /// What is currently displayed as the processed image.
    pub fn result(&self) -> Option<&ImageSource> {
        self.result.as_ref()
    }

    pub fn background(&self) -> Option<&Background> {
        self.backgrounds.current()
    }

    pub fn backgrounds(&self) -> &BackgroundStack {
        &self.backgrounds
    }

    pub fn selected(&self) -> Option<&Background> {
        self.selected.as_ref()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn last_download(&self) -> Option<&Path> {
        self.last_download.as_deref()
    }

    pub fn is_waiting(&self, lane: Lane) -> bool {
        self.awaiting[lane.index()].is_some()
    }

    fn issue(&mut self, lane: Lane) -> Token {
        self.next_token += 1;
        self.awaiting[lane.index()] = Some(self.next_token);
        self.next_token
    }

    fn cancel(&mut self, lane: Lane) {
        self.awaiting[lane.index()] = None;
    }

    /// Consumes the lane's pending token if `token` is the latest one.
    fn settle(&mut self, lane: Lane, token: Token) -> bool {
        if self.awaiting[lane.index()] == Some(token) {
            self.awaiting[lane.index()] = None;
            true
        } else {
            debug!("Dropping stale {lane:?} result #{token}");
            false
        }
    }

    fn fail<T>(&mut self, err: SessionError) -> Result<T, SessionError> {
        warn!("{err}");
        self.notice = Some(Notice::from(&err));
        Err(err)
    }

    fn begin_foreground(&mut self, preview: ImageSource) -> Token {
        self.preview = Some(preview);
        self.foreground = None;
        self.result = None;
        self.reveal = None;
        self.cancel(Lane::Composite);
        self.issue(Lane::Foreground)
    }

    /// Starts background removal for an uploaded photo.
    pub fn on_upload(&mut self, file_name: &str, bytes: Vec<u8>) -> Job {
        let mime = image::guess_format(&bytes)
            .map(|format| format.to_mime_type())
            .unwrap_or("application/octet-stream");
        let preview = self.store.create(bytes.clone(), mime);
        let token = self.begin_foreground(ImageSource::Blob(preview));
        info!("Uploading {file_name} for background removal (#{token})");
        Job::RemoveBackground {
            token,
            file_name: file_name.to_string(),
            bytes,
        }
    }

    pub fn on_upload_file(&mut self, path: &Path) -> Result<Job, SessionError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(source) => {
                return self.fail(SessionError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(self.on_upload(&file_name, bytes))
    }

    /// Shows the sample photo. Its precomputed cutout is revealed by
    /// [`Session::poll_timers`] once the sample delay has passed.
    pub fn on_sample_selected(&mut self, sample: &Sample) {
        let token = self.begin_foreground(ImageSource::Path(sample.thumbnail.clone()));
        info!("Showing sample {} (#{token})", sample.name);
        self.reveal = Some(PendingReveal {
            token,
            result: ImageSource::Path(sample.result.clone()),
            due: Instant::now() + self.sample_delay,
        });
    }

    /// Reveals a sample cutout whose delay has elapsed by `now`.
    pub fn poll_timers(&mut self, now: Instant) -> Option<Job> {
        if self.reveal.as_ref()?.due > now {
            return None;
        }
        let PendingReveal { token, result, .. } = self.reveal.take()?;
        if !self.settle(Lane::Foreground, token) {
            return None;
        }
        self.foreground_ready(result)
    }

    /// Time left until [`Session::poll_timers`] has something to do.
    pub fn next_timer(&self, now: Instant) -> Option<Duration> {
        self.reveal
            .as_ref()
            .map(|reveal| reveal.due.saturating_duration_since(now))
    }

    /// Records a background change and composites it over the foreground.
    pub fn on_set_background(&mut self, background: Background) -> Result<Option<Job>, SessionError> {
        let Some(foreground) = self.foreground.clone() else {
            return self.fail(SessionError::NoProcessedImage);
        };
        self.selected = Some(background.clone());
        if !self.backgrounds.set(background.clone()) {
            return Ok(None);
        }
        let token = self.issue(Lane::Composite);
        info!("Background set to {} (#{token})", background.label());
        Ok(Some(Job::Composite {
            token,
            foreground,
            background: Some(background),
            purpose: Purpose::Record,
        }))
    }

    pub fn on_set_color(&mut self, spec: &str) -> Result<Option<Job>, SessionError> {
        match Color::parse(spec) {
            Ok(color) => self.on_set_background(Background::Color(color)),
            Err(err) => self.fail(err.into()),
        }
    }

    /// Uses an uploaded file as the background. The bytes stay local.
    pub fn on_upload_background(&mut self, bytes: Vec<u8>) -> Result<Option<Job>, SessionError> {
        if self.foreground.is_none() {
            return self.fail(SessionError::NoProcessedImage);
        }
        let mime = image::guess_format(&bytes)
            .map(|format| format.to_mime_type())
            .unwrap_or("application/octet-stream");
        let blob = self.store.create(bytes, mime);
        self.on_set_background(Background::Image(ImageSource::Blob(blob)))
    }

    pub fn on_upload_background_file(&mut self, path: &Path) -> Result<Option<Job>, SessionError> {
        match fs::read(path) {
            Ok(bytes) => self.on_upload_background(bytes),
            Err(source) => self.fail(SessionError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn on_undo(&mut self) -> Option<Job> {
        if !self.backgrounds.undo() {
            return None;
        }
        self.refresh()
    }

    pub fn on_redo(&mut self) -> Option<Job> {
        if !self.backgrounds.redo() {
            return None;
        }
        self.refresh()
    }

    pub fn on_reset(&mut self) -> Option<Job> {
        if !self.backgrounds.reset() {
            return None;
        }
        self.selected = None;
        self.refresh()
    }

    /// Redraws the displayed result after undo/redo/reset without touching history.
    fn refresh(&mut self) -> Option<Job> {
        let foreground = self.foreground.clone()?;
        match self.backgrounds.current().cloned() {
            None => {
                self.cancel(Lane::Composite);
                self.result = Some(foreground);
                None
            }
            Some(background) => {
                let token = self.issue(Lane::Composite);
                Some(Job::Composite {
                    token,
                    foreground,
                    background: Some(background),
                    purpose: Purpose::Preview,
                })
            }
        }
    }

    /// Makes a history entry the current foreground and drops the active background.
    pub fn on_restore_history(&mut self, index: usize) -> bool {
        let Some(entry) = self.history.get(index) else {
            return false;
        };
        let source = entry.source.clone();
        debug!("Restoring {source:?}");
        self.foreground = Some(source.clone());
        self.result = Some(source);
        self.backgrounds.detach();
        self.selected = None;
        self.cancel(Lane::Composite);
        true
    }

    pub fn on_clear_history(&mut self) {
        let removed = self.history.clear();
        debug!("Cleared {removed} history entries");
    }

    /// Composites the current foreground and background into a PNG in `dir`.
    pub fn on_download(&mut self, dir: &Path) -> Result<Job, SessionError> {
        let Some(foreground) = self.foreground.clone() else {
            return self.fail(SessionError::NoProcessedImage);
        };
        Ok(Job::Download {
            foreground,
            background: self.backgrounds.current().cloned(),
            dir: dir.to_path_buf(),
        })
    }

    /// Applies a job outcome; may request follow-up jobs.
    pub fn apply(&mut self, outcome: Outcome) -> Option<Job> {
        match outcome {
            Outcome::Cutout { token, result } => {
                if !self.settle(Lane::Foreground, token) {
                    return None;
                }
                match result {
                    Ok(blob) => self.foreground_ready(ImageSource::Blob(blob)),
                    Err(err) => {
                        error!("Background removal failed: {err}");
                        self.notice = Some(Notice::ServiceFailure);
                        None
                    }
                }
            }
            Outcome::Composited {
                token,
                purpose,
                result,
            } => {
                if !self.settle(Lane::Composite, token) {
                    return None;
                }
                match result {
                    Some((composited, thumbnail)) => {
                        let source = ImageSource::Blob(composited.blob);
                        if purpose == Purpose::Record {
                            self.history.add(source.clone(), thumbnail);
                        }
                        self.result = Some(source);
                    }
                    None => warn!("Composite #{token} produced no image"),
                }
                None
            }
            Outcome::Downloaded { result } => {
                match result {
                    Ok(path) => {
                        info!("Saved {}", path.display());
                        self.notice = Some(Notice::Downloaded(path.clone()));
                        self.last_download = Some(path);
                    }
                    Err(err) => {
                        error!("Download failed: {err:#}");
                        self.notice = Some(Notice::DownloadFailure);
                    }
                }
                None
            }
        }
    }

    /// A cutout has landed. A background carried over from earlier edits is
    /// composited under it right away.
    fn foreground_ready(&mut self, foreground: ImageSource) -> Option<Job> {
        self.foreground = Some(foreground.clone());
        self.result = Some(foreground.clone());
        let background = self.backgrounds.current().cloned()?;
        let token = self.issue(Lane::Composite);
        Some(Job::Composite {
            token,
            foreground,
            background: Some(background),
            purpose: Purpose::Record,
        })
    }
}
