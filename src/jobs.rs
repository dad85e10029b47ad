//! Slow work requested by the session and the outcomes it reports back.

use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::anyhow;
use image::RgbaImage;
use log::{debug, warn};

use crate::{
    background::Background,
    blob_store::BlobRef,
    compositor::{Composited, Compositor},
    fs_utils::{write_unique, DOWNLOAD_NAME},
    image_utils::thumbnail,
    loader::{decode_bytes, ImageSource},
    removal::{BackgroundRemover, RemovalError},
};

/// Monotonic request id. Only the latest token issued on a lane is applied.
pub type Token = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Purpose {
    /// Display the result and append it to history.
    Record,
    /// Display the result only.
    Preview,
}

pub enum Job {
    RemoveBackground {
        token: Token,
        file_name: String,
        bytes: Vec<u8>,
    },
    Composite {
        token: Token,
        foreground: ImageSource,
        background: Option<Background>,
        purpose: Purpose,
    },
    Download {
        foreground: ImageSource,
        background: Option<Background>,
        dir: PathBuf,
    },
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoveBackground {
                token,
                file_name,
                bytes,
            } => write!(f, "RemoveBackground(#{token}, {file_name}, {} bytes)", bytes.len()),
            Self::Composite {
                token,
                foreground,
                background,
                purpose,
            } => write!(
                f,
                "Composite(#{token}, {foreground:?} over {background:?}, {purpose:?})"
            ),
            Self::Download { dir, .. } => write!(f, "Download({})", dir.display()),
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Cutout {
        token: Token,
        result: Result<BlobRef, RemovalError>,
    },
    Composited {
        token: Token,
        purpose: Purpose,
        result: Option<(Composited, Option<RgbaImage>)>,
    },
    Downloaded {
        result: anyhow::Result<PathBuf>,
    },
}

/// Executes jobs. Shared by every pipeline thread.
pub struct Worker {
    compositor: Compositor,
    remover: Arc<dyn BackgroundRemover>,
}

impl Worker {
    pub fn new(compositor: Compositor, remover: Arc<dyn BackgroundRemover>) -> Self {
        Self {
            compositor,
            remover,
        }
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn run(&self, job: Job) -> Outcome {
        debug!("Running {job:?}");
        match job {
            Job::RemoveBackground {
                token,
                file_name,
                bytes,
            } => {
                let result = self
                    .remover
                    .remove_background(&file_name, &bytes)
                    .map(|cutout| {
                        let mime = image::guess_format(&cutout)
                            .map(|format| format.to_mime_type())
                            .unwrap_or("application/octet-stream");
                        self.compositor.loader().store().create(cutout, mime)
                    });
                Outcome::Cutout { token, result }
            }
            Job::Composite {
                token,
                foreground,
                background,
                purpose,
            } => {
                let result = self
                    .compositor
                    .render(&foreground, background.as_ref())
                    .map(|composited| {
                        let thumb = match purpose {
                            Purpose::Record => self.thumbnail_of(&composited),
                            Purpose::Preview => None,
                        };
                        (composited, thumb)
                    });
                Outcome::Composited {
                    token,
                    purpose,
                    result,
                }
            }
            Job::Download {
                foreground,
                background,
                dir,
            } => {
                let result = self
                    .compositor
                    .render(&foreground, background.as_ref())
                    .ok_or_else(|| anyhow!("Unable to composite {foreground:?}"))
                    .and_then(|composited| write_unique(&dir, DOWNLOAD_NAME, composited.blob.bytes()));
                Outcome::Downloaded { result }
            }
        }
    }

    fn thumbnail_of(&self, composited: &Composited) -> Option<RgbaImage> {
        let image = decode_bytes(composited.blob.bytes())?;
        match thumbnail(&image) {
            Ok(thumb) => Some(thumb),
            Err(err) => {
                warn!("Failed to render thumbnail: {err:#}");
                None
            }
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("compositor", &self.compositor)
            .finish_non_exhaustive()
    }
}
