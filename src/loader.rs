use std::{
    borrow::Cow,
    fmt,
    io::{self, Cursor, Read},
    path::PathBuf,
    time::Duration,
};

use image::{DynamicImage, GenericImageView};
use log::{debug, warn};
use zune_jpeg::JpegDecoder;

use crate::blob_store::{BlobRef, BlobStore, BLOB_SCHEME};

/// Upper bound for HTTP response bodies.
pub const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

/// Where an image comes from. Equality is by reference string, so a
/// `Blob` handle and a `Url` naming the same `blob:` URL compare equal.
#[derive(Clone)]
pub enum ImageSource {
    Blob(BlobRef),
    Path(PathBuf),
    Url(String),
}

impl ImageSource {
    /// Interprets a reference string. Empty strings are "no image".
    pub fn parse(reference: &str) -> Option<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        if reference.starts_with(BLOB_SCHEME)
            || reference.starts_with("http://")
            || reference.starts_with("https://")
        {
            Some(Self::Url(reference.to_string()))
        } else {
            Some(Self::Path(PathBuf::from(reference)))
        }
    }

    pub fn key(&self) -> Cow<'_, str> {
        match self {
            Self::Blob(blob) => Cow::Borrowed(blob.url()),
            Self::Path(path) => path.to_string_lossy(),
            Self::Url(url) => Cow::Borrowed(url.as_str()),
        }
    }

    pub fn as_blob(&self) -> Option<&BlobRef> {
        match self {
            Self::Blob(blob) => Some(blob),
            _ => None,
        }
    }
}

impl From<BlobRef> for ImageSource {
    fn from(blob: BlobRef) -> Self {
        Self::Blob(blob)
    }
}

impl PartialEq for ImageSource {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ImageSource {}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blob(blob) => write!(f, "Blob({})", blob.url()),
            Self::Path(path) => write!(f, "Path({})", path.display()),
            Self::Url(url) => write!(f, "Url({url})"),
        }
    }
}

/// Resolves [`ImageSource`]s to decoded images.
///
/// Every failure (missing file, revoked blob, HTTP error, undecodable
/// bytes, zero-sized image) collapses to `None`; callers skip the layer.
#[derive(Clone)]
pub struct ImageLoader {
    store: BlobStore,
    agent: ureq::Agent,
}

impl ImageLoader {
    pub fn new(store: BlobStore, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { store, agent }
    }

    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    pub fn load(&self, source: &ImageSource) -> Option<DynamicImage> {
        let image = match source {
            ImageSource::Blob(blob) => decode_bytes(blob.bytes()),
            ImageSource::Path(path) => match std::fs::read(path) {
                Ok(bytes) => decode_bytes(&bytes),
                Err(err) => {
                    warn!("Failed to read {}: {err:#}", path.display());
                    None
                }
            },
            ImageSource::Url(url) if url.starts_with(BLOB_SCHEME) => match self.store.resolve(url) {
                Some(blob) => decode_bytes(blob.bytes()),
                None => {
                    debug!("{url} is revoked or released");
                    None
                }
            },
            ImageSource::Url(url) => self.fetch(url).and_then(|bytes| decode_bytes(&bytes)),
        }?;

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            debug!("{:?} decoded to an empty image", source);
            return None;
        }
        Some(image)
    }

    fn fetch(&self, url: &str) -> Option<Vec<u8>> {
        let resp = match self.agent.get(url).call() {
            Ok(resp) => resp,
            Err(err) => {
                warn!("Failed to fetch {url}: {err}");
                return None;
            }
        };
        match read_capped(resp.into_reader(), MAX_BODY_BYTES) {
            Ok(Some(bytes)) => Some(bytes),
            Ok(None) => {
                warn!("Body of {url} exceeds {MAX_BODY_BYTES} bytes");
                None
            }
            Err(err) => {
                warn!("Failed to read body of {url}: {err}");
                None
            }
        }
    }
}

impl fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageLoader").field("store", &self.store).finish()
    }
}

/// Reads `reader` to the end, or returns `None` once more than `limit`
/// bytes arrive.
pub fn read_capped(reader: impl Read, limit: u64) -> io::Result<Option<Vec<u8>>> {
    let mut bytes = Vec::new();
    reader.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > limit {
        return Ok(None);
    }
    Ok(Some(bytes))
}

pub fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8, 0xFF])
}

/// Decodes encoded image bytes, trying zune-jpeg first for JPEG data.
pub fn decode_bytes(bytes: &[u8]) -> Option<DynamicImage> {
    if is_jpeg(bytes) {
        if let Some(image) = decode_jpeg(bytes) {
            return Some(image);
        }
    }
    match image::load_from_memory(bytes) {
        Ok(image) => Some(image),
        Err(err) => {
            debug!("Failed to decode {} bytes: {err}", bytes.len());
            None
        }
    }
}

fn decode_jpeg(bytes: &[u8]) -> Option<DynamicImage> {
    let mut decoder = JpegDecoder::new(Cursor::new(bytes));
    let pixels = match decoder.decode() {
        Ok(pixels) => pixels,
        Err(err) => {
            // Fall back to the image crate decoders
            debug!("zune-jpeg rejected input: {err:?}");
            return None;
        }
    };
    let info = decoder.info()?;
    // zune-jpeg usually returns RGB8
    image::RgbImage::from_raw(info.width as u32, info.height as u32, pixels)
        .map(DynamicImage::ImageRgb8)
}
