#![allow(dead_code)]

use cutout::blob_store::BlobStore;
use cutout::compositor::Compositor;
use cutout::jobs::{Job, Worker};
use cutout::loader::ImageLoader;
use cutout::removal::{BackgroundRemover, RemovalError};
use cutout::session::Session;
use image::{codecs::png::PngEncoder, DynamicImage, Rgba, RgbaImage};
use once_cell::sync::Lazy;
use std::{
    env,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tempfile::tempdir;

pub static WORKDIR_GUARD: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub fn with_temp_workdir<F: FnOnce(&Path)>(func: F) {
    let guard = WORKDIR_GUARD
        .lock()
        .unwrap_or_else(|poison| poison.into_inner());
    let temp = tempdir().expect("tempdir");
    let previous = env::current_dir().expect("cwd");
    env::set_current_dir(temp.path()).expect("set cwd");

    struct RestoreCwd {
        previous: PathBuf,
    }

    impl Drop for RestoreCwd {
        fn drop(&mut self) {
            let _ = env::set_current_dir(&self.previous);
        }
    }

    let _restore = RestoreCwd { previous };
    func(temp.path());
    drop(guard);
    // tempdir drops here
}

pub fn solid_image(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
    let pixel = Rgba(color);
    let buffer = RgbaImage::from_pixel(width, height, pixel);
    DynamicImage::ImageRgba8(buffer)
}

pub fn write_image(path: impl Into<PathBuf>, image: &DynamicImage) {
    image
        .save(path.into())
        .expect("failed to write image to disk");
}

pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_with_encoder(PngEncoder::new(&mut bytes))
        .expect("failed to encode png");
    bytes
}

/// Cutout with an opaque left half and a transparent right half.
pub fn half_cutout(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
    let buffer = RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgba(color)
        } else {
            Rgba([0, 0, 0, 0])
        }
    });
    DynamicImage::ImageRgba8(buffer)
}

/// Returns a fixed cutout, or fails with the configured status.
pub struct FakeRemover {
    pub cutout: Vec<u8>,
    pub fail_with: Option<u16>,
    pub calls: AtomicUsize,
}

impl FakeRemover {
    pub fn returning(image: &DynamicImage) -> Self {
        Self {
            cutout: png_bytes(image),
            fail_with: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            cutout: Vec::new(),
            fail_with: Some(status),
            calls: AtomicUsize::new(0),
        }
    }
}

impl BackgroundRemover for FakeRemover {
    fn remove_background(&self, _file_name: &str, _bytes: &[u8]) -> Result<Vec<u8>, RemovalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.fail_with {
            Some(status) => Err(RemovalError::Status(status)),
            None => Ok(self.cutout.clone()),
        }
    }
}

pub struct Harness {
    pub store: BlobStore,
    pub session: Session,
    pub worker: Worker,
}

impl Harness {
    pub fn new(remover: Arc<FakeRemover>) -> Self {
        let store = BlobStore::new();
        let loader = ImageLoader::new(store.clone(), Duration::from_secs(5));
        let worker = Worker::new(Compositor::new(loader), remover);
        let session = Session::new(store.clone()).with_sample_delay(Duration::ZERO);
        Self {
            store,
            session,
            worker,
        }
    }

    /// Runs `job` and every follow-up job inline.
    pub fn run(&mut self, job: Option<Job>) {
        let mut next = job;
        while let Some(job) = next {
            let outcome = self.worker.run(job);
            next = self.session.apply(outcome);
        }
    }

    /// Decodes whatever the session currently displays.
    pub fn displayed(&self) -> DynamicImage {
        let source = self.session.result().expect("a result is displayed");
        self.worker
            .compositor()
            .loader()
            .load(source)
            .expect("displayed result decodes")
    }
}
