pub mod app;
pub mod background;
pub mod blob_store;
pub mod color;
pub mod compositor;
pub mod fs_utils;
pub mod history;
pub mod image_utils;
pub mod jobs;
pub mod loader;
pub mod removal;
pub mod samples;
pub mod session;
pub mod ui;
