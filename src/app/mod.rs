pub mod pipeline;
pub mod textures;

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use eframe::{
    egui::{self, load::SizedTexture, Color32},
    App, Frame,
};
use log::{error, warn};

use crate::{
    background::Background,
    blob_store::BlobStore,
    color::Color,
    compositor::Compositor,
    fs_utils::{collect_images, SUPPORTED_EXTENSIONS},
    history::HistoryEntry,
    image_utils::{rgba_to_color_image, thumbnail, to_color_image},
    jobs::{Job, Worker},
    loader::{ImageLoader, ImageSource},
    removal::RemovalClient,
    samples::{load_catalog, Sample},
    session::{Session, SessionError},
    ui::{fit_within, ViewState},
};

use self::{pipeline::Pipeline, textures::TextureCache};

const THUMB_SIZE: f32 = 72.0;
const SWATCH_SIZE: f32 = 36.0;

/// Settings collected from the command line.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub samples_dir: Option<PathBuf>,
    pub backgrounds_dir: Option<PathBuf>,
    pub recursive: bool,
    pub palette: Vec<Color>,
    pub sample_delay: Duration,
    pub output_dir: PathBuf,
    pub parallel: usize,
    pub initial_image: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BackgroundTab {
    Images,
    Colors,
}

pub struct CutoutApp {
    session: Session,
    pipeline: Pipeline,
    loader: ImageLoader,
    samples: Vec<Sample>,
    presets: Vec<ImageSource>,
    palette: Vec<Color>,
    output_dir: PathBuf,
    textures: TextureCache,
    tab: BackgroundTab,
    show_welcome: bool,
    status: String,
}

impl CutoutApp {
    pub fn new(config: AppConfig) -> Result<Self> {
        let store = BlobStore::new();
        let loader = ImageLoader::new(store.clone(), config.timeout);
        let remover = Arc::new(RemovalClient::new(config.endpoint.clone(), config.timeout));
        let worker = Arc::new(Worker::new(Compositor::new(loader.clone()), remover));
        let pipeline = Pipeline::new(config.parallel, worker);

        let samples = match &config.samples_dir {
            Some(dir) => load_catalog(dir, config.recursive)?,
            None => Vec::new(),
        };
        let presets = match &config.backgrounds_dir {
            Some(dir) => collect_images(dir, config.recursive)?
                .into_iter()
                .map(ImageSource::Path)
                .collect(),
            None => Vec::new(),
        };

        let mut app = Self {
            session: Session::new(store).with_sample_delay(config.sample_delay),
            pipeline,
            loader,
            samples,
            presets,
            palette: config.palette,
            output_dir: config.output_dir,
            textures: TextureCache::default(),
            tab: BackgroundTab::Images,
            show_welcome: config.initial_image.is_none(),
            status: format!("Ready. Removal service: {}", config.endpoint),
        };

        if let Some(path) = config.initial_image {
            let job = app.session.on_upload_file(&path)?;
            app.dispatch(Some(job));
        }
        Ok(app)
    }

    fn dispatch(&mut self, job: Option<Job>) {
        if let Some(job) = job {
            if let Err(err) = self.pipeline.submit(job) {
                error!("{err:#}");
                self.status = format!("{err:#}");
            }
        }
    }

    fn dispatch_result(&mut self, job: Result<Option<Job>, SessionError>) {
        match job {
            Ok(job) => self.dispatch(job),
            // The session already raised a notice.
            Err(err) => warn!("{err}"),
        }
    }

    fn pump(&mut self) {
        for outcome in self.pipeline.poll() {
            let follow_up = self.session.apply(outcome);
            self.dispatch(follow_up);
        }
        let follow_up = self.session.poll_timers(Instant::now());
        self.dispatch(follow_up);
    }

    fn pick_image(title: &str) -> Option<PathBuf> {
        rfd::FileDialog::new()
            .set_title(title)
            .add_filter("Images", SUPPORTED_EXTENSIONS)
            .pick_file()
    }

    fn source_texture(&mut self, ctx: &egui::Context, source: &ImageSource) -> Option<egui::TextureHandle> {
        let loader = &self.loader;
        self.textures.get_or_load(ctx, &source.key(), || {
            loader.load(source).map(|image| to_color_image(&image))
        })
    }

    fn thumb_texture(&mut self, ctx: &egui::Context, source: &ImageSource) -> Option<egui::TextureHandle> {
        let loader = &self.loader;
        let key = format!("thumb:{}", source.key());
        self.textures.get_or_load(ctx, &key, || {
            let image = loader.load(source)?;
            thumbnail(&image).ok().map(|thumb| rgba_to_color_image(&thumb))
        })
    }

    fn history_texture(&mut self, ctx: &egui::Context, entry: &HistoryEntry) -> Option<egui::TextureHandle> {
        match &entry.thumbnail {
            Some(thumb) => {
                let key = format!("history:{}", entry.source.key());
                self.textures
                    .get_or_load(ctx, &key, || Some(rgba_to_color_image(thumb)))
            }
            None => self.thumb_texture(ctx, &entry.source),
        }
    }

    fn show_image(ui: &mut egui::Ui, texture: &egui::TextureHandle, max: egui::Vec2) {
        let (size, _) = fit_within(texture.size_vec2(), max);
        ui.add(egui::Image::from_texture(SizedTexture::new(texture.id(), size)));
    }

    fn welcome(&mut self, ctx: &egui::Context) {
        egui::Window::new("Welcome")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label("Upload a photo to cut out its subject, then drop it onto a new background.");
                ui.add_space(8.0);
                if ui.button("Get started").clicked() {
                    self.show_welcome = false;
                }
            });
    }

    fn notice(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.session.notice().cloned() else {
            return;
        };
        let title = if notice.is_error() { "Error" } else { "Done" };
        egui::Window::new(title)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(notice.message());
                if ui.button("OK").clicked() {
                    self.session.dismiss_notice();
                }
            });
    }

    fn top_bar(&mut self, ctx: &egui::Context, view: &ViewState) {
        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Upload image").clicked() {
                    if let Some(path) = Self::pick_image("Choose a photo") {
                        match self.session.on_upload_file(&path) {
                            Ok(job) => self.dispatch(Some(job)),
                            Err(err) => warn!("{err}"),
                        }
                    }
                }
                if ui.button("Download").clicked() {
                    let dir = self.output_dir.clone();
                    match self.session.on_download(&dir) {
                        Ok(job) => self.dispatch(Some(job)),
                        Err(err) => warn!("{err}"),
                    }
                }
                if view.processing {
                    ui.add(egui::Spinner::new());
                }
                ui.separator();
                ui.label(&self.status);
            });

            if !self.samples.is_empty() {
                ui.horizontal(|ui| {
                    ui.label("Samples:");
                    for sample in self.samples.clone() {
                        let source = ImageSource::Path(sample.thumbnail.clone());
                        let Some(texture) = self.thumb_texture(ctx, &source) else {
                            continue;
                        };
                        let (size, _) = fit_within(texture.size_vec2(), egui::vec2(THUMB_SIZE, THUMB_SIZE));
                        let button = egui::Button::image(egui::Image::from_texture(SizedTexture::new(
                            texture.id(),
                            size,
                        )));
                        if ui.add(button).on_hover_text(&sample.name).clicked() {
                            self.session.on_sample_selected(&sample);
                        }
                    }
                });
            }
        });
    }

    fn background_controls(&mut self, ctx: &egui::Context, view: &ViewState) {
        egui::SidePanel::right("background-controls")
            .min_width(260.0)
            .show(ctx, |ui| {
                ui.heading("Background");
                ui.horizontal(|ui| {
                    if ui.add_enabled(view.buttons.undo, egui::Button::new("Undo")).clicked() {
                        let job = self.session.on_undo();
                        self.dispatch(job);
                    }
                    if ui.add_enabled(view.buttons.redo, egui::Button::new("Redo")).clicked() {
                        let job = self.session.on_redo();
                        self.dispatch(job);
                    }
                    if ui.add_enabled(view.buttons.reset, egui::Button::new("Reset")).clicked() {
                        let job = self.session.on_reset();
                        self.dispatch(job);
                    }
                });
                ui.separator();

                ui.horizontal(|ui| {
                    ui.selectable_value(&mut self.tab, BackgroundTab::Images, "Images");
                    ui.selectable_value(&mut self.tab, BackgroundTab::Colors, "Colors");
                });

                match self.tab {
                    BackgroundTab::Images => self.image_choices(ui),
                    BackgroundTab::Colors => self.color_choices(ui),
                }
            });
    }

    fn image_choices(&mut self, ui: &mut egui::Ui) {
        if ui.button("Upload background").clicked() {
            if let Some(path) = Self::pick_image("Choose a background") {
                let job = self.session.on_upload_background_file(&path);
                self.dispatch_result(job);
            }
        }
        let ctx = ui.ctx().clone();
        ui.horizontal_wrapped(|ui| {
            for preset in self.presets.clone() {
                let Some(texture) = self.thumb_texture(&ctx, &preset) else {
                    continue;
                };
                let background = Background::Image(preset.clone());
                let selected = self.session.selected() == Some(&background);
                let (size, _) = fit_within(texture.size_vec2(), egui::vec2(THUMB_SIZE, THUMB_SIZE));
                let button = egui::Button::image(egui::Image::from_texture(SizedTexture::new(
                    texture.id(),
                    size,
                )))
                .selected(selected);
                if ui.add(button).clicked() {
                    let job = self.session.on_set_background(background);
                    self.dispatch_result(job);
                }
            }
        });
    }

    fn color_choices(&mut self, ui: &mut egui::Ui) {
        ui.horizontal_wrapped(|ui| {
            for color in self.palette.clone() {
                let [r, g, b, a] = color.rgba().0;
                let background = Background::Color(color.clone());
                let selected = self.session.selected() == Some(&background);
                let button = egui::Button::new("")
                    .fill(Color32::from_rgba_unmultiplied(r, g, b, a))
                    .min_size(egui::vec2(SWATCH_SIZE, SWATCH_SIZE))
                    .selected(selected);
                if ui.add(button).on_hover_text(color.spec()).clicked() {
                    let job = self.session.on_set_background(background);
                    self.dispatch_result(job);
                }
            }
        });
    }

    fn history_strip(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("history").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("History");
                if ui.button("Clear history").clicked() {
                    self.session.on_clear_history();
                }
            });
            let entries = self.session.history().entries().to_vec();
            let mut restore = None;
            egui::ScrollArea::horizontal().show(ui, |ui| {
                ui.horizontal(|ui| {
                    for (index, entry) in entries.iter().enumerate() {
                        let Some(texture) = self.history_texture(ctx, entry) else {
                            continue;
                        };
                        let (size, _) =
                            fit_within(texture.size_vec2(), egui::vec2(THUMB_SIZE, THUMB_SIZE));
                        let button = egui::Button::image(egui::Image::from_texture(
                            SizedTexture::new(texture.id(), size),
                        ));
                        if ui.add(button).on_hover_text(HistoryEntry::RESTORE_HINT).clicked() {
                            restore = Some(index);
                        }
                    }
                });
            });
            if let Some(index) = restore {
                self.session.on_restore_history(index);
            }
        });
    }

    fn workspace(&mut self, ctx: &egui::Context, view: &ViewState) {
        egui::CentralPanel::default().show(ctx, |ui| {
            if !view.preview_visible {
                ui.centered_and_justified(|ui| {
                    ui.heading("Upload an image or pick a sample to begin");
                });
                return;
            }
            let pane = egui::vec2(
                (ui.available_width() / 2.0 - 12.0).max(64.0),
                (ui.available_height() - 24.0).max(64.0),
            );
            ui.horizontal_top(|ui| {
                ui.vertical(|ui| {
                    ui.label("Original");
                    let preview = self.session.preview().cloned();
                    if let Some(texture) = preview.and_then(|source| self.source_texture(ctx, &source)) {
                        Self::show_image(ui, &texture, pane);
                    }
                });
                ui.separator();
                ui.vertical(|ui| {
                    ui.label("Result");
                    if !view.processed_visible {
                        if view.processing {
                            ui.add(egui::Spinner::new());
                        }
                        return;
                    }
                    let result = self.session.result().cloned();
                    if let Some(texture) = result.and_then(|source| self.source_texture(ctx, &source)) {
                        Self::show_image(ui, &texture, pane);
                    }
                });
            });
        });
    }
}

impl App for CutoutApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut Frame) {
        let _ = frame;

        self.pump();
        self.textures.begin_frame();

        let view = ViewState::from_session(&self.session);
        self.top_bar(ctx, &view);
        if view.history_visible {
            self.history_strip(ctx);
        }
        if view.controls_visible {
            self.background_controls(ctx, &view);
        }
        self.workspace(ctx, &view);

        if self.show_welcome {
            self.welcome(ctx);
        }
        self.notice(ctx);

        self.textures.end_frame();

        if self.pipeline.in_flight > 0 {
            ctx.request_repaint_after(Duration::from_millis(50));
        }
        if let Some(wait) = self.session.next_timer(Instant::now()) {
            ctx.request_repaint_after(wait);
        }
    }
}
