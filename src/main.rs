use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};
use clap::Parser;
use eframe::egui;

use cutout::app::{AppConfig, CutoutApp};
use cutout::color::{Color, DEFAULT_PALETTE};
use cutout::removal::DEFAULT_ENDPOINT;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Remove photo backgrounds and composite the cutout over new ones"
)]
struct Args {
    /// Photo to send for background removal on startup
    #[arg(value_name = "IMAGE")]
    image: Option<PathBuf>,

    /// Background removal endpoint (multipart POST, field `image`)
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Timeout for background removal requests, in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Directory of sample photos paired with `<name>-result.<ext>` cutouts
    #[arg(short, long)]
    samples: Option<PathBuf>,

    /// Directory of preset background images
    #[arg(short, long)]
    backgrounds: Option<PathBuf>,

    /// Recurse into subdirectories of the sample and background directories
    #[arg(short = 'r', long = "recursive", default_value_t = false)]
    recursive: bool,

    /// Background color swatch (CSS notation); repeat for several
    #[arg(short, long = "color")]
    colors: Vec<String>,

    /// Simulated processing time when a sample is selected, in milliseconds
    #[arg(long, default_value_t = 3000)]
    sample_delay_ms: u64,

    /// Directory downloads are written to
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Number of background worker threads
    #[arg(short = 'j', long = "parallel", default_value_t = 4)]
    parallel: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let specs: Vec<&str> = if args.colors.is_empty() {
        DEFAULT_PALETTE.to_vec()
    } else {
        args.colors.iter().map(String::as_str).collect()
    };
    let palette = specs
        .into_iter()
        .map(|spec| {
            spec.parse::<Color>()
                .map_err(|err| anyhow!("--color {spec}: {err}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let config = AppConfig {
        endpoint: args.endpoint,
        timeout: Duration::from_secs(args.timeout_secs),
        samples_dir: args.samples,
        backgrounds_dir: args.backgrounds,
        recursive: args.recursive,
        palette,
        sample_delay: Duration::from_millis(args.sample_delay_ms),
        output_dir: args.output,
        parallel: args.parallel,
        initial_image: args.image,
    };
    let app = CutoutApp::new(config)?;

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Cutout Studio")
            .with_inner_size([1200.0, 800.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Cutout Studio",
        native_options,
        Box::new(move |_cc| Ok(Box::new(app))),
    )
    .map_err(|err| anyhow!("{err}"))?;

    Ok(())
}
