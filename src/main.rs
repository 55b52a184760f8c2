use std::fs::File;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use serde::Serialize;
use simplelog::{Config, LevelFilter, WriteLogger};

use labelsheet::export::{DEFAULT_PREFIX, DocumentExporter};
use labelsheet::layout::{LayoutConfig, Orientation, SlotRect, compute_layout};
use labelsheet::render::{PreviewSink, base_fit_factor};
use labelsheet::zoom::{Zoom, scale_from_slider_percent};
use labelsheet::{FileImageLoader, ImageItem, panic_handler, render, render_pdf, settings};

#[derive(Parser, Debug)]
#[command(name = "labelsheet", version, about = "Print repeated image labels on an A4 sheet")]
struct Cli {
    /// Settings file to use instead of the per-user config.yaml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "labelsheet.log")]
    log_file: PathBuf,

    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Command,
}

/// Overrides for the saved layout; anything given here is saved back
#[derive(Args, Debug, Clone, Default)]
struct LayoutArgs {
    #[arg(long)]
    rows: Option<u32>,
    #[arg(long)]
    cols: Option<u32>,
    /// Margin on all four sides, in mm
    #[arg(long)]
    margin: Option<f64>,
    /// Gap between labels, in mm
    #[arg(long)]
    spacing: Option<f64>,
    #[arg(long)]
    orientation: Option<Orientation>,
}

impl LayoutArgs {
    fn apply(&self, base: LayoutConfig) -> LayoutConfig {
        LayoutConfig {
            rows: self.rows.unwrap_or(base.rows),
            cols: self.cols.unwrap_or(base.cols),
            margin_mm: self.margin.unwrap_or(base.margin_mm),
            spacing_mm: self.spacing.unwrap_or(base.spacing_mm),
            orientation: self.orientation.unwrap_or(base.orientation),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the slot geometry for the current layout
    Layout {
        #[command(flatten)]
        layout: LayoutArgs,
        #[arg(long)]
        json: bool,
    },
    /// Render images onto a sheet and save it as PDF
    Generate {
        images: Vec<PathBuf>,
        #[command(flatten)]
        layout: LayoutArgs,
        /// Copies per image, e.g. 3,3,4 (default: split the sheet evenly)
        #[arg(long, value_delimiter = ',')]
        counts: Vec<u32>,
        #[arg(long, default_value = ".")]
        out: PathBuf,
        #[arg(long, default_value = DEFAULT_PREFIX)]
        prefix: String,
    },
    /// Render a PNG preview of the sheet
    Preview {
        images: Vec<PathBuf>,
        #[command(flatten)]
        layout: LayoutArgs,
        #[arg(long, value_delimiter = ',')]
        counts: Vec<u32>,
        /// Zoom factor, 0.1 to 3.0
        #[arg(long)]
        zoom: Option<f64>,
        /// Zoom slider position, 0.0 to 1.0
        #[arg(long, conflicts_with = "zoom")]
        slider: Option<f64>,
        /// Zoom steps from the saved zoom; negative steps zoom out
        #[arg(long, allow_negative_numbers = true, conflicts_with_all = ["zoom", "slider"])]
        steps: Option<i32>,
        /// Viewport the sheet is fitted into, WIDTHxHEIGHT in pixels
        #[arg(long, default_value = "1280x800")]
        viewport: Viewport,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Debug, Clone, Copy)]
struct Viewport {
    width: f64,
    height: f64,
}

impl FromStr for Viewport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let width = w.trim().parse().map_err(|e| format!("bad width '{w}': {e}"))?;
        let height = h.trim().parse().map_err(|e| format!("bad height '{h}': {e}"))?;
        Ok(Self { width, height })
    }
}

#[derive(Serialize)]
struct LayoutReport {
    config: LayoutConfig,
    sheet_width_mm: f64,
    sheet_height_mm: f64,
    slots: Vec<SlotRect>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    panic_handler::initialize_panic_handler();

    WriteLogger::init(
        cli.log_level,
        Config::default(),
        File::create(&cli.log_file)
            .with_context(|| format!("Cannot create log file {}", cli.log_file.display()))?,
    )?;
    info!("Starting labelsheet {}", env!("CARGO_PKG_VERSION"));

    if let Some(path) = &cli.config {
        settings::use_config_path(path);
    }
    settings::load_settings();

    let result = run(cli.command);
    if let Err(e) = &result {
        error!("{e:#}");
    }
    info!("Shutting down labelsheet");
    result
}

fn resolve_config(args: &LayoutArgs) -> LayoutConfig {
    let config = args.apply(settings::get_layout_config());
    settings::set_layout_config(config);
    config
}

fn build_items(images: Vec<PathBuf>, counts: &[u32], total_slots: usize) -> Result<Vec<ImageItem>> {
    let mut items = ImageItem::from_sources(images, total_slots);
    if counts.is_empty() {
        return Ok(items);
    }
    if counts.len() != items.len() {
        bail!(
            "--counts has {} value(s) but {} image(s) were given",
            counts.len(),
            items.len()
        );
    }
    let ids: Vec<_> = items.iter().map(|item| item.id).collect();
    for (id, &count) in ids.into_iter().zip(counts) {
        labelsheet::set_count(&mut items, id, count)?;
    }
    Ok(items)
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Layout { layout, json } => {
            let config = resolve_config(&layout);
            let computed = compute_layout(&config)?;
            if json {
                let report = LayoutReport {
                    config,
                    sheet_width_mm: computed.sheet.width_mm,
                    sheet_height_mm: computed.sheet.height_mm,
                    slots: computed.slots,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{}x{} on {} A4, slot {:.2} x {:.2} mm",
                    computed.rows,
                    computed.cols,
                    config.orientation.as_str(),
                    computed.slot_width(),
                    computed.slot_height()
                );
                for (i, slot) in computed.slots.iter().enumerate() {
                    println!(
                        "{:>4}  x {:>7.2}  y {:>7.2}  w {:>7.2}  h {:>7.2}",
                        i + 1,
                        slot.x,
                        slot.y,
                        slot.width,
                        slot.height
                    );
                }
            }
            Ok(())
        }
        Command::Generate {
            images,
            layout,
            counts,
            out,
            prefix,
        } => {
            let config = resolve_config(&layout);
            let items = build_items(images, &counts, config.total_slots())?;
            let document = render_pdf(&config, &items, &FileImageLoader, &prefix)?;
            let path = DocumentExporter::save(&document, &out)?;
            println!(
                "{} ({} of {} labels filled)",
                path.display(),
                document.summary.placed,
                document.summary.slots
            );
            if document.summary.dropped_copies > 0 {
                println!(
                    "{} cop{} did not fit on the sheet",
                    document.summary.dropped_copies,
                    if document.summary.dropped_copies == 1 { "y" } else { "ies" }
                );
            }
            Ok(())
        }
        Command::Preview {
            images,
            layout,
            counts,
            zoom,
            slider,
            steps,
            viewport,
            out,
        } => {
            let config = resolve_config(&layout);
            let scale = match (zoom, slider, steps) {
                (Some(z), _, _) => Zoom::new(z).factor(),
                (None, Some(pct), _) => scale_from_slider_percent(pct),
                (None, None, Some(n)) => {
                    let mut zoom = Zoom::new(settings::get_zoom_scale());
                    zoom.step_by(n);
                    zoom.factor()
                }
                (None, None, None) => settings::get_zoom_scale(),
            };
            settings::set_zoom_scale(scale);

            let items = build_items(images, &counts, config.total_slots())?;
            let base_fit = base_fit_factor(viewport.width, viewport.height, config.orientation);
            let mut sink = PreviewSink::new(base_fit, scale);
            let summary = render(&config, &items, &FileImageLoader, &mut sink)?;
            let image = sink
                .into_image()
                .context("Preview produced no page")?;
            image
                .save(&out)
                .with_context(|| format!("Failed to write preview {}", out.display()))?;
            println!(
                "{} ({}x{}px, zoom {}, {} of {} labels filled)",
                out.display(),
                image.width(),
                image.height(),
                Zoom::new(scale).percent_label(),
                summary.placed,
                summary.slots
            );
            Ok(())
        }
    }
}
