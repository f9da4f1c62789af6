use std::path::{Path, PathBuf};

use annomask_rs::{
    apply_segmentation_mask_constraints, mask_to_data_url, paint_stroke, rle, AnnotationUpdate,
    AnnotationUpdater, BoundingBox, BoxError, BrushMode, EditorParams, MaskColor, MaskEdit,
    PixelMask, Point, Rle, Sample, SegmentationMode,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use image::GrayImage;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "annomask")]
#[command(about = "Inspect segmentation masks and replay mask edits against their annotations")]
struct Cli {
    /// Path to an editor parameters JSON file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode a mask image (non-zero = foreground) as RLE
    Encode {
        /// Path to a mask image
        #[arg(long)]
        mask: PathBuf,
    },
    /// Decode an RLE into a mask image or data URL
    Decode {
        /// RLE as a JSON array, e.g. "[3,5,2,1]"
        #[arg(long)]
        rle: String,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        /// Output PNG path; prints a data URL when omitted
        #[arg(long)]
        out: Option<PathBuf>,
        /// Fill color for the data URL as r,g,b,a
        #[arg(long, value_delimiter = ',')]
        color: Option<Vec<u8>>,
    },
    /// Print the bounding box of an RLE
    Bbox {
        #[arg(long)]
        rle: String,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
    },
    /// Paint a brush stroke through the given points and print its RLE
    Stroke {
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        /// Points as x,y pairs separated by ';', e.g. "0,0;3,4"
        #[arg(long)]
        points: String,
        /// Erase instead of paint, starting from a full mask
        #[arg(long)]
        erase: bool,
    },
    /// Apply lock and overlap constraints to a recorded mask edit
    Constrain {
        /// Path to a mask edit JSON file
        #[arg(long)]
        edit: PathBuf,
        /// Override the segmentation mode: instance or semantic
        #[arg(long)]
        mode: Option<String>,
    },
}

/// Prints each update batch as JSON instead of persisting it.
struct PrintingUpdater;

#[async_trait]
impl AnnotationUpdater for PrintingUpdater {
    async fn update_annotations(&self, updates: Vec<AnnotationUpdate>) -> Result<(), BoxError> {
        info!(count = updates.len(), "Update batch");
        println!("{}", serde_json::to_string(&updates)?);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct EncodedMask {
    width: u32,
    height: u32,
    area: u64,
    rle: Rle,
    bounding_box: Option<BoundingBox>,
}

#[derive(Debug, Serialize)]
struct ConstrainReport {
    segmentation_mode: SegmentationMode,
    locked_pixels_removed: usize,
    mask: Rle,
    bounding_box: Option<BoundingBox>,
    updated_annotations: usize,
}

fn parse_rle(s: &str) -> Result<Rle> {
    serde_json::from_str(s).with_context(|| format!("invalid RLE '{s}'"))
}

fn parse_points(s: &str) -> Result<Vec<Point>> {
    s.split(';')
        .filter(|p| !p.trim().is_empty())
        .map(|pair| {
            let (x, y) = pair
                .split_once(',')
                .with_context(|| format!("point '{pair}' is not x,y"))?;
            Ok(Point::new(x.trim().parse()?, y.trim().parse()?))
        })
        .collect()
}

fn parse_mode(s: &str) -> Result<SegmentationMode> {
    match s {
        "instance" => Ok(SegmentationMode::Instance),
        "semantic" => Ok(SegmentationMode::Semantic),
        other => bail!("Unknown segmentation mode: '{other}'. Use instance or semantic."),
    }
}

/// `--color` values, or the configured color when none were given.
fn resolve_color(values: Option<&[u8]>, configured: MaskColor) -> Result<MaskColor> {
    match values {
        Some(&[r, g, b, a]) => Ok(MaskColor::new(r, g, b, a)),
        Some(_) => bail!("--color needs exactly four values r,g,b,a"),
        None => Ok(configured),
    }
}

fn encode_mask(path: &Path) -> Result<EncodedMask> {
    let img = image::open(path)
        .with_context(|| format!("failed to open {path:?}"))?
        .to_luma8();
    let (width, height) = img.dimensions();
    let mask = PixelMask::from_vec(width, height, img.into_raw())?;
    let rle = mask.to_rle();
    Ok(EncodedMask {
        width,
        height,
        area: rle::area(&rle),
        bounding_box: mask.bounding_box(),
        rle,
    })
}

/// 0/255 grayscale rendering of a mask.
fn mask_image(mask: PixelMask) -> Result<GrayImage> {
    let (width, height) = (mask.width(), mask.height());
    let pixels = mask.into_vec().into_iter().map(|v| v * 255).collect();
    GrayImage::from_raw(width, height, pixels).context("mask does not fill the image")
}

/// Bounding box of an RLE that must cover exactly `width * height` pixels.
fn rle_bounding_box(rle: &Rle, width: u32, height: u32) -> Result<Option<BoundingBox>> {
    if !rle.is_well_formed(width, height) {
        bail!(
            "RLE covers {} pixels, expected {}",
            rle.total_len(),
            u64::from(width) * u64::from(height)
        );
    }
    Ok(rle::to_bbox(rle, width))
}

/// Paint `points` onto a blank mask, or erase them from a full one.
fn stroke_mask(
    sample: &Sample,
    points: &[Point],
    erase: bool,
    params: &EditorParams,
) -> Result<PixelMask> {
    let (mut mask, mode) = if erase {
        let full = vec![1u8; sample.pixel_count()];
        (
            PixelMask::from_vec(sample.width, sample.height, full)?,
            BrushMode::Erase,
        )
    } else {
        (PixelMask::for_sample(sample), BrushMode::Paint)
    };
    let changed = paint_stroke(
        &mut mask,
        points,
        params.brush_radius,
        mode,
        params.interpolation_spacing,
    );
    info!(changed, "Stroke applied");
    Ok(mask)
}

/// Run both constraint stages on `edit`. `--mode` wins over the mode recorded
/// in the edit, which wins over the configured one.
async fn constrain_edit(
    mut edit: MaskEdit,
    mode: Option<SegmentationMode>,
    params: &EditorParams,
    updater: &dyn AnnotationUpdater,
) -> Result<ConstrainReport> {
    if mode.is_some() {
        edit.segmentation_mode = mode;
    }
    let scene = edit.scene(params);
    let mut working = edit.working_mask()?;

    info!(
        annotations = edit.annotations.len(),
        locked = edit.locked_annotation_ids.len(),
        mode = ?scene.segmentation_mode,
        "Applying constraints"
    );
    let outcome = apply_segmentation_mask_constraints(
        &mut working,
        &scene,
        edit.edited_annotation_id,
        updater,
    )
    .await?;

    Ok(ConstrainReport {
        segmentation_mode: scene.segmentation_mode,
        locked_pixels_removed: outcome.locked_pixels_removed,
        bounding_box: working.bounding_box(),
        mask: working.to_rle(),
        updated_annotations: outcome.updates.len(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let params = match &cli.config {
        Some(path) => EditorParams::load(path)
            .with_context(|| format!("failed to load parameters from {path:?}"))?,
        None => EditorParams::default(),
    };

    match cli.command {
        Command::Encode { mask } => {
            println!("{}", serde_json::to_string(&encode_mask(&mask)?)?);
        }
        Command::Decode {
            rle,
            width,
            height,
            out,
            color,
        } => {
            let mask = PixelMask::from_rle(&parse_rle(&rle)?, width, height)?;
            match out {
                Some(path) => {
                    mask_image(mask)?
                        .save(&path)
                        .with_context(|| format!("failed to write {path:?}"))?;
                    info!(path = %path.display(), "Wrote mask");
                }
                None => {
                    let color = resolve_color(color.as_deref(), params.mask_color)?;
                    println!(
                        "{}",
                        mask_to_data_url(mask.as_slice(), width, height, color)?
                    );
                }
            }
        }
        Command::Bbox { rle, width, height } => {
            let bbox = rle_bounding_box(&parse_rle(&rle)?, width, height)?;
            println!("{}", serde_json::to_string(&bbox)?);
        }
        Command::Stroke {
            width,
            height,
            points,
            erase,
        } => {
            let mask = stroke_mask(
                &Sample::new(width, height),
                &parse_points(&points)?,
                erase,
                &params,
            )?;
            println!("{}", serde_json::to_string(&mask.to_rle())?);
        }
        Command::Constrain { edit, mode } => {
            let edit =
                MaskEdit::load(&edit).with_context(|| format!("failed to load {edit:?}"))?;
            let mode = mode.as_deref().map(parse_mode).transpose()?;
            let report = constrain_edit(edit, mode, &params, &PrintingUpdater).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
