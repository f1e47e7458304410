use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use image::RgbaImage;
use imaging_viewer::{
    HttpBackend, ImagingError, MultiPlaneViewer, Plane, Result, Study, StudyId, ToolChange,
    ViewerConfig, ViewportStatus, VolumePanel, VolumeRayCaster, raycast,
};
use log::{info, warn};
use web_time::SystemTime;

/// Polls until every panel settles, at most this many debounce windows.
const MAX_WAIT_ROUNDS: u32 = 600;

#[derive(Parser)]
#[command(name = "imaging-viewer")]
#[command(author, version, about = "Fetch the middle slices and a volume rendering of a study")]
struct Cli {
    /// Existing study id on the backend
    #[arg(long, conflicts_with = "upload", required_unless_present = "upload")]
    study: Option<u64>,

    /// Medical image file to upload first
    #[arg(long)]
    upload: Option<PathBuf>,

    /// JSON config file; defaults plus IMAGING_* environment variables otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory for the PNGs
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Volume rendering size in pixels
    #[arg(long, default_value = "512")]
    size: u32,

    /// Window center, backend default if omitted
    #[arg(long)]
    window_center: Option<f32>,

    /// Window width, backend default if omitted
    #[arg(long)]
    window_width: Option<f32>,

    /// Slice filter: original, sharpen, smooth, noise_reduction
    #[arg(long)]
    filter: Option<String>,

    /// Render the volume on the CPU even when a GPU is available
    #[arg(long)]
    cpu: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_secs()
        .try_init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ViewerConfig::from_json_file(path)?,
        None => ViewerConfig::from_env()?,
    };
    let backend = Arc::new(HttpBackend::new(&config)?);
    let mut viewer = MultiPlaneViewer::new(backend, &config);

    let study = match (&cli.upload, cli.study) {
        (Some(path), _) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            viewer.upload(&name, std::fs::read(path)?).await?
        }
        (None, Some(id)) => {
            let study = viewer.studies_mut().add(Study {
                id: StudyId(id),
                name: format!("study {id}"),
                date: SystemTime::now(),
                path: None,
            });
            study.id
        }
        (None, None) => {
            return Err(ImagingError::InvalidRequest(
                "either --study or --upload is required".into(),
            ));
        }
    };

    if let Some(center) = cli.window_center {
        viewer.set_tool(ToolChange::WindowCenter(center))?;
    }
    if let Some(width) = cli.window_width {
        viewer.set_tool(ToolChange::WindowWidth(width))?;
    }
    if let Some(filter) = &cli.filter {
        viewer.set_tool_named("filter", filter)?;
    }

    viewer.select_study(study)?;
    settle_slices(&mut viewer, &config).await;

    // First responses only report slice counts; move every plane to its middle
    for plane in Plane::ALL {
        if let Some(total) = viewer.viewport(plane).total_slices() {
            viewer.set_slice(plane, total / 2)?;
        }
    }
    settle_slices(&mut viewer, &config).await;

    std::fs::create_dir_all(&cli.out)?;
    for plane in Plane::ALL {
        let frame = viewer.viewport_frame(plane);
        match (&frame.status, &frame.image) {
            (ViewportStatus::Ready, Some(image)) => {
                let path = cli.out.join(format!("{}.png", plane.as_str()));
                image.image.save(&path)?;
                info!(
                    "{} {} saved to {}",
                    frame.label,
                    frame.slice_label().unwrap_or_default(),
                    path.display()
                );
            }
            (ViewportStatus::Failed(message), _) => warn!("{}: {message}", frame.label),
            (status, _) => warn!("{}: gave up while {status:?}", frame.label),
        }
    }

    let volume = wait_for_volume(&viewer, &config).await?;
    let rendering = if cli.cpu {
        render_on_cpu(&viewer, &volume, cli.size)?
    } else {
        match VolumeRayCaster::headless().await {
            Ok(mut caster) => {
                caster.sync(Some(&volume));
                caster
                    .render_to_image(&viewer.camera, &viewer.render_settings, cli.size, cli.size)
                    .await?
            }
            Err(err) => {
                warn!("no GPU available ({err}), rendering on the CPU");
                render_on_cpu(&viewer, &volume, cli.size)?
            }
        }
    };
    save_rendering(&rendering, &cli.out.join("volume.png"))
}

async fn settle_slices(viewer: &mut MultiPlaneViewer<HttpBackend>, config: &ViewerConfig) {
    for _ in 0..MAX_WAIT_ROUNDS {
        tokio::time::sleep(config.debounce()).await;
        viewer.poll_events();
        let settled = Plane::ALL.into_iter().all(|plane| {
            matches!(
                viewer.viewport(plane).status(),
                ViewportStatus::Ready | ViewportStatus::Failed(_)
            )
        });
        if settled {
            return;
        }
    }
}

async fn wait_for_volume(
    viewer: &MultiPlaneViewer<HttpBackend>,
    config: &ViewerConfig,
) -> Result<Arc<imaging_viewer::VolumeBuffer>> {
    for _ in 0..MAX_WAIT_ROUNDS {
        match viewer.volume_panel() {
            VolumePanel::Ready(volume) => return Ok(volume),
            VolumePanel::Failed(message) => return Err(ImagingError::Backend(message)),
            VolumePanel::Placeholder | VolumePanel::Loading => {
                tokio::time::sleep(config.debounce()).await;
            }
        }
    }
    Err(ImagingError::Backend("timed out waiting for the volume".into()))
}

fn render_on_cpu(
    viewer: &MultiPlaneViewer<HttpBackend>,
    volume: &imaging_viewer::VolumeBuffer,
    size: u32,
) -> Result<RgbaImage> {
    raycast::render_cpu(
        volume,
        &viewer.camera,
        &glam::Mat4::IDENTITY,
        &viewer.render_settings,
        size,
        size,
    )
}

fn save_rendering(image: &RgbaImage, path: &Path) -> Result<()> {
    image.save(path)?;
    info!("volume rendering saved to {}", path.display());
    Ok(())
}
