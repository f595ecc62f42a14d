use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate};
use ntvision_core::{Backend, Dashboard, ToastLevel};
use tracing::{error, info};

pub(crate) fn export_file_name(day: NaiveDate) -> String {
    format!("ntvision_detections_{}.csv", day.format("%Y-%m-%d"))
}

/// Last non-empty segment of a backend image path. Dot segments and
/// names with backslashes never resolve to a file inside the output dir.
pub(crate) fn image_file_name(image_path: &str) -> Option<&str> {
    let name = image_path.rsplit('/').find(|segment| !segment.is_empty())?;
    (name != "." && name != ".." && !name.contains('\\')).then_some(name)
}

pub(crate) fn save_export(out_dir: &Path, body: &[u8], day: NaiveDate) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let path = out_dir.join(export_file_name(day));
    fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

pub(crate) fn save_image(out_dir: &Path, image_path: &str, body: &[u8]) -> Result<PathBuf> {
    let name = image_file_name(image_path)
        .ok_or_else(|| anyhow!("image path {image_path:?} has no file name"))?;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let path = out_dir.join(name);
    fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Fetches the CSV export and saves it under today's date stamp.
pub async fn export_detections<B: Backend + 'static>(
    dashboard: &Dashboard<B>,
    out_dir: &Path,
) -> Result<PathBuf> {
    let body = dashboard.export_csv().await?;
    match save_export(out_dir, &body, Local::now().date_naive()) {
        Ok(path) => {
            info!(path = %path.display(), bytes = body.len(), "export saved");
            dashboard
                .notifier()
                .notify(ToastLevel::Success, "Data exported successfully");
            Ok(path)
        }
        Err(err) => {
            error!(error = %err, "export could not be saved");
            dashboard
                .notifier()
                .notify(ToastLevel::Error, "Error exporting data");
            Err(err)
        }
    }
}

pub async fn download_image<B: Backend + 'static>(
    dashboard: &Dashboard<B>,
    image_path: &str,
    out_dir: &Path,
) -> Result<PathBuf> {
    let body = dashboard.download_image(image_path).await?;
    let path = save_image(out_dir, image_path, &body)?;
    info!(path = %path.display(), "image saved");
    Ok(path)
}
