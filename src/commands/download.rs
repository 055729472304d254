use super::AppContext;
use crate::apk_list::ApkListView;
use crate::download::{DownloadOutcome, DownloadPipeline, Platform, ReqwestFetcher};
use std::time::Duration;

/// `--url` is used as is; `--id` is looked up in the catalog. With neither,
/// the first listed APK is taken.
pub async fn download(
    ctx: &AppContext,
    url: Option<String>,
    id: Option<String>,
    platform: Option<Platform>,
) -> Result<(), String> {
    let platform = platform.unwrap_or_else(|| ctx.config.platform());
    let pipeline = DownloadPipeline::new(
        ReqwestFetcher::new(Duration::from_secs(ctx.config.http_timeout_secs)),
        platform,
        ctx.config.external_storage_root(),
        ctx.config.download_path.clone(),
    );

    let view = ApkListView::activate(&ctx.service)
        .await
        .map_err(|e| e.to_string())?;

    let apk_url = match (url, id) {
        (Some(url), _) => url,
        (None, Some(id)) => ctx
            .service
            .apk_by_id(&id)
            .await
            .map_err(|e| e.to_string())?
            .map(|apk| apk.apk_url)
            .ok_or_else(|| format!("APK {} not found", id))?,
        (None, None) => view.first_apk_url().ok_or("No APKs found")?,
    };
    let apk_url = resolve_url(ctx, &apk_url).await?;

    let outcome = view
        .download_apk(&pipeline, &apk_url)
        .await
        .map_err(|e| e.to_string());
    view.deactivate();

    match outcome? {
        DownloadOutcome::Saved { path, bytes } => {
            println!("Saved {} bytes to {}", bytes, path.display());
        }
        DownloadOutcome::Skipped { platform, .. } => {
            println!("Fetched; {} keeps no local copy", platform);
        }
    }
    Ok(())
}

/// Stored `apkUrl` values may be blob-store object paths rather than URLs.
async fn resolve_url(ctx: &AppContext, apk_url: &str) -> Result<String, String> {
    if apk_url.starts_with("http://") || apk_url.starts_with("https://") {
        return Ok(apk_url.to_string());
    }
    ctx.service
        .apk_download_url(apk_url)
        .await
        .map_err(|e| e.to_string())
}
