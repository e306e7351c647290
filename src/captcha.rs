//! CAPTCHA の検出・画像保存・手動解決待ち

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::engine::AutomationEngine;
use crate::error::ScraperError;
use crate::export::timestamped_filename;

const SOLVE_POLL_SECS: u64 = 2;

/// 表示されている最初のCAPTCHAセレクタを返す
pub async fn detect_captcha(
    engine: &AutomationEngine,
    selectors: &[String],
) -> Result<Option<String>, ScraperError> {
    for selector in selectors {
        if engine.is_visible(selector).await? {
            warn!("CAPTCHA detected: {}", selector);
            return Ok(Some(selector.clone()));
        }
    }
    Ok(None)
}

/// CAPTCHA画像を `captcha_YYYYMMDD_HHMMSS.png` として保存
pub async fn capture_captcha(
    engine: &AutomationEngine,
    selector: &str,
    dir: &Path,
) -> Result<PathBuf, ScraperError> {
    let path = dir.join(timestamped_filename(
        "captcha",
        "png",
        Local::now().naive_local(),
    ));
    let path = engine.element_screenshot(selector, &path).await?;
    info!("CAPTCHA image saved: {:?}", path);
    Ok(path)
}

/// 人間がブラウザ上でCAPTCHAを解くのを待つ（要素が消えるか非表示になれば解決とみなす）
pub async fn wait_for_manual_solve(
    engine: &AutomationEngine,
    selector: &str,
    timeout: Duration,
) -> Result<(), ScraperError> {
    info!(
        "Waiting up to {}s for the CAPTCHA to be solved in the browser window...",
        timeout.as_secs()
    );
    let start = std::time::Instant::now();

    while start.elapsed() < timeout {
        if !engine.is_visible(selector).await.unwrap_or(true) {
            info!("CAPTCHA solved after {:?}", start.elapsed());
            return Ok(());
        }
        sleep(Duration::from_secs(SOLVE_POLL_SECS)).await;
    }

    Err(ScraperError::Captcha(format!(
        "{}秒以内に解決されませんでした",
        timeout.as_secs()
    )))
}

/// CAPTCHAがあれば画像を保存し、表示モードなら手動解決を待つ
///
/// ヘッドレスでは人が解けないため、画像保存後に `Captcha` エラーを返す。
pub async fn handle_captcha(
    engine: &AutomationEngine,
    selectors: &[String],
    timeout: Duration,
) -> Result<Option<PathBuf>, ScraperError> {
    let Some(selector) = detect_captcha(engine, selectors).await? else {
        return Ok(None);
    };

    let image = capture_captcha(engine, &selector, &engine.config().debug_path).await?;
    if engine.config().headless {
        return Err(ScraperError::Captcha(format!(
            "ヘッドレスモードでは解決できません。画像: {}",
            image.display()
        )));
    }

    wait_for_manual_solve(engine, &selector, timeout).await?;
    Ok(Some(image))
}
