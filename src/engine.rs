//! ブラウザ操作の薄いラッパー
//!
//! 1つのブラウザ・1つのページを保持し、navigate / fill / click / screenshot /
//! extract_table / download を chromiumoxide にそのまま委譲する。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use chrono::Local;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::cookies::{CookieJar, StoredCookie};
use crate::error::ScraperError;
use crate::export::timestamped_filename;
use crate::table::Dataset;

const POLL_INTERVAL_MS: u64 = 500;

/// `extract_table` がページから受け取るセル一覧
#[derive(Debug, Deserialize)]
struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

pub struct AutomationEngine {
    config: ScraperConfig,
    browser: Option<Browser>,
    page: Arc<Page>,
    download_dir: PathBuf,
}

impl AutomationEngine {
    /// ブラウザを起動して空ページを開く
    pub async fn launch(config: &ScraperConfig) -> Result<Self, ScraperError> {
        info!("Launching browser (headless={})...", config.headless);

        std::fs::create_dir_all(&config.output_path)?;
        let download_dir = config
            .output_path
            .canonicalize()
            .unwrap_or_else(|_| config.output_path.clone());

        // ユニークなユーザーデータディレクトリを生成
        let unique_id = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("portal-scraper-{}", unique_id));

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&user_data_dir)
            .window_size(1280, 900)
            .request_timeout(config.timeout)
            .no_sandbox()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--lang=ko-KR");

        if let Some(chrome_path) = &config.chrome_path {
            builder = builder.chrome_executable(chrome_path);
        }
        if !config.headless {
            builder = builder.with_head();
        }
        if config.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        let browser_config = builder
            .build()
            .map_err(|e| ScraperError::BrowserInit(format!("ブラウザ設定エラー: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        // ブラウザイベントハンドラをバックグラウンドで実行
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        let download_params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(download_dir.to_string_lossy().to_string())
            .events_enabled(true)
            .build()
            .map_err(|e| ScraperError::BrowserInit(format!("ダウンロード設定エラー: {}", e)))?;
        page.execute(download_params)
            .await
            .map_err(|e| ScraperError::BrowserInit(format!("ダウンロード設定エラー: {}", e)))?;

        let page = Arc::new(page);
        Self::spawn_dialog_handler(page.clone()).await?;

        info!("Browser launched");
        Ok(Self {
            config: config.clone(),
            browser: Some(browser),
            page,
            download_dir,
        })
    }

    /// alert / confirm ダイアログを自動で承認する
    async fn spawn_dialog_handler(page: Arc<Page>) -> Result<(), ScraperError> {
        let mut dialogs = page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(dialog) = dialogs.next().await {
                info!("Dialog opened ({:?}): {}", dialog.r#type, dialog.message);
                if let Err(e) = page.execute(HandleJavaScriptDialogParams::new(true)).await {
                    debug!("Failed to accept dialog: {}", e);
                }
            }
        });
        Ok(())
    }

    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// URLへ移動し、遷移後のURLを返す
    pub async fn navigate(&self, url: &str) -> Result<String, ScraperError> {
        debug!("Navigating to {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| ScraperError::Navigation(format!("{}: {}", url, e)))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| ScraperError::Navigation(format!("{}: {}", url, e)))?;

        let current = self.current_url().await?;
        info!("Navigated: {}", current);
        Ok(current)
    }

    pub async fn current_url(&self) -> Result<String, ScraperError> {
        self.page
            .url()
            .await
            .map(|url| url.unwrap_or_default())
            .map_err(|e| ScraperError::Navigation(e.to_string()))
    }

    pub async fn content(&self) -> Result<String, ScraperError> {
        self.page
            .content()
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))
    }

    /// JavaScriptを実行して結果をデシリアライズ
    pub async fn evaluate<T: DeserializeOwned>(&self, script: &str) -> Result<T, ScraperError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;
        result
            .into_value::<T>()
            .map_err(|e| ScraperError::JavaScript(format!("結果の変換に失敗: {}", e)))
    }

    pub async fn exists(&self, selector: &str) -> Result<bool, ScraperError> {
        self.evaluate(&format!(
            "document.querySelector({}) !== null",
            js_string(selector)
        ))
        .await
    }

    /// セレクタに一致する要素のうち、実際に表示されているものがあるか
    pub async fn is_visible(&self, selector: &str) -> Result<bool, ScraperError> {
        self.evaluate(&format!(
            "Array.from(document.querySelectorAll({})).some({})",
            js_string(selector),
            IS_VISIBLE_JS
        ))
        .await
    }

    /// 入力欄にテキストを入力
    pub async fn fill(&self, selector: &str, text: &str) -> Result<(), ScraperError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("{}: {}", selector, e)))?;
        element
            .click()
            .await
            .map_err(|e| ScraperError::JavaScript(format!("{}: {}", selector, e)))?;
        // 既存の値をクリア
        self.evaluate::<bool>(&format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.value = ''; return true; }})()",
            js_string(selector)
        ))
        .await?;
        element
            .type_str(text)
            .await
            .map_err(|e| ScraperError::JavaScript(format!("{}: {}", selector, e)))?;
        Ok(())
    }

    /// `.value` を直接設定し input/change イベントを発火させる
    ///
    /// キー入力を受け付けないUIフレームワークの入力欄向け。
    pub async fn fill_js(&self, selector: &str, text: &str) -> Result<(), ScraperError> {
        let found: bool = self
            .evaluate(&format!(
                r#"
                (() => {{
                    const el = document.querySelector({});
                    if (!el) return false;
                    el.focus();
                    el.value = {};
                    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                    return true;
                }})()
                "#,
                js_string(selector),
                js_string(text)
            ))
            .await?;

        if !found {
            return Err(ScraperError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }

    pub async fn click(&self, selector: &str) -> Result<(), ScraperError> {
        self.page
            .find_element(selector)
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("{}: {}", selector, e)))?
            .click()
            .await
            .map_err(|e| ScraperError::JavaScript(format!("{}: {}", selector, e)))?;
        Ok(())
    }

    /// `tag` 要素のうちテキストに `text` を含む最初の要素をJavaScriptでクリック
    pub async fn click_text(&self, tag: &str, text: &str) -> Result<(), ScraperError> {
        let clicked: bool = self
            .evaluate(&format!(
                r#"
                (() => {{
                    const needle = {};
                    const items = document.querySelectorAll({});
                    for (const item of items) {{
                        if (item.textContent && item.textContent.trim().indexOf(needle) >= 0) {{
                            item.click();
                            return true;
                        }}
                    }}
                    return false;
                }})()
                "#,
                js_string(text),
                js_string(tag)
            ))
            .await?;

        if !clicked {
            return Err(ScraperError::ElementNotFound(format!("{} '{}'", tag, text)));
        }
        debug!("Clicked {} '{}'", tag, text);
        Ok(())
    }

    /// CDP経由でキーを押して離す
    pub async fn press_key(&self, key: &str) -> Result<(), ScraperError> {
        let key_code = match key {
            "Escape" => Some(27),
            "Enter" => Some(13),
            "Tab" => Some(9),
            _ => None,
        };

        for event_type in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let mut builder = DispatchKeyEventParams::builder()
                .r#type(event_type)
                .key(key)
                .code(key);
            if let Some(code) = key_code {
                builder = builder.windows_virtual_key_code(code);
            }
            let params = builder.build().map_err(ScraperError::JavaScript)?;
            self.page
                .execute(params)
                .await
                .map_err(|e| ScraperError::JavaScript(format!("キー入力 {}: {}", key, e)))?;
        }
        Ok(())
    }

    /// セレクタが現れるまで待機
    pub async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), ScraperError> {
        let start = std::time::Instant::now();
        loop {
            match self.exists(selector).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => debug!("Selector check error: {}", e),
            }

            if start.elapsed() > timeout {
                return Err(ScraperError::Timeout(format!(
                    "{} が{}秒以内に表示されませんでした",
                    selector,
                    timeout.as_secs()
                )));
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    /// URLが `from` から変わるまで待機し、新しいURLを返す
    pub async fn wait_for_url_change(
        &self,
        from: &str,
        timeout: Duration,
    ) -> Result<String, ScraperError> {
        let start = std::time::Instant::now();
        loop {
            let current = self.current_url().await.unwrap_or_default();
            if !current.is_empty() && current != from {
                return Ok(current);
            }

            if start.elapsed() > timeout {
                return Err(ScraperError::Timeout(format!(
                    "URLが{}秒以内に変化しませんでした: {}",
                    timeout.as_secs(),
                    from
                )));
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    /// ページ全体のスクリーンショットをPNGで保存
    pub async fn screenshot(&self, path: &Path) -> Result<PathBuf, ScraperError> {
        let png = self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| ScraperError::JavaScript(format!("スクリーンショット: {}", e)))?;
        write_file(path, &png)?;

        if self.config.debug {
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
            debug!("Screenshot: data:image/png;base64,{}", encoded);
        }
        Ok(path.to_path_buf())
    }

    /// 要素だけのスクリーンショットをPNGで保存
    pub async fn element_screenshot(
        &self,
        selector: &str,
        path: &Path,
    ) -> Result<PathBuf, ScraperError> {
        let png = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("{}: {}", selector, e)))?
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(|e| ScraperError::JavaScript(format!("スクリーンショット: {}", e)))?;
        write_file(path, &png)?;
        Ok(path.to_path_buf())
    }

    /// `<table>` の th / td テキストをデータセットとして取得
    pub async fn extract_table(&self, selector: &str) -> Result<Dataset, ScraperError> {
        let script = format!(
            r#"
            (() => {{
                const table = document.querySelector({});
                if (!table) return null;
                const text = (cell) => (cell.innerText || cell.textContent || '').trim();
                let headers = [];
                const headRow = table.querySelector('thead tr') || table.querySelector('tr');
                if (headRow && headRow.querySelectorAll('th').length > 0) {{
                    headers = Array.from(headRow.querySelectorAll('th')).map(text);
                }}
                const rows = [];
                for (const tr of table.querySelectorAll('tr')) {{
                    const cells = tr.querySelectorAll('td');
                    if (cells.length === 0) continue;
                    rows.push(Array.from(cells).map(text));
                }}
                return {{ headers, rows }};
            }})()
            "#,
            js_string(selector)
        );

        let raw: Option<RawTable> = self.evaluate(&script).await?;
        let raw = raw.ok_or_else(|| ScraperError::ElementNotFound(selector.to_string()))?;
        debug!(
            "Table {}: {} headers, {} rows",
            selector,
            raw.headers.len(),
            raw.rows.len()
        );
        Ok(Dataset::from_cells(raw.headers, raw.rows))
    }

    /// 各行の td テキストをそのまま取得
    pub async fn extract_row_cells(
        &self,
        row_selector: &str,
    ) -> Result<Vec<Vec<String>>, ScraperError> {
        self.evaluate(&format!(
            r#"
            Array.from(document.querySelectorAll({})).map(tr =>
                Array.from(tr.querySelectorAll('td')).map(td => (td.innerText || td.textContent || '').trim())
            )
            "#,
            js_string(row_selector)
        ))
        .await
    }

    /// トリガーをクリックし、ダウンロードディレクトリに新しいファイルが揃うまで待機
    pub async fn download(
        &self,
        trigger_selector: &str,
        extension: &str,
        timeout: Duration,
    ) -> Result<PathBuf, ScraperError> {
        let before = list_files(&self.download_dir);
        self.click(trigger_selector).await?;
        info!("Download triggered: {}", trigger_selector);

        let start = std::time::Instant::now();
        loop {
            if let Some(path) = find_new_download(&self.download_dir, &before, extension) {
                info!("Download complete: {:?}", path);
                return Ok(path);
            }

            if start.elapsed() > timeout {
                return Err(ScraperError::Download(format!(
                    "ダウンロードが{}秒以内に完了しませんでした",
                    timeout.as_secs()
                )));
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    /// 保存済みクッキーを注入（期限切れは除外）
    pub async fn apply_cookies(&self, jar: &CookieJar) -> Result<usize, ScraperError> {
        let now = chrono::Utc::now().timestamp() as f64;
        let jar = jar.unexpired(now);
        if jar.is_empty() {
            return Ok(0);
        }

        self.page
            .set_cookies(jar.to_params())
            .await
            .map_err(|e| ScraperError::Cookie(e.to_string()))?;
        info!("Injected {} cookies", jar.len());
        Ok(jar.len())
    }

    /// 現在のブラウザのクッキーを取得
    pub async fn capture_cookies(&self) -> Result<CookieJar, ScraperError> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| ScraperError::Cookie(e.to_string()))?;
        Ok(CookieJar::new(
            cookies.into_iter().map(StoredCookie::from).collect(),
        ))
    }

    /// 失敗時の調査用にスクリーンショットとHTMLを保存（エラーはログのみ）
    pub async fn dump_debug(&self, label: &str) {
        let now = Local::now().naive_local();
        let dir = &self.config.debug_path;

        let png_path = dir.join(timestamped_filename(label, "png", now));
        match self.screenshot(&png_path).await {
            Ok(path) => info!("Debug screenshot saved: {:?}", path),
            Err(e) => warn!("Failed to save debug screenshot: {}", e),
        }

        let html_path = dir.join(timestamped_filename(label, "html", now));
        match self.content().await {
            Ok(html) => match write_file(&html_path, html.as_bytes()) {
                Ok(()) => info!("Debug HTML saved: {:?}", html_path),
                Err(e) => warn!("Failed to save debug HTML: {}", e),
            },
            Err(e) => warn!("Failed to read page HTML: {}", e),
        }
    }

    /// ブラウザを閉じる
    pub async fn close(&mut self) -> Result<(), ScraperError> {
        if let Some(mut browser) = self.browser.take() {
            info!("Closing browser...");
            if let Err(e) = browser.close().await {
                debug!("Failed to close browser cleanly: {}", e);
            }
        }
        Ok(())
    }
}

/// display/visibility が非表示でなく、大きさを持つ要素なら true を返すJS関数
pub(crate) const IS_VISIBLE_JS: &str = "(el) => { \
    const style = window.getComputedStyle(el); \
    const rect = el.getBoundingClientRect(); \
    return style.display !== 'none' && style.visibility !== 'hidden' \
        && (rect.width > 0 || rect.height > 0); }";

/// Rust文字列をJavaScriptの文字列リテラルにする
pub(crate) fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ScraperError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

fn list_files(dir: &Path) -> HashSet<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .collect()
        })
        .unwrap_or_default()
}

/// ダウンロード前に無かった、書き込み完了済みのファイルを探す
fn find_new_download(dir: &Path, before: &HashSet<PathBuf>, extension: &str) -> Option<PathBuf> {
    list_files(dir).into_iter().find(|path| {
        if before.contains(path) {
            return false;
        }
        let filename = path.file_name().unwrap_or_default().to_string_lossy();
        if filename.ends_with(".crdownload") || filename.ends_with(".tmp") {
            return false;
        }
        path.extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes() {
        assert_eq!(js_string("a'b\"c"), r#""a'b\"c""#);
        assert_eq!(js_string("line\nbreak"), r#""line\nbreak""#);
    }

    #[test]
    fn test_find_new_download() {
        let dir = std::env::temp_dir().join(format!("portal-scraper-dl-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("old.xlsx"), b"old").unwrap();
        let before = list_files(&dir);

        std::fs::write(dir.join("report.xlsx.crdownload"), b"partial").unwrap();
        assert!(find_new_download(&dir, &before, "xlsx").is_none());

        std::fs::write(dir.join("report.XLSX"), b"done").unwrap();
        let found = find_new_download(&dir, &before, "xlsx").unwrap();
        assert_eq!(found.file_name().unwrap(), "report.XLSX");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    #[ignore] // Chromeが必要: cargo test engine -- --ignored --nocapture
    async fn test_extract_table_from_data_url() {
        let config = ScraperConfig::default().with_output_path(std::env::temp_dir());
        let mut engine = AutomationEngine::launch(&config).await.unwrap();

        engine
            .navigate("data:text/html,<table id='t'><tr><th>Name</th><th>City</th></tr><tr><td>A</td><td>Seoul</td></tr></table>")
            .await
            .unwrap();
        let dataset = engine.extract_table("#t").await.unwrap();
        assert_eq!(dataset.columns, vec!["Name", "City"]);
        assert_eq!(dataset.rows[0].get("City"), Some("Seoul"));

        engine.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Chromeが必要: cargo test engine -- --ignored --nocapture
    async fn test_is_visible_skips_hidden_elements() {
        let config = ScraperConfig::default().with_output_path(std::env::temp_dir());
        let mut engine = AutomationEngine::launch(&config).await.unwrap();

        engine
            .navigate(concat!(
                "data:text/html,<p id='shown'>text</p>",
                "<p id='gone' style='display:none'>x</p>",
                "<div style='visibility:hidden'><iframe id='frame'></iframe></div>",
                "<span id='empty'></span>",
            ))
            .await
            .unwrap();

        assert!(engine.is_visible("p").await.unwrap());
        assert!(engine.is_visible("[id=shown]").await.unwrap());
        assert!(engine.exists("[id=gone]").await.unwrap());
        assert!(!engine.is_visible("[id=gone]").await.unwrap());
        assert!(!engine.is_visible("[id=frame]").await.unwrap());
        assert!(!engine.is_visible("[id=empty]").await.unwrap());
        assert!(!engine.is_visible("[id=missing]").await.unwrap());

        engine.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Chromeが必要: cargo test engine -- --ignored --nocapture
    async fn test_download_timeout_is_download_error() {
        let dir = std::env::temp_dir().join(format!("portal-scraper-nodl-{}", std::process::id()));
        let config = ScraperConfig::default().with_output_path(&dir);
        let mut engine = AutomationEngine::launch(&config).await.unwrap();

        engine
            .navigate("data:text/html,<button id='export'>Excel</button>")
            .await
            .unwrap();
        let err = engine
            .download("[id=export]", "xlsx", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ScraperError::Download(_)));

        engine.close().await.unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }
}
