use std::path::PathBuf;

use async_trait::async_trait;
use tracing::warn;

use crate::error::ScraperError;
use crate::export::{ExportFormat, ExportedFile, Exporter};
use crate::table::Dataset;

#[async_trait]
pub trait Scraper: Send + Sync {
    /// ブラウザ初期化（保存済みクッキーがあれば注入）
    async fn initialize(&mut self) -> Result<(), ScraperError>;

    /// ログイン実行（セッションが生きていれば省略）
    async fn login(&mut self) -> Result<(), ScraperError>;

    /// データ取得
    async fn scrape(&mut self) -> Result<Dataset, ScraperError>;

    /// リソース解放
    async fn close(&mut self) -> Result<(), ScraperError>;

    /// 出力ファイル名の接頭辞
    fn export_prefix(&self) -> &str;

    /// 出力ディレクトリ
    fn output_path(&self) -> PathBuf;

    /// 一括実行（initialize → login → scrape → close → export）
    ///
    /// 途中で失敗してもブラウザは閉じる。
    async fn execute(&mut self, format: ExportFormat) -> Result<ExportedFile, ScraperError> {
        self.initialize().await?;

        let scraped = match self.login().await {
            Ok(()) => self.scrape().await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.close().await {
            warn!("Failed to close browser: {}", e);
        }

        let dataset = scraped?;
        let path = Exporter::new(self.output_path()).export(&dataset, self.export_prefix(), format)?;
        Ok(ExportedFile {
            path,
            rows: dataset.len(),
        })
    }
}
