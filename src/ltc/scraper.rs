//! 長期療養ポータル 施設検索スクレイパー実装

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::captcha::handle_captcha;
use crate::config::ScraperConfig;
use crate::engine::AutomationEngine;
use crate::error::ScraperError;
use crate::popup::{dismiss_popups, DEFAULT_CLOSE_SELECTORS};
use crate::table::Dataset;
use crate::traits::Scraper;

use super::types::{FacilityQuery, LtcSiteConfig};

const SEARCH_WAIT_SECS: u64 = 3;

pub struct LtcScraper {
    config: ScraperConfig,
    site: LtcSiteConfig,
    query: FacilityQuery,
    export_prefix: String,
    engine: Option<AutomationEngine>,
}

impl LtcScraper {
    pub fn new(config: ScraperConfig, site: LtcSiteConfig, query: FacilityQuery) -> Self {
        let label = query.label();
        let export_prefix = if label.is_empty() {
            site.export_prefix.clone()
        } else {
            format!("{}_{}", site.export_prefix, label)
        };
        Self {
            config,
            site,
            query,
            export_prefix,
            engine: None,
        }
    }

    fn get_engine(&self) -> Result<&AutomationEngine, ScraperError> {
        self.engine
            .as_ref()
            .ok_or_else(|| ScraperError::BrowserInit("ブラウザが初期化されていません".into()))
    }

    async fn submit_search(&self) -> Result<(), ScraperError> {
        let engine = self.get_engine()?;
        info!(
            "Searching facilities: region={:?}, keyword='{}'",
            self.query.region, self.query.keyword
        );

        if let Some(region) = &self.query.region {
            engine.fill_js(&self.site.region_selector, region).await?;
            // 地域選択で下位の選択肢が再読み込みされる
            sleep(Duration::from_secs(1)).await;
        }
        if !self.query.keyword.is_empty() {
            engine
                .fill(&self.site.keyword_selector, &self.query.keyword)
                .await?;
        }
        engine.click(&self.site.search_button_selector).await?;
        sleep(Duration::from_secs(SEARCH_WAIT_SECS)).await;

        if let Some(image) = handle_captcha(
            engine,
            &self.site.captcha_selectors,
            self.site.captcha_timeout,
        )
        .await?
        {
            info!("Continuing after manual CAPTCHA ({:?})", image);
            sleep(Duration::from_secs(SEARCH_WAIT_SECS)).await;
        }
        Ok(())
    }

    async fn collect_pages(&self) -> Result<Dataset, ScraperError> {
        let engine = self.get_engine()?;
        let mut dataset = Dataset::new();

        for page_no in 1..=self.site.max_pages.max(1) {
            engine
                .wait_for_selector(&self.site.result_table_selector, self.config.timeout)
                .await?;
            let page = engine.extract_table(&self.site.result_table_selector).await?;
            info!("Page {}: {} facilities", page_no, page.len());
            if page.is_empty() {
                break;
            }
            dataset.extend(page);

            let Some(next) = &self.site.next_page_selector else {
                break;
            };
            if page_no == self.site.max_pages || !engine.exists(next).await? {
                break;
            }
            engine.click(next).await?;
            sleep(Duration::from_secs(SEARCH_WAIT_SECS)).await;
        }

        Ok(dataset)
    }
}

#[async_trait]
impl Scraper for LtcScraper {
    async fn initialize(&mut self) -> Result<(), ScraperError> {
        self.engine = Some(AutomationEngine::launch(&self.config).await?);
        Ok(())
    }

    /// 公開ポータルなのでログインは不要。検索ページへ到達できるかだけ確認する
    async fn login(&mut self) -> Result<(), ScraperError> {
        let engine = self.get_engine()?;
        engine.navigate(&self.site.search_url).await?;
        dismiss_popups(engine, self.config.escape_count, DEFAULT_CLOSE_SELECTORS).await?;
        engine
            .wait_for_selector(&self.site.search_button_selector, self.config.timeout)
            .await?;
        debug!("Search form ready");
        Ok(())
    }

    async fn scrape(&mut self) -> Result<Dataset, ScraperError> {
        let engine = self.get_engine()?;
        let result = match self.submit_search().await {
            Ok(()) => self.collect_pages().await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(dataset) => info!("Scraped {} facilities", dataset.len()),
            Err(_) => engine.dump_debug("facility_search").await,
        }
        result
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        if let Some(mut engine) = self.engine.take() {
            engine.close().await?;
        }
        Ok(())
    }

    fn export_prefix(&self) -> &str {
        &self.export_prefix
    }

    fn output_path(&self) -> PathBuf {
        self.config.output_path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportFormat;

    #[test]
    fn test_export_prefix_includes_query() {
        let scraper = LtcScraper::new(
            ScraperConfig::default(),
            LtcSiteConfig::default(),
            FacilityQuery::new("요양원").with_region("11"),
        );
        assert_eq!(scraper.export_prefix(), "facility_search_11_요양원");

        let scraper = LtcScraper::new(
            ScraperConfig::default(),
            LtcSiteConfig::default(),
            FacilityQuery::default(),
        );
        assert_eq!(scraper.export_prefix(), "facility_search");
    }

    #[tokio::test]
    #[ignore] // 実環境テスト用: LTC_SEARCH_URL
    async fn test_facility_search_live() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("info,portal_scraper=debug")
            .try_init();

        let site = LtcSiteConfig::new(std::env::var("LTC_SEARCH_URL").expect("LTC_SEARCH_URL not set"));
        let config = ScraperConfig::default().with_headless(false);
        let mut scraper = LtcScraper::new(config, site, FacilityQuery::new("요양"));

        let exported = scraper.execute(ExportFormat::Csv).await.expect("search failed");
        println!("{} facilities -> {:?}", exported.rows, exported.path);
    }
}
