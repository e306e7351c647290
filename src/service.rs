use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::Service;
use tracing::info;

use crate::config::ScraperConfig;
use crate::erp::{ErpScraper, ErpSiteConfig};
use crate::error::ScraperError;
use crate::export::{ExportFormat, ExportedFile};
use crate::ltc::{FacilityQuery, LtcScraper, LtcSiteConfig};
use crate::mail::{MailScraper, MailSiteConfig};
use crate::traits::Scraper;

/// 対象システム
#[derive(Debug, Clone)]
pub enum Site {
    Mail(MailSiteConfig),
    Erp(ErpSiteConfig),
    Facility(LtcSiteConfig, FacilityQuery),
}

impl Site {
    pub fn name(&self) -> &'static str {
        match self {
            Site::Mail(_) => "mail",
            Site::Erp(_) => "erp",
            Site::Facility(..) => "facility",
        }
    }
}

/// スクレイピングリクエスト
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub site: Site,
    pub config: ScraperConfig,
    pub format: ExportFormat,
}

impl ScrapeRequest {
    pub fn new(site: Site, config: ScraperConfig) -> Self {
        Self {
            site,
            config,
            format: ExportFormat::default(),
        }
    }

    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = path.into();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    fn into_scraper(self) -> (Box<dyn Scraper>, ExportFormat) {
        let scraper: Box<dyn Scraper> = match self.site {
            Site::Mail(site) => Box::new(MailScraper::new(self.config, site)),
            Site::Erp(site) => Box::new(ErpScraper::new(self.config, site)),
            Site::Facility(site, query) => Box::new(LtcScraper::new(self.config, site, query)),
        };
        (scraper, self.format)
    }
}

/// スクレイピング結果
#[derive(Debug)]
pub struct ScrapeResult {
    pub path: PathBuf,
    pub rows: usize,
    pub content: Vec<u8>,
}

impl ScrapeResult {
    pub fn new(exported: ExportedFile) -> std::io::Result<Self> {
        let content = std::fs::read(&exported.path)?;
        Ok(Self {
            path: exported.path,
            rows: exported.rows,
            content,
        })
    }
}

/// tower::Serviceを実装したスクレイパーサービス
#[derive(Debug, Clone, Default)]
pub struct ScraperService {}

impl ScraperService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Service<ScrapeRequest> for ScraperService {
    type Response = ScrapeResult;
    type Error = ScraperError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ScrapeRequest) -> Self::Future {
        info!(
            "Scrape request: site={}, format={}",
            req.site.name(),
            req.format
        );

        Box::pin(async move {
            let (mut scraper, format) = req.into_scraper();
            let exported = scraper.execute(format).await?;
            let result = ScrapeResult::new(exported)?;

            info!(
                "Scrape complete: path={:?}, rows={}, size={}bytes",
                result.path,
                result.rows,
                result.content.len()
            );
            Ok(result)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_request_builder() {
        let req = ScrapeRequest::new(
            Site::Mail(MailSiteConfig::default()),
            ScraperConfig::new("user", "pass"),
        )
        .with_format(ExportFormat::Csv)
        .with_output_path("/tmp/out")
        .with_headless(false);

        assert_eq!(req.format, ExportFormat::Csv);
        assert_eq!(req.config.output_path, PathBuf::from("/tmp/out"));
        assert!(!req.config.headless);
        assert_eq!(req.site.name(), "mail");
    }

    #[test]
    fn test_request_into_scraper() {
        let req = ScrapeRequest::new(
            Site::Facility(LtcSiteConfig::default(), FacilityQuery::new("요양원")),
            ScraperConfig::default(),
        );
        let (scraper, format) = req.into_scraper();
        assert_eq!(format, ExportFormat::Xlsx);
        assert_eq!(scraper.export_prefix(), "facility_search_요양원");
    }

    #[test]
    fn test_scrape_result_reads_file() {
        let path = std::env::temp_dir().join(format!("portal-scraper-result-{}.csv", std::process::id()));
        std::fs::write(&path, b"a,b\n1,2\n").unwrap();

        let result = ScrapeResult::new(ExportedFile {
            path: path.clone(),
            rows: 1,
        })
        .unwrap();
        assert_eq!(result.content, b"a,b\n1,2\n");
        assert_eq!(result.rows, 1);

        std::fs::remove_file(&path).ok();
    }
}
