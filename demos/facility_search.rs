//! 長期療養ポータルで施設を検索して結果を出力
//!
//! CAPTCHAが表示された場合はブラウザ上で解くまで待機する。

use portal_scraper::{
    ExportFormat, FacilityQuery, LtcScraper, LtcSiteConfig, Scraper, ScraperConfig,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let search_url = std::env::var("LTC_SEARCH_URL").expect("LTC_SEARCH_URL not set");
    let keyword = std::env::args().nth(1).unwrap_or_default();

    let mut query = FacilityQuery::new(keyword);
    if let Ok(region) = std::env::var("LTC_REGION") {
        query = query.with_region(region);
    }

    let site = LtcSiteConfig::new(search_url).with_pagination("a.next", 10);
    // CAPTCHAを手で解けるよう表示モード
    let config = ScraperConfig::default().with_headless(false);

    let mut scraper = LtcScraper::new(config, site, query);
    let exported = scraper.execute(ExportFormat::Xlsx).await?;
    println!("成功! {}件 -> {:?}", exported.rows, exported.path);
    Ok(())
}
