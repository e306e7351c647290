//! ERPのグリッドデータをCSV/Excelに出力
//!
//! 実行方法:
//! ```
//! ERP_LOGIN_URL=... ERP_USER=... ERP_PASSWORD=... ERP_MENU="영업관리>매출현황" \
//!     cargo run --example erp_grid_export -- csv
//! ```

use portal_scraper::{ErpSiteConfig, ExportFormat, ScrapeRequest, ScraperConfig, ScraperService, Site};
use tower::Service;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let format: ExportFormat = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "xlsx".to_string())
        .parse()?;

    let login_url = std::env::var("ERP_LOGIN_URL").expect("ERP_LOGIN_URL not set");
    let menu = std::env::var("ERP_MENU").unwrap_or_default();

    let mut site = ErpSiteConfig::new(login_url)
        .with_menu_path(menu.split('>').map(str::trim).filter(|s| !s.is_empty()));
    if let Ok(code) = std::env::var("ERP_COMPANY") {
        site = site.with_company_code(code);
    }

    let config = ScraperConfig::from_env("ERP").with_cookie_path("./data/erp_cookies.json");
    let request = ScrapeRequest::new(Site::Erp(site), config).with_format(format);

    let mut service = ScraperService::new();
    let result = service.call(request).await?;
    println!("成功! {}件 -> {:?}", result.rows, result.path);
    Ok(())
}
