//! グループウェアのメール一覧をExcelに出力
//!
//! 実行方法:
//! ```
//! MAIL_LOGIN_URL=... MAIL_INBOX_URL=... MAIL_USER=... MAIL_PASSWORD=... \
//!     cargo run --example mail_export
//! ```

use portal_scraper::{ExportFormat, MailScraper, MailSiteConfig, Scraper, ScraperConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let login_url = std::env::var("MAIL_LOGIN_URL").expect("MAIL_LOGIN_URL not set");
    let inbox_url = std::env::var("MAIL_INBOX_URL").expect("MAIL_INBOX_URL not set");

    let mut site = MailSiteConfig::new(login_url, inbox_url);
    if let Ok(selector) = std::env::var("MAIL_LIST_SELECTOR") {
        site = site.with_list_selector(selector);
    }
    if let Ok(selector) = std::env::var("MAIL_ROW_SELECTOR") {
        site = site.with_row_selector(selector);
    }
    if let Ok(next) = std::env::var("MAIL_NEXT_SELECTOR") {
        site = site.with_pagination(next, 5);
    }

    let config = ScraperConfig::from_env("MAIL").with_cookie_path("./data/mail_cookies.json");

    println!("=== Mail Export ===");
    let mut scraper = MailScraper::new(config, site);
    match scraper.execute(ExportFormat::Xlsx).await {
        Ok(exported) => println!("成功! {}件 -> {:?}", exported.rows, exported.path),
        Err(e) => eprintln!("エラー: {}", e),
    }
    Ok(())
}
