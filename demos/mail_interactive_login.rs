//! ブラウザで手動ログインし、セッションクッキーを保存する
//!
//! 2段階認証が必要な場合はこちらで一度ログインしてから `mail_export` を実行する。

use portal_scraper::{MailScraper, MailSiteConfig, ScraperConfig};
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

    let config = ScraperConfig::from_env("MAIL").with_cookie_path("./data/mail_cookies.json");
    let mut scraper = MailScraper::new(config, MailSiteConfig::new(login_url, inbox_url));

    let path = scraper.interactive_login().await?;
    println!("クッキー保存先: {:?}", path);
    Ok(())
}
