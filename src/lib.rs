//! ポータルスクレイパーライブラリ
//!
//! - グループウェアのメール一覧をExcelに出力
//! - ERP (MEK-ICS) のグリッドデータをストアから直接取得
//! - 長期療養ポータルの施設検索結果を取得
//!
//! 保存済みクッキーを注入してログインを省略し、セッション切れ（ログインページへの
//! リダイレクト）を検出した場合のみID/パスワードでログインする。
//!
//! # 使用例
//!
//! ```rust,ignore
//! use portal_scraper::{ExportFormat, MailSiteConfig, ScrapeRequest, ScraperConfig, ScraperService, Site};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut service = ScraperService::new();
//!
//!     let site = MailSiteConfig::new("https://gw.example.com/login", "https://gw.example.com/mail/inbox");
//!     let config = ScraperConfig::new("user_id", "password")
//!         .with_cookie_path("./data/mail_cookies.json");
//!     let request = ScrapeRequest::new(Site::Mail(site), config).with_format(ExportFormat::Xlsx);
//!
//!     let result = service.call(request).await.unwrap();
//!     println!("{} rows -> {:?}", result.rows, result.path);
//! }
//! ```

pub mod captcha;
pub mod config;
pub mod cookies;
pub mod engine;
pub mod erp;
pub mod error;
pub mod export;
pub mod ltc;
pub mod mail;
pub mod popup;
pub mod service;
pub mod table;
pub mod traits;

// 主要な型をリエクスポート
pub use config::ScraperConfig;
pub use cookies::{CookieJar, StoredCookie};
pub use engine::AutomationEngine;
pub use error::ScraperError;
pub use export::{ExportFormat, ExportedFile, Exporter};
pub use service::{ScrapeRequest, ScrapeResult, ScraperService, Site};
pub use table::{Dataset, ScrapedRow};
pub use traits::Scraper;

pub use erp::{ErpScraper, ErpSiteConfig, GridData};
pub use ltc::{FacilityQuery, LtcScraper, LtcSiteConfig};
pub use mail::{MailRow, MailScraper, MailSiteConfig};
