//! グループウェアメール スクレイパーモジュール
//!
//! 受信箱のメール一覧 (送信者・件名・日付・サイズ) を取得してExcelに出力する

mod scraper;
mod types;

pub use scraper::MailScraper;
pub use types::{classify_mail_cells, MailRow, MailSiteConfig};
