//! 長期療養ポータル 施設検索モジュール
//!
//! 検索条件を入力し、結果テーブルをページごとに取得する。CAPTCHAが出た場合は
//! 画像を保存して手動での解決を待つ

mod scraper;
mod types;

pub use scraper::LtcScraper;
pub use types::{FacilityQuery, LtcSiteConfig};
