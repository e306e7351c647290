//! ERP (MEK-ICS) スクレイパーモジュール
//!
//! メニューを辿ってグリッド画面を開き、グリッドストアの全レコードを取得する

mod scraper;
mod types;

pub use scraper::ErpScraper;
pub use types::{value_to_cell, ErpSiteConfig, GridColumn, GridData};
