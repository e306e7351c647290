//! 長期療養ポータル (施設検索) 関連の型定義

use std::time::Duration;

/// 施設検索の条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacilityQuery {
    /// 地域 (`<select>` の value)。None なら全国
    pub region: Option<String>,
    /// 施設名などのキーワード
    pub keyword: String,
}

impl FacilityQuery {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            region: None,
            keyword: keyword.into(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// 出力ファイル名に使える短いラベル
    pub fn label(&self) -> String {
        let mut parts = Vec::new();
        if let Some(region) = &self.region {
            parts.push(region.as_str());
        }
        if !self.keyword.trim().is_empty() {
            parts.push(self.keyword.trim());
        }
        let label = parts.join("_");
        label
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

/// 施設検索ページのURL・セレクタ
#[derive(Debug, Clone)]
pub struct LtcSiteConfig {
    pub search_url: String,
    pub region_selector: String,
    pub keyword_selector: String,
    pub search_button_selector: String,
    pub result_table_selector: String,
    pub next_page_selector: Option<String>,
    pub max_pages: usize,
    pub captcha_selectors: Vec<String>,
    pub captcha_timeout: Duration,
    pub export_prefix: String,
}

impl Default for LtcSiteConfig {
    fn default() -> Self {
        Self {
            search_url: String::new(),
            region_selector: "select[name='siDoCd']".to_string(),
            keyword_selector: "input[name='searchWord']".to_string(),
            search_button_selector: "#btnSearch".to_string(),
            result_table_selector: "table.list".to_string(),
            next_page_selector: None,
            max_pages: 1,
            captcha_selectors: vec![
                "img[src*='captcha' i]".to_string(),
                "#captchaImg".to_string(),
                // 画像選択のチャレンジと、チェックボックス型のウィジェット
                "iframe[src*='recaptcha'][src*='bframe']".to_string(),
                "iframe[src*='recaptcha'][src*='anchor'][src*='size=normal']".to_string(),
            ],
            captcha_timeout: Duration::from_secs(180),
            export_prefix: "facility_search".to_string(),
        }
    }
}

impl LtcSiteConfig {
    pub fn new(search_url: impl Into<String>) -> Self {
        Self {
            search_url: search_url.into(),
            ..Default::default()
        }
    }

    pub fn with_result_table(mut self, selector: impl Into<String>) -> Self {
        self.result_table_selector = selector.into();
        self
    }

    pub fn with_pagination(mut self, next_page_selector: impl Into<String>, max_pages: usize) -> Self {
        self.next_page_selector = Some(next_page_selector.into());
        self.max_pages = max_pages.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_label() {
        assert_eq!(FacilityQuery::new("요양원").with_region("11").label(), "11_요양원");
        assert_eq!(FacilityQuery::new(" day care ").label(), "day_care");
        assert_eq!(FacilityQuery::default().label(), "");
    }

    #[test]
    fn test_site_config_pagination() {
        let site = LtcSiteConfig::new("https://ltc.example.or.kr/search").with_pagination(".next", 5);
        assert_eq!(site.max_pages, 5);
        assert_eq!(site.captcha_selectors.len(), 4);
        // 不可視reCAPTCHAのバッジ (size=invisible) は対象外
        assert!(site
            .captcha_selectors
            .iter()
            .all(|s| s != "iframe[src*='recaptcha']"));
    }
}
