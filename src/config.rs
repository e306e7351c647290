use std::path::PathBuf;
use std::time::Duration;

/// 全サイト共通のスクレイパー設定
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub user_id: String,
    pub password: String,
    /// 出力ファイル (xlsx/csv/json) とダウンロードの保存先
    pub output_path: PathBuf,
    /// デバッグ用スクリーンショット・HTMLダンプの保存先
    pub debug_path: PathBuf,
    /// 保存済みクッキーファイル (None ならクッキー注入しない)
    pub cookie_path: Option<PathBuf>,
    pub headless: bool,
    pub timeout: Duration,
    /// ポップアップを閉じるためにEscapeを押す回数
    pub escape_count: u32,
    pub chrome_path: Option<String>,
    pub debug: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            password: String::new(),
            output_path: PathBuf::from("./data"),
            debug_path: PathBuf::from("./logs"),
            cookie_path: None,
            headless: true,
            timeout: Duration::from_secs(60),
            escape_count: 3,
            chrome_path: None,
            debug: false,
        }
    }
}

impl ScraperConfig {
    pub fn new(user_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// 環境変数から設定を読み込む
    ///
    /// `<PREFIX>_USER` / `<PREFIX>_PASSWORD` / `<PREFIX>_HEADLESS` / `<PREFIX>_COOKIES`
    /// と共通の `SCRAPER_OUTPUT_DIR` / `CHROME_PATH` (`CHROMIUM_PATH`) を参照する。
    pub fn from_env(prefix: &str) -> Self {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    fn from_lookup(prefix: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new(
            lookup(&format!("{}_USER", prefix)).unwrap_or_default(),
            lookup(&format!("{}_PASSWORD", prefix)).unwrap_or_default(),
        );

        if let Some(headless) = lookup(&format!("{}_HEADLESS", prefix)) {
            config.headless = !matches!(headless.to_ascii_lowercase().as_str(), "0" | "false" | "no");
        }
        if let Some(cookies) = lookup(&format!("{}_COOKIES", prefix)) {
            config.cookie_path = Some(PathBuf::from(cookies));
        }
        if let Some(dir) = lookup("SCRAPER_OUTPUT_DIR") {
            config.output_path = PathBuf::from(dir);
        }
        config.chrome_path = lookup("CHROME_PATH").or_else(|| lookup("CHROMIUM_PATH"));
        config
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_debug_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = path.into();
        self
    }

    pub fn with_cookie_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookie_path = Some(path.into());
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_escape_count(mut self, count: u32) -> Self {
        self.escape_count = count;
        self
    }

    pub fn with_chrome_path(mut self, path: impl Into<String>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_builder() {
        let config = ScraperConfig::new("user", "pass")
            .with_headless(false)
            .with_output_path("/tmp/out")
            .with_cookie_path("/tmp/cookies.json")
            .with_timeout(Duration::from_secs(120))
            .with_escape_count(5);

        assert_eq!(config.user_id, "user");
        assert_eq!(config.password, "pass");
        assert!(!config.headless);
        assert_eq!(config.output_path, PathBuf::from("/tmp/out"));
        assert_eq!(config.cookie_path, Some(PathBuf::from("/tmp/cookies.json")));
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert_eq!(config.escape_count, 5);
    }

    #[test]
    fn test_defaults() {
        let config = ScraperConfig::default();
        assert!(config.headless);
        assert_eq!(config.output_path, PathBuf::from("./data"));
        assert_eq!(config.debug_path, PathBuf::from("./logs"));
        assert!(config.cookie_path.is_none());
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("MAIL_USER", "kim"),
            ("MAIL_PASSWORD", "secret"),
            ("MAIL_HEADLESS", "false"),
            ("MAIL_COOKIES", "./data/mail_cookies.json"),
            ("CHROMIUM_PATH", "/usr/bin/chromium"),
        ]
        .into_iter()
        .collect();

        let config = ScraperConfig::from_lookup("MAIL", |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.user_id, "kim");
        assert_eq!(config.password, "secret");
        assert!(!config.headless);
        assert_eq!(
            config.cookie_path,
            Some(PathBuf::from("./data/mail_cookies.json"))
        );
        assert_eq!(config.chrome_path.as_deref(), Some("/usr/bin/chromium"));
        assert_eq!(config.output_path, PathBuf::from("./data"));
    }
}
