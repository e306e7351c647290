//! セッションクッキーの保存と復元
//!
//! 対話ログイン後にブラウザから取得したクッキーをJSONに保存し、次回以降の実行で
//! 新しいブラウザコンテキストへ注入してログインを省略する。

use std::path::Path;

use chromiumoxide::cdp::browser_protocol::network::{Cookie, CookieParam};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ScraperError;

/// 保存用クッキー
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// 有効期限 (UNIX秒)。None または負値はセッションクッキー
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn default_path() -> String {
    "/".to_string()
}

impl StoredCookie {
    pub fn is_expired(&self, now: f64) -> bool {
        match self.expires {
            Some(expires) if expires > 0.0 => expires <= now,
            _ => false,
        }
    }

    fn to_param(&self) -> CookieParam {
        let mut param = CookieParam::new(self.name.clone(), self.value.clone());
        param.domain = Some(self.domain.clone());
        param.path = Some(self.path.clone());
        param.secure = Some(self.secure);
        param.http_only = Some(self.http_only);
        param
    }
}

impl From<Cookie> for StoredCookie {
    fn from(cookie: Cookie) -> Self {
        let expires = if cookie.session {
            None
        } else {
            Some(cookie.expires)
        };
        Self {
            name: cookie.name,
            value: cookie.value,
            domain: cookie.domain,
            path: cookie.path,
            expires,
            secure: cookie.secure,
            http_only: cookie.http_only,
        }
    }
}

/// クッキーセット
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CookieJar {
    pub cookies: Vec<StoredCookie>,
    /// 取得日時 (UNIX秒)
    #[serde(default)]
    pub captured_at: Option<i64>,
}

impl CookieJar {
    pub fn new(cookies: Vec<StoredCookie>) -> Self {
        Self {
            cookies,
            captured_at: Some(Utc::now().timestamp()),
        }
    }

    /// JSONファイルから読み込む
    ///
    /// ブラウザ拡張などが出力する素のクッキー配列 (`[{...}, ...]`) も受け付ける。
    pub fn load(path: &Path) -> Result<Self, ScraperError> {
        let json = std::fs::read_to_string(path)?;
        let jar = match serde_json::from_str::<CookieJar>(&json) {
            Ok(jar) => jar,
            Err(_) => {
                let cookies: Vec<StoredCookie> = serde_json::from_str(&json).map_err(|e| {
                    ScraperError::Cookie(format!("{}: {}", path.display(), e))
                })?;
                CookieJar {
                    cookies,
                    captured_at: None,
                }
            }
        };
        debug!("Loaded {} cookies from {:?}", jar.cookies.len(), path);
        Ok(jar)
    }

    /// JSONファイルへ保存（親ディレクトリも作成）
    pub fn save(&self, path: &Path) -> Result<(), ScraperError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved {} cookies to {:?}", self.cookies.len(), path);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// 期限切れクッキーを除いたセット
    pub fn unexpired(&self, now: f64) -> CookieJar {
        CookieJar {
            cookies: self
                .cookies
                .iter()
                .filter(|c| !c.is_expired(now))
                .cloned()
                .collect(),
            captured_at: self.captured_at,
        }
    }

    pub fn to_params(&self) -> Vec<CookieParam> {
        self.cookies.iter().map(StoredCookie::to_param).collect()
    }
}

/// ナビゲーション後のURLがログインページかどうか（セッション切れ判定）
pub fn is_login_url(url: &str, patterns: &[String]) -> bool {
    let url = url.to_lowercase();
    patterns
        .iter()
        .filter(|p| !p.is_empty())
        .any(|p| url.contains(&p.to_lowercase()))
}
