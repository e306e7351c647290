//! グループウェアメール関連の型定義

use std::time::Duration;

use crate::table::{looks_like_date, looks_like_size, normalize_text, ScrapedRow};

/// メール一覧の1行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailRow {
    pub sender: String,
    pub subject: String,
    pub date: String,
    pub size: String,
}

impl From<MailRow> for ScrapedRow {
    fn from(row: MailRow) -> Self {
        ScrapedRow::new()
            .with("sender", row.sender)
            .with("subject", row.subject)
            .with("date", row.date)
            .with("size", row.size)
    }
}

/// 一覧行のセルを送信者・件名・日付・サイズに振り分ける
///
/// 列位置はサイトによって異なるため、日付らしいセルとサイズらしいセルを先に取り、
/// 残りの最初のセルを送信者、最も長いセルを件名とする。空行は None。
pub fn classify_mail_cells(cells: &[String]) -> Option<MailRow> {
    let cells: Vec<String> = cells
        .iter()
        .map(|c| normalize_text(c))
        .filter(|c| !c.is_empty())
        .collect();
    // colspan の「メールがありません」行はセルが1つだけ
    if cells.len() < 2 {
        return None;
    }

    let date_idx = cells.iter().position(|c| looks_like_date(c));
    let size_idx = cells
        .iter()
        .enumerate()
        .position(|(i, c)| Some(i) != date_idx && looks_like_size(c));

    let rest: Vec<&String> = cells
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != date_idx && Some(*i) != size_idx)
        .map(|(_, c)| c)
        .collect();

    let sender = rest.first().map(|s| s.to_string()).unwrap_or_default();
    // 同じ長さなら先に出たセルを優先
    let subject = rest
        .iter()
        .skip(1)
        .rev()
        .max_by_key(|c| c.chars().count())
        .map(|s| s.to_string())
        .unwrap_or_default();

    Some(MailRow {
        sender,
        subject,
        date: date_idx.map(|i| cells[i].clone()).unwrap_or_default(),
        size: size_idx.map(|i| cells[i].clone()).unwrap_or_default(),
    })
}

/// メールシステムのURL・セレクタ
#[derive(Debug, Clone)]
pub struct MailSiteConfig {
    pub login_url: String,
    pub inbox_url: String,
    pub user_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    /// 一覧のコンテナ。受信箱が空でも表示される要素
    pub list_selector: String,
    /// 一覧の行 (`tr`)
    pub row_selector: String,
    /// 次ページボタン (None なら1ページのみ)
    pub next_page_selector: Option<String>,
    pub max_pages: usize,
    /// この文字列をURLに含む場合はログインページとみなす
    pub login_patterns: Vec<String>,
    /// 手動ログインの待ち時間
    pub interactive_timeout: Duration,
    pub export_prefix: String,
}

impl Default for MailSiteConfig {
    fn default() -> Self {
        Self {
            login_url: String::new(),
            inbox_url: String::new(),
            user_selector: "input[name='userId']".to_string(),
            password_selector: "input[type='password']".to_string(),
            submit_selector: "button[type='submit']".to_string(),
            list_selector: "#mailList".to_string(),
            row_selector: "#mailList tbody tr".to_string(),
            next_page_selector: None,
            max_pages: 1,
            login_patterns: vec!["login".to_string(), "sso".to_string()],
            interactive_timeout: Duration::from_secs(300),
            export_prefix: "mail_list".to_string(),
        }
    }
}

impl MailSiteConfig {
    pub fn new(login_url: impl Into<String>, inbox_url: impl Into<String>) -> Self {
        Self {
            login_url: login_url.into(),
            inbox_url: inbox_url.into(),
            ..Default::default()
        }
    }

    pub fn with_list_selector(mut self, selector: impl Into<String>) -> Self {
        self.list_selector = selector.into();
        self
    }

    pub fn with_row_selector(mut self, selector: impl Into<String>) -> Self {
        self.row_selector = selector.into();
        self
    }

    pub fn with_pagination(mut self, next_page_selector: impl Into<String>, max_pages: usize) -> Self {
        self.next_page_selector = Some(next_page_selector.into());
        self.max_pages = max_pages.max(1);
        self
    }
}
