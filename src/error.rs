use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("ログインエラー: {0}")]
    Login(String),

    #[error("セッション切れ: {0}")]
    SessionExpired(String),

    #[error("ダウンロードエラー: {0}")]
    Download(String),

    #[error("タイムアウト: {0}")]
    Timeout(String),

    #[error("要素が見つかりません: {0}")]
    ElementNotFound(String),

    #[error("JavaScript実行エラー: {0}")]
    JavaScript(String),

    #[error("データ抽出エラー: {0}")]
    Extraction(String),

    #[error("CAPTCHA: {0}")]
    Captcha(String),

    #[error("出力エラー: {0}")]
    Export(String),

    #[error("クッキーエラー: {0}")]
    Cookie(String),

    #[error("JSONエラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSVエラー: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excelエラー: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),
}

impl ScraperError {
    /// ログインページへのリダイレクトなど、再ログインで回復できるエラーか
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ScraperError::SessionExpired(_))
    }
}
