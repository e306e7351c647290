//! ERP (MEK-ICS) 関連の型定義

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::table::{normalize_text, Dataset, ScrapedRow};

/// グリッドの列定義
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridColumn {
    #[serde(default)]
    pub data_index: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub hidden: bool,
}

/// ページ内のグリッドストアから取り出した生データ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridData {
    pub columns: Vec<GridColumn>,
    pub rows: Vec<Map<String, Value>>,
}

impl GridData {
    /// 表示列だけを画面の見出し名で並べたデータセットに変換
    ///
    /// 見出しが空の列は dataIndex を列名にし、見出しが重複する列は
    /// `見出し (dataIndex)` とする。列定義が取れない場合は最初の行のキーを使う。
    pub fn into_dataset(self) -> Dataset {
        let mut fields: Vec<(String, String)> = Vec::new();
        for column in &self.columns {
            if column.hidden {
                continue;
            }
            let Some(data_index) = column.data_index.as_ref().filter(|d| !d.is_empty()) else {
                continue;
            };

            let text = normalize_text(&column.text);
            let mut header = if text.is_empty() {
                data_index.clone()
            } else {
                text
            };
            if fields.iter().any(|(h, _)| *h == header) {
                header = format!("{} ({})", header, data_index);
            }
            fields.push((header, data_index.clone()));
        }

        if fields.is_empty() {
            if let Some(first) = self.rows.first() {
                fields = first.keys().map(|k| (k.clone(), k.clone())).collect();
            }
        }

        let mut dataset = Dataset::new();
        for record in &self.rows {
            let mut row = ScrapedRow::new();
            for (header, data_index) in &fields {
                row.insert(
                    header.clone(),
                    record.get(data_index).map(value_to_cell).unwrap_or_default(),
                );
            }
            dataset.push(row);
        }
        dataset
    }
}

/// JSON値をセル文字列にする (null は空)
pub fn value_to_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// ERPのURL・セレクタ・メニュー経路
#[derive(Debug, Clone)]
pub struct ErpSiteConfig {
    pub login_url: String,
    /// 会社コード (不要なシステムでは None)
    pub company_code: Option<String>,
    pub company_selector: String,
    pub user_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    /// ログイン後に順にクリックするメニュー名
    pub menu_path: Vec<String>,
    /// メニュー項目として探す要素
    pub menu_item_selector: String,
    /// 画面上に複数グリッドがある場合の対象 (0始まり)
    pub grid_index: usize,
    pub grid_timeout: Duration,
    pub login_patterns: Vec<String>,
    pub export_prefix: String,
}

impl Default for ErpSiteConfig {
    fn default() -> Self {
        Self {
            login_url: String::new(),
            company_code: None,
            company_selector: "input[name='COMP_CODE']".to_string(),
            user_selector: "input[name='USER_ID']".to_string(),
            password_selector: "input[name='PASSWORD']".to_string(),
            submit_selector: "#btnLogin".to_string(),
            menu_path: Vec::new(),
            menu_item_selector: ".x-tree-node-text, .x-menu-item-text, a, span".to_string(),
            grid_index: 0,
            grid_timeout: Duration::from_secs(60),
            login_patterns: vec!["login".to_string()],
            export_prefix: "erp_grid".to_string(),
        }
    }
}

impl ErpSiteConfig {
    pub fn new(login_url: impl Into<String>) -> Self {
        Self {
            login_url: login_url.into(),
            ..Default::default()
        }
    }

    pub fn with_company_code(mut self, code: impl Into<String>) -> Self {
        self.company_code = Some(code.into());
        self
    }

    pub fn with_menu_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.menu_path = path.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_export_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.export_prefix = prefix.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn grid(value: Value) -> GridData {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_into_dataset_uses_visible_columns() {
        let data = grid(json!({
            "columns": [
                {"dataIndex": "ITEM_CODE", "text": "품목코드"},
                {"dataIndex": "ITEM_NAME", "text": "품목명 "},
                {"dataIndex": "SECRET", "text": "내부", "hidden": true},
                {"text": "선택"},
                {"dataIndex": "QTY", "text": ""}
            ],
            "rows": [
                {"ITEM_CODE": "A-001", "ITEM_NAME": "볼트", "SECRET": "x", "QTY": 12},
                {"ITEM_CODE": "A-002", "ITEM_NAME": null, "QTY": 3.5}
            ]
        }));

        let dataset = data.into_dataset();
        assert_eq!(dataset.columns, vec!["품목코드", "품목명", "QTY"]);
        assert_eq!(dataset.records()[0], vec!["A-001", "볼트", "12"]);
        assert_eq!(dataset.records()[1], vec!["A-002", "", "3.5"]);
    }

    #[test]
    fn test_into_dataset_duplicate_headers() {
        let data = grid(json!({
            "columns": [
                {"dataIndex": "IN_QTY", "text": "수량"},
                {"dataIndex": "OUT_QTY", "text": "수량"}
            ],
            "rows": [{"IN_QTY": 1, "OUT_QTY": 2}]
        }));

        let dataset = data.into_dataset();
        assert_eq!(dataset.columns, vec!["수량", "수량 (OUT_QTY)"]);
        assert_eq!(dataset.records()[0], vec!["1", "2"]);
    }

    #[test]
    fn test_into_dataset_without_columns() {
        let data = grid(json!({
            "columns": [],
            "rows": [{"a": "1", "b": true}]
        }));

        let dataset = data.into_dataset();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.rows[0].get("a"), Some("1"));
        assert_eq!(dataset.rows[0].get("b"), Some("true"));
    }

    #[test]
    fn test_value_to_cell() {
        assert_eq!(value_to_cell(&json!(null)), "");
        assert_eq!(value_to_cell(&json!("  x ")), "x");
        assert_eq!(value_to_cell(&json!(10)), "10");
        assert_eq!(value_to_cell(&json!([1, 2])), "[1,2]");
    }

    #[test]
    fn test_site_config_builder() {
        let site = ErpSiteConfig::new("https://erp.example.com/login")
            .with_company_code("MASTER")
            .with_menu_path(["영업관리", "매출현황"]);
        assert_eq!(site.company_code.as_deref(), Some("MASTER"));
        assert_eq!(site.menu_path, vec!["영업관리", "매출현황"]);
    }
}
