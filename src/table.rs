//! スクレイプ結果の行データ

use serde::ser::{Serialize, SerializeMap, Serializer};

/// 列名 → 文字列値 の1行分 (列順を保持)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedRow {
    fields: Vec<(String, String)>,
}

impl ScrapedRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// 値を設定（同名の列があれば上書き）
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(c, _)| *c == column) {
            Some(field) => field.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(c, _)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for ScrapedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (column, value) in &self.fields {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// 行の集合と、初出順の列一覧
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<ScrapedRow>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: ScrapedRow) {
        for column in row.columns() {
            if !self.columns.iter().any(|c| c == column) {
                self.columns.push(column.to_string());
            }
        }
        self.rows.push(row);
    }

    /// 別のデータセット (次ページなど) を末尾に追加
    pub fn extend(&mut self, other: Dataset) {
        for row in other.rows {
            self.push(row);
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 列順に揃えた値の一覧（欠けている列は空文字）
    pub fn records(&self) -> Vec<Vec<&str>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| row.get(c).unwrap_or(""))
                    .collect()
            })
            .collect()
    }

    /// `<th>` と `<td>` のテキストからデータセットを組み立てる
    ///
    /// ヘッダーが無い表は `col_1, col_2, ...` を列名にする。ヘッダーより長い行は
    /// 足りない列名を生成し、全セル空の行は捨てる。同名のヘッダーは
    /// `Phone (2)` のように番号を付けて区別し、セルを失わない。
    pub fn from_cells(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut columns: Vec<String> = Vec::with_capacity(headers.len());
        for (i, header) in headers.iter().enumerate() {
            let header = normalize_text(header);
            let column = if header.is_empty() {
                generated_column(i + 1, &columns)
            } else {
                unique_column(&header, &columns)
            };
            columns.push(column);
        }

        let mut dataset = Dataset::new();
        for cells in rows {
            let cells: Vec<String> = cells.iter().map(|c| normalize_text(c)).collect();
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }

            while columns.len() < cells.len() {
                let column = generated_column(columns.len() + 1, &columns);
                columns.push(column);
            }

            let mut row = ScrapedRow::new();
            for (i, column) in columns.iter().enumerate() {
                row.insert(column.clone(), cells.get(i).cloned().unwrap_or_default());
            }
            dataset.push(row);
        }
        dataset
    }
}

/// `name`, `name (2)`, `name (3)` ... のうち未使用の最初の名前
fn unique_column(name: &str, taken: &[String]) -> String {
    let mut candidate = name.to_string();
    let mut n = 2;
    while taken.contains(&candidate) {
        candidate = format!("{} ({})", name, n);
        n += 1;
    }
    candidate
}

/// `col_{position}` から数えて未使用の最初の `col_N`
fn generated_column(position: usize, taken: &[String]) -> String {
    let mut n = position;
    loop {
        let candidate = format!("col_{}", n);
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// 連続する空白 (改行・タブ・nbsp含む) を1つのスペースにまとめる
pub fn normalize_text(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `2024-01-31`, `2024.01.31 10:20`, `24/01/31` のような日付らしい文字列か
pub fn looks_like_date(text: &str) -> bool {
    let text = text.trim();
    let digits: Vec<&str> = text
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .collect();
    if digits.len() < 3 {
        return false;
    }

    let has_separator = text.contains('-') || text.contains('.') || text.contains('/');
    if !has_separator {
        return false;
    }

    // 2桁年は `24.03.05` / `24/01/31` 形式のみ (`10.1.2` のようなバージョン番号を除く)
    let year_ok = match digits[0].len() {
        4 => digits[0].starts_with("19") || digits[0].starts_with("20"),
        2 => {
            let separator = text
                .strip_prefix(digits[0])
                .and_then(|rest| rest.chars().next());
            matches!(separator, Some('.') | Some('/'))
                && digits[1].len() == 2
                && digits[2].len() == 2
        }
        _ => false,
    };
    let month_ok = digits[1]
        .parse::<u32>()
        .map(|m| (1..=12).contains(&m))
        .unwrap_or(false);
    let day_ok = digits[2]
        .parse::<u32>()
        .map(|d| (1..=31).contains(&d))
        .unwrap_or(false);

    year_ok && month_ok && day_ok
}

/// `12KB`, `1.5 MB`, `300B` のようなサイズ表記か
pub fn looks_like_size(text: &str) -> bool {
    let upper = text.trim().to_ascii_uppercase();
    let number_part = ["KB", "MB", "GB", "BYTES", "B", "K", "M"]
        .iter()
        .find_map(|unit| upper.strip_suffix(unit));

    match number_part {
        Some(number) => {
            let number = number.trim().replace(',', "");
            !number.is_empty() && number.parse::<f64>().is_ok()
        }
        None => false,
    }
}
