//! データセットのファイル出力 (CSV / Excel / JSON)

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{Local, NaiveDateTime};
use rust_xlsxwriter::{Format, Workbook};
use tracing::info;

use crate::error::ScraperError;
use crate::table::Dataset;

/// Excelで開いたときに文字化けしないよう先頭に付けるBOM
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const XLSX_MAX_COLUMN_WIDTH: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    Csv,
    #[default]
    Xlsx,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            "json" => Ok(ExportFormat::Json),
            other => Err(ScraperError::Export(format!("未対応の出力形式: {}", other))),
        }
    }
}

/// 出力結果
#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub rows: usize,
}

/// `prefix_YYYYMMDD_HHMMSS.ext`
pub fn timestamped_filename(prefix: &str, extension: &str, now: NaiveDateTime) -> String {
    format!("{}_{}.{}", prefix, now.format("%Y%m%d_%H%M%S"), extension)
}

pub struct Exporter {
    dir: PathBuf,
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// タイムスタンプ付きファイル名で出力し、そのパスを返す
    pub fn export(
        &self,
        dataset: &Dataset,
        prefix: &str,
        format: ExportFormat,
    ) -> Result<PathBuf, ScraperError> {
        let now = Local::now().naive_local();
        let path = self
            .dir
            .join(timestamped_filename(prefix, format.extension(), now));
        self.export_to(dataset, &path, format)?;
        Ok(path)
    }

    /// 指定パスへ出力
    pub fn export_to(
        &self,
        dataset: &Dataset,
        path: &Path,
        format: ExportFormat,
    ) -> Result<(), ScraperError> {
        std::fs::create_dir_all(&self.dir)?;
        match format {
            ExportFormat::Csv => write_csv(dataset, path)?,
            ExportFormat::Xlsx => write_xlsx(dataset, path)?,
            ExportFormat::Json => write_json(dataset, path)?,
        }
        info!("Exported {} rows to {:?}", dataset.len(), path);
        Ok(())
    }
}

fn write_csv(dataset: &Dataset, path: &Path) -> Result<(), ScraperError> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(UTF8_BOM)?;

    let mut writer = csv::WriterBuilder::new().from_writer(file);
    writer.write_record(&dataset.columns)?;
    for record in dataset.records() {
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_xlsx(dataset: &Dataset, path: &Path) -> Result<(), ScraperError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let header_format = Format::new().set_bold();

    let mut widths: Vec<usize> = dataset.columns.iter().map(|c| c.chars().count()).collect();

    for (col, column) in dataset.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, column, &header_format)?;
    }
    for (row, record) in dataset.records().iter().enumerate() {
        for (col, value) in record.iter().enumerate() {
            worksheet.write_string(row as u32 + 1, col as u16, *value)?;
            widths[col] = widths[col].max(value.chars().count());
        }
    }
    for (col, width) in widths.iter().enumerate() {
        let width = (*width as f64 + 2.0).min(XLSX_MAX_COLUMN_WIDTH);
        worksheet.set_column_width(col as u16, width)?;
    }

    workbook.save(path)?;
    Ok(())
}

fn write_json(dataset: &Dataset, path: &Path) -> Result<(), ScraperError> {
    let json = serde_json::to_string_pretty(&dataset.rows)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ScrapedRow;
    use chrono::NaiveDate;

    fn sample() -> Dataset {
        let mut dataset = Dataset::new();
        dataset.push(
            ScrapedRow::new()
                .with("sender", "홍길동")
                .with("subject", "주간 보고, 1차"),
        );
        dataset.push(ScrapedRow::new().with("sender", "kim").with("size", "12KB"));
        dataset
    }

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("portal-scraper-export-{}-{}", name, std::process::id()))
    }

    #[test]
    fn test_timestamped_filename() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(9, 7, 1)
            .unwrap();
        assert_eq!(
            timestamped_filename("mail_list", "xlsx", now),
            "mail_list_20240305_090701.xlsx"
        );
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("excel".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_export_csv_with_bom() {
        let dir = temp_dir("csv");
        let path = Exporter::new(&dir)
            .export(&sample(), "mail", ExportFormat::Csv)
            .unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "sender,subject,size");
        assert_eq!(lines[1], "홍길동,\"주간 보고, 1차\",");
        assert_eq!(lines[2], "kim,,12KB");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_export_empty_dataset() {
        let dir = temp_dir("empty");
        let exporter = Exporter::new(&dir);
        for format in [ExportFormat::Csv, ExportFormat::Xlsx, ExportFormat::Json] {
            let path = exporter.export(&Dataset::new(), "empty", format).unwrap();
            assert!(path.exists());
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_export_json() {
        let dir = temp_dir("json");
        let path = Exporter::new(&dir)
            .export(&sample(), "mail", ExportFormat::Json)
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[0]["sender"], "홍길동");
        assert_eq!(value[1]["size"], "12KB");
        assert!(value[1].get("subject").is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_export_xlsx() {
        let dir = temp_dir("xlsx");
        let path = Exporter::new(&dir)
            .export(&sample(), "mail", ExportFormat::Xlsx)
            .unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("mail_") && name.ends_with(".xlsx"));
        // xlsx は zip コンテナ
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], b"PK");

        std::fs::remove_dir_all(&dir).ok();
    }
}
