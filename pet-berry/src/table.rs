//! 结果表: 按列名对齐的行集合, 以 xlsx 或 CSV 格式持久化.

use crate::atlas::AtlasDef;
use crate::consts::column;
use crate::error::{Result, RoiError};
use crate::extract::ValueRow;
use crate::roi::RoiRow;
use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_xlsxwriter::Workbook;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// xlsx 工作表的行数上限.
const XLSX_MAX_ROWS: usize = 1_048_576;

/// xlsx 工作表的列数上限.
const XLSX_MAX_COLS: usize = 16_384;

/// 路径是否以 `.xlsx` 结尾 (不区分大小写)?
fn is_xlsx(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("xlsx"))
}

/// 该列是否始终按文本读取?
#[inline]
fn is_text_column(name: &str) -> bool {
    column::TEXT.contains(&name)
}

/// 创建 `path` 的父目录.
fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// 表格单元.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// 文本 (标识, 路径等).
    Text(String),

    /// 数值.
    Number(f64),

    /// 缺失值. 在 CSV 中为空单元.
    Missing,
}

impl Cell {
    /// 数值视图. 文本和缺失值均返回 `None`.
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// 从 CSV 字段解析. 空字段和 `nan` 视为缺失值.
    fn parse(field: &str) -> Self {
        let field = field.trim();
        if field.is_empty() || field.eq_ignore_ascii_case("nan") {
            return Cell::Missing;
        }
        match field.parse::<f64>() {
            Ok(v) => Cell::Number(v),
            Err(_) => Cell::Text(field.to_owned()),
        }
    }

    fn to_field(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(v) => v.to_string(),
            Cell::Missing => String::new(),
        }
    }
}

impl Cell {
    /// 从 xlsx 单元读取. `text` 为真时字符串原样保留为文本.
    fn from_sheet(data: &Data, text: bool) -> Self {
        match data {
            Data::Int(v) => Cell::Number(*v as f64),
            Data::Float(v) if v.is_finite() => Cell::Number(*v),
            Data::String(s) if text && !s.is_empty() => Cell::Text(s.clone()),
            Data::String(s) => Cell::parse(s),
            Data::Bool(b) => Cell::Text(b.to_string()),
            _ => Cell::Missing,
        }
    }
}

impl From<Option<f64>> for Cell {
    #[inline]
    fn from(v: Option<f64>) -> Self {
        v.map_or(Cell::Missing, Cell::Number)
    }
}

/// 结果表. 每行长度与表头一致, 缺失的区域以 [`Cell::Missing`] 补齐.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoiTable {
    header: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl RoiTable {
    /// 由结果行组装表格.
    ///
    /// 列顺序为 `subject_id`, `file`, 图谱区域 (按图谱顺序), 其余区域 (按首次出现顺序),
    /// `Pons`. 行顺序与 `rows` 一致.
    pub fn from_rows(atlas: &AtlasDef, rows: &[RoiRow]) -> Self {
        let mut regions: Vec<String> = atlas.names().map(str::to_owned).collect();
        for row in rows {
            for (name, _) in row.regions.iter() {
                if !regions.contains(name) {
                    regions.push(name.clone());
                }
            }
        }

        let mut header = Vec::with_capacity(regions.len() + 3);
        header.push(column::SUBJECT_ID.to_owned());
        header.push(column::FILE.to_owned());
        header.extend(regions.iter().cloned());
        header.push(column::PONS.to_owned());

        let rows = rows
            .iter()
            .map(|row| {
                let values: HashMap<&str, Option<f64>> = row
                    .regions
                    .iter()
                    .map(|(n, v)| (n.as_str(), *v))
                    .collect();
                let mut cells = Vec::with_capacity(header.len());
                cells.push(Cell::Text(row.subject_id.clone()));
                cells.push(Cell::Text(row.file.display().to_string()));
                cells.extend(
                    regions
                        .iter()
                        .map(|n| Cell::from(values.get(n.as_str()).copied().flatten())),
                );
                cells.push(Cell::from(row.pons));
                cells
            })
            .collect();

        Self { header, rows }
    }

    /// 由提取器结果行组装表格.
    ///
    /// 第一列为 `key`, 内容为各行的 [`ValueRow::file`]; 其后为 `columns`, 再之后是各行中
    /// 其余的值名, 按首次出现顺序排列. 行顺序与 `rows` 一致.
    pub fn from_values(key: &str, columns: &[&str], rows: &[ValueRow]) -> Self {
        let mut names: Vec<&str> = columns.to_vec();
        for row in rows {
            for (name, _) in row.values.iter() {
                if !names.contains(&name.as_str()) {
                    names.push(name.as_str());
                }
            }
        }

        let mut header = vec![key.to_owned()];
        header.extend(names.iter().map(|n| n.to_string()));
        let rows = rows
            .iter()
            .map(|row| {
                let mut cells = vec![Cell::Text(row.file.display().to_string())];
                cells.extend(names.iter().map(|n| Cell::from(row.get(n))));
                cells
            })
            .collect();
        Self { header, rows }
    }

    /// 将 `other` 的行追加到末尾. 列取两表的并集, 新列追加在右侧,
    /// 任一表中不存在的列以缺失值补齐.
    pub fn append(&mut self, other: RoiTable) {
        for h in other.header.iter() {
            if self.column_index(h).is_none() {
                self.header.push(h.clone());
                for row in self.rows.iter_mut() {
                    row.push(Cell::Missing);
                }
            }
        }

        let positions: Vec<usize> = other
            .header
            .iter()
            .filter_map(|h| self.column_index(h))
            .collect();
        for row in other.rows {
            let mut cells = vec![Cell::Missing; self.header.len()];
            for (cell, &i) in row.into_iter().zip(positions.iter()) {
                cells[i] = cell;
            }
            self.rows.push(cells);
        }
    }

    /// 直接由表头和行构造. 行长度与表头不一致时 panic.
    pub fn new(header: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        assert!(rows.iter().all(|r| r.len() == header.len()), "行长度与表头不一致");
        Self { header, rows }
    }

    /// 表头.
    #[inline]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// 所有行.
    #[inline]
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// 行数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 是否没有任何行?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 列名对应的下标.
    #[inline]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// 某列的数值视图. 文本和缺失值均为 `None`.
    pub fn column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| RoiError::MissingColumn(name.to_owned()))?;
        Ok(self.rows.iter().map(|r| r[idx].as_f64()).collect())
    }

    /// 数值列: 不含任何文本, 且至少有一个数值.
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.header
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let cells = || self.rows.iter().map(move |r| &r[*i]);
                cells().all(|c| !matches!(c, Cell::Text(_)))
                    && cells().any(|c| matches!(c, Cell::Number(_)))
            })
            .map(|(_, h)| h.as_str())
            .collect()
    }

    /// 按扩展名写出: `.xlsx` 写为工作簿, 其余按 CSV 写出.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        match is_xlsx(path) {
            true => self.write_xlsx(path),
            false => self.write_csv(path),
        }
    }

    /// 按扩展名读取, 规则同 [`RoiTable::write`].
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match is_xlsx(path) {
            true => Self::read_xlsx(path),
            false => Self::read_csv(path),
        }
    }

    /// 以 xlsx 格式写出到第一个工作表. 缺失值为空单元. 父目录不存在时自动创建.
    pub fn write_xlsx<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let (n_rows, n_cols) = (self.rows.len() + 1, self.header.len());
        if n_rows > XLSX_MAX_ROWS || n_cols > XLSX_MAX_COLS {
            return Err(RoiError::SheetLimit(n_rows, n_cols));
        }
        create_parent(path)?;

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        // 上面已检查行列上限, 以下转换不会截断.
        for (c, h) in self.header.iter().enumerate() {
            sheet.write_string(0, c as u16, h)?;
        }
        for (r, row) in self.rows.iter().enumerate() {
            let r = r as u32 + 1;
            for (c, cell) in row.iter().enumerate() {
                match cell {
                    Cell::Text(s) => {
                        sheet.write_string(r, c as u16, s)?;
                    }
                    Cell::Number(v) => {
                        sheet.write_number(r, c as u16, *v)?;
                    }
                    Cell::Missing => {}
                }
            }
        }
        workbook.save(path)?;
        Ok(())
    }

    /// 读取 xlsx 工作簿的第一个工作表. 第一行为表头, 文本列规则同 [`RoiTable::read_csv`].
    pub fn read_xlsx<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut workbook: Xlsx<_> = open_workbook(path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| RoiError::EmptyWorkbook(path.to_owned()))??;

        let mut rows_iter = range.rows();
        let header: Vec<String> = match rows_iter.next() {
            Some(first) => first.iter().map(|d| Cell::from_sheet(d, true).to_field()).collect(),
            None => return Ok(Self::default()),
        };
        let is_text: Vec<bool> = header.iter().map(|h| is_text_column(h)).collect();
        let rows: Vec<Vec<Cell>> = rows_iter
            .map(|r| {
                // 工作表区域是矩形的, 行长度与表头一致.
                r.iter()
                    .zip(is_text.iter())
                    .map(|(d, &text)| Cell::from_sheet(d, text))
                    .collect()
            })
            .collect();
        Ok(Self { header, rows })
    }

    /// 以 CSV 格式写出. 父目录不存在时自动创建.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        create_parent(path)?;

        let mut w = csv::Writer::from_path(path)?;
        w.write_record(&self.header)?;
        for row in self.rows.iter() {
            w.write_record(row.iter().map(Cell::to_field))?;
        }
        w.flush()?;
        Ok(())
    }

    /// 读取 CSV 表格. 第一行为表头.
    ///
    /// `subject_id`, `file`, `scan_path` 三列始终按文本读取, 其余列能解析为数值的单元按数值读取.
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut r = csv::Reader::from_path(path.as_ref())?;
        let header: Vec<String> = r.headers()?.iter().map(str::to_owned).collect();
        let is_text: Vec<bool> = header.iter().map(|h| is_text_column(h)).collect();

        let mut rows = Vec::new();
        for record in r.records() {
            let record = record?;
            let row = record
                .iter()
                .zip(is_text.iter())
                .map(|(field, &text)| match text {
                    true if !field.is_empty() => Cell::Text(field.to_owned()),
                    _ => Cell::parse(field),
                })
                .collect();
            rows.push(row);
        }
        Ok(Self { header, rows })
    }
}
