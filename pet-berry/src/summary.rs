//! 结果表的列统计: 变异系数 (CV) 与单变量线性回归 R².

use crate::error::{Result, RoiError};
use crate::table::{Cell, RoiTable};
use ordered_float::OrderedFloat;
use std::path::Path;

/// 按指标升序排列的 (列名, 指标值). 无法计算的指标为 `None`, 排在最后.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    metric: &'static str,
    entries: Vec<(String, Option<f64>)>,
}

impl Ranking {
    fn new(metric: &'static str, mut entries: Vec<(String, Option<f64>)>) -> Self {
        // 稳定排序, 值相同时保持列顺序.
        entries.sort_by_key(|(_, v)| (v.is_none(), v.map(OrderedFloat)));
        Self { metric, entries }
    }

    /// 指标名称.
    #[inline]
    pub fn metric(&self) -> &str {
        self.metric
    }

    /// 所有条目.
    #[inline]
    pub fn entries(&self) -> &[(String, Option<f64>)] {
        &self.entries
    }

    /// 按列名查询.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| *v)
    }

    /// 转换为两列表格 `region, {metric}`.
    pub fn to_table(&self) -> RoiTable {
        let rows = self
            .entries
            .iter()
            .map(|(n, v)| vec![Cell::Text(n.clone()), Cell::from(*v)])
            .collect();
        RoiTable::new(vec!["region".to_owned(), self.metric.to_owned()], rows)
    }

    /// 按扩展名写出 (`.xlsx` 或 CSV), 见 [`RoiTable::write`].
    #[inline]
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_table().write(path)
    }
}

/// 均值与样本方差 (自由度 n - 1). 少于 2 个值时返回 `None`.
fn mean_var(values: &[f64]) -> Option<(f64, f64)> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some((mean, ss / (n - 1) as f64))
}

/// 对每个数值列计算变异系数 `std / mean` (样本标准差), 忽略缺失值, 升序排列.
///
/// 少于 2 个有效值或均值为 0 的列, 结果为 `None`.
pub fn coefficient_of_variation(table: &RoiTable) -> Ranking {
    let entries = table
        .numeric_columns()
        .into_iter()
        .map(|name| {
            let values: Vec<f64> = table
                .column(name)
                .map(|c| c.into_iter().flatten().collect())
                .unwrap_or_default();
            let cv = mean_var(&values)
                .filter(|(mean, _)| *mean != 0.0)
                .map(|(mean, var)| var.sqrt() / mean);
            (name.to_owned(), cv)
        })
        .collect();
    Ranking::new("cv", entries)
}

/// 简单线性回归 (含截距) 的决定系数, 即 Pearson 相关系数的平方.
///
/// 任一变量方差为 0 时返回 `None`.
fn simple_r2(x: &[f64], y: &[f64]) -> Option<f64> {
    let (mx, vx) = mean_var(x)?;
    let (my, vy) = mean_var(y)?;
    if vx == 0.0 || vy == 0.0 {
        return None;
    }
    let n = x.len() as f64;
    let cov = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum::<f64>() / (n - 1.0);
    Some((cov * cov / (vx * vy)).min(1.0))
}

/// 对每个预测列计算其对 `target` 列的单变量回归 R², 升序排列.
///
/// 含任一缺失单元的行先被整行丢弃. 预测列为除 `target` 外的数值列,
/// 名称以 `target` 或 `age` 开头的列不参与. `target` 不存在时返回
/// [`RoiError::MissingColumn`].
pub fn r_squared(table: &RoiTable, target: &str) -> Result<Ranking> {
    let t_idx = table
        .column_index(target)
        .ok_or_else(|| RoiError::MissingColumn(target.to_owned()))?;

    let complete: Vec<&Vec<Cell>> = table
        .rows()
        .iter()
        .filter(|r| !r.iter().any(|c| matches!(c, Cell::Missing)))
        .collect();
    let column_of = |i: usize| -> Vec<f64> {
        complete.iter().filter_map(|r| r[i].as_f64()).collect()
    };

    let y = column_of(t_idx);
    if y.len() != complete.len() {
        // 目标列不是数值列.
        return Err(RoiError::MissingColumn(target.to_owned()));
    }

    let entries = table
        .numeric_columns()
        .into_iter()
        .filter(|name| !name.starts_with(target) && !name.starts_with("age"))
        .filter_map(|name| table.column_index(name).map(|i| (name, i)))
        .map(|(name, i)| {
            let x = column_of(i);
            let r2 = (x.len() == y.len()).then(|| simple_r2(&x, &y)).flatten();
            (name.to_owned(), r2)
        })
        .collect();
    Ok(Ranking::new("r2", entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(header: &[&str], rows: &[&[Option<f64>]]) -> RoiTable {
        let mut h = vec!["subject_id".to_owned()];
        h.extend(header.iter().map(|s| s.to_string()));
        let rows = rows
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let mut cells = vec![Cell::Text(format!("s{i}"))];
                cells.extend(r.iter().map(|v| Cell::from(*v)));
                cells
            })
            .collect();
        RoiTable::new(h, rows)
    }

    #[test]
    fn test_cv() {
        let t = table(
            &["flat", "spread", "single"],
            &[
                &[Some(2.0), Some(1.0), Some(1.0)],
                &[Some(2.0), Some(3.0), None],
                &[Some(2.0), None, None],
            ],
        );
        let cv = coefficient_of_variation(&t);
        assert_eq!(cv.get("flat"), Some(0.0));
        // mean 2, std sqrt(2).
        assert!((cv.get("spread").unwrap() - 2f64.sqrt() / 2.0).abs() < 1e-12);
        assert_eq!(cv.get("single"), None);

        let names: Vec<_> = cv.entries().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["flat", "spread", "single"]);
    }

    #[test]
    fn test_r2() {
        let t = table(
            &["cluster", "linear", "noisy", "age", "cluster_z"],
            &[
                &[Some(1.0), Some(3.0), Some(1.0), Some(60.0), Some(0.0)],
                &[Some(2.0), Some(5.0), Some(3.0), Some(61.0), Some(0.0)],
                &[Some(3.0), Some(7.0), Some(2.0), Some(62.0), Some(0.0)],
                &[Some(4.0), Some(9.0), Some(5.0), Some(63.0), Some(0.0)],
                &[Some(5.0), None, Some(0.0), Some(64.0), Some(0.0)],
            ],
        );
        let r2 = r_squared(&t, "cluster").unwrap();
        assert_eq!(r2.entries().len(), 2);
        assert!((r2.get("linear").unwrap() - 1.0).abs() < 1e-12);
        let noisy = r2.get("noisy").unwrap();
        assert!(noisy > 0.0 && noisy < 1.0);
        assert_eq!(r2.entries()[1].0, "linear");

        assert!(matches!(r_squared(&t, "missing"), Err(RoiError::MissingColumn(_))));
    }

    #[test]
    fn test_ranking_write() {
        let dir = tempfile::tempdir().unwrap();
        let t = table(&["A"], &[&[Some(1.0)], &[Some(3.0)]]);
        let cv = coefficient_of_variation(&t);

        let path = dir.path().join("cv.csv");
        cv.write(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("region,cv\nA,"));

        let path = dir.path().join("cv.xlsx");
        cv.write(&path).unwrap();
        let back = RoiTable::read(&path).unwrap();
        assert_eq!(back, cv.to_table());
    }
}
