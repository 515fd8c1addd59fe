//! ROI 统计: 图谱区域平均值与参考区域平均值.

use crate::atlas::AtlasDef;
use crate::error::{Result, RoiError};
use crate::{NiftiHeaderAttr, PetLabel, PetScan, SubjectData3d};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// 单个被试的结果行.
///
/// 区域值为 `None` 表示该区域在该被试图谱中没有任何体素 (缺失值), 而不是 0.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiRow {
    /// 被试标识 `{group}_{ipp}_{date}`.
    pub subject_id: String,

    /// 源扫描文件路径.
    pub file: PathBuf,

    /// 按图谱顺序排列的 (区域名, 平均强度).
    pub regions: Vec<(String, Option<f64>)>,

    /// 参考区域 (脑桥) 平均强度.
    pub pons: Option<f64>,
}

impl RoiRow {
    /// 按区域名查询. 区域不存在或为缺失值时返回 `None`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.regions
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| *v)
    }
}

/// 将缺失值显示为 `NaN`.
pub(crate) struct NanCell(pub(crate) Option<f64>);

impl fmt::Display for NanCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v:.6}"),
            None => f.write_str("NaN"),
        }
    }
}

/// 单行日志格式: `{subject_id} [{file}] A=.., B=.., Pons=..`.
impl fmt::Display for RoiRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.subject_id, self.file.display())?;
        for (name, v) in self.regions.iter() {
            write!(f, " {name}={}", NanCell(*v))?;
        }
        write!(f, " Pons={}", NanCell(self.pons))
    }
}

/// 按区域累积 (和, 个数).
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Accum {
    sum: f64,
    count: u64,
}

impl Accum {
    #[inline]
    pub(crate) fn push(&mut self, v: f32) {
        self.sum += v as f64;
        self.count += 1;
    }

    /// 并入另一个累加器.
    #[inline]
    pub(crate) fn merge(&mut self, other: &Accum) {
        self.sum += other.sum;
        self.count += other.count;
    }

    #[inline]
    pub(crate) fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// 对 `labels` 中的每个标签, 计算图谱值等于该标签的所有体素的扫描强度平均值.
///
/// 结果与 `labels` 按下标对齐. 没有匹配体素的标签得到 `None`.
/// 求和以 `f64` 按行优先序进行, 因此相同输入总是得到逐位相同的结果.
///
/// 若两者形状不一致, 则程序 panic.
pub fn roi_means<I: IntoIterator<Item = i32>>(
    scan: &PetScan,
    atlas: &PetLabel,
    labels: I,
) -> Vec<Option<f64>> {
    assert_eq!(scan.shape(), atlas.shape(), "扫描和图谱形状不一致");

    let labels: Vec<i32> = labels.into_iter().collect();
    // 标签可能重复, 共用同一个累加器.
    let mut slots: HashMap<i32, Accum> = labels.iter().map(|l| (*l, Accum::default())).collect();

    for (v, l) in scan.data().iter().zip(atlas.data().iter()) {
        if let Some(acc) = slots.get_mut(l) {
            acc.push(*v);
        }
    }
    labels.iter().map(|l| slots[l].mean()).collect()
}

/// 计算 `mask` 非零位置的扫描强度平均值. 掩膜全为 0 时返回 `None`.
///
/// 若两者形状不一致, 则程序 panic.
pub fn reference_mean(scan: &PetScan, mask: &PetLabel) -> Option<f64> {
    assert_eq!(scan.shape(), mask.shape(), "扫描和掩膜形状不一致");

    let mut acc = Accum::default();
    for (v, m) in scan.data().iter().zip(mask.data().iter()) {
        if *m != 0 {
            acc.push(*v);
        }
    }
    acc.mean()
}

/// 由已加载的被试数据计算结果行. 该函数没有副作用.
pub fn compute_row(
    subject_id: &str,
    file: &Path,
    data: &SubjectData3d,
    atlas: &AtlasDef,
) -> Result<RoiRow> {
    let (s, a, r) = (data.scan.shape(), data.atlas.shape(), data.reference.shape());
    if s != a || s != r {
        return Err(RoiError::ShapeMismatch(subject_id.to_owned(), s, a, r));
    }

    let means = roi_means(&data.scan, &data.atlas, atlas.labels());
    let regions = atlas
        .names()
        .map(str::to_owned)
        .zip(means)
        .collect();

    Ok(RoiRow {
        subject_id: subject_id.to_owned(),
        file: file.to_owned(),
        regions,
        pons: reference_mean(&data.scan, &data.reference),
    })
}
