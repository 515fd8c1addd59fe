//! 附加提取器: 组织约束的 AAL 区域平均值, 单一团块掩膜平均值, 以及按质心重定位世界坐标原点.
//!
//! 每个提取器都提供 `process_file`, 可以直接交给 [`crate::pipeline::run_batch`] 并行执行.

use crate::atlas::AtlasDef;
use crate::consts::{aal, column, REALIGNED_SUFFIX};
use crate::error::{Result, RoiError};
use crate::roi::{Accum, NanCell};
use crate::{Idx3d, NiftiHeaderAttr, PetLabel, PetScan};
use ndarray::Zip;
use std::collections::{BTreeSet, HashMap};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

/// 提取器的单行结果: 来源路径和按列顺序排列的 (列名, 值).
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRow {
    /// 来源路径, 写入结果表的第一列.
    pub file: PathBuf,

    /// (列名, 值). 值为 `None` 表示没有参与平均的体素.
    pub values: Vec<(String, Option<f64>)>,
}

impl ValueRow {
    /// 构造结果行.
    pub fn new(file: impl Into<PathBuf>, values: Vec<(String, Option<f64>)>) -> Self {
        Self {
            file: file.into(),
            values,
        }
    }

    /// 按列名查询. 列不存在或为缺失值时返回 `None`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| *v)
    }
}

/// 单行日志格式: `[{file}] A=.., B=..`.
impl fmt::Display for ValueRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.file.display())?;
        for (name, v) in self.values.iter() {
            write!(f, " {name}={}", NanCell(*v))?;
        }
        Ok(())
    }
}

/// 检查 `found` 的形状是否与参考形状一致.
fn check_grid(what: &str, expected: Idx3d, found: Idx3d) -> Result<()> {
    match expected == found {
        true => Ok(()),
        false => Err(RoiError::GridMismatch(what.to_owned(), expected, found)),
    }
}

/// 该区域是否属于小脑 (半球或蚓部)?
#[inline]
fn is_cerebellar(name: &str) -> bool {
    name.starts_with(aal::CEREBELLUM) || name.starts_with(aal::VERMIS)
}

/// AAL 区域平均值, 只统计组织概率超过 `threshold` 的体素.
///
/// 普通区域只取灰质体素 (`gm > threshold`); 名称以 `Cerebellum` 或 `Vermis` 开头的区域
/// 取灰质或白质体素. 结果按图谱顺序排列, 随后追加三个复合区域 `Cerebellum`,
/// `Vermis`, `Whole_Cerebellum`, 它们合并对应前缀的全部标签, 同样取灰质或白质体素.
///
/// 图谱或组织概率图与扫描形状不一致时返回 [`RoiError::GridMismatch`].
pub fn aal_means(
    scan: &PetScan,
    atlas: &PetLabel,
    def: &AtlasDef,
    gm: &PetScan,
    wm: &PetScan,
    threshold: f32,
) -> Result<Vec<(String, Option<f64>)>> {
    let shape = scan.shape();
    check_grid("atlas", shape, atlas.shape())?;
    check_grid("grey matter map", shape, gm.shape())?;
    check_grid("white matter map", shape, wm.shape())?;

    let labels: BTreeSet<i32> = def.labels().collect();
    // 灰质内, 以及灰质或白质内的累积.
    let mut grey: HashMap<i32, Accum> = HashMap::new();
    let mut tissue: HashMap<i32, Accum> = HashMap::new();
    Zip::from(&scan.data())
        .and(&atlas.data())
        .and(&gm.data())
        .and(&wm.data())
        .for_each(|&v, &l, &g, &w| {
            if !labels.contains(&l) {
                return;
            }
            let in_grey = g > threshold;
            if in_grey {
                grey.entry(l).or_default().push(v);
            }
            if in_grey || w > threshold {
                tissue.entry(l).or_default().push(v);
            }
        });

    let mut values: Vec<(String, Option<f64>)> = def
        .structures()
        .iter()
        .map(|s| {
            let acc = match is_cerebellar(&s.name) {
                true => &tissue,
                false => &grey,
            };
            (s.name.clone(), acc.get(&s.label).and_then(Accum::mean))
        })
        .collect();

    let composite = |prefixes: &[&str]| {
        let members: BTreeSet<i32> = def
            .structures()
            .iter()
            .filter(|s| prefixes.iter().any(|p| s.name.starts_with(p)))
            .map(|s| s.label)
            .collect();
        let mut total = Accum::default();
        for acc in members.iter().filter_map(|l| tissue.get(l)) {
            total.merge(acc);
        }
        total.mean()
    };
    values.push((aal::CEREBELLUM.to_owned(), composite(&[aal::CEREBELLUM])));
    values.push((aal::VERMIS.to_owned(), composite(&[aal::VERMIS])));
    values.push((
        aal::WHOLE_CEREBELLUM.to_owned(),
        composite(&[aal::CEREBELLUM, aal::VERMIS]),
    ));
    Ok(values)
}

/// 扫描文件对应的 (灰质, 白质) 概率图路径, 位于扫描所在目录的 `mri/` 下.
pub fn tissue_paths(scan: &Path) -> (PathBuf, PathBuf) {
    let dir = scan.parent().unwrap_or_else(|| Path::new(""));
    (dir.join(aal::GM_MAP), dir.join(aal::WM_MAP))
}

/// 标准空间 AAL 图谱提取器. 图谱体和区域定义在所有扫描之间只读共享.
pub struct AalExtractor<'a> {
    def: &'a AtlasDef,
    atlas: &'a PetLabel,
    threshold: f32,
}

impl<'a> AalExtractor<'a> {
    /// 使用默认组织阈值 [`aal::TISSUE_THRESHOLD`].
    pub fn new(def: &'a AtlasDef, atlas: &'a PetLabel) -> Self {
        Self {
            def,
            atlas,
            threshold: aal::TISSUE_THRESHOLD,
        }
    }

    /// 替换组织概率阈值.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// 结果表的值列: 图谱区域 (按图谱顺序) 以及三个复合区域.
    pub fn columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self.def.names().collect();
        columns.extend([aal::CEREBELLUM, aal::VERMIS, aal::WHOLE_CEREBELLUM]);
        columns
    }

    /// 处理单个扫描文件. 灰质或白质概率图缺失时返回 [`RoiError::MissingCompanion`].
    pub fn process_file(&self, file: &Path) -> Result<ValueRow> {
        let (gm_path, wm_path) = tissue_paths(file);
        for p in [&gm_path, &wm_path] {
            if !p.is_file() {
                return Err(RoiError::MissingCompanion(file.display().to_string(), p.clone()));
            }
        }

        let scan = PetScan::open(file)?;
        let gm = PetScan::open(&gm_path)?;
        let wm = PetScan::open(&wm_path)?;
        let values = aal_means(&scan, self.atlas, self.def, &gm, &wm, self.threshold)?;
        Ok(ValueRow::new(file, values))
    }
}

/// 掩膜 (`mask > 0`) 内扫描强度的平均值. 掩膜为空时返回 `Ok(None)`.
///
/// 两者形状不一致时返回 [`RoiError::GridMismatch`].
pub fn cluster_mean(scan: &PetScan, mask: &PetScan) -> Result<Option<f64>> {
    check_grid("cluster mask", mask.shape(), scan.shape())?;
    let mut acc = Accum::default();
    Zip::from(&scan.data()).and(&mask.data()).for_each(|&v, &m| {
        if m > 0.0 {
            acc.push(v);
        }
    });
    Ok(acc.mean())
}

/// 文件名是否为 `{stem}.nii*` 形式 (`.nii`, `.nii.gz` 等)?
pub fn stem_matches(name: &OsStr, stem: &str) -> bool {
    name.to_str()
        .and_then(|s| s.strip_prefix(stem))
        .map_or(false, |rest| rest.starts_with(".nii"))
}

/// 单一团块掩膜提取器.
#[derive(Debug, Clone)]
pub struct ClusterExtractor {
    mask: PetScan,
}

impl ClusterExtractor {
    /// 以已加载的掩膜构造.
    pub fn new(mask: PetScan) -> Self {
        Self { mask }
    }

    /// 打开掩膜文件. 含多个体积的掩膜返回 [`RoiError::Dimensionality`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        PetScan::open_single(path).map(Self::new)
    }

    /// 掩膜内 (`> 0`) 的体素个数.
    pub fn voxel_count(&self) -> usize {
        self.mask.data().iter().filter(|m| **m > 0.0).count()
    }

    /// 掩膜体积, 以立方毫米为单位.
    pub fn volume_mm3(&self) -> f64 {
        self.voxel_count() as f64 * self.mask.voxel()
    }

    /// 处理单个扫描文件. 结果行的来源路径为扫描所在目录, 值列为 `mean`.
    ///
    /// 与掩膜形状不一致的扫描返回 [`RoiError::GridMismatch`], 由批处理记录并跳过.
    pub fn process_file(&self, file: &Path) -> Result<ValueRow> {
        let scan = PetScan::open_single(file)?;
        let mean = cluster_mean(&scan, &self.mask).map_err(|e| match e {
            RoiError::GridMismatch(_, expected, found) => {
                RoiError::GridMismatch(file.display().to_string(), expected, found)
            }
            other => other,
        })?;
        let dir = file.parent().unwrap_or_else(|| Path::new(""));
        Ok(ValueRow::new(dir, vec![(column::MEAN.to_owned(), mean)]))
    }
}

/// 以体素强度为权重的质心, 按体素坐标 `(i, j, k)` 即 `(W, H, z)` 给出.
///
/// 强度总和为 0 (或非有限值) 时返回 `None`.
pub fn center_of_mass(scan: &PetScan) -> Option<[f64; 3]> {
    let mut total = 0.0;
    let mut moment = [0.0; 3];
    for ((z, h, w), &v) in scan.data().indexed_iter() {
        let v = v as f64;
        total += v;
        moment[0] += v * w as f64;
        moment[1] += v * h as f64;
        moment[2] += v * z as f64;
    }
    (total != 0.0 && total.is_finite()).then(|| moment.map(|m| m / total))
}

/// 平移 `scan` 的世界坐标系, 使其质心落在世界坐标原点. 返回原质心的世界坐标.
pub fn recenter(scan: &mut PetScan) -> Option<[f64; 3]> {
    let com = scan.world_of(center_of_mass(scan)?);
    scan.shift_origin(com);
    Some(com)
}

/// 重定位结果的输出路径: 在 `.nii` / `.nii.gz` 扩展名之前追加 `_realigned`.
/// 其它文件名直接在末尾追加.
pub fn realigned_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = name.to_ascii_lowercase();
    let split = [".nii.gz", ".nii"]
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map_or(name.len(), |ext| name.len() - ext.len());
    let (stem, ext) = name.split_at(split);
    path.with_file_name(format!("{stem}{REALIGNED_SUFFIX}{ext}"))
}

/// 一次重定位的结果.
#[derive(Debug, Clone, PartialEq)]
pub struct Realigned {
    /// 输入文件.
    pub source: PathBuf,

    /// 输出文件.
    pub output: PathBuf,

    /// 原质心的世界坐标 (毫米), 即世界坐标系的平移量.
    pub shift: [f64; 3],
}

impl fmt::Display for Realigned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = self.shift;
        write!(
            f,
            "{} -> {} shift=({x:.3}, {y:.3}, {z:.3})",
            self.source.display(),
            self.output.display()
        )
    }
}

/// 打开 `file`, 将其质心平移到世界坐标原点后写出.
///
/// `overwrite` 为真时覆盖原文件, 否则写到 [`realigned_path`]. 体数据保持不变,
/// 只修改 header 中的仿射变换. 强度总和为 0 时返回 [`RoiError::ZeroMass`].
pub fn realign_file(file: &Path, overwrite: bool) -> Result<Realigned> {
    let mut scan = PetScan::open_single(file)?;
    let shift = recenter(&mut scan).ok_or_else(|| RoiError::ZeroMass(file.to_owned()))?;
    let output = match overwrite {
        true => file.to_owned(),
        false => realigned_path(file),
    };
    scan.save(&output)?;
    Ok(Realigned {
        source: file.to_owned(),
        output,
        shift,
    })
}
