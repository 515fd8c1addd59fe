//! ROI 批处理流水线.
//!
//! 每个扫描文件是一个相互独立的工作单元: 推断被试标识, 定位配套文件, 加载,
//! (可选) 写出 QC 图像, 计算结果行. 工作单元之间没有共享的可变状态.
//!
//! 单元失败策略为 "跳过并继续": 失败的文件及其原因记录在 [`BatchReport::failures`] 中,
//! 其余被试的结果不受影响. [`run_batch`] 同样驱动 [`crate::extract`] 中的提取器.

use crate::atlas::AtlasDef;
use crate::dataset::NamingPolicy;
use crate::error::{Result, RoiError};
use crate::qc::QcWriter;
use crate::roi::{compute_row, RoiRow};
use crate::SubjectData3d;
use std::any::Any;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::prelude::*;
        use std::sync::mpsc;
        use std::thread;
    }
}

/// 一次批处理的全部结果.
///
/// `rows` 按完成顺序排列, 该顺序在不同运行之间不确定, 调用者不应依赖它.
#[derive(Debug)]
pub struct BatchReport<T = RoiRow> {
    /// 成功的结果行.
    pub rows: Vec<T>,

    /// 失败的文件及原因.
    pub failures: Vec<(PathBuf, RoiError)>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T: fmt::Display> BatchReport<T> {
    /// 记录一个已完成的工作单元, 并立即写入日志.
    fn push(&mut self, file: PathBuf, result: Result<T>) {
        match result {
            Ok(row) => {
                log::info!("{row}");
                self.rows.push(row);
            }
            Err(e) => {
                log::error!("Failed {}: {e}", file.display());
                self.failures.push((file, e));
            }
        }
    }
}

impl<T> BatchReport<T> {
    /// 已完成的工作单元总数 (成功 + 失败).
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len() + self.failures.len()
    }

    /// 是否没有任何工作单元?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 是否所有工作单元都成功?
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 从 panic 负载中提取消息.
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// 执行单个工作单元, 并将 panic 转换为 [`RoiError::WorkerPanic`].
fn guarded<T, F>(unit: &F, file: &Path) -> Result<T>
where
    F: Fn(&Path) -> Result<T>,
{
    panic::catch_unwind(AssertUnwindSafe(|| unit(file)))
        .unwrap_or_else(|p| Err(RoiError::WorkerPanic(panic_message(p))))
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        /// 借助 `rayon`, 以 `workers` 个线程对每个文件并行执行 `unit`.
        ///
        /// 结果按完成顺序通过通道汇总到调用线程, 每完成一个即写入日志.
        /// 只有线程池创建失败会返回 `Err`.
        pub fn run_batch<P, T, F>(files: &[P], workers: NonZeroUsize, unit: F) -> Result<BatchReport<T>>
        where
            P: AsRef<Path> + Sync,
            T: Send + fmt::Display,
            F: Fn(&Path) -> Result<T> + Sync,
        {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers.get())
                .thread_name(|i| format!("roi-worker-{i}"))
                .build()
                .map_err(|e| RoiError::WorkerPool(e.to_string()))?;

            let (tx, rx) = mpsc::channel();
            let mut report = BatchReport::default();
            let unit = &unit;
            thread::scope(|s| {
                s.spawn(move || {
                    pool.install(|| {
                        files.par_iter().for_each_with(tx, |tx, f| {
                            let f = f.as_ref();
                            // 接收端在全部发送者释放之前不会关闭.
                            let _ = tx.send((f.to_owned(), guarded(unit, f)));
                        });
                    });
                });
                for (file, result) in rx {
                    report.push(file, result);
                }
            });
            Ok(report)
        }
    } else {
        /// 顺序对每个文件执行 `unit`. 未开启 `rayon` feature 时 `workers` 被忽略.
        pub fn run_batch<P, T, F>(files: &[P], workers: NonZeroUsize, unit: F) -> Result<BatchReport<T>>
        where
            P: AsRef<Path> + Sync,
            T: Send + fmt::Display,
            F: Fn(&Path) -> Result<T> + Sync,
        {
            log::debug!("rayon disabled, ignoring {workers} worker(s)");
            let mut report = BatchReport::default();
            for f in files.iter().map(AsRef::as_ref) {
                report.push(f.to_owned(), guarded(&unit, f));
            }
            Ok(report)
        }
    }
}

/// ROI 提取流水线.
///
/// 图谱定义只读共享; 路径约定由 `N` 注入; QC 图像是否写出由调用者决定.
pub struct RoiPipeline<'a, N: NamingPolicy> {
    atlas: &'a AtlasDef,
    naming: N,
    qc: Option<QcWriter>,
}

impl<'a, N: NamingPolicy> RoiPipeline<'a, N> {
    /// 创建不写 QC 图像的流水线.
    pub fn new(atlas: &'a AtlasDef, naming: N) -> Self {
        Self {
            atlas,
            naming,
            qc: None,
        }
    }

    /// 为每个被试额外写出 QC 图像.
    pub fn with_qc(mut self, qc: QcWriter) -> Self {
        self.qc = Some(qc);
        self
    }

    /// 路径约定.
    #[inline]
    pub fn naming(&self) -> &N {
        &self.naming
    }

    /// 定位并加载 `file` 对应被试的全部数据.
    ///
    /// 配套文件缺失时返回 [`RoiError::MissingCompanion`].
    pub fn load(&self, file: &Path) -> Result<(String, SubjectData3d)> {
        let subject = self.naming.subject_of(file)?;
        let subject_id = subject.to_string();

        let atlas_path = self.naming.atlas_path(&subject);
        let reference_path = self.naming.reference_path(&subject);
        for p in [&atlas_path, &reference_path] {
            if !p.is_file() {
                return Err(RoiError::MissingCompanion(subject_id, p.clone()));
            }
        }

        let data = SubjectData3d::open(&subject_id, file, &atlas_path, &reference_path)?;
        Ok((subject_id, data))
    }

    /// 处理单个扫描文件. QC 写入失败同样使该被试失败.
    pub fn process_file(&self, file: &Path) -> Result<RoiRow> {
        let (subject_id, data) = self.load(file)?;
        if let Some(qc) = &self.qc {
            qc.write(&subject_id, &data.scan, &data.reference)?;
        }
        compute_row(&subject_id, file, &data, self.atlas)
    }

    /// 以 `workers` 个线程处理 `files`, 见 [`run_batch`].
    #[inline]
    pub fn run<P>(&self, files: &[P], workers: NonZeroUsize) -> Result<BatchReport>
    where
        P: AsRef<Path> + Sync,
    {
        run_batch(files, workers, |f| self.process_file(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{FolderConvention, SubjectId};
    use crate::{PetLabel, PetScan};
    use ndarray::Array3;
    use std::collections::BTreeSet;
    use std::fs;

    const SHAPE: (usize, usize, usize) = (4, 4, 4);

    /// 在 `root/{group}/{ipp}/{date}/scan.nii.gz` 写出扫描, 并在 `atlas_dir` 下写出配套文件.
    fn write_subject(root: &Path, conv: &FolderConvention, id: &SubjectId, offset: f32) -> PathBuf {
        let dir = root.join(&id.group).join(&id.subject).join(&id.date);
        fs::create_dir_all(&dir).unwrap();

        let scan = PetScan::fake(Array3::from_shape_fn(SHAPE, |(z, h, w)| {
            (z * 16 + h * 4 + w) as f32 + offset
        }));
        let file = dir.join("scan.nii.gz");
        scan.save(&file).unwrap();

        let atlas = PetLabel::fake(Array3::from_shape_fn(SHAPE, |(z, _, _)| z as i32 + 1));
        atlas.save(conv.atlas_path(id)).unwrap();
        let pons = PetLabel::fake(Array3::from_shape_fn(SHAPE, |(z, h, _)| (z == 0 && h < 2) as i32));
        pons.save(conv.reference_path(id)).unwrap();
        file
    }

    fn fixture(n: usize) -> (tempfile::TempDir, FolderConvention, Vec<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        let atlas_dir = dir.path().join("results_assembly");
        fs::create_dir_all(&atlas_dir).unwrap();
        let conv = FolderConvention::new(&atlas_dir);
        let root = dir.path().join("HC");
        let files = (0..n)
            .map(|i| {
                let id = SubjectId::new("HC", format!("P{i:03}"), "2021-05-01");
                write_subject(&root, &conv, &id, i as f32 * 100.0)
            })
            .collect();
        (dir, conv, files)
    }

    fn atlas() -> AtlasDef {
        AtlasDef::from_pairs([(1, "Z0"), (4, "Z3"), (9, "Nowhere")])
    }

    #[test]
    fn test_process_file() {
        let (_dir, conv, files) = fixture(1);
        let atlas = atlas();
        let row = RoiPipeline::new(&atlas, conv).process_file(&files[0]).unwrap();
        assert_eq!(row.subject_id, "HC_P000_2021-05-01");
        assert_eq!(row.get("Z0"), Some(7.5));
        assert_eq!(row.get("Z3"), Some(55.5));
        assert_eq!(row.get("Nowhere"), None);
        assert_eq!(row.pons, Some(3.5));
    }

    #[test]
    fn test_run_row_set_invariant_to_workers() {
        let (_dir, conv, files) = fixture(5);
        let atlas = atlas();
        let pipeline = RoiPipeline::new(&atlas, conv);

        let mut seen = Vec::new();
        for k in [1, 2, 5] {
            let report = pipeline.run(&files, NonZeroUsize::new(k).unwrap()).unwrap();
            assert!(report.is_complete());
            assert_eq!(report.rows.len(), 5);
            let set: BTreeSet<String> = report
                .rows
                .iter()
                .map(|r| format!("{} {:?}", r.subject_id, r.pons))
                .collect();
            seen.push(set);
        }
        assert!(seen.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_run_skips_missing_companion() {
        let (_dir, conv, files) = fixture(4);
        let victim = SubjectId::new("HC", "P002", "2021-05-01");
        fs::remove_file(conv.atlas_path(&victim)).unwrap();

        let atlas = atlas();
        let report = RoiPipeline::new(&atlas, conv)
            .run(&files, NonZeroUsize::new(2).unwrap())
            .unwrap();
        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.failures.len(), 1);
        let (file, err) = &report.failures[0];
        assert_eq!(file, &files[2]);
        assert!(matches!(err, RoiError::MissingCompanion(s, _) if s == "HC_P002_2021-05-01"));
    }

    #[test]
    fn test_run_shape_mismatch_and_qc() {
        let (dir, conv, files) = fixture(2);
        let bad = SubjectId::new("HC", "P001", "2021-05-01");
        PetLabel::fake(Array3::zeros((4, 4, 3)))
            .save(conv.reference_path(&bad))
            .unwrap();

        let atlas = atlas();
        let qc = QcWriter::beside(dir.path().join("HC"));
        let report = RoiPipeline::new(&atlas, conv)
            .with_qc(qc.clone())
            .run(&files, NonZeroUsize::new(2).unwrap())
            .unwrap();
        assert_eq!(report.rows.len(), 1);
        assert!(matches!(report.failures[0].1, RoiError::ShapeMismatch(..)));
        assert!(qc.path_for("HC_P000_2021-05-01").is_file());
        assert!(!qc.path_for("HC_P001_2021-05-01").exists());
    }

    #[test]
    fn test_guarded_panic() {
        struct Boom;
        impl NamingPolicy for Boom {
            fn subject_of(&self, _: &Path) -> Result<SubjectId> {
                panic!("boom")
            }
            fn atlas_path(&self, _: &SubjectId) -> PathBuf {
                unreachable!()
            }
            fn reference_path(&self, _: &SubjectId) -> PathBuf {
                unreachable!()
            }
        }

        let atlas = atlas();
        let report = RoiPipeline::new(&atlas, Boom)
            .run(&[Path::new("a/b/c/d.nii")], NonZeroUsize::new(1).unwrap())
            .unwrap();
        assert!(report.rows.is_empty());
        assert!(matches!(&report.failures[0].1, RoiError::WorkerPanic(m) if m == "boom"));
    }
}
