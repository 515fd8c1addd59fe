//! 运行时错误.

use crate::Idx3d;
use quick_error::quick_error;
use std::io::Error as IoError;
use std::path::PathBuf;

quick_error! {
    /// 本 crate 所有错误的统一类型.
    ///
    /// 除 [`RoiError::WorkerPool`] 外, 所有错误都只影响单个被试, 由批处理逐个收集.
    #[derive(Debug)]
    pub enum RoiError {
        /// 底层 NIfTI 读写错误.
        Nifti(err: nifti::NiftiError) {
            from()
            source(err)
            display("nifti error: {}", err)
        }

        /// 底层 I/O 错误.
        Io(err: IoError) {
            from()
            source(err)
            display("I/O error: {}", err)
        }

        /// 图谱定义 JSON 解析错误.
        Json(err: serde_json::Error) {
            from()
            source(err)
            display("atlas definition error: {}", err)
        }

        /// 结果表读写错误.
        Csv(err: csv::Error) {
            from()
            source(err)
            display("table error: {}", err)
        }

        /// xlsx 表格写入错误.
        XlsxWrite(err: rust_xlsxwriter::XlsxError) {
            from()
            source(err)
            display("xlsx write error: {}", err)
        }

        /// xlsx 表格读取错误.
        XlsxRead(err: calamine::XlsxError) {
            from()
            source(err)
            display("xlsx read error: {}", err)
        }

        /// xlsx 工作簿中没有任何工作表.
        EmptyWorkbook(path: PathBuf) {
            display("no worksheet in `{}`", path.display())
        }

        /// 表格超出 xlsx 工作表的行列上限.
        SheetLimit(rows: usize, cols: usize) {
            display("{} rows x {} columns exceed the worksheet limit", rows, cols)
        }

        /// QC 图像写入错误.
        Image(err: image::ImageError) {
            from()
            source(err)
            display("image error: {}", err)
        }

        /// 被试的图谱或参考掩膜文件不存在.
        MissingCompanion(subject: String, path: PathBuf) {
            display("missing companion file for `{}`: {}", subject, path.display())
        }

        /// 扫描, 图谱和参考掩膜的网格形状不一致. 形状均按 `(z, h, w)` 给出.
        ShapeMismatch(subject: String, scan: Idx3d, atlas: Idx3d, reference: Idx3d) {
            display(
                "shape mismatch for `{}`: scan {:?}, atlas {:?}, reference {:?}",
                subject, scan, atlas, reference
            )
        }

        /// 体数据维度既不是 3 也不是 4.
        Dimensionality(ndim: usize) {
            display("expected a 3-D or 4-D volume, found {} dimension(s)", ndim)
        }

        /// 体数据与参考网格形状不一致 (单一掩膜, 组织概率图等). 形状按 `(z, h, w)` 给出.
        GridMismatch(what: String, expected: Idx3d, found: Idx3d) {
            display("grid mismatch for `{}`: expected {:?}, found {:?}", what, expected, found)
        }

        /// 体数据强度总和为 0, 无法定义质心.
        ZeroMass(path: PathBuf) {
            display("volume `{}` has zero total intensity", path.display())
        }

        /// 4D 文件的体积数不足. `needed` 为所需体积数, `found` 为实际体积数.
        VolumeCount(needed: usize, found: usize) {
            display("expected at least {} volume(s), found {}", needed, found)
        }

        /// 无法从路径推断被试标识 (目录层级不足, 或目录名不是合法 UTF-8).
        SubjectPath(path: PathBuf) {
            display("cannot derive subject identity from `{}`", path.display())
        }

        /// 线程池创建失败. 该错误会中止整个批处理.
        WorkerPool(msg: String) {
            display("worker pool error: {}", msg)
        }

        /// 单个工作单元 panic.
        WorkerPanic(msg: String) {
            display("worker panicked: {}", msg)
        }

        /// 结果表中不存在某列.
        MissingColumn(name: String) {
            display("column `{}` not found", name)
        }
    }
}

/// 本 crate 的结果类型.
pub type Result<T> = std::result::Result<T, RoiError>;
