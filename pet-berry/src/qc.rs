//! 质量控制 (QC) 叠加图.
//!
//! 在参考区域掩膜覆盖的中间层上, 以灰度绘制扫描, 并以半透明暖色绘制掩膜,
//! 供人工检查配准是否正确.

use crate::consts::{QC_ALPHA, QC_DIR_NAME, QC_SUFFIX};
use crate::error::Result;
use crate::{GrayWindow, LabelSlice, NiftiHeaderAttr, PetLabel, PetScan, ScanSlice};
use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};

/// 选择 QC 切片: 所有含非零掩膜体素的 z 索引的中位数.
///
/// 偶数个时取中间两者平均值并向下取整. 掩膜全为 0 时返回 `None`.
pub fn qc_slice_index(mask: &PetLabel) -> Option<usize> {
    let zs: Vec<usize> = mask
        .slice_iter()
        .enumerate()
        .filter_map(|(z, s)| (!s.is_background()).then_some(z))
        .collect();
    let n = zs.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(zs[n / 2]),
        _ => Some((zs[n / 2 - 1] + zs[n / 2]) / 2),
    }
}

/// "autumn" 色阶: `t` 从 0 到 1 对应红色到黄色.
#[inline]
fn autumn(t: f32) -> [f32; 3] {
    [255.0, 255.0 * t.clamp(0.0, 1.0), 0.0]
}

/// 将扫描切片与掩膜切片叠加为 RGB 图像.
///
/// 扫描按切片自身强度范围映射为灰度; 掩膜非零体素按非零值范围映射到 autumn 色阶,
/// 以 [`QC_ALPHA`] 的不透明度混合, 零值体素完全透明. 图像原点在左下角.
///
/// 两切片形状不一致时 panic.
pub fn render_overlay(scan: ScanSlice, mask: LabelSlice) -> RgbImage {
    assert_eq!(scan.shape(), mask.shape(), "扫描和掩膜切片形状不一致");

    let (height, width) = scan.shape();
    let window = scan
        .min_max()
        .and_then(|(lo, hi)| GrayWindow::from_range(lo, hi));
    let mask_range = mask.nonzero_min_max();

    let mut img = RgbImage::new(width as u32, height as u32);
    for ((h, w), &v) in scan.indexed_iter() {
        let gray = window.and_then(|win| win.eval_f32(v)).unwrap_or(0.0);
        let mut px = [gray; 3];

        let m = mask[(h, w)];
        if let (true, Some((lo, hi))) = (m != 0, mask_range) {
            let t = if hi > lo {
                (m - lo) as f32 / (hi - lo) as f32
            } else {
                0.0
            };
            let color = autumn(t);
            for (p, c) in px.iter_mut().zip(color) {
                *p = (1.0 - QC_ALPHA) * *p + QC_ALPHA * c;
            }
        }

        let px = px.map(|c| c.round().clamp(0.0, 255.0) as u8);
        img.put_pixel(w as u32, (height - 1 - h) as u32, Rgb(px));
    }
    img
}

/// QC 图像写出器.
#[derive(Debug, Clone)]
pub struct QcWriter {
    dir: PathBuf,
}

impl QcWriter {
    /// 将图像写到 `dir` 目录.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_owned(),
        }
    }

    /// 将图像写到与搜索根目录 `root` 同级的 `QC` 目录.
    pub fn beside<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self::new(root.parent().unwrap_or(root).join(QC_DIR_NAME))
    }

    /// 输出目录.
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 被试 QC 图像的完整路径 `{dir}/{subject_id}_qc.png`.
    #[inline]
    pub fn path_for(&self, subject_id: &str) -> PathBuf {
        self.dir.join(format!("{subject_id}{QC_SUFFIX}"))
    }

    /// 渲染并保存被试的 QC 图像, 返回写出的路径.
    ///
    /// 掩膜全为 0 时记录警告并返回 `Ok(None)`, 不写任何文件.
    /// 写入失败时返回 `Err`, 不会重试.
    pub fn write(&self, subject_id: &str, scan: &PetScan, mask: &PetLabel) -> Result<Option<PathBuf>> {
        let Some(z) = qc_slice_index(mask) else {
            log::warn!("[QC] No reference voxels found for {subject_id}, skipping");
            return Ok(None);
        };
        debug_assert!(z < scan.len_z());

        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(subject_id);
        render_overlay(scan.slice_at(z), mask.slice_at(z)).save(&path)?;
        log::debug!("[QC] {subject_id} (z={z}) -> {}", path.display());
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn mask_at(zs: &[usize]) -> PetLabel {
        PetLabel::fake(Array3::from_shape_fn((6, 3, 3), |(z, h, w)| {
            (zs.contains(&z) && h == 1 && w == 1) as i32
        }))
    }

    #[test]
    fn test_qc_slice_median() {
        assert_eq!(qc_slice_index(&mask_at(&[2, 3, 4])), Some(3));
        assert_eq!(qc_slice_index(&mask_at(&[1, 4])), Some(2));
        assert_eq!(qc_slice_index(&mask_at(&[5])), Some(5));
        assert_eq!(qc_slice_index(&mask_at(&[])), None);
    }

    #[test]
    fn test_render_overlay() {
        let scan = PetScan::fake(Array3::from_shape_fn((1, 2, 2), |(_, h, w)| (h * 2 + w) as f32));
        let mut mask = Array3::zeros((1, 2, 2));
        mask[(0, 0, 0)] = 1;
        let mask = PetLabel::fake(mask);

        let img = render_overlay(scan.slice_at(0), mask.slice_at(0));
        assert_eq!(img.dimensions(), (2, 2));
        // (h=0, w=0) 位于左下角, 灰度 0 与红色各半.
        assert_eq!(img.get_pixel(0, 1).0, [128, 0, 0]);
        // (h=1, w=1) 位于右上角, 灰度 255, 无掩膜.
        assert_eq!(img.get_pixel(1, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_qc_writer() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("HC");
        let writer = QcWriter::beside(&root);
        assert_eq!(writer.dir(), dir.path().join("QC"));

        let scan = PetScan::fake(Array3::from_elem((6, 3, 3), 1.0));
        let written = writer.write("HC_P1_d", &scan, &mask_at(&[2, 3, 4])).unwrap();
        let path = written.unwrap();
        assert_eq!(path, dir.path().join("QC").join("HC_P1_d_qc.png"));
        assert!(path.is_file());

        // 空掩膜: 不写文件, 不报错.
        let written = writer.write("HC_P2_d", &scan, &mask_at(&[])).unwrap();
        assert!(written.is_none());
        assert!(!writer.path_for("HC_P2_d").exists());
    }
}
