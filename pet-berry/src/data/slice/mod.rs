//! PET scan/label 切片对象的操作.

use crate::Idx2d;
use ndarray::ArrayView2;
use std::ops::Index;

/// 3D 扫描的单个水平不可变切片, 按 `(H, W)` 索引.
#[derive(Debug, Clone, Copy)]
pub struct ScanSlice<'a> {
    data: ArrayView2<'a, f32>,
}

impl<'a> ScanSlice<'a> {
    /// 从二维视图创建切片.
    #[inline]
    pub fn new(data: ArrayView2<'a, f32>) -> Self {
        Self { data }
    }

    /// 切片形状 `(H, W)`.
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }

    /// 底层数据视图.
    #[inline]
    pub fn data(&self) -> ArrayView2<'a, f32> {
        self.data
    }

    /// 按行优先序迭代 (索引, 强度).
    #[inline]
    pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &f32)> {
        self.data.indexed_iter()
    }

    /// 切片中有限强度的最小值和最大值. 若不存在有限值, 则返回 `None`.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

impl Index<Idx2d> for ScanSlice<'_> {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

/// 3D 标签体的单个水平不可变切片, 按 `(H, W)` 索引.
#[derive(Debug, Clone, Copy)]
pub struct LabelSlice<'a> {
    data: ArrayView2<'a, i32>,
}

impl<'a> LabelSlice<'a> {
    /// 从二维视图创建切片.
    #[inline]
    pub fn new(data: ArrayView2<'a, i32>) -> Self {
        Self { data }
    }

    /// 切片形状 `(H, W)`.
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }

    /// 底层数据视图.
    #[inline]
    pub fn data(&self) -> ArrayView2<'a, i32> {
        self.data
    }

    /// 按行优先序迭代 (索引, 标签).
    #[inline]
    pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &i32)> {
        self.data.indexed_iter()
    }

    /// 切片是否全为背景 (0)?
    #[inline]
    pub fn is_background(&self) -> bool {
        self.data.iter().all(|p| *p == 0)
    }

    /// 切片中非零标签的最小值和最大值. 若切片全为背景, 则返回 `None`.
    pub fn nonzero_min_max(&self) -> Option<(i32, i32)> {
        self.data
            .iter()
            .copied()
            .filter(|p| *p != 0)
            .fold(None, |acc, p| match acc {
                None => Some((p, p)),
                Some((lo, hi)) => Some((lo.min(p), hi.max(p))),
            })
    }
}

impl Index<Idx2d> for LabelSlice<'_> {
    type Output = i32;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}
