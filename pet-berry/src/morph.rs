//! 掩膜形态学操作: 6 邻域二值腐蚀, 以及多体积阈值二值化.

use crate::{Idx3d, NiftiHeaderAttr, PetLabel, PetScan};
use ndarray::{Array3, ArrayView3};

/// 获取 `pos` 上下前后左右六个点的坐标. 越界坐标在索引时得到 `None`.
#[inline]
fn diamond_neighbours((z, h, w): Idx3d) -> [Idx3d; 6] {
    [
        (z.wrapping_sub(1), h, w),
        (z.saturating_add(1), h, w),
        (z, h.wrapping_sub(1), w),
        (z, h.saturating_add(1), w),
        (z, h, w.wrapping_sub(1)),
        (z, h, w.saturating_add(1)),
    ]
}

/// 对 `fg` 前景做一次 6 邻域二值腐蚀. 数据范围外视为背景.
fn erode_view(fg: ArrayView3<bool>) -> Array3<i32> {
    Array3::from_shape_fn(fg.dim(), |pos| {
        let keep = fg[pos]
            && diamond_neighbours(pos)
                .iter()
                .all(|n| fg.get(*n).copied().unwrap_or(false));
        keep as i32
    })
}

/// 对掩膜做一次 6 邻域 (面相邻) 二值腐蚀.
///
/// 值大于 0 的体素视为前景 (按浮点比较, 部分容积值同样算作前景).
/// 只有自身及 6 个面相邻体素均为前景时才保留, 数据边界外视为背景.
/// 结果以 0 / 1 表示, 沿用原 header.
pub fn erode_6(mask: &PetScan) -> PetLabel {
    let fg = mask.data().mapv(|v| v > 0.0);
    PetLabel::like(mask, erode_view(fg.view()))
}

/// 两个体积的阈值并集: `(a > thr) | (b > thr)`, 结果以 0 / 1 表示, 沿用 `a` 的 header.
///
/// 两者形状不一致时 panic.
pub fn binarize_union(a: &PetScan, b: &PetScan, thr: f32) -> PetLabel {
    assert_eq!(a.shape(), b.shape(), "两个体积形状不一致");
    let data = ndarray::Zip::from(&a.data())
        .and(&b.data())
        .map_collect(|&x, &y| (x > thr || y > thr) as i32);
    PetLabel::like(a, data)
}
