use std::ops::Index;
use std::path::Path;

use ndarray::{Array3, ArrayD, ArrayView, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::error::{Result, RoiError};
use crate::Idx3d;

pub mod slice;
pub mod window;

pub use slice::{LabelSlice, ScanSlice};
pub use window::GrayWindow;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 读取 nii / nii.gz 文件, 返回 header 和 nifti 原生轴顺序的全部数据.
fn read_raw(path: &Path) -> Result<(BoxedHeader, ArrayD<f32>)> {
    let obj = ReaderOptions::new().read_file(path)?;
    let header = Box::new(obj.header().clone());
    let data = obj.into_volume().into_ndarray::<f32>()?;
    Ok((header, data))
}

/// 读取 nii / nii.gz 文件的第 `t` 个体积, 返回 header 和按 `(z, H, W)` 组织的体数据.
///
/// 3D 文件视为只有一个体积.
fn read_volume(path: &Path, t: usize) -> Result<(BoxedHeader, Array3<f32>)> {
    let (header, data) = read_raw(path)?;
    Ok((header, into_zhw(data, t)?))
}

/// 将 nifti 原生的 `[W, H, z(, t)]` 数组的第 `t` 个体积转换成 `(z, H, W)`.
/// 以后均按照该模式访问.
fn into_zhw<T: Clone>(data: ArrayD<T>, t: usize) -> Result<Array3<T>> {
    let data = match (data.ndim(), t) {
        (3, 0) => data,
        (3, _) => return Err(RoiError::VolumeCount(t + 1, 1)),
        (4, _) if t < data.len_of(Axis(3)) => data.index_axis_move(Axis(3), t),
        (4, _) => return Err(RoiError::VolumeCount(t + 1, data.len_of(Axis(3)))),
        (n, _) => return Err(RoiError::Dimensionality(n)),
    };
    let ndim = data.ndim();
    let data = data
        .into_dimensionality::<Ix3>()
        .map_err(|_| RoiError::Dimensionality(ndim))?;

    // hint: 原第一维向右增长, 原第二维向下增长.
    Ok(data.permuted_axes([2, 1, 0]).as_standard_layout().into_owned())
}

/// 为手动拼接的数据构造最小 header. `shape` 按 `(z, H, W)` 给出.
/// 仿射变换为单位阵.
///
/// 任一维度超过 `u16::MAX` 时 panic.
fn fake_header((z, h, w): Idx3d) -> BoxedHeader {
    let max = u16::MAX as usize;
    assert!(z <= max && h <= max && w <= max, "维度超出 nifti 表示范围: {:?}", (z, h, w));

    let mut header = Box::<NiftiHeader>::default();
    header.dim = [3, w as u16, h as u16, z as u16, 1, 1, 1, 1];
    header.pixdim = [1.0; 8];
    header.sform_code = 1;
    header.srow_x = [1.0, 0.0, 0.0, 0.0];
    header.srow_y = [0.0, 1.0, 0.0, 0.0];
    header.srow_z = [0.0, 0.0, 1.0, 0.0];
    header
}

/// 3D nii 文件 header 的共用属性和部分通用操作.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小, 按 `(z, H, W)` 给出.
    fn shape(&self) -> Idx3d;

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表空间 (相邻切片方向),
    /// 高 (自然图像的垂直方向), 宽 (自然图像的水平方向).
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, w, h, z, ..] = self.header().pixdim;
        [z as f64, h as f64, w as f64]
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 获取体素坐标到世界坐标的仿射变换的前三行.
    ///
    /// 体素坐标按 nifti 惯例以 `(i, j, k, 1)` 即 `(W, H, z, 1)` 排列.
    /// 优先使用 sform; `sform_code` 为 0 时退回到 pixdim 缩放加 qoffset 平移
    /// (忽略四元数旋转).
    fn affine(&self) -> [[f32; 4]; 3] {
        let h = self.header();
        if h.sform_code > 0 {
            return [h.srow_x, h.srow_y, h.srow_z];
        }
        let [_, dx, dy, dz, ..] = h.pixdim;
        [
            [dx, 0.0, 0.0, h.quatern_x],
            [0.0, dy, 0.0, h.quatern_y],
            [0.0, 0.0, dz, h.quatern_z],
        ]
    }

    /// 将体素坐标 `(i, j, k)` (可为小数) 映射到世界坐标 (毫米).
    fn world_of(&self, ijk: [f64; 3]) -> [f64; 3] {
        self.affine().map(|row| {
            row[..3]
                .iter()
                .zip(ijk)
                .map(|(a, v)| *a as f64 * v)
                .sum::<f64>()
                + row[3] as f64
        })
    }
}

/// nii 格式 3D PET 扫描, 包括 header 和体素强度. 强度以 `f32` 保存.
#[derive(Debug, Clone)]
pub struct PetScan {
    header: BoxedHeader,
    data: Array3<f32>,
}

impl NiftiHeaderAttr for PetScan {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for PetScan {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl PetScan {
    /// 打开 nii (或 nii.gz) 文件格式的 3D PET 扫描. `path` 为文件的本地路径.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_volume(path, 0)
    }

    /// 打开 4D nii 文件的第 `t` 个体积 (从 0 开始).
    /// 体积数不足时返回 [`RoiError::VolumeCount`].
    pub fn open_volume<P: AsRef<Path>>(path: P, t: usize) -> Result<Self> {
        let (header, data) = read_volume(path.as_ref(), t)?;
        Ok(Self { header, data })
    }

    /// 打开只含一个体积的 nii 文件. 含多个体积的 4D 文件返回 [`RoiError::Dimensionality`],
    /// 而不是静默地只取第一个体积.
    pub fn open_single<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (header, data) = read_raw(path.as_ref())?;
        if data.ndim() == 4 && data.len_of(Axis(3)) > 1 {
            return Err(RoiError::Dimensionality(4));
        }
        Ok(Self {
            header,
            data: into_zhw(data, 0)?,
        })
    }

    /// 平移世界坐标系, 使当前世界坐标 `origin` (毫米) 成为新的原点.
    ///
    /// sform 与 qform 的平移分量同时更新. sform 未设置时以 [`NiftiHeaderAttr::affine`]
    /// 补全, 并将 `sform_code` 设为 2 (aligned).
    pub fn shift_origin(&mut self, origin: [f64; 3]) {
        let mut rows = self.affine();
        for (row, o) in rows.iter_mut().zip(origin) {
            row[3] -= o as f32;
        }
        let h = &mut self.header;
        [h.srow_x, h.srow_y, h.srow_z] = rows;
        if h.sform_code <= 0 {
            h.sform_code = 2;
        }
        h.quatern_x -= origin[0] as f32;
        h.quatern_y -= origin[1] as f32;
        h.quatern_z -= origin[2] as f32;
    }

    /// 打开 4D nii 文件的前 `count` 个体积, 文件只读取一次.
    /// 体积数不足时返回 [`RoiError::VolumeCount`].
    pub fn open_volumes<P: AsRef<Path>>(path: P, count: usize) -> Result<Vec<Self>> {
        let (header, data) = read_raw(path.as_ref())?;
        (0..count)
            .map(|t| {
                Ok(Self {
                    header: header.clone(),
                    data: into_zhw(data.clone(), t)?,
                })
            })
            .collect()
    }

    /// 根据裸数据直接创建扫描. `data` 按 `(z, H, W)` 组织.
    ///
    /// # 注意
    ///
    /// 生成的 header 只包含维度信息, 你应仅将其用于实验目的.
    pub fn fake(data: Array3<f32>) -> Self {
        let header = fake_header(data.dim());
        Self { header, data }
    }

    /// 获取 3D 扫描 z 空间的第 `z_index` 层切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> ScanSlice<'_> {
        ScanSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }
}

/// nii 格式 3D 标签体 (解剖图谱或参考掩膜), 包括 header 和整数标签.
///
/// 以浮点编码的标签文件会被截断为整数.
#[derive(Debug, Clone)]
pub struct PetLabel {
    header: BoxedHeader,
    data: Array3<i32>,
}

impl NiftiHeaderAttr for PetLabel {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for PetLabel {
    type Output = i32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl PetLabel {
    /// 打开 nii (或 nii.gz) 文件格式的 3D 标签体. 如果打开成功,
    /// 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (header, data) = read_volume(path.as_ref(), 0)?;
        let data = data.mapv(|v| v as i32);
        Ok(Self { header, data })
    }

    /// 根据裸标签数据直接创建标签体. `data` 按 `(z, H, W)` 组织.
    ///
    /// # 注意
    ///
    /// 生成的 header 只包含维度信息, 你应仅将其用于实验目的.
    pub fn fake(data: Array3<i32>) -> Self {
        let header = fake_header(data.dim());
        Self { header, data }
    }

    /// 沿用任意体数据 `src` 的 header, 用新数据创建标签体. 形状不一致时 panic.
    pub fn like<V: NiftiHeaderAttr>(src: &V, data: Array3<i32>) -> Self {
        assert_eq!(src.shape(), data.dim(), "标签形状不一致");
        Self {
            header: Box::new(src.header().clone()),
            data,
        }
    }

    /// 获取 3D 标签 z 空间的第 `z_index` 层不可变切片.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> LabelSlice<'_> {
        LabelSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获取能按升序迭代 3D 标签水平不可变切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = LabelSlice<'_>> {
        self.data.axis_iter(Axis(0)).map(LabelSlice::new)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, i32, Ix3> {
        self.data.view()
    }

    /// 获取 3D 标签中非零体素个数.
    #[inline]
    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|p| **p != 0).count()
    }
}

macro_rules! impl_nifti_save {
    ($($vol: ty),+) => {
        $(
            impl $vol {
                /// 以 `self` 的 header 为参考, 按 nii (或 nii.gz) 格式保存到 `path`.
                /// 数据类型由元素类型决定, 轴顺序还原为 nifti 原生的 `[W, H, z]`.
                pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
                    let data = self.data.view().permuted_axes([2, 1, 0]);
                    WriterOptions::new(path.as_ref())
                        .reference_header(&self.header)
                        .write_nifti(&data)?;
                    Ok(())
                }
            }
        )+
    };
}

impl_nifti_save!(PetScan, PetLabel);

/// 单个被试的 3D PET 扫描, 原生空间解剖图谱与参考区域掩膜.
///
/// 三者形状由构造函数保证一致.
#[derive(Debug, Clone)]
pub struct SubjectData3d {
    /// 3D PET 扫描.
    pub scan: PetScan,

    /// 解剖图谱, 每个体素至多属于一个区域.
    pub atlas: PetLabel,

    /// 参考区域掩膜, 非零体素代表参考结构.
    pub reference: PetLabel,
}

impl SubjectData3d {
    /// 组合三个体数据. 若形状不一致, 则返回 [`RoiError::ShapeMismatch`].
    pub fn new(subject: &str, scan: PetScan, atlas: PetLabel, reference: PetLabel) -> Result<Self> {
        let shapes = (scan.shape(), atlas.shape(), reference.shape());
        if shapes.0 != shapes.1 || shapes.0 != shapes.2 {
            return Err(RoiError::ShapeMismatch(
                subject.to_owned(),
                shapes.0,
                shapes.1,
                shapes.2,
            ));
        }
        Ok(Self {
            scan,
            atlas,
            reference,
        })
    }

    /// 分别打开扫描, 图谱和参考掩膜. 如果任一文件打开失败或形状不一致, 则返回 `Err`.
    pub fn open(
        subject: &str,
        scan_path: impl AsRef<Path>,
        atlas_path: impl AsRef<Path>,
        reference_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let scan = PetScan::open(scan_path)?;
        let atlas = PetLabel::open(atlas_path)?;
        let reference = PetLabel::open(reference_path)?;
        Self::new(subject, scan, atlas, reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn ramp(shape: Idx3d) -> Array3<f32> {
        let (z, h, w) = shape;
        Array::range(1.0, (z * h * w) as f32 + 1.0, 1.0)
            .into_shape(shape)
            .unwrap()
    }

    #[test]
    fn test_shape_mismatch() {
        let scan = PetScan::fake(ramp((2, 3, 4)));
        let atlas = PetLabel::fake(Array3::zeros((2, 3, 4)));
        let reference = PetLabel::fake(Array3::zeros((2, 4, 3)));
        let err = SubjectData3d::new("HC_P1_d", scan, atlas, reference).unwrap_err();
        assert!(matches!(err, RoiError::ShapeMismatch(s, _, _, (2, 4, 3)) if s == "HC_P1_d"));
    }

    #[test]
    #[should_panic(expected = "维度超出")]
    fn test_fake_header_overflow() {
        PetLabel::fake(Array3::zeros((1, 1, u16::MAX as usize + 1)));
    }

    #[test]
    fn test_fake_header() {
        let scan = PetScan::fake(ramp((2, 3, 4)));
        assert_eq!(scan.shape(), (2, 3, 4));
        assert_eq!(scan.len_z(), 2);
        assert_eq!(scan.header().dim[1..4], [4, 3, 2]);
        assert_eq!(scan.voxel(), 1.0);
        assert_eq!(scan.world_of([1.0, 2.5, 3.0]), [1.0, 2.5, 3.0]);
    }

    /// 写出再读回, 轴顺序保持不变.
    #[test]
    fn test_label_save_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.nii.gz");

        let data = ramp((2, 3, 4)).mapv(|v| v as i32);
        let label = PetLabel::fake(data.clone());
        label.save(&path).unwrap();

        let back = PetLabel::open(&path).unwrap();
        assert_eq!(back.shape(), (2, 3, 4));
        assert_eq!(back.data(), data.view());
        assert_eq!(back[(1, 2, 3)], 24);
    }

    #[test]
    fn test_open_volumes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.nii.gz");
        let data = Array::from_shape_fn((4, 3, 2, 2), |(w, h, z, t)| {
            (t * 1000 + z * 100 + h * 10 + w) as f32
        });
        WriterOptions::new(&path).write_nifti(&data).unwrap();

        let volumes = PetScan::open_volumes(&path, 2).unwrap();
        assert_eq!(volumes.len(), 2);
        assert_eq!(volumes[0].shape(), (2, 3, 4));
        assert_eq!(volumes[1][(1, 2, 3)], 1123.0);
        assert_eq!(PetScan::open(&path).unwrap()[(1, 2, 3)], 123.0);
        assert!(matches!(
            PetScan::open_volumes(&path, 3),
            Err(RoiError::VolumeCount(3, 2))
        ));
        assert!(matches!(PetScan::open_single(&path), Err(RoiError::Dimensionality(4))));
    }

    #[test]
    fn test_shift_origin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.nii");

        let mut scan = PetScan::fake(ramp((2, 3, 4)));
        scan.shift_origin([1.0, -2.0, 0.5]);
        assert_eq!(scan.world_of([1.0, 2.0, 0.5]), [0.0, 4.0, 0.0]);
        scan.save(&path).unwrap();

        let back = PetScan::open_single(&path).unwrap();
        assert_eq!(back.header().sform_code, 1);
        assert_eq!(back.affine(), scan.affine());
        assert_eq!(back.data(), scan.data());
    }

    /// sform 未设置时, 以 pixdim 和 qoffset 补全仿射变换.
    #[test]
    fn test_shift_origin_without_sform() {
        let mut scan = PetScan::fake(ramp((2, 3, 4)));
        scan.header.sform_code = 0;
        scan.header.pixdim = [1.0, 2.0, 2.0, 3.0, 1.0, 1.0, 1.0, 1.0];
        scan.header.quatern_x = 10.0;
        assert_eq!(scan.world_of([1.0, 1.0, 1.0]), [12.0, 2.0, 3.0]);

        scan.shift_origin([12.0, 2.0, 3.0]);
        assert_eq!(scan.header().sform_code, 2);
        assert_eq!(scan.header().quatern_x, -2.0);
        assert_eq!(scan.world_of([1.0, 1.0, 1.0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_into_zhw_4d() {
        let data = Array::from_shape_fn((4, 3, 2, 2), |(w, h, z, t)| {
            (t * 1000 + z * 100 + h * 10 + w) as f32
        })
        .into_dyn();
        let zhw = into_zhw(data.clone(), 0).unwrap();
        assert_eq!(zhw.dim(), (2, 3, 4));
        assert_eq!(zhw[(1, 2, 3)], 123.0);
        assert_eq!(into_zhw(data.clone(), 1).unwrap()[(1, 2, 3)], 1123.0);
        assert!(matches!(into_zhw(data, 2), Err(RoiError::VolumeCount(3, 2))));

        let flat = Array::<f32, _>::zeros(5).into_dyn();
        assert!(matches!(into_zhw(flat, 0), Err(RoiError::Dimensionality(1))));
    }
}
