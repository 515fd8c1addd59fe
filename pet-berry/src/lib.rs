#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 提供 PET 脑扫描 (NIfTI) 的结构化信息, 以及基于解剖图谱的 ROI 统计算法.
//!
//! # 注意
//!
//! 1. 该 crate 假设所有被试的扫描文件按照 `{组别}/{被试号}/{日期}/{文件名}`
//!   的目录结构组织. 该约定通过 [`dataset::NamingPolicy`] 注入, 可以替换.
//! 2. 单个被试的失败 (缺失图谱文件, 形状不一致等) 只影响该被试,
//!   不会中断整个批处理.
//!
//! # 开发计划
//!
//! ### 文件发现与被试识别 ✅
//!
//! 递归搜索给定文件名, 并从路径推断 `{group}_{ipp}_{date}` 形式的被试标识.
//!
//! 实现位于 `pet-berry/src/dataset`.
//!
//! ### ROI 平均值 ✅
//!
//! 对图谱中每个标签计算扫描体素的平均值, 以及参考区域 (脑桥, Pons) 的平均值.
//! 空区域得到缺失值而不是 0.
//!
//! 实现位于 `pet-berry/src/roi.rs`.
//!
//! ### QC 叠加图 ✅
//!
//! 在参考区域中间层绘制灰度背景 + 半透明掩膜, 供人工检查配准.
//!
//! 实现位于 `pet-berry/src/qc.rs`.
//!
//! ### 并行批处理与结果表 ✅
//!
//! 固定大小的线程池, 按完成顺序收集结果, 失败的被试单独记录.
//!
//! 实现位于 `pet-berry/src/pipeline.rs`, `pet-berry/src/table.rs`.
//!
//! ### 结果表统计 (CV, R²) ✅
//!
//! 实现位于 `pet-berry/src/summary.rs`.
//!
//! ### 掩膜腐蚀与二值化 ✅
//!
//! 实现位于 `pet-berry/src/morph.rs`.
//!
//! ### 附加提取器 ✅
//!
//! 组织约束的 AAL 区域平均值 (含小脑复合区域), 单一团块掩膜平均值,
//! 以及将质心平移到世界坐标原点的重定位.
//!
//! 实现位于 `pet-berry/src/extract.rs`.
//!
//! ### xlsx 结果表 ✅
//!
//! 输出路径以 `.xlsx` 结尾时写为工作簿, 否则为 CSV. 读取同理.
//!
//! 实现位于 `pet-berry/src/table.rs`.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 3D nii 文件基础数据结构.
mod data;

pub use data::{GrayWindow, LabelSlice, NiftiHeaderAttr, PetLabel, PetScan, ScanSlice, SubjectData3d};

pub mod atlas;
pub mod consts;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod morph;
pub mod pipeline;
pub mod prelude;
pub mod qc;
pub mod roi;
pub mod summary;
pub mod table;

pub use error::{Result, RoiError};
