//! 通用常量.

/// 结果表中的固定列名.
pub mod column {
    /// 被试标识列.
    pub const SUBJECT_ID: &str = "subject_id";

    /// 源扫描文件路径列.
    pub const FILE: &str = "file";

    /// 参考区域 (脑桥) 平均值列.
    pub const PONS: &str = "Pons";

    /// AAL 提取结果中的扫描路径列.
    pub const SCAN_PATH: &str = "scan_path";

    /// 团块掩膜平均值列.
    pub const MEAN: &str = "mean";

    /// 始终按文本读取的列.
    pub const TEXT: [&str; 3] = [SUBJECT_ID, FILE, SCAN_PATH];
}

/// AAL 图谱提取的组织约束.
pub mod aal {
    /// 灰质 / 白质概率阈值, 严格大于该值的体素参与平均.
    pub const TISSUE_THRESHOLD: f32 = 0.7;

    /// 相对扫描所在目录的灰质概率图.
    pub const GM_MAP: &str = "mri/wp1mri.nii";

    /// 相对扫描所在目录的白质概率图.
    pub const WM_MAP: &str = "mri/wp2mri.nii";

    /// 小脑半球区域名前缀, 同时是其复合区域的列名.
    pub const CEREBELLUM: &str = "Cerebellum";

    /// 小脑蚓部区域名前缀, 同时是其复合区域的列名.
    pub const VERMIS: &str = "Vermis";

    /// 小脑半球与蚓部合并的复合区域.
    pub const WHOLE_CEREBELLUM: &str = "Whole_Cerebellum";
}

/// 质心重定位后输出文件名在扩展名之前追加的后缀.
pub const REALIGNED_SUFFIX: &str = "_realigned";

/// 默认命名模板. 占位符为 `{group}`, `{ipp}`, `{date}`.
pub mod template {
    /// 被试原生空间的解剖图谱文件.
    pub const ATLAS: &str = "native_structures_{group}_{ipp}_{date}.nii.gz";

    /// 被试原生空间的脑桥参考掩膜文件.
    pub const REFERENCE: &str = "wfu_pons_native_{group}_{ipp}_{date}.nii.gz";
}

/// QC 图像所在目录名. 该目录与搜索根目录同级.
pub const QC_DIR_NAME: &str = "QC";

/// QC 图像文件名后缀.
pub const QC_SUFFIX: &str = "_qc.png";

/// QC 叠加图中掩膜的不透明度.
pub const QC_ALPHA: f32 = 0.5;
