//! 被试标识与配套文件的命名约定.

use crate::consts::template;
use crate::error::{Result, RoiError};
use std::fmt;
use std::path::{Path, PathBuf};

/// 被试标识, 由队列组别, 被试号和扫描日期组成.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubjectId {
    /// 队列组别, 如 `DLB`, `HC`.
    pub group: String,

    /// 被试号 (通常为匿名化的病人编号).
    pub subject: String,

    /// 扫描日期目录名.
    pub date: String,
}

impl SubjectId {
    /// 创建标识.
    pub fn new(group: impl Into<String>, subject: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            subject: subject.into(),
            date: date.into(),
        }
    }

    /// 用该标识填充模板中的 `{group}`, `{ipp}`, `{date}` 占位符.
    pub fn fill(&self, template: &str) -> String {
        template
            .replace("{group}", &self.group)
            .replace("{ipp}", &self.subject)
            .replace("{date}", &self.date)
    }
}

/// 格式为 `{group}_{subject}_{date}`. 下游表格按该字符串连接, 不要更改.
impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.group, self.subject, self.date)
    }
}

/// 从扫描文件路径到被试标识和配套文件路径的映射.
///
/// 计算代码只通过该 trait 访问路径约定.
pub trait NamingPolicy: Sync {
    /// 从扫描文件路径推断被试标识.
    fn subject_of(&self, file: &Path) -> Result<SubjectId>;

    /// 被试的解剖图谱文件路径.
    fn atlas_path(&self, subject: &SubjectId) -> PathBuf;

    /// 被试的参考区域掩膜文件路径.
    fn reference_path(&self, subject: &SubjectId) -> PathBuf;
}

/// 默认目录约定: `{group}/{ipp}/{date}/[skip 层目录/]{文件}`,
/// 图谱与掩膜统一存放在 `atlas_dir` 下, 文件名由模板生成.
#[derive(Debug, Clone)]
pub struct FolderConvention {
    atlas_dir: PathBuf,
    atlas_template: String,
    reference_template: String,
    skip: usize,
}

impl FolderConvention {
    /// 使用默认模板 ([`template::ATLAS`], [`template::REFERENCE`]) 和零层额外目录.
    pub fn new<P: AsRef<Path>>(atlas_dir: P) -> Self {
        Self {
            atlas_dir: atlas_dir.as_ref().to_owned(),
            atlas_template: template::ATLAS.to_owned(),
            reference_template: template::REFERENCE.to_owned(),
            skip: 0,
        }
    }

    /// 设置日期目录与扫描文件之间的额外目录层数.
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// 设置图谱文件名模板.
    pub fn with_atlas_template(mut self, template: impl Into<String>) -> Self {
        self.atlas_template = template.into();
        self
    }

    /// 设置参考掩膜文件名模板.
    pub fn with_reference_template(mut self, template: impl Into<String>) -> Self {
        self.reference_template = template.into();
        self
    }

    /// 图谱与掩膜所在目录.
    #[inline]
    pub fn atlas_dir(&self) -> &Path {
        &self.atlas_dir
    }
}

impl NamingPolicy for FolderConvention {
    fn subject_of(&self, file: &Path) -> Result<SubjectId> {
        let err = || RoiError::SubjectPath(file.to_owned());

        // `ancestors()` 第 0 项为文件本身. 末尾的 `/` 不产生额外分量.
        let mut names = file
            .ancestors()
            .skip(1 + self.skip)
            .map(|p| p.file_name().and_then(|n| n.to_str()));
        let mut next = || names.next().flatten().ok_or_else(err);

        let date = next()?;
        let subject = next()?;
        let group = next()?;
        Ok(SubjectId::new(group, subject, date))
    }

    fn atlas_path(&self, subject: &SubjectId) -> PathBuf {
        self.atlas_dir.join(subject.fill(&self.atlas_template))
    }

    fn reference_path(&self, subject: &SubjectId) -> PathBuf {
        self.atlas_dir.join(subject.fill(&self.reference_template))
    }
}
