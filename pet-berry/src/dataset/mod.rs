//! 数据集操作: 文件发现与被试命名约定.

mod discover;
mod naming;

pub use discover::{find_files, find_files_by, is_nifti_name};
pub use naming::{FolderConvention, NamingPolicy, SubjectId};
