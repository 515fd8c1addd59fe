//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::slice::{LabelSlice, ScanSlice};
pub use crate::data::window::GrayWindow;
pub use crate::data::{NiftiHeaderAttr, PetLabel, PetScan, SubjectData3d};

pub use crate::atlas::AtlasDef;
pub use crate::dataset::{self, find_files, find_files_by, FolderConvention, NamingPolicy, SubjectId};
pub use crate::error::RoiError;
pub use crate::extract::{AalExtractor, ClusterExtractor, ValueRow};

pub use crate::pipeline::{run_batch, BatchReport, RoiPipeline};
pub use crate::qc::QcWriter;
pub use crate::roi::RoiRow;
pub use crate::table::RoiTable;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    /// 全量导入后, `Result` 仍是标准库的双参数版本.
    #[test]
    fn test_glob_import_keeps_std_result() -> Result<(), Box<dyn Error>> {
        let atlas = AtlasDef::from_pairs([(1, "A")]);
        let err: Result<(), RoiError> = Err(RoiError::MissingColumn("B".into()));
        assert_eq!(atlas.len(), 1);
        assert!(err.is_err());
        Ok(())
    }
}
