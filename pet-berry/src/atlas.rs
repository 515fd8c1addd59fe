//! 解剖图谱定义.

use crate::error::Result;
use serde::de::Error as _;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// 图谱中的单个结构.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Structure {
    /// 图谱体中该结构的整数标签.
    pub label: i32,

    /// 结构名, 同时也是结果表的列名.
    pub name: String,
}

/// 两种图谱文件格式: 结构列表, 或标签到区域名的映射 (AAL 风格, 键为十进制标签).
#[derive(Deserialize)]
#[serde(untagged)]
enum AtlasFile {
    Structures { structures: Vec<Structure> },
    Labels(Map<String, Value>),
}

impl AtlasFile {
    fn into_structures(self) -> serde_json::Result<Vec<Structure>> {
        let map = match self {
            AtlasFile::Structures { structures } => return Ok(structures),
            AtlasFile::Labels(map) => map,
        };
        map.into_iter()
            .map(|(key, value)| {
                let label = key
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| serde_json::Error::custom(format!("invalid atlas label `{key}`")))?;
                let name = match value {
                    Value::String(name) => name,
                    other => {
                        return Err(serde_json::Error::custom(format!(
                            "atlas label {label} maps to non-string {other}"
                        )))
                    }
                };
                Ok(Structure { label, name })
            })
            .collect()
    }
}

/// 有序的 (标签, 区域名) 列表.
///
/// 加载后只读, 可以在工作线程之间直接共享引用.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtlasDef {
    structures: Vec<Structure>,
}

impl AtlasDef {
    /// 从 JSON 文件加载. 支持两种格式:
    ///
    /// + `{"structures": [{"label": 1, "name": "..."}, ...]}`, 其余字段被忽略;
    /// + `{"1": "Precentral_L", "2": "Precentral_R", ...}`, 按文件中的键顺序排列.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    /// 从任意 JSON 输入加载.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let file: AtlasFile = serde_json::from_reader(reader)?;
        Ok(Self {
            structures: file.into_structures()?,
        })
    }

    /// 直接由 (标签, 区域名) 构造.
    pub fn from_pairs<I, S>(it: I) -> Self
    where
        I: IntoIterator<Item = (i32, S)>,
        S: Into<String>,
    {
        let structures = it
            .into_iter()
            .map(|(label, name)| Structure {
                label,
                name: name.into(),
            })
            .collect();
        Self { structures }
    }

    /// 所有结构, 保持文件中的顺序.
    #[inline]
    pub fn structures(&self) -> &[Structure] {
        &self.structures
    }

    /// 所有标签, 与 [`AtlasDef::names`] 按下标对齐.
    #[inline]
    pub fn labels(&self) -> impl ExactSizeIterator<Item = i32> + '_ {
        self.structures.iter().map(|s| s.label)
    }

    /// 所有区域名, 与 [`AtlasDef::labels`] 按下标对齐.
    #[inline]
    pub fn names(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.structures.iter().map(|s| s.name.as_str())
    }

    /// 结构个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.structures.len()
    }

    /// 是否没有任何结构?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::AtlasDef;
    use crate::RoiError;

    #[test]
    fn test_atlas_from_json() {
        let json = r#"{
            "version": 2,
            "structures": [
                {"label": 4, "name": "Putamen_L", "color": [1, 2, 3]},
                {"label": 2, "name": "Caudate_L"}
            ]
        }"#;
        let atlas = AtlasDef::from_reader(json.as_bytes()).unwrap();
        assert_eq!(atlas.len(), 2);
        assert_eq!(atlas.labels().collect::<Vec<_>>(), [4, 2]);
        assert_eq!(atlas.names().collect::<Vec<_>>(), ["Putamen_L", "Caudate_L"]);
        assert_eq!(atlas, AtlasDef::from_pairs([(4, "Putamen_L"), (2, "Caudate_L")]));
    }

    #[test]
    fn test_atlas_label_map() {
        let json = r#"{"2001": "Precentral_L", "9001": "Cerebellum_Crus1_L", "9100": "Vermis_1_2"}"#;
        let atlas = AtlasDef::from_reader(json.as_bytes()).unwrap();
        assert_eq!(atlas.labels().collect::<Vec<_>>(), [2001, 9001, 9100]);
        assert_eq!(
            atlas.names().collect::<Vec<_>>(),
            ["Precentral_L", "Cerebellum_Crus1_L", "Vermis_1_2"]
        );

        let bad = AtlasDef::from_reader(r#"{"1": 3}"#.as_bytes()).unwrap_err();
        assert!(matches!(bad, RoiError::Json(_)));
    }

    #[test]
    fn test_atlas_missing_key() {
        let err = AtlasDef::from_reader(r#"{"regions": []}"#.as_bytes()).unwrap_err();
        assert!(matches!(err, RoiError::Json(_)));
    }
}
