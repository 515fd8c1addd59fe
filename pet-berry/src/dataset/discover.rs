//! 递归文件发现.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// 递归搜索 `root` 目录树下所有基本文件名恰好为 `target_name` 的文件.
///
/// 结果按目录遍历顺序给出, 不保证有序. 无法读取的目录或条目会被记录并跳过,
/// 不会中断整个搜索. `root` 不存在时返回空列表.
#[inline]
pub fn find_files<P: AsRef<Path>>(root: P, target_name: &str) -> Vec<PathBuf> {
    find_files_by(root, |name| name == target_name)
}

/// 是否为 NIfTI 文件名 (`.nii` 或 `.nii.gz`)?
pub fn is_nifti_name(name: &OsStr) -> bool {
    name.to_str()
        .map_or(false, |s| s.ends_with(".nii") || s.ends_with(".nii.gz"))
}

/// 递归搜索 `root` 目录树下所有基本文件名满足 `accept` 的文件. 遍历规则同 [`find_files`].
pub fn find_files_by<P, F>(root: P, accept: F) -> Vec<PathBuf>
where
    P: AsRef<Path>,
    F: Fn(&OsStr) -> bool,
{
    let mut ans = Vec::new();
    let mut pending = vec![root.as_ref().to_owned()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Skipping unreadable directory {}: {e}", dir.display());
                continue;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry in {}: {e}", dir.display());
                    continue;
                }
            };
            // 不跟随目录符号链接, 文件符号链接照常匹配.
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let path = entry.path();
            if is_dir {
                pending.push(path);
            } else if accept(&entry.file_name()) {
                ans.push(path);
            }
        }
    }
    ans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_files_nested() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("HC");
        for sub in ["P001/2021-05-01", "P002/2022-01-01", "P002/2022-01-01/extra"] {
            let d = root.join(sub);
            fs::create_dir_all(&d).unwrap();
            fs::write(d.join("scan.nii.gz"), b"").unwrap();
            fs::write(d.join("scan.nii.gz.bak"), b"").unwrap();
        }
        fs::write(root.join("other.nii.gz"), b"").unwrap();

        let mut found = find_files(&root, "scan.nii.gz");
        found.sort();
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|p| p.file_name().unwrap() == "scan.nii.gz"));
        assert!(found[0].ends_with("P001/2021-05-01/scan.nii.gz"));
    }

    #[test]
    fn test_find_nifti_files() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("s1");
        fs::create_dir_all(&sub).unwrap();
        for name in ["a.nii", "b.nii.gz", "c.nii.gz.bak", "d.txt"] {
            fs::write(sub.join(name), b"").unwrap();
        }
        fs::write(dir.path().join("e.nii"), b"").unwrap();

        let mut found = find_files_by(dir.path(), is_nifti_name);
        found.sort();
        let names: Vec<_> = found.iter().map(|p| p.file_name().unwrap()).collect();
        assert_eq!(names, ["e.nii", "a.nii", "b.nii.gz"]);
    }

    #[test]
    fn test_find_files_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_files(dir.path().join("nope"), "scan.nii.gz").is_empty());
    }
}
