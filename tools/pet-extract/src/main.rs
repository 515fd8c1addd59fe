//! 附加提取工具: 标准空间 AAL 区域平均值, 团块掩膜平均值, 质心重定位.

use clap::{Parser, Subcommand};
use pet_berry::consts::column;
use pet_berry::dataset::is_nifti_name;
use pet_berry::extract::{self, realign_file};
use pet_berry::prelude::*;
use std::error::Error;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// 工作线程数, 默认为可并行核心数.
    #[arg(long, global = true)]
    workers: Option<NonZeroUsize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 每个扫描的 AAL 区域平均值, 只统计灰质 (小脑区域为灰质或白质) 概率超过阈值的体素.
    Aal {
        /// 递归搜索的根目录.
        root_folder: PathBuf,

        /// AAL 区域定义 JSON, 形如 `{"1": "Precentral_L", ...}`.
        aal_json: PathBuf,

        /// 与扫描同一空间的 AAL 标签体.
        atlas: PathBuf,

        /// 输出表, 扩展名为 `.xlsx` 时写为工作簿, 否则为 CSV.
        output: PathBuf,

        /// 需要匹配的扫描文件名 (精确匹配).
        #[arg(long, default_value = "wr_petsuv.nii")]
        target: String,

        /// 组织概率阈值, 严格大于该值的体素参与平均.
        #[arg(long, default_value_t = pet_berry::consts::aal::TISSUE_THRESHOLD)]
        threshold: f32,
    },

    /// 每个扫描在单一团块掩膜 (值大于 0) 内的平均值. 输出表已存在时追加.
    Cluster {
        /// 文件名主干, 匹配 `{stem}.nii*`.
        stem: String,

        /// 递归搜索的根目录.
        folder: PathBuf,

        /// 团块掩膜.
        mask: PathBuf,

        /// 输出表, 扩展名为 `.xlsx` 时写为工作簿, 否则为 CSV.
        output: PathBuf,
    },

    /// 平移每个 nii / nii.gz 文件的仿射变换, 使其强度质心位于世界坐标原点.
    Realign {
        /// 递归搜索的根目录.
        folder: PathBuf,

        /// 覆盖原文件, 而不是写出 `*_realigned.nii(.gz)`.
        #[arg(long)]
        overwrite: bool,
    },
}

/// 记录失败的文件.
fn log_failures<T>(report: &BatchReport<T>) {
    for (path, err) in report.failures.iter() {
        log::warn!("  skipped {}: {err}", path.display());
    }
}

fn aal(
    root: &Path,
    aal_json: &Path,
    atlas: &Path,
    output: &Path,
    target: &str,
    threshold: f32,
    workers: NonZeroUsize,
) -> Result<(), Box<dyn Error>> {
    let def = AtlasDef::open(aal_json)?;
    let atlas = PetLabel::open(atlas)?;
    log::info!("Loaded {} AAL regions, atlas shape {:?}", def.len(), atlas.shape());

    let files = find_files(root, target);
    log::info!("Found {} `{target}` file(s) under {}", files.len(), root.display());

    let extractor = AalExtractor::new(&def, &atlas).with_threshold(threshold);
    let report = run_batch(&files, workers, |f| extractor.process_file(f))?;
    utils::sep();

    RoiTable::from_values(column::SCAN_PATH, &extractor.columns(), &report.rows).write(output)?;
    log::info!(
        "{} row(s) written to {}, {} failure(s)",
        report.rows.len(),
        output.display(),
        report.failures.len()
    );
    log_failures(&report);
    Ok(())
}

fn cluster(
    stem: &str,
    folder: &Path,
    mask: &Path,
    output: &Path,
    workers: NonZeroUsize,
) -> Result<(), Box<dyn Error>> {
    let extractor = ClusterExtractor::open(mask)?;
    log::info!(
        "Cluster mask {}: {} voxel(s), {:.1} mm³",
        mask.display(),
        extractor.voxel_count(),
        extractor.volume_mm3()
    );

    let files = find_files_by(folder, |name| extract::stem_matches(name, stem));
    if files.is_empty() {
        log::warn!("No `{stem}.nii*` file under {}", folder.display());
        return Ok(());
    }

    let report = run_batch(&files, workers, |f| extractor.process_file(f))?;
    utils::sep();
    log_failures(&report);
    if report.rows.is_empty() {
        log::warn!("No valid result, nothing saved");
        return Ok(());
    }

    let fresh = RoiTable::from_values(column::FILE, &[column::MEAN], &report.rows);
    let table = match output.is_file() {
        true => {
            let mut table = RoiTable::read(output)?;
            log::info!("Appending to {} existing row(s)", table.len());
            table.append(fresh);
            table
        }
        false => fresh,
    };
    table.write(output)?;
    log::info!("{} row(s) written to {}", table.len(), output.display());
    Ok(())
}

fn realign(folder: &Path, overwrite: bool, workers: NonZeroUsize) -> Result<(), Box<dyn Error>> {
    // 先收集完整列表, 本次写出的文件不会再被处理.
    let files = find_files_by(folder, is_nifti_name);
    log::info!("Found {} NIfTI file(s) under {}", files.len(), folder.display());

    let report = run_batch(&files, workers, |f| realign_file(f, overwrite))?;
    utils::sep();
    log::info!("{} file(s) realigned, {} failure(s)", report.rows.len(), report.failures.len());
    log_failures(&report);
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    utils::init_logger();
    let args = Args::parse();
    log::debug!("{args:?}");

    let workers = args
        .workers
        .or_else(|| NonZeroUsize::new(utils::cpus()))
        .unwrap_or(NonZeroUsize::MIN);
    log::info!("Running with {workers} worker(s)");

    match args.command {
        Command::Aal {
            root_folder,
            aal_json,
            atlas,
            output,
            target,
            threshold,
        } => aal(&root_folder, &aal_json, &atlas, &output, &target, threshold, workers),
        Command::Cluster {
            stem,
            folder,
            mask,
            output,
        } => cluster(&stem, &folder, &mask, &output, workers),
        Command::Realign { folder, overwrite } => realign(&folder, overwrite, workers),
    }
}
