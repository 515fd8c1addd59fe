//! 批量计算 PET 扫描的图谱区域平均值与参考区域平均值, 写出结果表和 QC 图像.

use clap::Parser;
use pet_berry::prelude::*;
use std::error::Error;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 递归搜索的根目录, 子目录按 `{组别}/{被试号}/{日期}` 组织.
    root_folder: PathBuf,

    /// 需要匹配的扫描文件名 (精确匹配).
    target_filename: String,

    /// 图谱定义 JSON, 形如 `{"structures": [{"label": 1, "name": ".."}]}` 或 `{"1": ".."}`.
    atlas_json: PathBuf,

    /// 原生空间图谱和参考掩膜所在目录.
    atlas_folder: PathBuf,

    /// 输出结果表路径. 扩展名为 `.xlsx` 时写为工作簿, 否则为 CSV.
    output_table_path: PathBuf,

    /// 工作线程数, 默认为可并行核心数.
    worker_count: Option<NonZeroUsize>,

    /// 不生成 QC 图像.
    #[arg(long)]
    no_qc: bool,

    /// 日期目录与扫描文件之间额外的目录层数.
    #[arg(long, default_value_t = 0)]
    skip: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    utils::init_logger();
    let args = Args::parse();
    log::debug!("{args:?}");
    let start = Instant::now();

    let atlas = AtlasDef::open(&args.atlas_json)?;
    log::info!("Loaded {} structures from {}", atlas.len(), args.atlas_json.display());

    let files = find_files(&args.root_folder, &args.target_filename);
    log::info!(
        "Found {} `{}` file(s) under {}",
        files.len(),
        args.target_filename,
        args.root_folder.display()
    );

    let naming = FolderConvention::new(&args.atlas_folder).with_skip(args.skip);
    let mut pipeline = RoiPipeline::new(&atlas, naming);
    if !args.no_qc {
        let qc = QcWriter::beside(&args.root_folder);
        log::info!("QC images -> {}", qc.dir().display());
        pipeline = pipeline.with_qc(qc);
    }

    let workers = args
        .worker_count
        .or_else(|| NonZeroUsize::new(utils::cpus()))
        .unwrap_or(NonZeroUsize::MIN);
    log::info!("Running with {workers} worker(s)");
    utils::sep();

    let report = pipeline.run(&files, workers)?;

    utils::sep();
    RoiTable::from_rows(&atlas, &report.rows).write(&args.output_table_path)?;
    log::info!(
        "{} row(s) written to {}, {} failure(s), {:.2?} elapsed",
        report.rows.len(),
        args.output_table_path.display(),
        report.failures.len(),
        start.elapsed()
    );
    for (path, err) in report.failures.iter() {
        log::warn!("  skipped {}: {err}", path.display());
    }
    Ok(())
}
