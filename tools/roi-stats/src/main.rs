//! 结果表统计: 区域变异系数, 以及各区域对目标列的单变量 R².

use clap::{Parser, Subcommand};
use pet_berry::summary::{self, Ranking};
use pet_berry::table::RoiTable;
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 各数值列的变异系数 (样本标准差 / 均值), 升序.
    Cv {
        /// 输入结果表 (xlsx 或 CSV).
        table: PathBuf,

        /// 输出表, 扩展名为 `.xlsx` 时写为工作簿, 否则为 CSV. 省略时只打印.
        output: Option<PathBuf>,
    },

    /// 各区域对目标列的单变量线性回归 R², 升序.
    R2 {
        /// 输入表 (xlsx 或 CSV).
        table: PathBuf,

        /// 目标列名.
        target: String,

        /// 输出表, 扩展名为 `.xlsx` 时写为工作簿, 否则为 CSV. 省略时只打印.
        output: Option<PathBuf>,
    },
}

fn report(ranking: &Ranking, output: Option<&PathBuf>) -> Result<(), Box<dyn Error>> {
    utils::sep();
    for (name, v) in ranking.entries() {
        match v {
            Some(v) => log::info!("{name:<32} {v:.6}"),
            None => log::info!("{name:<32} NaN"),
        }
    }
    utils::sep();
    if let Some(path) = output {
        ranking.write(path)?;
        log::info!("{} written to {}", ranking.metric(), path.display());
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    utils::init_logger();
    let args = Args::parse();

    match args.command {
        Command::Cv { table, output } => {
            let table = RoiTable::read(&table)?;
            log::info!("ROIs sorted by coefficient of variation (lowest to highest):");
            report(&summary::coefficient_of_variation(&table), output.as_ref())
        }
        Command::R2 {
            table,
            target,
            output,
        } => {
            let table = RoiTable::read(&table)?;
            let ranking = summary::r_squared(&table, &target)?;
            log::info!("R² of each region against `{target}` (lowest to highest):");
            report(&ranking, output.as_ref())
        }
    }
}
