//! 掩膜工具: 6 邻域腐蚀, 以及 4D 模板前两个体积的阈值二值化.

use clap::{Parser, Subcommand};
use pet_berry::morph;
use pet_berry::prelude::*;
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
    /// 对掩膜做一次 6 邻域二值腐蚀.
    Erode {
        /// 输入掩膜 (nii / nii.gz), 值大于 0 视为前景.
        input: PathBuf,

        /// 输出掩膜.
        output: PathBuf,
    },

    /// 将 4D 模板前两个体积按阈值二值化并取并集.
    Binarize {
        /// 输入 4D 模板, 至少包含 2 个体积.
        input: PathBuf,

        /// 输出掩膜.
        output: PathBuf,

        /// 阈值, 严格大于该值视为前景.
        #[arg(long, default_value_t = 0.1)]
        threshold: f32,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    utils::init_logger();
    let args = Args::parse();

    match args.command {
        Command::Erode { input, output } => {
            let mask = PetScan::open(&input)?;
            let eroded = morph::erode_6(&mask);
            eroded.save(&output)?;
            log::info!(
                "Eroded {} -> {} voxel(s), saved as {}",
                mask.data().iter().filter(|v| **v > 0.0).count(),
                eroded.count_nonzero(),
                output.display()
            );
        }
        Command::Binarize {
            input,
            output,
            threshold,
        } => {
            let volumes = PetScan::open_volumes(&input, 2)?;
            let mask = morph::binarize_union(&volumes[0], &volumes[1], threshold);
            mask.save(&output)?;
            log::info!(
                "Binary mask ({} voxel(s) > {threshold}) saved to {}",
                mask.count_nonzero(),
                output.display()
            );
        }
    }
    Ok(())
}
