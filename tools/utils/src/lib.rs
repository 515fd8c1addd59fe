//! 命令行工具依赖的通用组件.

use log::LevelFilter;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线, 以 `info` 级别输出.
#[inline]
pub fn sep() {
    log::info!("{SEP}");
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 解析日志级别. 无法识别时退回 `info`.
pub fn level_from_str(s: &str) -> LevelFilter {
    s.parse().unwrap_or(LevelFilter::Info)
}

/// 初始化日志.
///
/// 1. 若环境变量 `$RUST_LOG` 非空, 则按其值设置级别 (如 `debug`, `warn`);
/// 2. 否则, 使用 `info`.
///
/// 重复初始化不会报错, 只保留第一次的设置.
pub fn init_logger() {
    let level = std::env::var("RUST_LOG")
        .map(|s| level_from_str(&s))
        .unwrap_or(LevelFilter::Info);
    let _ = simple_logger::SimpleLogger::new()
        .with_level(level)
        .init();
}
