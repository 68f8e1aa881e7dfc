//! m4vpack-cli - MPEG-4 Part 2 packed bitstream 命令行工具
//!
//! 读取 .m4v 原始码流, 按模式解包 (重建 PTS)、打包或做往返校验,
//! 输出处理后的原始码流, 可选输出 JSON 时间戳报告.

mod config;
mod framing;
mod logging;
mod pipeline;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;
use std::path::{Path, PathBuf};
use std::process;

use m4vpack_codec::parsers::mpeg4::extract_vol_header;
use m4vpack_core::timestamp;

use config::{FileConfig, Mode, Overrides, Settings};
use pipeline::Report;

#[derive(Parser, Debug)]
#[command(name = "m4vpack", version, about = "MPEG-4 Part 2 packed bitstream 打包/解包工具")]
struct Cli {
    /// 输入 .m4v 原始码流
    #[arg(short, long)]
    input: PathBuf,

    /// 输出 .m4v 原始码流
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 处理模式
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// 帧率 (如 "25" 或 "30000/1001")
    #[arg(short = 'r', long = "rate")]
    rate: Option<String>,

    /// 时间基 (默认 "1/90000")
    #[arg(long)]
    time_base: Option<String>,

    /// 两个 I/P 帧之间允许的连续 B 帧数量上限
    #[arg(long)]
    max_b_frames: Option<usize>,

    /// 输入是否为 packed 码流 (默认根据 DivX 签名自动判断)
    #[arg(long)]
    packed_input: Option<bool>,

    /// 输出 JSON 时间戳报告的路径
    #[arg(long)]
    report: Option<PathBuf>,

    /// JSON 配置文件, 命令行参数优先
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志目录
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// 覆盖输出文件
    #[arg(short = 'y', long)]
    overwrite: bool,

    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("错误: {e:#}");
        process::exit(1);
    }
}

fn check_writable(path: &Path, overwrite: bool) -> Result<()> {
    if !overwrite && path.exists() {
        bail!("输出文件已存在 '{}', 使用 -y 覆盖", path.display());
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let file_config = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(
        file_config,
        Overrides {
            mode: cli.mode,
            frame_rate: cli.rate.clone(),
            time_base: cli.time_base.clone(),
            max_b_frames: cli.max_b_frames,
            log_dir: cli.log_dir.clone(),
        },
    )?;

    logging::init(&settings.log_dir, "m4vpack-cli", cli.verbose)?;

    if cli.output.is_none() && cli.report.is_none() {
        bail!("必须指定输出文件 (-o) 或报告文件 (--report)");
    }
    for path in [&cli.output, &cli.report].into_iter().flatten() {
        check_writable(path, cli.overwrite)?;
    }

    let duration = timestamp::frame_duration(settings.frame_rate, settings.time_base)
        .with_context(|| {
            format!(
                "无法由帧率 {} 与时间基 {} 计算帧时长",
                settings.frame_rate, settings.time_base
            )
        })?;

    info!(
        "m4vpack {} 模式={:?} 帧率={} 时间基={} 帧时长={}",
        env!("CARGO_PKG_VERSION"),
        settings.mode,
        settings.frame_rate,
        settings.time_base,
        duration
    );

    let data = std::fs::read(&cli.input)
        .with_context(|| format!("无法读取输入文件 '{}'", cli.input.display()))?;
    let units =
        framing::split_elementary_stream(&data, duration, settings.time_base, cli.packed_input);
    if units.is_empty() {
        bail!("输入文件中没有找到 VOP: '{}'", cli.input.display());
    }
    let input_units = units.len();
    info!("输入: {} 字节, {} 个访问单元", data.len(), input_units);

    let vol = extract_vol_header(&data);
    let output = pipeline::process(&settings, vol.as_deref(), units)?;
    info!("输出: {} 个访问单元", output.len());

    if let Some(path) = &cli.output {
        let bytes: Vec<u8> = output.iter().flat_map(|p| p.data.iter().copied()).collect();
        std::fs::write(path, &bytes)
            .with_context(|| format!("无法写入输出文件 '{}'", path.display()))?;
        info!("已写入 {} ({} 字节)", path.display(), bytes.len());
    }

    if let Some(path) = &cli.report {
        let report = Report::new(&settings, input_units, &output);
        let json = serde_json::to_string_pretty(&report).context("序列化报告失败")?;
        std::fs::write(path, json)
            .with_context(|| format!("无法写入报告文件 '{}'", path.display()))?;
        info!("已写入报告 {}", path.display());
    }

    Ok(())
}
