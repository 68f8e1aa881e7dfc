//! JSON 配置文件.
//!
//! 配置文件提供默认值, 命令行参数优先. 示例:
//!
//! ```json
//! {
//!     "mode": "unpack",
//!     "frame_rate": "30000/1001",
//!     "time_base": "1/90000",
//!     "max_b_frames": 5,
//!     "max_nvop_size": 8,
//!     "log_dir": "logs"
//! }
//! ```

use anyhow::{Context, Result};
use clap::ValueEnum;
use m4vpack_codec::bsf::{DEFAULT_MAX_B_FRAMES, DEFAULT_MAX_NVOP_SIZE, PackConfig, UnpackConfig};
use m4vpack_core::Rational;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 默认帧率 (ES 文件本身不带容器时间戳)
pub const DEFAULT_FRAME_RATE: Rational = Rational::new(25, 1);
/// 默认时间基 (90kHz)
pub const DEFAULT_TIME_BASE: Rational = Rational::new(1, 90000);

/// 处理模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// packed -> 独立 VOP, 并重建 PTS
    #[default]
    Unpack,
    /// 独立 VOP -> packed
    Pack,
    /// 打包后再解包, 校验与直接解包的结果一致
    Roundtrip,
}

/// 配置文件内容, 所有字段可省略
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FileConfig {
    pub mode: Option<Mode>,
    pub frame_rate: Option<String>,
    pub time_base: Option<String>,
    pub max_b_frames: Option<usize>,
    pub max_nvop_size: Option<usize>,
    pub log_dir: Option<PathBuf>,
}

impl FileConfig {
    /// 从 JSON 文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))
    }
}

/// 命令行参数中可覆盖配置文件的部分
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub mode: Option<Mode>,
    pub frame_rate: Option<String>,
    pub time_base: Option<String>,
    pub max_b_frames: Option<usize>,
    pub log_dir: Option<PathBuf>,
}

/// 合并后的运行配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub mode: Mode,
    pub frame_rate: Rational,
    pub time_base: Rational,
    pub max_b_frames: usize,
    pub max_nvop_size: usize,
    pub log_dir: PathBuf,
}

impl Settings {
    /// 合并配置文件与命令行参数, 命令行优先
    pub fn resolve(file: FileConfig, cli: Overrides) -> Result<Self> {
        let parse = |value: Option<String>, default: Rational, what: &str| -> Result<Rational> {
            match value {
                Some(s) => s
                    .parse::<Rational>()
                    .with_context(|| format!("无效的{what}: {s}")),
                None => Ok(default),
            }
        };

        let frame_rate = parse(
            cli.frame_rate.or(file.frame_rate),
            DEFAULT_FRAME_RATE,
            "帧率",
        )?;
        let time_base = parse(cli.time_base.or(file.time_base), DEFAULT_TIME_BASE, "时间基")?;

        Ok(Self {
            mode: cli.mode.or(file.mode).unwrap_or_default(),
            frame_rate,
            time_base,
            max_b_frames: cli
                .max_b_frames
                .or(file.max_b_frames)
                .unwrap_or(DEFAULT_MAX_B_FRAMES),
            max_nvop_size: file.max_nvop_size.unwrap_or(DEFAULT_MAX_NVOP_SIZE),
            log_dir: cli
                .log_dir
                .or(file.log_dir)
                .unwrap_or_else(|| PathBuf::from("logs")),
        })
    }

    pub fn unpack_config(&self) -> UnpackConfig {
        UnpackConfig {
            max_b_frames: self.max_b_frames,
            max_nvop_size: self.max_nvop_size,
        }
    }

    pub fn pack_config(&self) -> PackConfig {
        PackConfig {
            max_b_frames: self.max_b_frames,
        }
    }
}
