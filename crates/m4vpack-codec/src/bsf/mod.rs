//! 码流过滤器 (bitstream filter).
//!
//! 码流过滤器在压缩域内改写数据包, 不做解码. 本模块提供 MPEG-4 Part 2
//! packed bitstream 的两个方向:
//! - [`Mpeg4Unpacker`]: 把 packed 单元 (P+B 打包在一个包里, 空位用 N-VOP 占位)
//!   拆分为独立的 VOP 访问单元, 并从 DTS 重建 PTS
//! - [`Mpeg4Packer`]: 反方向, 把独立的 VOP 访问单元重新打包成 packed 形式

pub mod pack;
pub mod reorder;
pub mod unpack;

#[cfg(test)]
mod testutil;

pub use pack::Mpeg4Packer;
pub use reorder::PtsReorder;
pub use unpack::Mpeg4Unpacker;

use m4vpack_core::{M4vError, M4vResult};

use crate::packet::Packet;

/// 两个 I/P 帧之间允许的连续 B 帧数量默认上限
pub const DEFAULT_MAX_B_FRAMES: usize = 5;

/// 默认的 N-VOP 最大尺寸 (字节), 不超过该尺寸的单 VOP 包视为占位 N-VOP
pub const DEFAULT_MAX_NVOP_SIZE: usize = 8;

/// 码流过滤器 trait
///
/// 与解码器一致的推/拉接口:
/// 1. 调用 `send_packet()` 送入一个访问单元 (解码顺序)
/// 2. 循环调用 `receive_packet()` 直到返回 `NeedMoreData`
/// 3. 码流结束时送入空包, 取出缓存的帧, 直到返回 `Eof`
pub trait BitstreamFilter: Send {
    /// 获取过滤器名称
    fn name(&self) -> &str;

    /// 送入一个数据包
    ///
    /// # 参数
    /// - `packet`: 访问单元. 送入空包表示码流结束, 过滤器输出所有缓存的帧.
    ///
    /// # 返回
    /// - `Ok(())`: 数据包已接受 (可能被丢弃, 丢弃原因记录在日志中)
    /// - `Err(e)` 且 `e.is_fatal()`: 过滤器进入错误状态, 直到 `flush()`/`reset()`
    fn send_packet(&mut self, packet: Packet) -> M4vResult<()>;

    /// 取出一个处理后的数据包
    ///
    /// # 返回
    /// - `Ok(packet)`: 成功取出一个数据包
    /// - `Err(M4vError::NeedMoreData)`: 需要送入更多数据包
    /// - `Err(M4vError::Eof)`: 码流结束且所有数据包已取出
    fn receive_packet(&mut self) -> M4vResult<Packet>;

    /// 丢弃所有缓存的帧与中间状态
    ///
    /// 用于 seek. 已学习到的流参数 (帧时长, passthrough 模式等) 保留.
    fn flush(&mut self);

    /// 完全重置, 回到刚创建时的状态 (保留配置)
    fn reset(&mut self);
}

/// 解包配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnpackConfig {
    /// 两个 I/P 帧之间允许的连续 B 帧数量上限, 超出即为致命错误
    pub max_b_frames: usize,
    /// 不超过该尺寸的单 VOP 包视为 N-VOP 占位并丢弃
    pub max_nvop_size: usize,
}

impl Default for UnpackConfig {
    fn default() -> Self {
        Self {
            max_b_frames: DEFAULT_MAX_B_FRAMES,
            max_nvop_size: DEFAULT_MAX_NVOP_SIZE,
        }
    }
}

/// 打包配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackConfig {
    /// 两个 I/P 帧之间的连续 B 帧数量上限, 仅用于告警
    pub max_b_frames: usize,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            max_b_frames: DEFAULT_MAX_B_FRAMES,
        }
    }
}

/// 将过滤器当前可取出的数据包全部取出
///
/// `NeedMoreData` 与 `Eof` 都视为取完, 其他错误原样返回.
pub fn drain_filter(filter: &mut dyn BitstreamFilter) -> M4vResult<Vec<Packet>> {
    let mut out = Vec::new();
    loop {
        match filter.receive_packet() {
            Ok(pkt) => out.push(pkt),
            Err(M4vError::NeedMoreData) | Err(M4vError::Eof) => return Ok(out),
            Err(e) => return Err(e),
        }
    }
}
