//! # m4vpack
//!
//! MPEG-4 Part 2 packed bitstream 的打包与解包.
//!
//! 旧版 DivX 编码器把 P 帧和紧随其后的 B 帧打包进同一个数据包, 并用 N-VOP
//! 填补空出的槽位, 使 AVI 中保持一帧一包. m4vpack 提供两个方向的转换:
//! - **解包**: 拆分 P+B, 丢弃 N-VOP 占位, 由 DTS 重建 PTS
//! - **打包**: 把独立的 VOP 合并为 packed 形式, 合成 N-VOP 占位
//!
//! # 快速开始
//!
//! ```rust
//! use m4vpack::codec::{BitstreamFilter, Mpeg4Unpacker, Packet};
//! use m4vpack::core::Rational;
//!
//! let mut unpacker = Mpeg4Unpacker::new();
//! unpacker.set_frame_rate(Rational::new(25, 1), Rational::new(1, 90000)).unwrap();
//!
//! let vop = vec![0x00, 0x00, 0x01, 0xB6, 0x10, 0xAA, 0xAA, 0xAA, 0xAA];
//! unpacker.send_packet(Packet::from_data(vop).with_timing(0, 0)).unwrap();
//! assert_eq!(unpacker.receive_packet().unwrap().pts, 3600);
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `m4vpack-core` | 比特流读写、时间基、错误类型 |
//! | `m4vpack-codec` | 码流解析、解包器与打包器 |

/// 核心类型与工具
pub use m4vpack_core as core;

/// 码流解析与 packed bitstream 过滤器
pub use m4vpack_codec as codec;

/// 获取 m4vpack 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
