//! # m4vpack-codec
//!
//! MPEG-4 Part 2 (ISO/IEC 14496-2) 码流层处理库.
//!
//! - [`packet`]: 压缩数据包抽象
//! - [`parsers::mpeg4`]: 起始码扫描、VOL/VOP 头部字段提取、N-VOP 合成
//! - [`bsf`]: packed bitstream 解包器与打包器
//!
//! ## 使用示例
//!
//! ```rust
//! use m4vpack_codec::bsf::{BitstreamFilter, Mpeg4Unpacker};
//! use m4vpack_codec::Packet;
//! use m4vpack_core::M4vError;
//!
//! let mut unpacker = Mpeg4Unpacker::new();
//! let vop = vec![0x00, 0x00, 0x01, 0xB6, 0x10, 0xAA, 0xAA, 0xAA, 0xAA];
//! unpacker.send_packet(Packet::from_data(vop).with_timing(0, 3600)).unwrap();
//! unpacker.send_packet(Packet::empty()).unwrap();
//!
//! let pkt = unpacker.receive_packet().unwrap();
//! assert_eq!(pkt.pts, 3600);
//! assert!(matches!(unpacker.receive_packet(), Err(M4vError::Eof)));
//! ```

pub mod bsf;
pub mod packet;
pub mod parsers;

// 重导出常用类型
pub use bsf::{BitstreamFilter, Mpeg4Packer, Mpeg4Unpacker, PackConfig, PtsReorder, UnpackConfig};
pub use packet::Packet;
