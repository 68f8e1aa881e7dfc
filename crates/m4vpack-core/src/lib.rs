//! # m4vpack-core
//!
//! m4vpack 核心库, 提供比特流读写、时间基与统一错误处理.
//!
//! 上层的 MPEG-4 Part 2 码流解析与 packed bitstream 打包/解包都建立在本 crate 之上.

pub mod bitreader;
pub mod bitwriter;
pub mod error;
pub mod rational;
pub mod timestamp;

// 重导出常用类型
pub use error::{M4vError, M4vResult};
pub use rational::Rational;
pub use timestamp::NOPTS_VALUE;
