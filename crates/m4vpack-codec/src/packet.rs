//! 压缩数据包 (Packet).
//!
//! 对标 FFmpeg 的 `AVPacket`, 表示一个访问单元 (一帧压缩视频数据) 及其时间信息.
//! Packet 在调用方、滤镜内部缓存槽位与输出队列之间按值移动, 不隐式复制.

use bytes::Bytes;
use m4vpack_core::Rational;
use m4vpack_core::timestamp::{self, NOPTS_VALUE};

/// 压缩数据包
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// 压缩数据
    pub data: Bytes,
    /// 显示时间戳 (PTS), `NOPTS_VALUE` 表示未设置
    pub pts: i64,
    /// 解码时间戳 (DTS), `NOPTS_VALUE` 表示未设置
    pub dts: i64,
    /// 数据包时长 (以 time_base 为单位), 0 表示未知
    pub duration: i64,
    /// 时间基
    pub time_base: Rational,
    /// 所属流的索引
    pub stream_index: usize,
    /// 是否为关键帧
    pub is_keyframe: bool,
    /// 在源数据中的字节偏移量 (-1 表示未知)
    pub pos: i64,
}

impl Packet {
    /// 创建空数据包
    ///
    /// 送入滤镜的空包表示流结束 (EOS), 滤镜随后排空内部缓存.
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            pts: NOPTS_VALUE,
            dts: NOPTS_VALUE,
            duration: 0,
            time_base: Rational::UNDEFINED,
            stream_index: 0,
            is_keyframe: false,
            pos: -1,
        }
    }

    /// 从数据创建数据包
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::empty()
        }
    }

    /// 设置 DTS 与时长 (构造测试/解封装数据时使用)
    pub fn with_timing(mut self, dts: i64, duration: i64) -> Self {
        self.dts = dts;
        self.duration = duration;
        self
    }

    /// 以新的负载替换数据, 保留全部时间与流信息
    pub fn with_data(&self, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..self.clone_meta()
        }
    }

    /// 复制除负载以外的元数据
    fn clone_meta(&self) -> Self {
        Self {
            data: Bytes::new(),
            pts: self.pts,
            dts: self.dts,
            duration: self.duration,
            time_base: self.time_base,
            stream_index: self.stream_index,
            is_keyframe: self.is_keyframe,
            pos: self.pos,
        }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否为空包 (EOS 信号)
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 是否携带有效 DTS
    pub fn has_dts(&self) -> bool {
        timestamp::is_valid(self.dts)
    }

    /// 是否携带有效 PTS
    pub fn has_pts(&self) -> bool {
        timestamp::is_valid(self.pts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_packet_is_eos() {
        let pkt = Packet::empty();
        assert!(pkt.is_empty());
        assert!(!pkt.has_dts());
        assert!(!pkt.has_pts());
    }

    #[test]
    fn test_with_data_keeps_timing() {
        let mut pkt = Packet::from_data(vec![1u8, 2, 3]).with_timing(40, 40);
        pkt.pts = 80;
        pkt.stream_index = 2;

        let part = pkt.with_data(pkt.data.slice(1..));
        assert_eq!(part.data.as_ref(), &[2, 3]);
        assert_eq!(part.dts, 40);
        assert_eq!(part.pts, 80);
        assert_eq!(part.duration, 40);
        assert_eq!(part.stream_index, 2);
    }
}
