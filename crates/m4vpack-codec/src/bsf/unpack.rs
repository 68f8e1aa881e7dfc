//! MPEG-4 Part 2 packed bitstream 解包.
//!
//! 旧版 DivX 编码器为了在 AVI 中保持一帧一包, 把 P 帧和紧随的 B 帧打包进同一个
//! 数据包, 并在空出来的位置放一个 N-VOP 占位:
//!
//! ```text
//! 原始:   I0  P3  B1  B2  P6
//! packed: I0 | P3+B1 | B2 | N-VOP | P6 ...
//! ```
//!
//! 解包器把 P+B 拆开, 把 B 部分暂存到下一个槽位 (DTS 顺延一个帧时长),
//! 丢弃 N-VOP 占位, 并通过 [`PtsReorder`] 重建 PTS.

use std::collections::VecDeque;

use bytes::Bytes;
use log::{debug, info, warn};
use m4vpack_core::timestamp::{self, NOPTS_VALUE};
use m4vpack_core::{M4vError, M4vResult, Rational};

use super::reorder::PtsReorder;
use super::{BitstreamFilter, UnpackConfig};
use crate::packet::Packet;
use crate::parsers::mpeg4::scan_packed;

/// packed bitstream 解包器
pub struct Mpeg4Unpacker {
    /// 配置
    config: UnpackConfig,
    /// 单帧时长, 来自 `set_frame_rate()` 或第一个带时长的数据包
    duration: Option<i64>,
    /// `set_frame_rate()` 给定的时长, `reset()` 后恢复
    configured_duration: Option<i64>,
    /// 从 packed 单元中拆出、等待下一槽位的 B 帧
    pending_b: Option<Packet>,
    /// PTS 重排器
    reorder: PtsReorder,
    /// 输出队列
    output: VecDeque<Packet>,
    /// 连续 B 帧溢出后锁定的错误 (记录上限值)
    overflow: Option<usize>,
    /// 是否已收到码流结束信号
    eos: bool,
}

impl Mpeg4Unpacker {
    /// 使用默认配置创建解包器
    pub fn new() -> Self {
        Self::with_config(UnpackConfig::default())
    }

    /// 使用指定配置创建解包器
    pub fn with_config(config: UnpackConfig) -> Self {
        Self {
            config,
            duration: None,
            configured_duration: None,
            pending_b: None,
            reorder: PtsReorder::new(config.max_b_frames),
            output: VecDeque::new(),
            overflow: None,
            eos: false,
        }
    }

    /// 获取配置
    pub fn config(&self) -> &UnpackConfig {
        &self.config
    }

    /// 根据帧率与时间基设置单帧时长
    ///
    /// 未设置时, 以第一个 `duration > 0` 的数据包为准, 在此之前的数据包被丢弃.
    pub fn set_frame_rate(&mut self, frame_rate: Rational, time_base: Rational) -> M4vResult<()> {
        let duration = timestamp::frame_duration(frame_rate, time_base).ok_or_else(|| {
            M4vError::InvalidArgument(format!(
                "无法由帧率 {} 与时间基 {} 计算帧时长",
                frame_rate, time_base
            ))
        })?;
        debug!("解包器帧时长: {} (帧率 {})", duration, frame_rate);
        self.configured_duration = Some(duration);
        self.duration = Some(duration);
        Ok(())
    }

    /// 当前使用的单帧时长
    pub fn duration(&self) -> Option<i64> {
        self.duration
    }

    /// 是否已切换到 passthrough 模式
    pub fn is_passthrough(&self) -> bool {
        self.reorder.is_passthrough()
    }

    /// 送入重排器, 溢出错误在此锁定
    fn push_reorder(&mut self, pkt: Packet, duration: i64) -> M4vResult<()> {
        let result = self.reorder.push(pkt, duration, &mut self.output);
        if let Err(M4vError::TooManyBFrames(max)) = &result {
            self.overflow = Some(*max);
        }
        result
    }

    /// 码流结束: 输出暂存的 B 帧与重排器中缓存的帧
    fn drain(&mut self) -> M4vResult<()> {
        self.eos = true;
        let Some(d) = self.duration else {
            return Ok(());
        };
        if let Some(b) = self.pending_b.take() {
            self.push_reorder(b, d)?;
        }
        self.reorder.drain(d, &mut self.output);
        Ok(())
    }

    /// 把 packed 单元拆成 P 部分 `[0, split)` 与 B 部分 `[split, end)`
    fn split_packed(&mut self, pkt: Packet, split: usize, duration: i64) -> M4vResult<()> {
        if self.pending_b.is_some() {
            warn!("缺少一个 N-VOP 包, 丢弃一个暂存的 B 帧");
        }

        let mut b_frame = pkt.with_data(pkt.data.slice(split..));
        b_frame.dts = timestamp::offset(pkt.dts, duration);
        b_frame.pts = NOPTS_VALUE;
        b_frame.is_keyframe = false;
        self.pending_b = Some(b_frame);

        let p_frame = pkt.with_data(pkt.data.slice(..split));
        debug!(
            "拆分 packed 单元: P {} 字节, B {} 字节, dts={}",
            p_frame.size(),
            pkt.size() - split,
            timestamp::display(pkt.dts)
        );
        self.push_reorder(p_frame, duration)
    }
}

impl Default for Mpeg4Unpacker {
    fn default() -> Self {
        Self::new()
    }
}

impl BitstreamFilter for Mpeg4Unpacker {
    fn name(&self) -> &str {
        "mpeg4_unpack_bframes"
    }

    fn send_packet(&mut self, mut pkt: Packet) -> M4vResult<()> {
        if let Some(max) = self.overflow {
            return Err(M4vError::TooManyBFrames(max));
        }
        if self.eos {
            return Err(M4vError::InvalidArgument(
                "码流已结束, 需要先 flush() 或 reset()".into(),
            ));
        }
        if pkt.is_empty() {
            return self.drain();
        }

        let duration = match self.duration {
            Some(d) => d,
            None if pkt.duration > 0 => {
                debug!("由数据包得到帧时长: {}", pkt.duration);
                self.duration = Some(pkt.duration);
                pkt.duration
            }
            None => {
                warn!("无法获取帧时长, 丢弃数据包 (dts={})", timestamp::display(pkt.dts));
                return Ok(());
            }
        };

        let scan = scan_packed(&pkt.data);

        if let Some(split) = scan.second_vop_pos {
            if scan.vop_count > 2 {
                warn!("一个数据包中有 {} 个 VOP, 只拆分第一个", scan.vop_count);
            }
            return self.split_packed(pkt, split, duration);
        }

        if scan.vop_count == 1 {
            if let Some(b_frame) = self.pending_b.take() {
                let b_dts = b_frame.dts;
                self.push_reorder(b_frame, duration)?;
                if pkt.size() <= self.config.max_nvop_size {
                    debug!("丢弃 N-VOP 占位 ({} 字节)", pkt.size());
                } else {
                    pkt.dts = timestamp::offset(b_dts, duration);
                    self.pending_b = Some(pkt);
                }
                return Ok(());
            }
        }

        if let Some(marker) = scan.packed_marker_pos {
            info!("改写 DivX user_data 中的 packed 标记 'p' -> 'n'");
            let mut data = pkt.data.to_vec();
            data[marker] = b'n';
            pkt.data = Bytes::from(data);
        }

        self.push_reorder(pkt, duration)
    }

    fn receive_packet(&mut self) -> M4vResult<Packet> {
        match self.output.pop_front() {
            Some(pkt) => Ok(pkt),
            None if self.eos => Err(M4vError::Eof),
            None => Err(M4vError::NeedMoreData),
        }
    }

    fn flush(&mut self) {
        self.pending_b = None;
        self.reorder.flush();
        self.output.clear();
        self.overflow = None;
        self.eos = false;
    }

    fn reset(&mut self) {
        self.flush();
        self.reorder.reset();
        self.duration = self.configured_duration;
    }
}
