//! 由 DTS 重建 PTS 的重排规则.
//!
//! AVI 等容器只记录解码顺序的时间戳. 对于解码顺序 `I0 P3 B1 B2 P6 ...`,
//! 参考帧 (I/P) 的显示时间要晚于其后的 B 帧. 这里缓存一个参考帧和它之后的
//! B 帧序列, 等下一个参考帧到达 (或码流结束) 时统一计算 PTS 并按解码顺序输出:
//!
//! ```text
//! 缓存 <P1, B1..Bk>, 到达 P2:
//!   PTS(P1) = DTS(Bk) + d
//!   PTS(B1) = DTS(P1) + d
//!   PTS(Bi) = DTS(Bi-1) + d
//! ```
//!
//! 其中 d 为单帧时长.

use std::collections::VecDeque;

use log::{debug, error, info};
use m4vpack_core::timestamp;
use m4vpack_core::{M4vError, M4vResult};

use crate::packet::Packet;
use crate::parsers::mpeg4::{VopCodingType, first_vop};

/// PTS 重排器
pub struct PtsReorder {
    /// 连续 B 帧数量上限
    max_b_frames: usize,
    /// 第一个 I/P 帧是否已输出
    first_frame_written: bool,
    /// 等待确定 PTS 的参考帧
    held_frame: Option<Packet>,
    /// 参考帧之后收集到的 B 帧
    b_run: Vec<Packet>,
    /// 输入的 B 帧已带 PTS, 之后所有帧原样转发
    passthrough: bool,
}

impl PtsReorder {
    /// 创建重排器
    pub fn new(max_b_frames: usize) -> Self {
        Self {
            max_b_frames,
            first_frame_written: false,
            held_frame: None,
            b_run: Vec::with_capacity(max_b_frames),
            passthrough: false,
        }
    }

    /// 是否已切换到 passthrough 模式
    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    /// 当前缓存的帧数 (参考帧 + B 帧)
    pub fn buffered(&self) -> usize {
        usize::from(self.held_frame.is_some()) + self.b_run.len()
    }

    /// 处理一个解码顺序的访问单元, 确定 PTS 的帧追加到 `out`
    ///
    /// `duration` 为单帧时长. B 帧数量超过上限时返回
    /// [`M4vError::TooManyBFrames`], 该 B 帧被丢弃.
    pub fn push(
        &mut self,
        mut pkt: Packet,
        duration: i64,
        out: &mut VecDeque<Packet>,
    ) -> M4vResult<()> {
        if self.passthrough || !pkt.has_dts() {
            out.push_back(pkt);
            return Ok(());
        }

        let Some((_, coding_type)) = first_vop(&pkt.data) else {
            out.push_back(pkt);
            return Ok(());
        };

        match coding_type {
            VopCodingType::I | VopCodingType::P => {
                if !self.first_frame_written {
                    self.first_frame_written = true;
                    pkt.pts = timestamp::offset(pkt.dts, duration);
                    debug!("首个 I/P 帧: dts={}, pts={}", pkt.dts, pkt.pts);
                    out.push_back(pkt);
                } else {
                    self.resolve(duration, out);
                    self.held_frame = Some(pkt);
                }
            }
            VopCodingType::B => {
                if self.held_frame.is_none() {
                    info!("B 帧缺少前后参考帧, 无法推算 PTS, 丢弃 (dts={})", pkt.dts);
                    return Ok(());
                }
                if pkt.has_pts() {
                    info!("输入的 B 帧已带 PTS, 切换为 passthrough 模式");
                    self.resolve(duration, out);
                    self.passthrough = true;
                    out.push_back(pkt);
                    return Ok(());
                }
                if self.b_run.len() >= self.max_b_frames {
                    error!(
                        "连续 B 帧数量达到上限 {}, 丢弃 (dts={})",
                        self.max_b_frames, pkt.dts
                    );
                    return Err(M4vError::TooManyBFrames(self.max_b_frames));
                }
                self.b_run.push(pkt);
            }
            VopCodingType::S => out.push_back(pkt),
        }

        Ok(())
    }

    /// 码流结束: 按同一规则确定缓存帧的 PTS 并全部输出
    pub fn drain(&mut self, duration: i64, out: &mut VecDeque<Packet>) {
        self.resolve(duration, out);
    }

    /// 丢弃缓存的帧, 保留 passthrough 模式
    pub fn flush(&mut self) {
        self.held_frame = None;
        self.b_run.clear();
        self.first_frame_written = false;
    }

    /// 完全重置
    pub fn reset(&mut self) {
        self.flush();
        self.passthrough = false;
    }

    /// 为缓存的参考帧与 B 帧序列计算 PTS, 依次输出
    fn resolve(&mut self, duration: i64, out: &mut VecDeque<Packet>) {
        let Some(mut held) = self.held_frame.take() else {
            self.b_run.clear();
            return;
        };

        let anchor_dts = self.b_run.last().map_or(held.dts, |b| b.dts);
        held.pts = timestamp::offset(anchor_dts, duration);
        debug!(
            "输出参考帧: dts={}, pts={}, B 帧数={}",
            held.dts,
            held.pts,
            self.b_run.len()
        );

        let mut prev_dts = held.dts;
        out.push_back(held);
        for mut b in self.b_run.drain(..) {
            b.pts = timestamp::offset(prev_dts, duration);
            prev_dts = b.dts;
            debug!("输出 B 帧: dts={}, pts={}", b.dts, timestamp::display(b.pts));
            out.push_back(b);
        }
    }
}
