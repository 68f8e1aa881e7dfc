//! MPEG-4 Part 2 packed bitstream 打包.
//!
//! 解包的逆过程: 输入为解码顺序的独立 VOP 访问单元, 输出为一帧一包的 packed
//! 形式. 第一个 B 帧并入前一个 P 帧, 之后的 B 帧各自延后一个槽位输出, 最后一个
//! 空出的槽位用 N-VOP 填充:
//!
//! ```text
//! 输入:   I0  P3  B1  B2  P6
//! 输出:   I0 | P3+B1 | B2 | N-VOP | P6 ...
//! ```
//!
//! 输出槽位沿用输入槽位的时间戳. 码流的 user_data 中已经带有 DivX packed
//! 签名时, 打包器自动停用, 之后的数据原样转发.

use std::collections::VecDeque;

use log::{debug, info, warn};
use m4vpack_core::{M4vError, M4vResult};

use super::{BitstreamFilter, PackConfig};
use crate::packet::Packet;
use crate::parsers::mpeg4::{
    VopCodingType, VopHeader, build_nvop, find_packed_signature, find_vol_time_inc_bits,
    first_vop,
};

/// 等待输出的帧
struct HeldFrame {
    packet: Packet,
    /// 负载是否已经随前一个槽位发出 (只剩时间戳槽位待用)
    transmitted: bool,
}

/// packed bitstream 打包器
pub struct Mpeg4Packer {
    /// 配置
    config: PackConfig,
    /// vop_time_increment 位宽, 0 表示尚未见到 VOL
    time_inc_bits: u32,
    /// 通过 extradata 给定的位宽, `reset()` 后恢复
    extra_time_inc_bits: u32,
    /// 等待输出的帧
    held: Option<HeldFrame>,
    /// 上一个 I/P 帧之后的 B 帧数量
    pending_b_count: usize,
    /// 上一个 I/P 帧的 vop_time_increment, 用于合成 N-VOP
    last_time_inc: u32,
    /// 码流已是 packed 形式, 停止打包
    passthrough: bool,
    /// 输出队列
    output: VecDeque<Packet>,
    /// N-VOP 合成失败后锁定的错误信息
    failed: Option<String>,
    /// 是否已收到码流结束信号
    eos: bool,
}

impl Mpeg4Packer {
    /// 使用默认配置创建打包器
    pub fn new() -> Self {
        Self::with_config(PackConfig::default())
    }

    /// 使用指定配置创建打包器
    pub fn with_config(config: PackConfig) -> Self {
        Self {
            config,
            time_inc_bits: 0,
            extra_time_inc_bits: 0,
            held: None,
            pending_b_count: 0,
            last_time_inc: 0,
            passthrough: false,
            output: VecDeque::new(),
            failed: None,
            eos: false,
        }
    }

    /// 从带外的 extradata (通常为 VOS/VO/VOL 头) 中读取 VOL 参数
    pub fn set_extra_data(&mut self, extra_data: &[u8]) -> M4vResult<()> {
        let bits = find_vol_time_inc_bits(extra_data).ok_or_else(|| {
            M4vError::InvalidData("extradata 中没有可解析的 VOL 头".into())
        })?;
        debug!("extradata: time_increment 位宽={}", bits);
        self.extra_time_inc_bits = bits;
        self.time_inc_bits = bits;
        Ok(())
    }

    /// 当前的 vop_time_increment 位宽 (0 表示未知)
    pub fn time_inc_bits(&self) -> u32 {
        self.time_inc_bits
    }

    /// 是否因检测到已 packed 的码流而停止打包
    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    /// 合成占用 `slot` 时间戳的 N-VOP 并输出
    fn emit_filler(&mut self, slot: &Packet) -> M4vResult<()> {
        let nvop = match build_nvop(self.time_inc_bits, self.last_time_inc) {
            Ok(nvop) => nvop,
            Err(e) => {
                self.failed = Some(e.to_string());
                return Err(e);
            }
        };
        debug!("输出 N-VOP 占位: dts={}", slot.dts);
        let mut filler = slot.with_data(nvop);
        filler.is_keyframe = false;
        self.output.push_back(filler);
        Ok(())
    }

    /// 结束当前的 I/P 段: 输出尚未发出的缓存帧, 或为已发出的 B 帧补一个 N-VOP
    fn flush_held(&mut self) -> M4vResult<()> {
        match self.held.take() {
            Some(held) if !held.transmitted => self.output.push_back(held.packet),
            Some(held) if self.pending_b_count > 0 => self.emit_filler(&held.packet)?,
            _ => {}
        }
        Ok(())
    }

    /// 读取 VOP 的 time_increment, 作为之后 N-VOP 的取值
    fn capture_time_inc(&mut self, vop: &[u8]) {
        match VopHeader::parse(vop, self.time_inc_bits) {
            Ok(VopHeader {
                time_increment: Some(inc),
                ..
            }) => self.last_time_inc = inc,
            Ok(_) => {}
            Err(e) => warn!("VOP 头部解析失败, 沿用上一个 time_increment: {}", e),
        }
    }

    fn handle_reference(
        &mut self,
        pkt: Packet,
        vop: usize,
        coding_type: VopCodingType,
    ) -> M4vResult<()> {
        // 补出的 N-VOP 沿用上一个 I/P 帧的 time_increment, 新值在其后读取
        if coding_type == VopCodingType::I {
            self.flush_held()?;
            self.pending_b_count = 0;
            self.capture_time_inc(&pkt.data[vop..]);
            self.output.push_back(pkt);
            return Ok(());
        }

        if let Some(held) = self.held.take() {
            if self.pending_b_count == 0 {
                self.output.push_back(held.packet);
            } else {
                self.emit_filler(&held.packet)?;
            }
        }
        self.pending_b_count = 0;
        self.capture_time_inc(&pkt.data[vop..]);
        self.held = Some(HeldFrame {
            packet: pkt,
            transmitted: false,
        });
        Ok(())
    }

    fn handle_bidirectional(&mut self, pkt: Packet) {
        self.pending_b_count += 1;
        if self.pending_b_count > self.config.max_b_frames {
            warn!(
                "连续 B 帧数量 {} 超过上限 {}",
                self.pending_b_count, self.config.max_b_frames
            );
        }

        let Some(held) = self.held.take() else {
            debug!("B 帧之前没有参考帧, 原样转发");
            self.output.push_back(pkt);
            return;
        };

        let slot = if self.pending_b_count == 1 && !held.transmitted {
            let mut merged = Vec::with_capacity(held.packet.size() + pkt.size());
            merged.extend_from_slice(&held.packet.data);
            merged.extend_from_slice(&pkt.data);
            debug!("合并 P+B: {} + {} 字节", held.packet.size(), pkt.size());
            held.packet.with_data(merged)
        } else {
            held.packet.with_data(pkt.data.clone())
        };
        self.output.push_back(slot);
        self.held = Some(HeldFrame {
            packet: pkt,
            transmitted: true,
        });
    }

    /// 码流结束: 输出最后一个缓存帧或补一个 N-VOP
    fn drain(&mut self) -> M4vResult<()> {
        self.eos = true;
        self.flush_held()
    }
}

impl Default for Mpeg4Packer {
    fn default() -> Self {
        Self::new()
    }
}

impl BitstreamFilter for Mpeg4Packer {
    fn name(&self) -> &str {
        "mpeg4_pack_bframes"
    }

    fn send_packet(&mut self, pkt: Packet) -> M4vResult<()> {
        if let Some(msg) = &self.failed {
            return Err(M4vError::Codec(msg.clone()));
        }
        if self.eos {
            return Err(M4vError::InvalidArgument(
                "码流已结束, 需要先 flush() 或 reset()".into(),
            ));
        }
        if pkt.is_empty() {
            return self.drain();
        }

        if let Some(bits) = find_vol_time_inc_bits(&pkt.data) {
            if bits != self.time_inc_bits {
                debug!("VOL: time_increment 位宽 {} -> {}", self.time_inc_bits, bits);
            }
            self.time_inc_bits = bits;
        }

        if !self.passthrough {
            if let Some(signature) = find_packed_signature(&pkt.data) {
                info!("检测到已 packed 的码流 ({}), 停止打包", signature);
                self.passthrough = true;
                if let Some(held) = self.held.take() {
                    if !held.transmitted {
                        self.output.push_back(held.packet);
                    }
                }
                self.pending_b_count = 0;
            }
        }

        if self.passthrough {
            self.output.push_back(pkt);
            return Ok(());
        }

        match first_vop(&pkt.data) {
            None => {
                self.output.push_back(pkt);
                Ok(())
            }
            Some((vop, coding_type @ (VopCodingType::I | VopCodingType::P))) => {
                self.handle_reference(pkt, vop, coding_type)
            }
            Some((_, VopCodingType::B | VopCodingType::S)) => {
                self.handle_bidirectional(pkt);
                Ok(())
            }
        }
    }

    fn receive_packet(&mut self) -> M4vResult<Packet> {
        match self.output.pop_front() {
            Some(pkt) => Ok(pkt),
            None if self.eos => Err(M4vError::Eof),
            None => Err(M4vError::NeedMoreData),
        }
    }

    fn flush(&mut self) {
        self.held = None;
        self.pending_b_count = 0;
        self.output.clear();
        self.failed = None;
        self.eos = false;
    }

    fn reset(&mut self) {
        self.flush();
        self.passthrough = false;
        self.last_time_inc = 0;
        self.time_inc_bits = self.extra_time_inc_bits;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsf::drain_filter;
    use crate::bsf::testutil::{D, timed_vop, unit, vol, vop};
    use crate::parsers::mpeg4::scan_packed;

    fn packer() -> Mpeg4Packer {
        let mut packer = Mpeg4Packer::new();
        packer.set_extra_data(&vol(25)).unwrap();
        packer
    }

    fn run(packer: &mut Mpeg4Packer, kinds: &[u8]) -> Vec<Packet> {
        let mut out = Vec::new();
        for (i, &k) in kinds.iter().enumerate() {
            packer
                .send_packet(unit(vop(k, 0x40 + i as u8), i as i64))
                .unwrap();
            out.extend(drain_filter(packer).unwrap());
        }
        packer.send_packet(Packet::empty()).unwrap();
        out.extend(drain_filter(packer).unwrap());
        out
    }

    fn is_filler(pkt: &Packet) -> bool {
        pkt.size() <= 8 && scan_packed(&pkt.data).vop_count == 1
    }

    #[test]
    fn test_pack_gop() {
        // I0 P1 B2 P3 B4 B5 P6
        let mut packer = packer();
        let out = run(&mut packer, &[0, 1, 2, 1, 2, 2, 1]);

        assert_eq!(out.len(), 7);
        let dts: Vec<i64> = out.iter().map(|p| p.dts).collect();
        assert_eq!(dts, (0..7).map(|i| i * D).collect::<Vec<_>>());

        assert_eq!(out[0].data.as_ref(), vop(0, 0x40).as_slice());
        let mut p1b2 = vop(1, 0x41);
        p1b2.extend_from_slice(&vop(2, 0x42));
        assert_eq!(out[1].data.as_ref(), p1b2.as_slice());
        assert!(is_filler(&out[2]));
        assert_eq!(scan_packed(&out[3].data).vop_count, 2);
        assert_eq!(out[4].data.as_ref(), vop(2, 0x45).as_slice());
        assert!(is_filler(&out[5]));
        assert_eq!(out[6].data.as_ref(), vop(1, 0x46).as_slice());
    }

    #[test]
    fn test_no_b_frames_passes_through() {
        let mut packer = packer();
        let out = run(&mut packer, &[0, 1, 1, 0, 1]);
        let tags: Vec<u8> = out.iter().map(|p| p.data[5]).collect();
        assert_eq!(tags, vec![0x40, 0x41, 0x42, 0x43, 0x44]);
    }

    #[test]
    fn test_i_frame_closes_b_run() {
        // I0 P1 B2 I3: I 帧之前补 N-VOP, I 帧不缓存
        let mut packer = packer();
        let out = run(&mut packer, &[0, 1, 2, 0]);
        assert_eq!(out.len(), 4);
        assert!(is_filler(&out[2]));
        assert_eq!(out[2].dts, 2 * D);
        assert_eq!(out[3].data.as_ref(), vop(0, 0x43).as_slice());
    }

    #[test]
    fn test_eos_emits_trailing_filler() {
        let mut packer = packer();
        let out = run(&mut packer, &[0, 1, 2]);
        assert_eq!(out.len(), 3);
        assert!(is_filler(&out[2]));
        assert!(matches!(packer.receive_packet(), Err(M4vError::Eof)));
    }

    #[test]
    fn test_filler_uses_last_time_increment() {
        let mut packer = packer();
        let out = run(&mut packer, &[0, 1, 2]);
        // vop() 的 time_increment (5 位) 为首字节低 4 位 0000 加上 tag 最高位 0
        let header = VopHeader::parse(&out[2].data[4..], 5).unwrap();
        assert_eq!(header.coding_type, VopCodingType::P);
        assert_eq!(header.time_increment, Some(0));
    }

    fn filler_time_inc(pkt: &Packet) -> Option<u32> {
        assert!(is_filler(pkt));
        VopHeader::parse(&pkt.data[4..], 5).unwrap().time_increment
    }

    #[test]
    fn test_filler_takes_previous_reference_time_increment() {
        // I0(t=3) P1(t=7) B2(t=5) P3(t=11): 占位沿用 P1 的 7
        let mut packer = packer();
        let mut out = Vec::new();
        for (i, (kind, inc)) in [(0u8, 3u32), (1, 7), (2, 5), (1, 11)].into_iter().enumerate() {
            let pkt = unit(timed_vop(kind, inc, 0x40 + i as u8), i as i64);
            packer.send_packet(pkt).unwrap();
            out.extend(drain_filter(&mut packer).unwrap());
        }

        assert_eq!(out.len(), 3);
        assert_eq!(filler_time_inc(&out[2]), Some(7));
    }

    #[test]
    fn test_filler_before_i_frame_takes_previous_time_increment() {
        // I0(t=3) P1(t=9) B2(t=6) I3(t=13) P4(t=20) B5(t=16) EOS
        let mut packer = packer();
        let mut out = Vec::new();
        let frames = [(0u8, 3u32), (1, 9), (2, 6), (0, 13), (1, 20), (2, 16)];
        for (i, (kind, inc)) in frames.into_iter().enumerate() {
            let pkt = unit(timed_vop(kind, inc, 0x40 + i as u8), i as i64);
            packer.send_packet(pkt).unwrap();
            out.extend(drain_filter(&mut packer).unwrap());
        }
        packer.send_packet(Packet::empty()).unwrap();
        out.extend(drain_filter(&mut packer).unwrap());

        // I0 | P1+B2 | N(9) | I3 | P4+B5 | N(20)
        assert_eq!(out.len(), 6);
        assert_eq!(filler_time_inc(&out[2]), Some(9));
        assert_eq!(out[3].data.as_ref(), timed_vop(0, 13, 0x43).as_slice());
        assert_eq!(filler_time_inc(&out[5]), Some(20));
    }

    #[test]
    fn test_flush_discards_untransmitted_held() {
        let mut packer = packer();
        packer.send_packet(unit(vop(0, 0x40), 0)).unwrap();
        packer.send_packet(unit(vop(1, 0x41), 1)).unwrap();
        let mut out = drain_filter(&mut packer).unwrap();

        packer.flush();
        packer.send_packet(unit(vop(0, 0x42), 2)).unwrap();
        packer.send_packet(Packet::empty()).unwrap();
        out.extend(drain_filter(&mut packer).unwrap());

        let tags: Vec<u8> = out.iter().map(|p| p.data[5]).collect();
        assert_eq!(tags, vec![0x40, 0x42]);
    }

    #[test]
    fn test_filler_without_vol_is_fatal() {
        let mut packer = Mpeg4Packer::new();
        for (i, k) in [0u8, 1, 2].into_iter().enumerate() {
            packer.send_packet(unit(vop(k, 0x40), i as i64)).unwrap();
        }
        let err = packer.send_packet(unit(vop(1, 0x44), 3)).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            packer.send_packet(unit(vop(1, 0x45), 4)),
            Err(M4vError::Codec(_))
        ));

        packer.flush();
        assert!(packer.send_packet(unit(vop(0, 0x46), 5)).is_ok());
    }

    #[test]
    fn test_in_band_vol_updates_width() {
        let mut packer = Mpeg4Packer::new();
        let mut first = vol(30000);
        first.extend_from_slice(&vop(0, 0x40));
        packer.send_packet(unit(first, 0)).unwrap();
        assert_eq!(packer.time_inc_bits(), 15);

        packer.reset();
        assert_eq!(packer.time_inc_bits(), 0);
    }

    #[test]
    fn test_packed_signature_disables_packing() {
        let mut packer = packer();
        packer.send_packet(unit(vop(0, 0x40), 0)).unwrap();
        packer.send_packet(unit(vop(1, 0x41), 1)).unwrap();

        let mut signed = vec![0x00, 0x00, 0x01, 0xB2];
        signed.extend_from_slice(b"DivX503b1393p\0");
        signed.extend_from_slice(&vop(2, 0x42));
        packer.send_packet(unit(signed.clone(), 2)).unwrap();
        packer.send_packet(unit(vop(2, 0x43), 3)).unwrap();

        assert!(packer.is_passthrough());
        let out = drain_filter(&mut packer).unwrap();
        let sizes: Vec<usize> = out.iter().map(Packet::size).collect();
        assert_eq!(sizes, vec![12, 12, signed.len(), 12]);
        assert_eq!(out[1].data[5], 0x41);

        packer.reset();
        assert!(!packer.is_passthrough());
        assert_eq!(packer.time_inc_bits(), 5);
    }

    #[test]
    fn test_lone_b_forwarded() {
        let mut packer = packer();
        let out = run(&mut packer, &[2, 0]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].data[5], 0x40);
    }

    #[test]
    fn test_set_extra_data_without_vol() {
        let mut packer = Mpeg4Packer::new();
        assert!(matches!(
            packer.set_extra_data(&[0x00, 0x00, 0x01, 0xB0, 0x01]),
            Err(M4vError::InvalidData(_))
        ));
    }
}
