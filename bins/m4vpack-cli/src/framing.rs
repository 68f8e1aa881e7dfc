//! 把 .m4v 原始码流切分为带时间戳的访问单元.
//!
//! 原始码流没有容器层的包边界, 按 VOP 切分后以固定帧时长分配 DTS.
//! packed 码流 (user_data 中带 DivX packed 签名) 在 AVI 中是 P+B 合为一包的,
//! 这里把紧跟在 P 之后的第一个 B 重新并入该 P, 还原原来的包边界.

use log::{debug, info};
use m4vpack_codec::Packet;
use m4vpack_codec::bsf::DEFAULT_MAX_NVOP_SIZE;
use m4vpack_codec::parsers::mpeg4::{
    Mpeg4VopPacket, VopCodingType, find_packed_signature, first_vop, split_vop_packets,
};
use m4vpack_core::Rational;

/// 访问单元的 VOP 编码类型
fn coding_type(unit: &Mpeg4VopPacket) -> Option<VopCodingType> {
    first_vop(&unit.data[unit.vop_offset..]).map(|(_, t)| t)
}

/// 把 P 之后紧邻的第一个 B/S 并入该 P (P 本身未并入其他帧时)
fn regroup_packed(units: Vec<Mpeg4VopPacket>) -> Vec<Mpeg4VopPacket> {
    let mut grouped: Vec<Mpeg4VopPacket> = Vec::with_capacity(units.len());
    let mut last_was_lone_p = false;

    for unit in units {
        let ty = coding_type(&unit);
        let is_b = matches!(ty, Some(VopCodingType::B | VopCodingType::S));
        if is_b && last_was_lone_p {
            if let Some(prev) = grouped.last_mut() {
                prev.data.extend_from_slice(&unit.data);
                last_was_lone_p = false;
                continue;
            }
        }
        // N-VOP 占位同为 P 类型, 不接收合并
        last_was_lone_p =
            ty == Some(VopCodingType::P) && unit.data.len() > DEFAULT_MAX_NVOP_SIZE;
        grouped.push(unit);
    }

    grouped
}

/// 切分原始码流
///
/// 第 i 个访问单元的 DTS 为 `i * duration`. `regroup` 为 `None` 时根据 DivX
/// packed 签名自动判断是否恢复 P+B 包边界.
pub fn split_elementary_stream(
    data: &[u8],
    duration: i64,
    time_base: Rational,
    regroup: Option<bool>,
) -> Vec<Packet> {
    let units = split_vop_packets(data);
    let regroup = regroup.unwrap_or_else(|| match find_packed_signature(data) {
        Some(signature) => {
            info!("检测到 packed 码流签名 {}, 恢复 P+B 包边界", signature);
            true
        }
        None => false,
    });

    let units = if regroup {
        regroup_packed(units)
    } else {
        units
    };
    debug!("切分得到 {} 个访问单元", units.len());

    units
        .into_iter()
        .enumerate()
        .map(|(i, unit)| {
            let is_keyframe = coding_type(&unit) == Some(VopCodingType::I);
            let mut pkt = Packet::from_data(unit.data).with_timing(i as i64 * duration, duration);
            pkt.time_base = time_base;
            pkt.is_keyframe = is_keyframe;
            pkt.pos = unit.source_offset as i64;
            pkt
        })
        .collect()
}
