//! 码流过滤器单元测试共用的数据构造.

use m4vpack_core::bitwriter::BitWriter;

use crate::packet::Packet;

/// 测试用帧时长
pub const D: i64 = 3600;

/// 构造含 VOL 的 extradata (00 00 01 20 + 最简 VOL), time_increment_resolution 由参数指定
pub fn vol(resolution: u16) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bytes(&[0x00, 0x00, 0x01, 0x20]);
    bw.write_bit(0);
    bw.write_bits(1, 8);
    bw.write_bit(0);
    bw.write_bits(1, 4);
    bw.write_bit(0);
    bw.write_bits(0, 2);
    bw.write_bit(1);
    bw.write_bits(u32::from(resolution), 16);
    bw.write_bit(1);
    bw.finish()
}

/// 构造单个 VOP: 起始码 + 编码类型 + `tag` 填充字节 (总长 12 字节)
///
/// `kind` 取值 0=I, 1=P, 2=B, 3=S. modulo_time_base=0, marker=1.
pub fn vop(kind: u8, tag: u8) -> Vec<u8> {
    let mut data = vec![0x00, 0x00, 0x01, 0xB6, (kind << 6) | 0x10];
    data.extend(std::iter::repeat_n(tag, 7));
    data
}

/// 以解码顺序位置 `index` 构造数据包: dts = index * D, duration = D
pub fn unit(data: Vec<u8>, index: i64) -> Packet {
    Packet::from_data(data).with_timing(index * D, D)
}

/// 构造带指定 vop_time_increment (5 位, 对应 `vol(25)`) 的 VOP, 总长 13 字节
pub fn timed_vop(kind: u8, time_inc: u32, tag: u8) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bytes(&[0x00, 0x00, 0x01, 0xB6]);
    bw.write_bits(u32::from(kind), 2);
    bw.write_bit(0);
    bw.write_bit(1);
    bw.write_bits(time_inc, 5);
    bw.write_bit(1);
    bw.write_stuffing();
    bw.write_bytes(&[tag; 7]);
    bw.finish()
}
