//! MPEG-4 Part 2 码流解析器.
//!
//! 提供对 MPEG-4 Part 2 (ISO/IEC 14496-2) 原始码流的解析能力:
//! - 起始码扫描与类型识别
//! - packed bitstream 单趟扫描 (VOP 计数, 第二个 VOP 位置, user_data 中的 packed 标记)
//! - 从原始 .m4v 字节流中分割 VOP 访问单元
//! - VOL/VOP 头部字段提取 (见 [`header`])

pub mod header;

pub use header::{
    VopCodingType, VopHeader, build_nvop, find_packed_signature, find_vol_time_inc_bits,
    first_vop, is_packed_signature, parse_vol_time_inc_bits,
};

/// VOP 起始码 (00 00 01 B6)
pub const VOP_START_CODE: u32 = 0x1B6;
/// user_data 起始码 (00 00 01 B2)
pub const USER_DATA_START_CODE: u32 = 0x1B2;

/// user_data 中 packed 标记的最大搜索长度
const PACKED_MARKER_SEARCH_LEN: usize = 255;

/// MPEG-4 Part 2 起始码类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mpeg4StartCodeType {
    /// 视频对象 (Video Object, 0x00-0x1F)
    VideoObject(u8),
    /// 视频对象层 (Video Object Layer, 0x20-0x2F)
    VideoObjectLayer(u8),
    /// 视觉对象序列起始 (0xB0)
    VisualObjectSequenceStart,
    /// 视觉对象序列结束 (0xB1)
    VisualObjectSequenceEnd,
    /// 用户数据 (0xB2)
    UserData,
    /// 组头 (Group of VOP, 0xB3)
    GroupOfVop,
    /// 视觉对象 (0xB5)
    VisualObject,
    /// VOP 起始码 (0xB6)
    Vop,
    /// 其他起始码
    Other(u8),
}

impl Mpeg4StartCodeType {
    /// 从起始码字节识别类型
    pub fn from_byte(code: u8) -> Self {
        match code {
            0x00..=0x1F => Mpeg4StartCodeType::VideoObject(code),
            0x20..=0x2F => Mpeg4StartCodeType::VideoObjectLayer(code - 0x20),
            0xB0 => Mpeg4StartCodeType::VisualObjectSequenceStart,
            0xB1 => Mpeg4StartCodeType::VisualObjectSequenceEnd,
            0xB2 => Mpeg4StartCodeType::UserData,
            0xB3 => Mpeg4StartCodeType::GroupOfVop,
            0xB5 => Mpeg4StartCodeType::VisualObject,
            0xB6 => Mpeg4StartCodeType::Vop,
            other => Mpeg4StartCodeType::Other(other),
        }
    }
}

/// 起始码条目: 位置和类型
#[derive(Debug, Clone)]
pub struct StartCodeEntry {
    /// 起始码 00 00 01 xx 的开始偏移
    pub offset: usize,
    /// 起始码之后的数据偏移 (offset + 4)
    pub data_offset: usize,
    /// 起始码类型
    pub code_type: Mpeg4StartCodeType,
}

/// 从 `pos` 开始查找下一个字节对齐的起始码
///
/// 返回 `(0x100 | xx, 起始码之后的位置)`; 数据耗尽时返回 `None`.
/// 不完整的起始码 (缺少类型字节) 视为不存在.
pub fn find_next_start_code(data: &[u8], pos: usize) -> Option<(u32, usize)> {
    let mut i = pos;
    while i + 3 < data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x01 {
            return Some((0x100 | u32::from(data[i + 3]), i + 4));
        }
        i += 1;
    }
    None
}

/// 扫描数据中所有 MPEG-4 起始码
///
/// 返回按偏移排序的起始码列表.
pub fn scan_start_codes(data: &[u8]) -> Vec<StartCodeEntry> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while let Some((code, next)) = find_next_start_code(data, pos) {
        entries.push(StartCodeEntry {
            offset: next - 4,
            data_offset: next,
            code_type: Mpeg4StartCodeType::from_byte(code as u8),
        });
        pos = next;
    }
    entries
}

/// 单个访问单元的 packed bitstream 扫描结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackedScan {
    /// 第一个 VOP 起始码的偏移
    pub first_vop_pos: Option<usize>,
    /// VOP 起始码个数
    pub vop_count: usize,
    /// 第二个 VOP 起始码 (含 4 字节起始码本身) 的偏移
    pub second_vop_pos: Option<usize>,
    /// user_data 中 `'p'` 标记 (后接 NUL) 的偏移
    pub packed_marker_pos: Option<usize>,
}

impl PackedScan {
    /// 是否为包含多个 VOP 的 packed 单元
    pub fn is_packed_unit(&self) -> bool {
        self.second_vop_pos.is_some()
    }
}

/// 单趟扫描一个访问单元
///
/// 同时完成:
/// - 统计 VOP 起始码个数, 记录第一个与第二个 VOP 的偏移
/// - 在每段 user_data 之后最多 255 字节内查找 `'p' '\0'` (旧版 DivX 编码器的 packed 标记),
///   多段 user_data 时以最后找到的为准
///
/// 每次调用只看当前数据, 不跨访问单元保留状态.
pub fn scan_packed(data: &[u8]) -> PackedScan {
    let mut scan = PackedScan::default();
    let mut pos = 0;

    while let Some((code, next)) = find_next_start_code(data, pos) {
        match code {
            USER_DATA_START_CODE => {
                if let Some(off) = find_packed_marker(&data[next..]) {
                    scan.packed_marker_pos = Some(next + off);
                }
            }
            VOP_START_CODE => {
                scan.vop_count += 1;
                match scan.vop_count {
                    1 => scan.first_vop_pos = Some(next - 4),
                    2 => scan.second_vop_pos = Some(next - 4),
                    _ => {}
                }
            }
            _ => {}
        }
        pos = next;
    }

    scan
}

/// 在 user_data 负载中查找 `'p'` 后接 NUL 的位置
fn find_packed_marker(user_data: &[u8]) -> Option<usize> {
    (0..PACKED_MARKER_SEARCH_LEN)
        .take_while(|&i| i + 1 < user_data.len())
        .find(|&i| user_data[i] == b'p' && user_data[i + 1] == 0)
}

/// VOP 访问单元: 一个完整的 VOP 及其之前的头信息
#[derive(Debug, Clone)]
pub struct Mpeg4VopPacket {
    /// 单元数据 (VOP 之前的 VOL/UserData 等头信息 + VOP 编码数据)
    pub data: Vec<u8>,
    /// 单元在原始数据中的起始偏移
    pub source_offset: usize,
    /// 单元中 VOP 起始码 (00 00 01 B6) 的相对偏移
    pub vop_offset: usize,
    /// 是否包含 VOL 头
    pub has_vol: bool,
    /// 是否包含 user_data
    pub has_user_data: bool,
}

/// 从原始字节流中分割 VOP 访问单元
///
/// 每个 VOP 之后出现的第一个起始码 (无论是头信息还是下一个 VOP) 开启一个新单元,
/// 因此头信息总是归属于其后的 VOP. 最后一个 VOP 之后的尾部数据 (如序列结束码)
/// 并入最后一个单元. 不含任何 VOP 时返回空列表.
pub fn split_vop_packets(data: &[u8]) -> Vec<Mpeg4VopPacket> {
    let entries = scan_start_codes(data);

    // 每个单元起始的条目索引
    let mut unit_starts = Vec::new();
    let mut vop_in_unit = false;
    for (i, entry) in entries.iter().enumerate() {
        if i == 0 || vop_in_unit {
            unit_starts.push(i);
            vop_in_unit = false;
        }
        if entry.code_type == Mpeg4StartCodeType::Vop {
            vop_in_unit = true;
        }
    }

    let mut packets: Vec<Mpeg4VopPacket> = Vec::new();
    for (k, &first) in unit_starts.iter().enumerate() {
        let last = unit_starts.get(k + 1).copied().unwrap_or(entries.len());
        let start = entries[first].offset;
        let end = entries.get(last).map(|e| e.offset).unwrap_or(data.len());
        let unit = &entries[first..last];

        let Some(vop) = unit
            .iter()
            .find(|e| e.code_type == Mpeg4StartCodeType::Vop)
        else {
            // 尾部的非 VOP 数据并入上一个单元
            if let Some(prev) = packets.last_mut() {
                prev.data.extend_from_slice(&data[start..end]);
            }
            continue;
        };

        let headers = unit.iter().take_while(|e| e.offset < vop.offset);
        let (mut has_vol, mut has_user_data) = (false, false);
        for entry in headers {
            match entry.code_type {
                Mpeg4StartCodeType::VideoObjectLayer(_) => has_vol = true,
                Mpeg4StartCodeType::UserData => has_user_data = true,
                _ => {}
            }
        }

        packets.push(Mpeg4VopPacket {
            data: data[start..end].to_vec(),
            source_offset: start,
            vop_offset: vop.offset - start,
            has_vol,
            has_user_data,
        });
    }

    packets
}

/// 提取 VOL (Video Object Layer) 头数据
///
/// 返回从 VOL 起始码到下一个起始码之间的数据 (含起始码).
pub fn extract_vol_header(data: &[u8]) -> Option<Vec<u8>> {
    let entries = scan_start_codes(data);

    entries.iter().enumerate().find_map(|(i, entry)| {
        matches!(entry.code_type, Mpeg4StartCodeType::VideoObjectLayer(_)).then(|| {
            let end = entries.get(i + 1).map(|e| e.offset).unwrap_or(data.len());
            data[entry.offset..end].to_vec()
        })
    })
}

/// 提取所有 user_data 段 (不含起始码)
pub fn extract_user_data(data: &[u8]) -> Vec<Vec<u8>> {
    let entries = scan_start_codes(data);

    entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.code_type == Mpeg4StartCodeType::UserData)
        .map(|(i, entry)| {
            let end = entries.get(i + 1).map(|e| e.offset).unwrap_or(data.len());
            data[entry.data_offset..end].to_vec()
        })
        .collect()
}
