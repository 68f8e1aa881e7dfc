//! VOL/VOP 头部字段提取与 N-VOP 合成.
//!
//! 这里只解析 packed bitstream 处理所需的少量字段, 不做完整语法校验:
//! - VOL: `vop_time_increment_resolution`, 用于确定 `vop_time_increment` 的位宽
//! - VOP: `vop_coding_type` 与 `vop_time_increment`
//! - user_data: DivX 编码器签名 (判断码流是否已经是 packed)

use log::debug;
use m4vpack_core::bitreader::BitReader;
use m4vpack_core::bitwriter::BitWriter;
use m4vpack_core::{M4vError, M4vResult};

use super::{Mpeg4StartCodeType, VOP_START_CODE, extract_user_data, find_next_start_code};

/// VOP 编码类型 (2 位 vop_coding_type)
const VOP_TYPE_I: u32 = 0;
const VOP_TYPE_P: u32 = 1;
const VOP_TYPE_B: u32 = 2;

/// VOL 中 shape 取值: 灰度
const SHAPE_GRAYSCALE: u32 = 3;
/// VOL 中 aspect_ratio_info 取值: 扩展 PAR
const ASPECT_RATIO_EXTENDED_PAR: u32 = 0xF;
/// vbv_parameters 总位数 (15+1+15+1+15+1+3+11+1+15+1)
const VBV_PARAMETERS_BITS: u32 = 79;

/// N-VOP 支持的最大 time_increment 位宽 (resolution 为 16 位字段)
const MAX_TIME_INC_BITS: u32 = 16;

/// VOP 编码类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VopCodingType {
    /// 帧内编码
    I,
    /// 前向预测
    P,
    /// 双向预测
    B,
    /// Sprite (GMC)
    S,
}

impl VopCodingType {
    /// 从 2 位 vop_coding_type 字段转换
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            VOP_TYPE_I => VopCodingType::I,
            VOP_TYPE_P => VopCodingType::P,
            VOP_TYPE_B => VopCodingType::B,
            _ => VopCodingType::S,
        }
    }

    /// 是否为 I/P 参考帧
    pub fn is_reference(self) -> bool {
        matches!(self, VopCodingType::I | VopCodingType::P)
    }
}

/// VOP 头部视图
///
/// 每个访问单元重新解析, 不持久保存.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VopHeader {
    /// 编码类型
    pub coding_type: VopCodingType,
    /// vop_time_increment, 位宽未知 (尚未见到 VOL) 时为 `None`
    pub time_increment: Option<u32>,
}

impl VopHeader {
    /// 解析 VOP 头部
    ///
    /// `data` 从 VOP 起始码之后开始. 读取 vop_coding_type, 跳过 modulo_time_base
    /// 与 marker_bit, 再按 `time_inc_bits` 位宽读取 vop_time_increment.
    pub fn parse(data: &[u8], time_inc_bits: u32) -> M4vResult<Self> {
        let mut reader = BitReader::new(data);
        let coding_type = VopCodingType::from_bits(reader.read_bits(2)?);

        if time_inc_bits == 0 {
            return Ok(Self {
                coding_type,
                time_increment: None,
            });
        }

        let _modulo_time_base = reader.read_unary(0)?;
        reader.skip_bits(1)?; // marker
        let time_increment = reader.read_bits(time_inc_bits)?;

        Ok(Self {
            coding_type,
            time_increment: Some(time_increment),
        })
    }
}

/// 定位访问单元中的第一个 VOP 并读取其编码类型
///
/// 返回 `(VOP 起始码之后的偏移, 编码类型)`. VOP 起始码之后没有数据时视为无 VOP.
pub fn first_vop(data: &[u8]) -> Option<(usize, VopCodingType)> {
    let mut pos = 0;
    while let Some((code, next)) = find_next_start_code(data, pos) {
        if code == VOP_START_CODE {
            let byte = *data.get(next)?;
            return Some((next, VopCodingType::from_bits(u32::from(byte >> 6))));
        }
        pos = next;
    }
    None
}

/// 统计 time_increment_resolution 的有效位数
fn significant_bits(value: u32) -> u32 {
    32 - value.leading_zeros()
}

/// 从 VOL 头部解析 vop_time_increment 的位宽
///
/// `data` 从 VOL 起始码 (00 00 01 2x) 之后开始. 依次跳过
/// random_accessible_vol, video_object_type_indication, 可选的 verid/priority,
/// aspect_ratio_info (及扩展 PAR), vol_control_parameters (及 vbv_parameters),
/// video_object_layer_shape (灰度扩展), marker, 然后读取 16 位
/// vop_time_increment_resolution 并返回其有效位数.
pub fn parse_vol_time_inc_bits(data: &[u8]) -> M4vResult<u32> {
    let mut reader = BitReader::new(data);

    reader.skip_bits(9)?; // random_accessible_vol + video_object_type_indication
    let mut verid = 1;
    if reader.read_bit()? == 1 {
        verid = reader.read_bits(4)?;
        reader.skip_bits(3)?; // video_object_layer_priority
    }

    if reader.read_bits(4)? == ASPECT_RATIO_EXTENDED_PAR {
        reader.skip_bits(16)?; // par_width + par_height
    }

    if reader.read_bit()? == 1 {
        reader.skip_bits(2)?; // chroma_format
        let _low_delay = reader.read_bit()?;
        if reader.read_bit()? == 1 {
            reader.skip_bits(VBV_PARAMETERS_BITS)?;
        }
    }

    let shape = reader.read_bits(2)?;
    if verid != 1 && shape == SHAPE_GRAYSCALE {
        reader.skip_bits(4)?; // video_object_layer_shape_extension
    }
    reader.skip_bits(1)?; // marker

    let resolution = reader.read_bits(16)?;
    if resolution == 0 {
        return Err(M4vError::InvalidData(
            "VOL 中 vop_time_increment_resolution 为 0".into(),
        ));
    }

    let bits = significant_bits(resolution);
    debug!("VOL: time_increment_resolution={}, 位宽={}", resolution, bits);
    Ok(bits)
}

/// 扫描访问单元中的 VOL 头, 返回最后一个可解析 VOL 的 time_increment 位宽
///
/// 没有 VOL 或 VOL 无法解析时返回 `None`.
pub fn find_vol_time_inc_bits(data: &[u8]) -> Option<u32> {
    let mut result = None;
    let mut pos = 0;
    while let Some((code, next)) = find_next_start_code(data, pos) {
        if let Mpeg4StartCodeType::VideoObjectLayer(_) = Mpeg4StartCodeType::from_byte(code as u8)
        {
            match parse_vol_time_inc_bits(&data[next..]) {
                Ok(bits) => result = Some(bits),
                Err(e) => debug!("VOL 解析失败: {}", e),
            }
        }
        pos = next;
    }
    result
}

/// 判断 user_data 是否为已 packed 的 DivX 编码器签名
///
/// 形如 `DivX<数字><c1><数字><c2>`, 其中 c1 为 `b`/`B`, c2 为 `p`/`P`,
/// 例如 `DivX503b1393p`.
pub fn is_packed_signature(user_data: &[u8]) -> bool {
    fn skip_digits(data: &[u8]) -> Option<&[u8]> {
        let n = data.iter().take_while(|b| b.is_ascii_digit()).count();
        (n > 0).then(|| &data[n..])
    }

    let Some(rest) = user_data.strip_prefix(b"DivX") else {
        return false;
    };
    let Some((&c1, rest)) = skip_digits(rest).and_then(|r| r.split_first()) else {
        return false;
    };
    let Some((&c2, _)) = skip_digits(rest).and_then(|r| r.split_first()) else {
        return false;
    };

    matches!(c1, b'b' | b'B') && matches!(c2, b'p' | b'P')
}

/// 在访问单元的 user_data 中查找已 packed 的 DivX 签名
///
/// 找到时返回签名文本 (截至第一个 NUL), 用于日志.
pub fn find_packed_signature(data: &[u8]) -> Option<String> {
    extract_user_data(data)
        .into_iter()
        .find(|ud| is_packed_signature(ud))
        .map(|ud| {
            let end = ud.iter().position(|&b| b == 0).unwrap_or(ud.len());
            String::from_utf8_lossy(&ud[..end]).into_owned()
        })
}

/// 合成填充用的 N-VOP (未编码 VOP)
///
/// 结构: 起始码 `00 00 01 B6`, vop_coding_type=01, modulo_time_base=0, marker=1,
/// vop_time_increment (`time_inc_bits` 位), marker=1, vop_coded=0, stuffing.
/// 位宽不超过 16 时结果不超过 7 字节.
pub fn build_nvop(time_inc_bits: u32, time_inc: u32) -> M4vResult<Vec<u8>> {
    if time_inc_bits == 0 || time_inc_bits > MAX_TIME_INC_BITS {
        return Err(M4vError::Codec(format!(
            "无法合成 N-VOP: time_increment 位宽 {} 无效 (尚未解析到 VOL?)",
            time_inc_bits
        )));
    }

    let mask = (1u32 << time_inc_bits) - 1;
    let mut bw = BitWriter::with_capacity(8);
    bw.write_bytes(&[0x00, 0x00, 0x01, 0xB6]);
    bw.write_bits(VOP_TYPE_P, 2);
    bw.write_bit(0); // modulo_time_base
    bw.write_bit(1); // marker
    bw.write_bits(time_inc & mask, time_inc_bits);
    bw.write_bit(1); // marker
    bw.write_bit(0); // vop_coded
    bw.write_stuffing();
    Ok(bw.finish())
}
