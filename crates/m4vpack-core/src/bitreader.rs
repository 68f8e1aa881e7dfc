//! 比特流读取器.
//!
//! 按大端位序 (MSB first) 从字节缓冲区中逐位读取, 用于解析 MPEG-4 Part 2 的
//! VOL/VOP 头部字段. 游标 (字节位置 + 位位置) 由读取器自身持有, 不存在共享状态.

use crate::{M4vError, M4vResult};

/// 比特流读取器
///
/// # 示例
/// ```
/// use m4vpack_core::bitreader::BitReader;
///
/// // coding_type=01 (P), modulo_time_base=10, marker=1
/// let data = [0b0110_1000];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(2).unwrap(), 0b01);
/// assert_eq!(br.read_unary(0).unwrap(), 1);
/// assert_eq!(br.read_bit().unwrap(), 1);
/// ```
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        if self.byte_pos >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> M4vResult<u32> {
        if self.byte_pos >= self.data.len() {
            return Err(M4vError::Eof);
        }

        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(u32::from(bit))
    }

    /// 读取 N 个位 (0 <= N <= 32)
    ///
    /// 返回值的低 N 位有效, 可跨越字节边界.
    pub fn read_bits(&mut self, n: u32) -> M4vResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(M4vError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n,
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(M4vError::Eof);
        }

        // 用 u64 累加, 避免 n=32 时移位溢出
        let mut result: u64 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let available = 8 - u32::from(self.bit_pos);
            let take = remaining.min(available);

            let shift = available - take;
            let mask = ((1u32 << take) - 1) as u8;
            let bits = (self.data[self.byte_pos] >> shift) & mask;
            result = (result << take) | u64::from(bits);

            self.bit_pos += take as u8;
            if self.bit_pos == 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= take;
        }

        Ok(result as u32)
    }

    /// 读取一元编码值
    ///
    /// 统计在遇到 `stop_bit` 之前出现的相反位个数, 并消耗 `stop_bit` 本身.
    /// MPEG-4 的 `modulo_time_base` 就是以 0 结尾的一串 1, 即 `read_unary(0)`.
    pub fn read_unary(&mut self, stop_bit: u32) -> M4vResult<u32> {
        let stop = stop_bit & 1;
        let mut count = 0u32;
        while self.read_bit()? != stop {
            count += 1;
        }
        Ok(count)
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: u32) -> M4vResult<()> {
        if (n as usize) > self.bits_left() {
            return Err(M4vError::Eof);
        }

        let total_bits = u32::from(self.bit_pos) + n;
        self.byte_pos += (total_bits / 8) as usize;
        self.bit_pos = (total_bits % 8) as u8;

        Ok(())
    }

    /// 获取当前字节位置
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }
}
