//! 比特流写入器.
//!
//! 按大端位序 (MSB first) 向字节缓冲区写入, 与 [`BitReader`](crate::bitreader::BitReader) 对应.
//! packed bitstream 打包时用它合成填充用的 N-VOP 头部.

/// 比特流写入器
///
/// # 示例
/// ```
/// use m4vpack_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0b01, 2);
/// bw.write_bit(0);
/// bw.write_stuffing();
/// assert_eq!(bw.finish(), vec![0b0100_1111]);
/// ```
pub struct BitWriter {
    /// 输出缓冲区
    data: Vec<u8>,
    /// 当前字节 (正在填充)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// 以指定容量创建比特流写入器
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// 获取已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }

    /// 是否位于字节边界
    pub fn is_aligned(&self) -> bool {
        self.bit_count == 0
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: u32) {
        self.current_byte = (self.current_byte << 1) | (bit & 1) as u8;
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 写入 N 个位 (最多 32 位)
    ///
    /// 值的低 N 位被写入, 高位在前. 未凑满的尾部字节在多次调用之间保留.
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);

        let mut remaining = n;
        while remaining > 0 {
            let available = 8 - u32::from(self.bit_count);
            let take = remaining.min(available);

            let shift = remaining - take;
            let mask = (1u32 << take) - 1;
            let bits = ((value >> shift) & mask) as u8;

            // take == 8 时 bit_count 必为 0, 直接整字节赋值避免 u8 移位溢出
            self.current_byte = if take == 8 {
                bits
            } else {
                (self.current_byte << take) | bits
            };
            self.bit_count += take as u8;

            if self.bit_count == 8 {
                self.data.push(self.current_byte);
                self.current_byte = 0;
                self.bit_count = 0;
            }

            remaining -= take;
        }
    }

    /// 写入 MPEG-4 stuffing, 对齐到字节边界
    ///
    /// 填充值为 `0x7F >> 已用位数`, 宽度为剩余空闲位数:
    /// 一个 0 后接若干 1. 已对齐时写入完整的 `0x7F` 字节.
    pub fn write_stuffing(&mut self) {
        let used = u32::from(self.bit_count);
        self.write_bits(0x7F >> used, 8 - used);
    }

    /// 写入完整字节
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.bit_count == 0 {
            self.data.extend_from_slice(bytes);
        } else {
            for &b in bytes {
                self.write_bits(u32::from(b), 8);
            }
        }
    }

    /// 完成写入, 返回字节数据
    ///
    /// 尾部不足一字节的部分用 0 补齐. 需要 MPEG-4 stuffing 时应先调用
    /// [`write_stuffing`](Self::write_stuffing).
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            let pad = 8 - self.bit_count;
            self.data.push(self.current_byte << pad);
        }
        self.data
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}
