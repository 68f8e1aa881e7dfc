//! 驱动码流过滤器并生成时间戳报告.

use anyhow::{Context, Result, bail};
use log::{info, warn};
use m4vpack_codec::Packet;
use m4vpack_codec::bsf::{BitstreamFilter, Mpeg4Packer, Mpeg4Unpacker, drain_filter};
use m4vpack_codec::parsers::mpeg4::{VopCodingType, first_vop, scan_packed};
use m4vpack_core::timestamp;
use serde::Serialize;

use crate::config::{Mode, Settings};

/// 把全部访问单元送入过滤器, 最后送入空包并取出所有缓存帧
pub fn run_filter(filter: &mut dyn BitstreamFilter, units: Vec<Packet>) -> Result<Vec<Packet>> {
    let mut out = Vec::with_capacity(units.len());
    for (i, pkt) in units.into_iter().enumerate() {
        filter
            .send_packet(pkt)
            .with_context(|| format!("{}: 处理第 {} 个访问单元失败", filter.name(), i))?;
        out.extend(drain_filter(filter)?);
    }
    filter
        .send_packet(Packet::empty())
        .with_context(|| format!("{}: 码流结束处理失败", filter.name()))?;
    out.extend(drain_filter(filter)?);
    Ok(out)
}

fn unpack(settings: &Settings, units: Vec<Packet>) -> Result<Vec<Packet>> {
    let mut unpacker = Mpeg4Unpacker::with_config(settings.unpack_config());
    unpacker.set_frame_rate(settings.frame_rate, settings.time_base)?;
    run_filter(&mut unpacker, units)
}

fn pack(
    settings: &Settings,
    extra_data: Option<&[u8]>,
    units: Vec<Packet>,
) -> Result<Vec<Packet>> {
    let mut packer = Mpeg4Packer::with_config(settings.pack_config());
    if let Some(extra) = extra_data {
        packer.set_extra_data(extra)?;
    }
    run_filter(&mut packer, units)
}

/// 比较两组输出的负载与 PTS, 返回第一个不一致的位置
pub fn first_mismatch(expected: &[Packet], actual: &[Packet]) -> Option<usize> {
    let n = expected.len().min(actual.len());
    (0..n)
        .find(|&i| expected[i].data != actual[i].data || expected[i].pts != actual[i].pts)
        .or((expected.len() != actual.len()).then_some(n))
}

/// 按模式处理访问单元
pub fn process(
    settings: &Settings,
    extra_data: Option<&[u8]>,
    units: Vec<Packet>,
) -> Result<Vec<Packet>> {
    match settings.mode {
        Mode::Unpack => unpack(settings, units),
        Mode::Pack => pack(settings, extra_data, units),
        Mode::Roundtrip => {
            let direct = unpack(settings, units.clone())?;
            let packed = pack(settings, extra_data, units)?;
            info!("打包后 {} 个访问单元", packed.len());
            let roundtrip = unpack(settings, packed)?;
            if let Some(i) = first_mismatch(&direct, &roundtrip) {
                warn!(
                    "往返结果在第 {} 个包处不一致 (直接解包 {} 个, 往返 {} 个)",
                    i,
                    direct.len(),
                    roundtrip.len()
                );
                bail!("打包再解包的结果与直接解包不一致 (位置 {})", i);
            }
            info!("往返校验通过: {} 个访问单元", roundtrip.len());
            Ok(roundtrip)
        }
    }
}

/// 报告中的单个数据包
#[derive(Debug, Serialize)]
pub struct PacketEntry {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pts: Option<i64>,
    pub size: usize,
    pub vop_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coding_type: Option<&'static str>,
}

/// 时间戳报告
#[derive(Debug, Serialize)]
pub struct Report {
    pub mode: Mode,
    pub frame_rate: String,
    pub time_base: String,
    pub input_units: usize,
    pub output_units: usize,
    pub packets: Vec<PacketEntry>,
}

fn coding_type_name(t: VopCodingType) -> &'static str {
    match t {
        VopCodingType::I => "I",
        VopCodingType::P => "P",
        VopCodingType::B => "B",
        VopCodingType::S => "S",
    }
}

fn valid(ts: i64) -> Option<i64> {
    timestamp::is_valid(ts).then_some(ts)
}

impl Report {
    pub fn new(settings: &Settings, input_units: usize, output: &[Packet]) -> Self {
        let packets = output
            .iter()
            .enumerate()
            .map(|(index, pkt)| PacketEntry {
                index,
                dts: valid(pkt.dts),
                pts: valid(pkt.pts),
                size: pkt.size(),
                vop_count: scan_packed(&pkt.data).vop_count,
                coding_type: first_vop(&pkt.data).map(|(_, t)| coding_type_name(t)),
            })
            .collect();

        Self {
            mode: settings.mode,
            frame_rate: settings.frame_rate.to_string(),
            time_base: settings.time_base.to_string(),
            input_units,
            output_units: output.len(),
            packets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileConfig, Overrides};
    use crate::framing::split_elementary_stream;
    use m4vpack_codec::bsf::DEFAULT_MAX_NVOP_SIZE;

    fn vop(kind: u8, tag: u8) -> Vec<u8> {
        let mut data = vec![0x00, 0x00, 0x01, 0xB6, (kind << 6) | 0x10];
        data.extend(std::iter::repeat_n(tag, 7));
        data
    }

    /// VOL (time_increment_resolution = 25) 的字节形式
    const VOL_25: [u8; 9] = [0x00, 0x00, 0x01, 0x20, 0x00, 0x84, 0x40, 0x06, 0x60];

    fn settings(mode: Mode) -> Settings {
        let cli = Overrides {
            mode: Some(mode),
            ..Overrides::default()
        };
        Settings::resolve(FileConfig::default(), cli).unwrap()
    }

    fn gop() -> Vec<u8> {
        let mut data = VOL_25.to_vec();
        for (i, k) in [0u8, 1, 2, 1, 2, 2, 1].into_iter().enumerate() {
            data.extend_from_slice(&vop(k, 0x40 + i as u8));
        }
        data
    }

    #[test]
    fn test_roundtrip_mode_succeeds() {
        let settings = settings(Mode::Roundtrip);
        let units = split_elementary_stream(&gop(), 3600, settings.time_base, Some(false));
        let out = process(&settings, None, units).unwrap();
        assert_eq!(out.len(), 7);
    }

    #[test]
    fn test_pack_mode_inserts_fillers() {
        let settings = settings(Mode::Pack);
        let units = split_elementary_stream(&gop(), 3600, settings.time_base, Some(false));
        let out = process(&settings, None, units).unwrap();
        let fillers = out.iter().filter(|p| p.size() <= DEFAULT_MAX_NVOP_SIZE).count();
        assert_eq!(out.len(), 7);
        assert_eq!(fillers, 2);
    }

    #[test]
    fn test_first_mismatch() {
        let a = vec![Packet::from_data(vec![1u8]), Packet::from_data(vec![2u8])];
        let mut b = a.clone();
        assert_eq!(first_mismatch(&a, &b), None);
        b[1].pts = 5;
        assert_eq!(first_mismatch(&a, &b), Some(1));
        assert_eq!(first_mismatch(&a, &a[..1]), Some(1));
    }

    #[test]
    fn test_report_serializes() {
        let settings = settings(Mode::Unpack);
        let units = split_elementary_stream(&gop(), 3600, settings.time_base, None);
        let out = process(&settings, None, units).unwrap();
        let report = Report::new(&settings, 7, &out);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["mode"], "unpack");
        assert_eq!(json["output_units"], 7);
        assert_eq!(json["packets"][0]["pts"], 3600);
        assert_eq!(json["packets"][0]["coding_type"], "I");
    }
}
