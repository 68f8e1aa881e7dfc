//! 时间戳工具.
//!
//! 时间戳以 `i64` 表示, 单位为所在流的 time_base. `NOPTS_VALUE` 表示未设置.

use crate::rational::Rational;

/// 表示"未定义"的时间戳值
pub const NOPTS_VALUE: i64 = i64::MIN;

/// 判断时间戳是否有效 (非 NOPTS_VALUE)
pub const fn is_valid(ts: i64) -> bool {
    ts != NOPTS_VALUE
}

/// 根据帧率计算单帧时长 (以 `time_base` 为单位)
///
/// duration = time_base.den * frame_rate.den / (time_base.num * frame_rate.num),
/// 结果向最近整数取整. 帧率或时间基无效时返回 `None`.
pub fn frame_duration(frame_rate: Rational, time_base: Rational) -> Option<i64> {
    if !frame_rate.is_valid() || !time_base.is_valid() || frame_rate.num <= 0 || time_base.num <= 0
    {
        return None;
    }
    let num = i128::from(time_base.den) * i128::from(frame_rate.den);
    let den = i128::from(time_base.num) * i128::from(frame_rate.num);
    let duration = (num + den / 2) / den;
    if duration <= 0 {
        return None;
    }
    Some(duration as i64)
}

/// 时间戳加上偏移量, 未设置的时间戳保持未设置
pub fn offset(ts: i64, delta: i64) -> i64 {
    if is_valid(ts) {
        ts.saturating_add(delta)
    } else {
        NOPTS_VALUE
    }
}

/// 时间戳的日志友好显示, 未设置时显示 "NOPTS"
pub fn display(ts: i64) -> String {
    if is_valid(ts) {
        ts.to_string()
    } else {
        "NOPTS".to_string()
    }
}
