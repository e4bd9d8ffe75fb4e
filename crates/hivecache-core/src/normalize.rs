//! Numeric and text normalizers applied while building cache rows.

/// Reputation shown for a zero (or sub-threshold) raw score.
const REP_CENTER: f64 = 25.0;
/// Display points per order of magnitude.
const REP_POINTS_PER_MAGNITUDE: f64 = 9.0;
/// Raw scores below `10^REP_FLOOR_MAGNITUDE` collapse onto the center.
const REP_FLOOR_MAGNITUDE: f64 = 9.0;

/// Rescale a raw reputation score into the compact display value.
///
/// Magnitudes are compressed with a base-10 logarithm of the leading four
/// digits, shifted so that `10^9` maps to 25, and scaled by 9 points per
/// order of magnitude. The sign of the raw score is preserved.
///
/// The result is non-decreasing in `rep` across the whole `i64` range.
pub fn rep_log10(rep: i64) -> f64 {
    if rep == 0 {
        return REP_CENTER;
    }
    let sign = if rep < 0 { -1.0 } else { 1.0 };
    let abs = rep.unsigned_abs();

    // n = number of decimal digits - 1
    let n = abs.ilog10();
    let leading = abs / 10u64.pow(n.saturating_sub(3));
    let log = (leading as f64).log10() + 0.000_000_01;
    let magnitude = n as f64 + log.fract();

    let out = (magnitude - REP_FLOOR_MAGNITUDE).max(0.0) * sign;
    round2(out * REP_POINTS_PER_MAGNITUDE + REP_CENTER)
}

/// Trim `s` and cap it at `max_chars` characters, marking the cut with `...`.
pub fn trunc(s: &str, max_chars: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Convert a lifetime bandwidth counter to kilobytes.
pub fn kb_used(lifetime_bandwidth: i64) -> f64 {
    lifetime_bandwidth as f64 / 1e6 / 1024.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
