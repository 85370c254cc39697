use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// A quantity of fluid (stored volume, flow per tick, capacity).
pub type Volume = Fixed64;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Convert an f64 to a [`Volume`]. Use only for initialization, never in the sim loop.
#[inline]
pub fn f64_to_volume(v: f64) -> Volume {
    Volume::from_num(v)
}

/// Convert a [`Volume`] to f64. Use only for display, never in the sim loop.
#[inline]
pub fn volume_to_f64(v: Volume) -> f64 {
    v.to_num::<f64>()
}

/// Clamp a volume into `[lo, hi]`. Returns `lo` when the range is empty.
#[inline]
pub fn clamp_volume(v: Volume, lo: Volume, hi: Volume) -> Volume {
    if hi < lo {
        return lo;
    }
    v.max(lo).min(hi)
}

/// `part / whole` as a ratio in `[0, 1]`. Zero when `whole` is not positive.
#[inline]
pub fn ratio(part: Volume, whole: Volume) -> Fixed64 {
    if whole <= Volume::ZERO {
        return Fixed64::ZERO;
    }
    match part.checked_div(whole) {
        Some(r) => clamp_volume(r, Fixed64::ZERO, Fixed64::from_num(1)),
        None => Fixed64::from_num(1),
    }
}

/// Split `amount` in proportion to `share / total`, never exceeding `amount`.
///
/// Computed as `amount * (share / total)` so the intermediate product stays
/// within range for any volume the type can represent.
#[inline]
pub fn proportional(amount: Volume, share: Volume, total: Volume) -> Volume {
    amount.saturating_mul(ratio(share, total))
}

/// Sum an iterator of volumes with saturation.
pub fn sum_volumes(iter: impl IntoIterator<Item = Volume>) -> Volume {
    iter.into_iter()
        .fold(Volume::ZERO, |acc, v| acc.saturating_add(v))
}
