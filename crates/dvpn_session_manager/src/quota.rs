/// Checks if consumed traffic exceeds the authorized quota.
///
/// Counters are widened to `u128` so the sum of two `u64` values can never overflow.
#[must_use]
pub fn quota_exceeded(upload: u64, download: u64, available: u64) -> bool {
    let consumed = u128::from(upload) + u128::from(download);
    consumed > u128::from(available)
}
