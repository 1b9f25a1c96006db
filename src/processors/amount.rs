//! Amounts are integers of 10^-7 units; rows and details show them as
//! decimal strings with seven fractional digits.

const ONE: i64 = 10_000_000;

pub fn format(stroops: i64) -> String {
    let sign = if stroops < 0 { "-" } else { "" };
    let abs = stroops.unsigned_abs();
    format!("{}{}.{:07}", sign, abs / ONE as u64, abs % ONE as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        assert_eq!(format(0), "0.0000000");
        assert_eq!(format(1), "0.0000001");
        assert_eq!(format(100_000_000), "10.0000000");
        assert_eq!(format(-25_000_000), "-2.5000000");
        assert_eq!(format(i64::MIN), "-922337203685.4775808");
    }
}
