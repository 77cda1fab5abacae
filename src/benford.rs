//! Leading-digit audit against Benford's Law

/// Expected share (percent) of leading digits 1 through 9
pub const BENFORD_PCT: [f64; 9] = [30.1, 17.6, 12.5, 9.7, 7.9, 6.7, 5.8, 5.1, 4.6];

/// Values at or below this are too small for leading-digit statistics
pub const MIN_AUDIT_VALUE: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DigitBin {
    pub digit: u8,
    pub observed: u64,
    pub expected: f64,
}

/// Observed and expected leading-digit counts
#[derive(Debug, Clone, PartialEq)]
pub struct BenfordAudit {
    /// Values that passed the size filter
    pub sample_size: u64,
    pub bins: [DigitBin; 9],
}

impl BenfordAudit {
    pub fn observed(&self) -> [u64; 9] {
        self.bins.map(|b| b.observed)
    }

    pub fn expected(&self) -> [f64; 9] {
        self.bins.map(|b| b.expected)
    }
}

/// First decimal digit of a positive value
pub fn leading_digit(mut value: u64) -> Option<u8> {
    if value == 0 {
        return None;
    }
    while value >= 10 {
        value /= 10;
    }
    Some(value as u8)
}

/// Count leading digits of all values above [`MIN_AUDIT_VALUE`]
pub fn audit_leading_digits<I>(values: I) -> BenfordAudit
where
    I: IntoIterator<Item = u64>,
{
    let mut observed = [0u64; 9];
    for digit in values
        .into_iter()
        .filter(|&v| v > MIN_AUDIT_VALUE)
        .filter_map(leading_digit)
    {
        observed[usize::from(digit) - 1] += 1;
    }

    let sample_size: u64 = observed.iter().sum();
    let bins = std::array::from_fn(|i| DigitBin {
        digit: i as u8 + 1,
        observed: observed[i],
        expected: sample_size as f64 * BENFORD_PCT[i] / 100.0,
    });

    BenfordAudit { sample_size, bins }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_digit() {
        assert_eq!(leading_digit(0), None);
        assert_eq!(leading_digit(7), Some(7));
        assert_eq!(leading_digit(105), Some(1));
        assert_eq!(leading_digit(u64::MAX), Some(1));
    }

    #[test]
    fn test_audit_counts_and_filter() {
        let audit = audit_leading_digits([5, 10, 11, 19, 21, 30, 105]);

        assert_eq!(audit.sample_size, 5);
        assert_eq!(audit.observed(), [3, 1, 1, 0, 0, 0, 0, 0, 0]);
        assert!((audit.bins[0].expected - 1.505).abs() < 1e-9);
        assert_eq!(audit.bins[8].digit, 9);
    }

    #[test]
    fn test_expected_percentages_sum_to_one_hundred() {
        let total: f64 = BENFORD_PCT.iter().sum();
        assert!((total - 100.0).abs() < 1e-9);

        let audit = audit_leading_digits((11..=1000).step_by(7));
        let expected_total: f64 = audit.expected().iter().sum();
        assert!((expected_total - audit.sample_size as f64).abs() < 1e-6);
    }

    #[test]
    fn test_empty_audit() {
        let audit = audit_leading_digits(std::iter::empty());
        assert_eq!(audit.sample_size, 0);
        assert!(audit.expected().iter().all(|&e| e == 0.0));
    }
}
