//! Integers shown with binary prefixes (`KiB`, `MiB`, ...).

use std::fmt;

const PREFIXES: [&str; 9] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi", "Yi"];

/// An integer quantity that displays itself scaled by powers of 1024.
///
/// The scale switches one step before the value reaches the next power of
/// 1024 (at 1000 of a unit), so `1000` shows as `0.977 KiB`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HumanReadable {
    value: u64,
    unit: String,
}

impl HumanReadable {
    pub fn new(value: u64) -> Self {
        Self::with_unit(value, "B")
    }

    pub fn with_unit(value: u64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    /// Power of 1024 used for display.
    pub fn scaler(&self) -> i32 {
        if self.value == 0 {
            return 0;
        }
        1 + ((self.value as f64 / 1000.0).log2() / 10.0).floor() as i32
    }

    pub fn scaled(&self) -> f64 {
        self.value as f64 / 1024f64.powi(self.scaler())
    }

    fn prefix(&self) -> &'static str {
        usize::try_from(self.scaler())
            .ok()
            .and_then(|i| PREFIXES.get(i).copied())
            .unwrap_or("")
    }
}

impl From<u64> for HumanReadable {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

/// Precision defaults to 3 decimals; width pads the number only.
impl fmt::Display for HumanReadable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let precision = f.precision().unwrap_or(3);
        let width = f.width().unwrap_or(0);
        write!(
            f,
            "{:>width$.precision$} {}{}",
            self.scaled(),
            self.prefix(),
            self.unit,
            width = width,
            precision = precision
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humanreadable() {
        assert_eq!(format!("{:.1}", HumanReadable::new(1 << 10)), "1.0 KiB");
        assert_eq!(format!("{:.7}", HumanReadable::new(1000)), "0.9765625 KiB");
        assert_eq!(format!("{:.1}", HumanReadable::new(1 << 20)), "1.0 MiB");
        assert_eq!(
            format!("{:.4}", HumanReadable::with_unit(1_000_000, "baud")),
            "976.5625 Kibaud"
        );
        assert_eq!(
            format!("{:10.2}", HumanReadable::new(123_456_789)),
            "    117.74 MiB"
        );
    }

    #[test]
    fn test_default_precision_and_small_values() {
        assert_eq!(HumanReadable::new(1024).to_string(), "1.000 KiB");
        assert_eq!(HumanReadable::new(500).to_string(), "500.000 B");
        assert_eq!(HumanReadable::new(0).to_string(), "0.000 B");
        assert_eq!(HumanReadable::new(1).scaler(), 0);
    }
}
