use serde::{Deserialize, Serialize};

/// Aggregation interval of the emitted quotation events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frequency {
    pub label: String,
    pub seconds: i64,
}

impl Frequency {
    /// Parses `"<n>min"`, `"<n>m"`, `"<n>sec"` or `"<n>s"` (case-insensitive, `n > 0`).
    pub fn parse(value: &str) -> Result<Self, String> {
        let normalized = value.trim().to_lowercase();
        if normalized.is_empty() {
            return Err("empty frequency".to_string());
        }

        let (number_part, multiplier) = if let Some(stripped) = normalized.strip_suffix("min") {
            (stripped, 60)
        } else if let Some(stripped) = normalized.strip_suffix("sec") {
            (stripped, 1)
        } else if let Some(stripped) = normalized.strip_suffix('m') {
            (stripped, 60)
        } else if let Some(stripped) = normalized.strip_suffix('s') {
            (stripped, 1)
        } else {
            return Err(format!("unsupported frequency unit: {value}"));
        };

        let number: i64 = number_part
            .trim()
            .parse()
            .map_err(|_| format!("invalid frequency: {value}"))?;
        if number <= 0 {
            return Err(format!("frequency must be > 0: {value}"));
        }

        let seconds = number
            .checked_mul(multiplier)
            .ok_or_else(|| format!("frequency too large: {value}"))?;

        Ok(Self {
            label: value.trim().to_string(),
            seconds,
        })
    }

    /// Whole minutes covered by one interval; `None` when the interval is not minute-aligned.
    pub fn whole_minutes(&self) -> Option<i64> {
        if self.seconds % 60 == 0 {
            Some(self.seconds / 60)
        } else {
            None
        }
    }
}
