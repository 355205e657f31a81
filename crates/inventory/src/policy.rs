use serde::{Deserialize, Serialize};

/// Tunables for ledger operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerPolicy {
    /// Minimum trimmed length of an adjustment justification.
    pub min_justification_len: usize,
    /// Decimal places kept on the weighted-average unit cost (rounded half-up).
    pub cost_scale: u32,
}

impl LedgerPolicy {
    pub const DEFAULT_MIN_JUSTIFICATION_LEN: usize = 20;
    pub const DEFAULT_COST_SCALE: u32 = 2;
    /// rust_decimal carries at most 28 fractional digits.
    pub const MAX_COST_SCALE: u32 = 28;
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            min_justification_len: Self::DEFAULT_MIN_JUSTIFICATION_LEN,
            cost_scale: Self::DEFAULT_COST_SCALE,
        }
    }
}
