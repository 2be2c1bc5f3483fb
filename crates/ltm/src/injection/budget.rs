use serde::{Deserialize, Serialize};

use crate::config::BudgetConfig;
use crate::error::{LtmError, Result};

/// Token budget for an injected context block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Budget {
    /// Explicit token count
    Tokens(usize),
    /// Share of the host's total context window
    Fraction { context_window: usize, fraction: f64 },
}

impl Budget {
    /// Validated fraction budget; `fraction` must lie in (0, 1]
    pub fn fraction(context_window: usize, fraction: f64) -> Result<Self> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(LtmError::InvalidInput(format!(
                "budget fraction must be in (0, 1], got {fraction}"
            )));
        }
        Ok(Budget::Fraction {
            context_window,
            fraction,
        })
    }

    /// Budget in tokens
    pub fn tokens(&self) -> usize {
        match *self {
            Budget::Tokens(tokens) => tokens,
            Budget::Fraction {
                context_window,
                fraction,
            } => (context_window as f64 * fraction.clamp(0.0, 1.0)).floor() as usize,
        }
    }
}

impl From<&BudgetConfig> for Budget {
    fn from(config: &BudgetConfig) -> Self {
        match config.max_tokens {
            Some(tokens) => Budget::Tokens(tokens),
            None => Budget::Fraction {
                context_window: config.context_window,
                fraction: config.context_fraction,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget_is_ten_percent() {
        let budget = Budget::from(&BudgetConfig::default());
        assert_eq!(budget.tokens(), 20_000);
    }

    #[test]
    fn test_explicit_tokens_win() {
        let config = BudgetConfig {
            max_tokens: Some(500),
            ..BudgetConfig::default()
        };
        assert_eq!(Budget::from(&config), Budget::Tokens(500));
    }

    #[test]
    fn test_fraction_validation() {
        assert!(Budget::fraction(1000, 0.0).is_err());
        assert!(Budget::fraction(1000, 1.5).is_err());
        assert_eq!(Budget::fraction(1000, 0.25).expect("valid").tokens(), 250);
    }
}
