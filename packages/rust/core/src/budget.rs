//! Timeout budget planning.

use std::time::Duration;

use bizclass_shared::{BudgetPolicy, ClassificationRequest, Result, TimeoutBudget};

/// Splits a request's total deadline into per-stage sub-budgets.
#[derive(Debug, Clone)]
pub struct BudgetPlanner {
    policy: BudgetPolicy,
    ml_available: bool,
}

impl BudgetPlanner {
    /// Fails with a config error when `policy` would make [`plan`](Self::plan)
    /// clamp an inverted range or scale by a non-finite share.
    pub fn new(policy: BudgetPolicy, ml_available: bool) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            policy,
            ml_available,
        })
    }

    pub fn with_ml_available(mut self, ml_available: bool) -> Self {
        self.ml_available = ml_available;
        self
    }

    pub fn policy(&self) -> &BudgetPolicy {
        &self.policy
    }

    /// Plan the budget for `request`. Never fails.
    ///
    /// - total: the request override clamped to `[min, max]`, else the default
    /// - acquisition: `acquisition_share` of total, zero without a website
    /// - ml: `ml_share` of total, zero unless requested and configured
    /// - overhead: the reserve, capped by what is left
    /// - keyword: everything else
    pub fn plan(&self, request: &ClassificationRequest) -> TimeoutBudget {
        let p = &self.policy;
        let total = request
            .timeout
            .map(|t| t.clamp(p.min_timeout, p.max_timeout))
            .unwrap_or(p.default_timeout);

        let has_website = request
            .website
            .as_deref()
            .is_some_and(|w| !w.trim().is_empty());

        let acquisition = if has_website {
            total.mul_f64(p.acquisition_share)
        } else {
            Duration::ZERO
        };
        let ml = if request.flags.enable_ml && self.ml_available {
            total.mul_f64(p.ml_share)
        } else {
            Duration::ZERO
        };

        let remaining = total.saturating_sub(acquisition).saturating_sub(ml);
        let overhead = p.overhead_reserve.min(remaining);
        let keyword = remaining - overhead;

        TimeoutBudget {
            total,
            acquisition,
            ml,
            keyword,
            overhead,
            fast_path: total <= p.fast_path_threshold,
        }
    }
}
