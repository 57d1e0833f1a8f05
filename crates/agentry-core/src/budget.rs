//! Per-department budget ledger with atomic test-and-increment admission.
//!
//! Spend is tracked in integer euro cents within a calendar-month billing
//! period. The check and the increment happen under one entry lock, so a
//! burst of concurrent requests cannot all pass the check before any of
//! them registers spend.
//!
//! Departments without a configured budget take the explicit
//! [`BudgetPolicy::Unmetered`] branch: always admitted, nothing tracked.
//! This is a deliberate policy choice to avoid blocking unmapped agents,
//! not an oversight.

use chrono::{Datelike, Utc};
use dashmap::DashMap;

use agentry_types::config::DepartmentBudget;

/// Which policy branch produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetPolicy {
    /// The department has a configured monthly budget.
    Metered,
    /// No budget configured; admission is unconditional and untracked.
    Unmetered,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetDecision {
    pub admitted: bool,
    /// Projected percentage of the budget used, including this request.
    pub pct_used: f64,
    pub policy: BudgetPolicy,
}

/// A calendar-month billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPeriod {
    pub year: i32,
    pub month: u32,
}

impl BillingPeriod {
    pub fn current() -> Self {
        let now = Utc::now();
        Self {
            year: now.year(),
            month: now.month(),
        }
    }
}

#[derive(Debug)]
struct Account {
    budget_cents: u64,
    spent_cents: u64,
    period: BillingPeriod,
}

/// Concurrent budget ledger, one account per configured department.
pub struct BudgetLedger {
    accounts: DashMap<String, Account>,
}

impl BudgetLedger {
    /// Build the ledger from configured department budgets. Spend starts at
    /// zero in the current billing period.
    pub fn new(budgets: &[DepartmentBudget]) -> Self {
        let accounts = DashMap::new();
        let period = BillingPeriod::current();
        for budget in budgets {
            accounts.insert(
                budget.department_key.clone(),
                Account {
                    budget_cents: budget.monthly_budget_cents(),
                    spent_cents: 0,
                    period,
                },
            );
        }
        Self { accounts }
    }

    /// Check whether `cost_cents` fits the department's remaining budget
    /// and, if so, reserve it -- atomically.
    pub fn check_and_reserve(&self, department_key: &str, cost_cents: u64) -> BudgetDecision {
        self.check_and_reserve_in(BillingPeriod::current(), department_key, cost_cents)
    }

    /// Same as [`check_and_reserve`](Self::check_and_reserve) with an
    /// explicit billing period, so period rollover is testable.
    pub fn check_and_reserve_in(
        &self,
        period: BillingPeriod,
        department_key: &str,
        cost_cents: u64,
    ) -> BudgetDecision {
        let Some(mut account) = self.accounts.get_mut(department_key) else {
            return BudgetDecision {
                admitted: true,
                pct_used: 0.0,
                policy: BudgetPolicy::Unmetered,
            };
        };

        // Reset spend at the period boundary
        if account.period != period {
            tracing::info!(
                department_key,
                spent_cents = account.spent_cents,
                "billing period rollover, resetting spend"
            );
            account.period = period;
            account.spent_cents = 0;
        }

        let projected = account.spent_cents + cost_cents;
        let pct_used = projected as f64 / account.budget_cents as f64 * 100.0;

        if pct_used >= 100.0 {
            tracing::warn!(
                department_key,
                spent_cents = account.spent_cents,
                cost_cents,
                pct_used,
                "budget admission rejected"
            );
            return BudgetDecision {
                admitted: false,
                pct_used,
                policy: BudgetPolicy::Metered,
            };
        }

        account.spent_cents = projected;
        BudgetDecision {
            admitted: true,
            pct_used,
            policy: BudgetPolicy::Metered,
        }
    }

    /// Current spend for a metered department, in cents.
    pub fn spent_cents(&self, department_key: &str) -> Option<u64> {
        self.accounts.get(department_key).map(|a| a.spent_cents)
    }

    /// Whether a department is metered.
    pub fn is_metered(&self, department_key: &str) -> bool {
        self.accounts.contains_key(department_key)
    }
}
