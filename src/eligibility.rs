//! Eligibility evaluation
//!
//! Rules-based verdict over a completed applicant record.
//! Deterministic: the same input and date always give the same verdict.

use crate::models::{EligibilityCheck, EligibilityInput, EligibilityVerdict};
use chrono::{Datelike, NaiveDate};
use tracing::info;

pub const EXPLANATION: &str =
    "Based on our assessment of your financial profile and eligibility criteria.";

pub const NEXT_STEPS: [&str; 3] = [
    "Upload last 6 months' bank statements",
    "Upload latest salary slips",
    "Proceed to application form",
];

pub const IMPROVEMENT_SUGGESTIONS: [&str; 3] = [
    "Improve your credit score",
    "Reduce your existing debt",
    "Maintain stable employment",
];

/// Thresholds applied by the default rule set
#[derive(Debug, Clone)]
pub struct EligibilityPolicy {
    pub min_age: i32,
    pub max_age: i32,
    pub min_monthly_income: f64,
    pub max_debt_ratio: f64,
    pub min_credit_score: u16,
    pub min_years_employed: f64,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self {
            min_age: 21,
            max_age: 58,
            min_monthly_income: 25_000.0,
            max_debt_ratio: 0.5,
            min_credit_score: 750,
            min_years_employed: 1.0,
        }
    }
}

/// Outcome of a single rule. `details` is the summary line when the rule
/// passes and the applicant-facing reason when it fails.
pub struct RuleOutcome {
    pub passed: bool,
    pub details: String,
}

pub trait EligibilityRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, input: &EligibilityInput, today: NaiveDate) -> RuleOutcome;
}

/// Completed years between `date_of_birth` and `today`.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    age
}

/// Existing EMIs over income; 1.0 when there is no income.
pub fn debt_ratio(existing_emis: f64, monthly_income: f64) -> f64 {
    if monthly_income > 0.0 {
        existing_emis / monthly_income
    } else {
        1.0
    }
}

/// Renders an amount without a trailing `.0` for whole values.
pub fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

//
// ========== Rules ==========
//

pub struct AgeRule {
    min: i32,
    max: i32,
}

impl EligibilityRule for AgeRule {
    fn name(&self) -> &'static str {
        "age_range"
    }

    fn evaluate(&self, input: &EligibilityInput, today: NaiveDate) -> RuleOutcome {
        let age = age_on(input.date_of_birth, today);
        if (self.min..=self.max).contains(&age) {
            RuleOutcome {
                passed: true,
                details: format!("Age: {} (within {}-{} range)", age, self.min, self.max),
            }
        } else {
            RuleOutcome {
                passed: false,
                details: format!(
                    "Age {} is outside acceptable range ({}-{})",
                    age, self.min, self.max
                ),
            }
        }
    }
}

pub struct MinimumIncomeRule {
    min: f64,
}

impl EligibilityRule for MinimumIncomeRule {
    fn name(&self) -> &'static str {
        "minimum_income"
    }

    fn evaluate(&self, input: &EligibilityInput, _today: NaiveDate) -> RuleOutcome {
        let income = input.monthly_income;
        if income >= self.min {
            RuleOutcome {
                passed: true,
                details: format!(
                    "Monthly income: ₹{} (>= ₹{})",
                    format_amount(income),
                    format_amount(self.min)
                ),
            }
        } else {
            RuleOutcome {
                passed: false,
                details: format!(
                    "Income ₹{} is below minimum requirement (₹{})",
                    format_amount(income),
                    format_amount(self.min)
                ),
            }
        }
    }
}

pub struct DebtRatioRule {
    max: f64,
}

impl EligibilityRule for DebtRatioRule {
    fn name(&self) -> &'static str {
        "debt_to_income"
    }

    fn evaluate(&self, input: &EligibilityInput, _today: NaiveDate) -> RuleOutcome {
        let ratio = debt_ratio(input.existing_emis, input.monthly_income);
        if ratio <= self.max {
            RuleOutcome {
                passed: true,
                details: format!(
                    "Existing EMIs: ₹{} ({:.0}% of income, <= {:.0}%)",
                    format_amount(input.existing_emis),
                    ratio * 100.0,
                    self.max * 100.0
                ),
            }
        } else {
            RuleOutcome {
                passed: false,
                details: format!(
                    "Debt-to-income ratio {:.2} exceeds maximum allowed ({})",
                    ratio, self.max
                ),
            }
        }
    }
}

pub struct CreditScoreRule {
    min: u16,
}

impl EligibilityRule for CreditScoreRule {
    fn name(&self) -> &'static str {
        "credit_score"
    }

    fn evaluate(&self, input: &EligibilityInput, _today: NaiveDate) -> RuleOutcome {
        if input.credit_score >= self.min {
            RuleOutcome {
                passed: true,
                details: format!("Credit score: {} (>= {})", input.credit_score, self.min),
            }
        } else {
            RuleOutcome {
                passed: false,
                details: format!(
                    "Credit score {} is below preferred threshold ({})",
                    input.credit_score, self.min
                ),
            }
        }
    }
}

pub struct EmploymentTenureRule {
    min_years: f64,
}

impl EligibilityRule for EmploymentTenureRule {
    fn name(&self) -> &'static str {
        "employment_tenure"
    }

    fn evaluate(&self, input: &EligibilityInput, _today: NaiveDate) -> RuleOutcome {
        let years = format_amount(input.years_employed);
        if input.years_employed >= self.min_years {
            RuleOutcome {
                passed: true,
                details: format!("Employment duration: {} years", years),
            }
        } else {
            RuleOutcome {
                passed: false,
                details: format!(
                    "Employment duration {} years is below minimum requirement ({} year)",
                    years,
                    format_amount(self.min_years)
                ),
            }
        }
    }
}

//
// ========== Evaluator ==========
//

/// Applies rules in order; every rule must pass for an eligible verdict.
pub struct EligibilityEvaluator {
    rules: Vec<Box<dyn EligibilityRule>>,
}

impl EligibilityEvaluator {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Standard rule set in reason order: age, income, debt ratio, credit score, tenure.
    pub fn with_policy(policy: &EligibilityPolicy) -> Self {
        let mut evaluator = Self::new();
        evaluator.add_rule(Box::new(AgeRule {
            min: policy.min_age,
            max: policy.max_age,
        }));
        evaluator.add_rule(Box::new(MinimumIncomeRule {
            min: policy.min_monthly_income,
        }));
        evaluator.add_rule(Box::new(DebtRatioRule {
            max: policy.max_debt_ratio,
        }));
        evaluator.add_rule(Box::new(CreditScoreRule {
            min: policy.min_credit_score,
        }));
        evaluator.add_rule(Box::new(EmploymentTenureRule {
            min_years: policy.min_years_employed,
        }));
        evaluator
    }

    pub fn add_rule(&mut self, rule: Box<dyn EligibilityRule>) {
        self.rules.push(rule);
    }

    pub fn evaluate(&self, input: &EligibilityInput, today: NaiveDate) -> EligibilityVerdict {
        let mut checks = Vec::with_capacity(self.rules.len());
        let mut reasons = Vec::new();

        for rule in &self.rules {
            let outcome = rule.evaluate(input, today);
            if !outcome.passed {
                reasons.push(outcome.details.clone());
            }
            checks.push(EligibilityCheck {
                rule_name: rule.name().to_string(),
                passed: outcome.passed,
                details: outcome.details,
            });
        }

        let eligible = reasons.is_empty();

        info!(
            rule_count = self.rules.len(),
            eligible,
            failed = reasons.len(),
            "Eligibility evaluated"
        );

        let next_steps = if eligible {
            NEXT_STEPS.iter().map(|s| s.to_string()).collect()
        } else {
            IMPROVEMENT_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
        };

        EligibilityVerdict {
            eligible,
            reasons,
            explanation: EXPLANATION.to_string(),
            next_steps,
            checks,
        }
    }
}

impl Default for EligibilityEvaluator {
    fn default() -> Self {
        Self::with_policy(&EligibilityPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn passing_input() -> EligibilityInput {
        EligibilityInput {
            date_of_birth: date(1985, 6, 15),
            monthly_income: 75_000.0,
            existing_emis: 15_000.0,
            credit_score: 780,
            years_employed: 5.0,
        }
    }

    #[test]
    fn test_age_before_and_on_anniversary() {
        let dob = date(1990, 8, 20);
        assert_eq!(age_on(dob, date(2026, 8, 19)), 35);
        assert_eq!(age_on(dob, date(2026, 8, 20)), 36);
        assert_eq!(age_on(dob, date(2026, 8, 21)), 36);
        assert_eq!(age_on(dob, date(2026, 7, 25)), 35);
    }

    #[test]
    fn test_zero_income_debt_ratio_is_maximal() {
        assert_eq!(debt_ratio(0.0, 0.0), 1.0);
        assert_eq!(debt_ratio(5_000.0, 0.0), 1.0);
        assert_eq!(debt_ratio(15_000.0, 75_000.0), 0.2);
    }

    #[test]
    fn test_eligible_applicant() {
        let evaluator = EligibilityEvaluator::default();
        let verdict = evaluator.evaluate(&passing_input(), date(2026, 10, 18));

        assert!(verdict.eligible);
        assert!(verdict.reasons.is_empty());
        assert_eq!(verdict.next_steps.len(), 3);
        assert_eq!(verdict.checks.len(), 5);
        assert!(verdict.checks.iter().all(|c| c.passed));
    }

    #[test]
    fn test_reasons_follow_rule_order() {
        let evaluator = EligibilityEvaluator::default();
        let input = EligibilityInput {
            date_of_birth: date(2010, 1, 1),
            monthly_income: 0.0,
            existing_emis: 0.0,
            credit_score: 600,
            years_employed: 0.5,
        };
        let verdict = evaluator.evaluate(&input, date(2026, 10, 18));

        assert!(!verdict.eligible);
        assert_eq!(verdict.reasons.len(), 5);
        assert!(verdict.reasons[0].starts_with("Age 16"));
        assert!(verdict.reasons[1].starts_with("Income ₹0"));
        assert!(verdict.reasons[2].starts_with("Debt-to-income ratio 1.00"));
        assert!(verdict.reasons[3].starts_with("Credit score 600"));
        assert!(verdict.reasons[4].starts_with("Employment duration 0.50"));
        assert_eq!(verdict.next_steps[0], "Improve your credit score");
    }

    #[test]
    fn test_only_income_fails() {
        let evaluator = EligibilityEvaluator::default();
        let input = EligibilityInput {
            monthly_income: 20_000.0,
            existing_emis: 5_000.0,
            ..passing_input()
        };
        let verdict = evaluator.evaluate(&input, date(2026, 10, 18));

        assert!(!verdict.eligible);
        assert_eq!(
            verdict.reasons,
            vec!["Income ₹20000 is below minimum requirement (₹25000)".to_string()]
        );
    }

    #[test]
    fn test_age_bounds_are_inclusive() {
        let evaluator = EligibilityEvaluator::default();
        let today = date(2026, 10, 18);

        let just_21 = EligibilityInput {
            date_of_birth: date(2005, 10, 18),
            ..passing_input()
        };
        assert!(evaluator.evaluate(&just_21, today).eligible);

        let turns_59 = EligibilityInput {
            date_of_birth: date(1967, 10, 18),
            ..passing_input()
        };
        assert!(!evaluator.evaluate(&turns_59, today).eligible);
    }
}
