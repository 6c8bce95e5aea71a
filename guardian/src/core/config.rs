//! Budget policy model and validation.
//!
//! The on-disk form lives in `.guardian/state/config.toml` (see
//! [`crate::io::config`]). Missing fields default to the values below, which
//! describe a 150 USD/month shorts channel.

use serde::{Deserialize, Serialize};

use crate::core::estimator::estimate;
use crate::core::types::{PlanCode, PlanDefinition, QualityTier, ResourceKind, ResourceQuantities};
use crate::error::GuardianError;

/// Upper bound on any weekly episode target (ten a day).
pub const MAX_SHORTS_PER_WEEK: u32 = 70;

/// Budget and selection policy. Re-read from disk before every decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BudgetConfig {
    /// Hard monthly spend cap in cents.
    pub monthly_cap_cents: i64,
    /// Share of the cap held back from non-fallback plans.
    pub reserve_percent: u32,
    /// Spend share at which non-fallback plans stop being offered.
    pub soft_stop_percent: u32,
    /// Trailing committed episodes averaged for the advisory forecast.
    pub forecast_window: usize,
    pub rates: RateTable,
    pub plans: Vec<PlanDefinition>,
    pub policy: PolicyConfig,
    pub cadence: CadenceConfig,
    pub reallocation: ReallocationConfig,
    pub scoring: ScoringConfig,
    pub retry: RetryConfig,
}

/// Unit costs in millicents, one row per quality tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateTable {
    pub premium: TierRates,
    pub standard: TierRates,
    pub economy: TierRates,
}

/// A missing rate is only an error for resources a plan actually consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TierRates {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_minutes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_generations: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_minutes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variants: Option<u64>,
}

impl TierRates {
    pub fn get(&self, kind: ResourceKind) -> Option<u64> {
        match kind {
            ResourceKind::LlmTokens => self.llm_tokens,
            ResourceKind::TtsMinutes => self.tts_minutes,
            ResourceKind::ImageGenerations => self.image_generations,
            ResourceKind::RenderMinutes => self.render_minutes,
            ResourceKind::Variants => self.variants,
        }
    }
}

impl RateTable {
    pub fn tier(&self, tier: QualityTier) -> &TierRates {
        match tier {
            QualityTier::Premium => &self.premium,
            QualityTier::Standard => &self.standard,
            QualityTier::Economy => &self.economy,
        }
    }

    pub fn rate(&self, tier: QualityTier, kind: ResourceKind) -> Option<u64> {
        self.tier(tier).get(kind)
    }
}

/// Whether provider-outage fallbacks count against the fallback quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutageFallbackPolicy {
    #[default]
    EnforceQuotas,
    Exempt,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    pub max_fallback_per_7eps: u32,
    pub min_days_between_fallback: u32,
    /// Score multiplier for episodes inside a priority event arc.
    pub event_arc_priority_weight: f64,
    /// Fallback plans may spend into the reserve (gated on the hard cap).
    pub fallback_uses_reserve: bool,
    pub outage_fallback: OutageFallbackPolicy,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_fallback_per_7eps: 2,
            min_days_between_fallback: 3,
            event_arc_priority_weight: 1.5,
            fallback_uses_reserve: true,
            outage_fallback: OutageFallbackPolicy::EnforceQuotas,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CadenceConfig {
    pub default_shorts_per_week: u32,
    pub min_shorts_per_week: u32,
    /// Episodes removed from the weekly target per step-down.
    pub step_down: u32,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            default_shorts_per_week: 5,
            min_shorts_per_week: 1,
            step_down: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReallocationConfig {
    pub enabled: bool,
    /// Share of next month's reserve that can never be lent.
    pub floor_percent: u32,
    /// Upper bound on a single pull.
    pub max_pull_cents: i64,
}

impl Default for ReallocationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            floor_percent: 50,
            max_pull_cents: 1_500,
        }
    }
}

/// Weights of the richness score and the pacing penalty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub llm_kilotoken_weight: f64,
    pub tts_minute_weight: f64,
    pub image_weight: f64,
    pub render_minute_weight: f64,
    pub variant_weight: f64,
    /// Score lost per cent an estimate exceeds the per-episode fair share.
    pub pacing_penalty_per_cent: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            llm_kilotoken_weight: 1.0,
            tts_minute_weight: 5.0,
            image_weight: 3.0,
            render_minute_weight: 1.0,
            variant_weight: 10.0,
            pacing_penalty_per_cent: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 200,
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            monthly_cap_cents: 15_000,
            reserve_percent: 20,
            soft_stop_percent: 90,
            forecast_window: 7,
            rates: default_rates(),
            plans: default_plans(),
            policy: PolicyConfig::default(),
            cadence: CadenceConfig::default(),
            reallocation: ReallocationConfig::default(),
            scoring: ScoringConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_rates() -> RateTable {
    RateTable {
        premium: TierRates {
            llm_tokens: Some(2),
            tts_minutes: Some(30_000),
            image_generations: Some(8_000),
            render_minutes: Some(5_000),
            variants: Some(20_000),
        },
        standard: TierRates {
            llm_tokens: Some(1),
            tts_minutes: Some(20_000),
            image_generations: Some(5_000),
            render_minutes: Some(4_000),
            variants: Some(10_000),
        },
        economy: TierRates {
            llm_tokens: Some(1),
            tts_minutes: Some(10_000),
            image_generations: Some(3_000),
            render_minutes: Some(3_000),
            variants: Some(5_000),
        },
    }
}

fn default_plans() -> Vec<PlanDefinition> {
    vec![
        PlanDefinition {
            code: PlanCode::Full,
            tier: QualityTier::Premium,
            resources: ResourceQuantities {
                llm_tokens: 60_000,
                tts_minutes: 6,
                image_generations: 12,
                render_minutes: 20,
                variants: 3,
            },
        },
        PlanDefinition {
            code: PlanCode::Saver,
            tier: QualityTier::Standard,
            resources: ResourceQuantities {
                llm_tokens: 30_000,
                tts_minutes: 4,
                image_generations: 6,
                render_minutes: 10,
                variants: 2,
            },
        },
        PlanDefinition {
            code: PlanCode::Minimal,
            tier: QualityTier::Economy,
            resources: ResourceQuantities {
                llm_tokens: 12_000,
                tts_minutes: 2,
                image_generations: 2,
                render_minutes: 4,
                variants: 1,
            },
        },
        PlanDefinition {
            code: PlanCode::FallbackDm,
            tier: QualityTier::Economy,
            resources: ResourceQuantities {
                llm_tokens: 4_000,
                tts_minutes: 1,
                image_generations: 0,
                render_minutes: 1,
                variants: 1,
            },
        },
    ]
}

impl BudgetConfig {
    /// Plans in ladder order, richest first.
    pub fn ladder(&self) -> Vec<&PlanDefinition> {
        let mut plans: Vec<&PlanDefinition> = self.plans.iter().collect();
        plans.sort_by_key(|plan| plan.code);
        plans
    }

    pub fn plan(&self, code: PlanCode) -> Option<&PlanDefinition> {
        self.plans.iter().find(|plan| plan.code == code)
    }

    /// Reserve held back from `cap_cents`, rounded up.
    pub fn reserve_for(&self, cap_cents: i64) -> i64 {
        percent_ceil(cap_cents, self.reserve_percent)
    }

    /// Collect every problem rather than stopping at the first.
    pub fn problems(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.monthly_cap_cents <= 0 {
            errors.push("monthly_cap_cents must be > 0".to_string());
        }
        if self.reserve_percent >= 100 {
            errors.push("reserve_percent must be < 100".to_string());
        }
        if self.soft_stop_percent == 0 || self.soft_stop_percent > 100 {
            errors.push("soft_stop_percent must be in 1..=100".to_string());
        }
        if self.forecast_window == 0 {
            errors.push("forecast_window must be > 0".to_string());
        }
        self.plan_problems(&mut errors);
        self.policy_problems(&mut errors);
        errors
    }

    pub fn validate(&self) -> Result<(), GuardianError> {
        let errors = self.problems();
        if errors.is_empty() {
            return Ok(());
        }
        Err(GuardianError::ConfigInvalid(errors.join("; ")))
    }

    fn plan_problems(&self, errors: &mut Vec<String>) {
        if self.plan(PlanCode::FallbackDm).is_none() {
            errors.push("plans must include fallback_dm".to_string());
        }
        if !self.plans.iter().any(|plan| !plan.code.is_fallback()) {
            errors.push("plans must include at least one non-fallback plan".to_string());
        }
        let ladder = self.ladder();
        for pair in ladder.windows(2) {
            let (richer, leaner) = (pair[0], pair[1]);
            if richer.code == leaner.code {
                errors.push(format!("plan '{}' defined more than once", richer.code));
            } else if !richer.resources.dominates(&leaner.resources) {
                errors.push(format!(
                    "plan '{}' must use at least the resources of '{}'",
                    richer.code, leaner.code
                ));
            }
        }
        for plan in &self.plans {
            if let Err(err) = estimate(plan, &self.rates) {
                errors.push(err.to_string());
            }
        }
    }

    fn policy_problems(&self, errors: &mut Vec<String>) {
        let weight = self.policy.event_arc_priority_weight;
        if !weight.is_finite() || weight < 1.0 {
            errors.push("policy.event_arc_priority_weight must be >= 1.0".to_string());
        }
        if self.cadence.min_shorts_per_week == 0 {
            errors.push("cadence.min_shorts_per_week must be > 0".to_string());
        }
        if self.cadence.min_shorts_per_week > self.cadence.default_shorts_per_week {
            errors.push(
                "cadence.min_shorts_per_week must be <= cadence.default_shorts_per_week"
                    .to_string(),
            );
        }
        if self.cadence.default_shorts_per_week > MAX_SHORTS_PER_WEEK {
            errors.push(format!(
                "cadence.default_shorts_per_week must be <= {MAX_SHORTS_PER_WEEK}"
            ));
        }
        if self.cadence.step_down == 0 {
            errors.push("cadence.step_down must be > 0".to_string());
        }
        if self.reallocation.floor_percent > 100 {
            errors.push("reallocation.floor_percent must be <= 100".to_string());
        }
        if self.reallocation.max_pull_cents < 0 {
            errors.push("reallocation.max_pull_cents must be >= 0".to_string());
        }
        let scoring = &self.scoring;
        let weights = [
            ("llm_kilotoken_weight", scoring.llm_kilotoken_weight),
            ("tts_minute_weight", scoring.tts_minute_weight),
            ("image_weight", scoring.image_weight),
            ("render_minute_weight", scoring.render_minute_weight),
            ("variant_weight", scoring.variant_weight),
            ("pacing_penalty_per_cent", scoring.pacing_penalty_per_cent),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                errors.push(format!("scoring.{name} must be a finite value >= 0"));
            }
        }
        if self.retry.max_attempts == 0 {
            errors.push("retry.max_attempts must be > 0".to_string());
        }
    }
}

/// `ceil(amount * percent / 100)` for non-negative amounts.
pub fn percent_ceil(amount: i64, percent: u32) -> i64 {
    let scaled = i128::from(amount) * i128::from(percent);
    let rounded = (scaled + 99).div_euclid(100);
    rounded as i64
}
