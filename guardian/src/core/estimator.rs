//! Cost estimation for a plan against the configured rate table.

use crate::core::config::RateTable;
use crate::core::types::{CostEstimate, CostLine, PlanDefinition};
use crate::error::GuardianError;

const MILLICENTS_PER_CENT: u128 = 1_000;

/// Price every resource the plan consumes.
///
/// Each subtotal is rounded up to a whole cent before summing, so the total
/// never understates spend. Resources with zero quantity are omitted from the
/// breakdown and need no rate.
pub fn estimate(plan: &PlanDefinition, rates: &RateTable) -> Result<CostEstimate, GuardianError> {
    let mut breakdown = Vec::new();
    let mut total_cents: i64 = 0;
    for (resource, quantity) in plan.resources.iter() {
        if quantity == 0 {
            continue;
        }
        let unit = rates.rate(plan.tier, resource).ok_or_else(|| {
            GuardianError::ConfigInvalid(format!(
                "missing {} rate for {} (used by plan '{}')",
                plan.tier.as_str(),
                resource,
                plan.code
            ))
        })?;
        let subtotal_cents = ceil_cents(quantity, unit).ok_or_else(|| {
            GuardianError::ConfigInvalid(format!(
                "cost of {resource} for plan '{}' overflows",
                plan.code
            ))
        })?;
        total_cents = total_cents.checked_add(subtotal_cents).ok_or_else(|| {
            GuardianError::ConfigInvalid(format!("total cost of plan '{}' overflows", plan.code))
        })?;
        breakdown.push(CostLine {
            resource,
            quantity,
            unit_cost_millicents: unit,
            subtotal_cents,
        });
    }
    Ok(CostEstimate {
        plan: plan.code,
        breakdown,
        total_cents,
    })
}

fn ceil_cents(quantity: u64, unit_millicents: u64) -> Option<i64> {
    let millicents = u128::from(quantity) * u128::from(unit_millicents);
    i64::try_from(millicents.div_ceil(MILLICENTS_PER_CENT)).ok()
}
