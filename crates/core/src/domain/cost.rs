use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareCosts {
    pub monthly_fees: Decimal,
    pub setup_fees: Decimal,
    pub license_fees: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareCosts {
    pub unit_costs: Decimal,
    pub installation_costs: Decimal,
    pub maintenance_costs: Decimal,
}

/// One-time (CAPEX) versus recurring (OPEX) totals.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostTotals {
    pub one_time: Decimal,
    pub monthly: Decimal,
    pub annual: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub software: SoftwareCosts,
    pub hardware: HardwareCosts,
    pub totals: CostTotals,
}

pub const MONTHS_PER_YEAR: i64 = 12;

impl CostBreakdown {
    /// Builds a breakdown whose totals are derived from the components.
    pub fn from_components(software: SoftwareCosts, hardware: HardwareCosts) -> Self {
        let one_time = software.setup_fees
            + software.license_fees
            + hardware.unit_costs
            + hardware.installation_costs;
        let monthly = software.monthly_fees + hardware.maintenance_costs;
        let annual = monthly * Decimal::from(MONTHS_PER_YEAR);

        Self { software, hardware, totals: CostTotals { one_time, monthly, annual } }
    }

    pub fn components(&self) -> [Decimal; 9] {
        [
            self.software.monthly_fees,
            self.software.setup_fees,
            self.software.license_fees,
            self.hardware.unit_costs,
            self.hardware.installation_costs,
            self.hardware.maintenance_costs,
            self.totals.one_time,
            self.totals.monthly,
            self.totals.annual,
        ]
    }

    pub fn is_consistent(&self) -> bool {
        self.totals.annual == self.totals.monthly * Decimal::from(MONTHS_PER_YEAR)
            && self.components().iter().all(|value| *value >= Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{CostBreakdown, HardwareCosts, SoftwareCosts};

    #[test]
    fn totals_follow_capex_opex_split() {
        let breakdown = CostBreakdown::from_components(
            SoftwareCosts {
                monthly_fees: Decimal::new(2500, 2),
                setup_fees: Decimal::new(150, 0),
                license_fees: Decimal::new(40, 0),
            },
            HardwareCosts {
                unit_costs: Decimal::new(450, 0),
                installation_costs: Decimal::new(75, 0),
                maintenance_costs: Decimal::new(5, 0),
            },
        );

        assert_eq!(breakdown.totals.one_time, Decimal::new(715, 0));
        assert_eq!(breakdown.totals.monthly, Decimal::new(30, 0));
        assert_eq!(breakdown.totals.annual, Decimal::new(360, 0));
        assert!(breakdown.is_consistent());
    }

    #[test]
    fn tampered_snapshot_is_reported_inconsistent() {
        let mut breakdown = CostBreakdown::default();
        breakdown.totals.annual = Decimal::ONE;

        assert!(!breakdown.is_consistent());
    }
}
