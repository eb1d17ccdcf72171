/// Safety margin added on top of `eth_estimateGas` for multisig calls (30%).
pub const DEFAULT_GAS_MARGIN_BPS: u32 = 3_000;
pub const MAX_GAS_MARGIN_BPS: u32 = 10_000;
const BPS_DENOMINATOR: u128 = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasLimitRequirements {
    pub estimated_gas: u64,
    pub margin_bps: u32,
    pub margin_gas: u64,
    pub gas_limit: u64,
}

/// How the gas limit of a submitted transaction is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GasPolicy {
    /// Estimate first and pad the estimate by `margin_bps`.
    EstimateWithMargin { margin_bps: u32 },
    /// Leave the gas limit to the chain client.
    ClientDefault,
}

pub fn gas_limit_with_margin(estimated_gas: u64, margin_bps: u32) -> GasLimitRequirements {
    let clamped_margin_bps = margin_bps.min(MAX_GAS_MARGIN_BPS);
    // Rounded to the nearest unit of gas.
    let margin = (u128::from(estimated_gas) * u128::from(clamped_margin_bps) + BPS_DENOMINATOR / 2)
        / BPS_DENOMINATOR;
    let margin_gas = u64::try_from(margin).unwrap_or(u64::MAX);

    GasLimitRequirements {
        estimated_gas,
        margin_bps: clamped_margin_bps,
        margin_gas,
        gas_limit: estimated_gas.saturating_add(margin_gas),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_margin_pads_estimate_by_thirty_percent() {
        let requirements = gas_limit_with_margin(100_000, DEFAULT_GAS_MARGIN_BPS);
        assert_eq!(requirements.margin_gas, 30_000);
        assert_eq!(requirements.gas_limit, 130_000);
    }

    #[test]
    fn margin_rounds_to_nearest_gas_unit() {
        // 21_001 * 1.3 = 27_301.3
        assert_eq!(gas_limit_with_margin(21_001, 3_000).gas_limit, 27_301);
        // 5 * 1.3 = 6.5
        assert_eq!(gas_limit_with_margin(5, 3_000).gas_limit, 7);
    }

    #[test]
    fn zero_margin_keeps_estimate() {
        let requirements = gas_limit_with_margin(55_555, 0);
        assert_eq!(requirements.gas_limit, 55_555);
        assert_eq!(requirements.margin_gas, 0);
    }

    #[test]
    fn margin_bps_is_clamped_to_one_hundred_percent() {
        let requirements = gas_limit_with_margin(1_000, 25_000);
        assert_eq!(requirements.margin_bps, 10_000);
        assert_eq!(requirements.gas_limit, 2_000);
    }

    #[test]
    fn huge_estimates_saturate_instead_of_overflowing() {
        let requirements = gas_limit_with_margin(u64::MAX, 3_000);
        assert_eq!(requirements.gas_limit, u64::MAX);
    }
}
