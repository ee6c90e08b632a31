//! Measurement units and metric prefixes.
//!
//! A numeric script value carries two unit properties: a *unit type*
//! (seconds, hertz, bel or none), fixed per variable declaration at parse
//! time, and a *prefix factor*, a runtime scale factor formed by up to two
//! stacked metric prefixes (e.g. `mdB` = milli deci bel = 10^-4 B).
//! The factor is stored pre-multiplied; 1.0 means "no prefix".

use crate::{vmfloat, vmint};

/// Sentinel factor for values without any metric prefix.
pub const NO_FACTOR: vmfloat = 1.0;

/// Standard measurement unit type of a numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitType {
    /// Plain number without any measurement dimension.
    #[default]
    None,
    /// Time.
    Second,
    /// Frequency.
    Hertz,
    /// Relation between two energy levels (logarithmic scale).
    Bel,
}

impl UnitType {
    /// Unit token as written in script source (`s`, `Hz`, `B`).
    pub fn token(&self) -> &'static str {
        match self {
            UnitType::None => "",
            UnitType::Second => "s",
            UnitType::Hertz => "Hz",
            UnitType::Bel => "B",
        }
    }

    /// Human readable name, as used in diagnostic messages.
    pub fn name(&self) -> &'static str {
        match self {
            UnitType::None => "none",
            UnitType::Second => "seconds",
            UnitType::Hertz => "Hz",
            UnitType::Bel => "Bel",
        }
    }
}

impl std::fmt::Display for UnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One metric prefix as it may appear (at most twice) in a number literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricPrefix {
    Kilo,
    Hecto,
    Deca,
    Deci,
    Centi,
    Milli,
    Micro,
}

impl MetricPrefix {
    /// Scale factor contributed by this prefix.
    pub fn factor(&self) -> vmfloat {
        match self {
            MetricPrefix::Kilo => 1e3,
            MetricPrefix::Hecto => 1e2,
            MetricPrefix::Deca => 1e1,
            MetricPrefix::Deci => 1e-1,
            MetricPrefix::Centi => 1e-2,
            MetricPrefix::Milli => 1e-3,
            MetricPrefix::Micro => 1e-6,
        }
    }

    /// Prefix token as written in script source.
    pub fn token(&self) -> &'static str {
        match self {
            MetricPrefix::Kilo => "k",
            MetricPrefix::Hecto => "h",
            MetricPrefix::Deca => "da",
            MetricPrefix::Deci => "d",
            MetricPrefix::Centi => "c",
            MetricPrefix::Milli => "m",
            MetricPrefix::Micro => "u",
        }
    }
}

/// Pre-multiplied factor of a prefix sequence, in source order.
pub fn prefix_factor(prefixes: &[MetricPrefix]) -> vmfloat {
    prefixes.iter().fold(NO_FACTOR, |acc, p| acc * p.factor())
}

/// Convert an integer value from one prefix factor into another.
///
/// Rounds half away from zero, so conversions where one factor divides the
/// other are lossless.
pub fn conv_int_to_factor(value: vmint, src_factor: vmfloat, dst_factor: vmfloat) -> vmint {
    let f = value as vmfloat;
    (f * (src_factor / dst_factor)).round() as vmint
}

/// Convert a real value from one prefix factor into another.
pub fn conv_real_to_factor(value: vmfloat, src_factor: vmfloat, dst_factor: vmfloat) -> vmfloat {
    value * (src_factor / dst_factor)
}

/// Short prefix notation for a factor, as used when casting numbers with
/// units to strings (i.e. by the `&` operator and `message()`).
pub fn factor_short_str(factor: vmfloat) -> String {
    let tens = factor.log10().round() as i32;
    match tens {
        3 => "k".to_string(),
        2 => "h".to_string(),
        1 => "da".to_string(),
        0 => String::new(),
        -1 => "d".to_string(),
        -2 => "c".to_string(),
        -3 => "m".to_string(),
        -4 => "md".to_string(),
        -5 => "mc".to_string(),
        -6 => "u".to_string(),
        _ => format!("*10^{}", tens),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_factors() {
        assert_eq!(MetricPrefix::Kilo.factor(), 1000.0);
        assert_eq!(MetricPrefix::Micro.factor(), 1e-6);
        let mdb = prefix_factor(&[MetricPrefix::Milli, MetricPrefix::Deci]);
        assert!((mdb - 1e-4).abs() < 1e-18);
    }

    #[test]
    fn test_conv_int_lossless_when_divisible() {
        // 1s expressed in milli: factor 1.0 -> 0.001
        assert_eq!(conv_int_to_factor(1, 1.0, 1e-3), 1000);
        // back again
        assert_eq!(conv_int_to_factor(1000, 1e-3, 1.0), 1);
    }

    #[test]
    fn test_conv_int_rounds_half_away_from_zero() {
        // 5 deci = 0.5 -> rounds to 1, -5 deci -> -1
        assert_eq!(conv_int_to_factor(5, 1e-1, 1.0), 1);
        assert_eq!(conv_int_to_factor(-5, 1e-1, 1.0), -1);
    }

    #[test]
    fn test_factor_short_str() {
        assert_eq!(factor_short_str(NO_FACTOR), "");
        assert_eq!(factor_short_str(1e3), "k");
        assert_eq!(factor_short_str(1e-3 * 1e-1), "md");
    }
}
