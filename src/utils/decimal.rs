use bigdecimal::{BigDecimal, RoundingMode};
use num_traits::Zero;

pub trait BigDecimalHelpers {
    /// Rounds half-up to `places` fractional digits.
    fn round_half_up(&self, places: i64) -> BigDecimal;
}

impl BigDecimalHelpers for BigDecimal {
    fn round_half_up(&self, places: i64) -> BigDecimal {
        self.with_scale_round(places, RoundingMode::HalfUp)
    }
}

impl BigDecimalHelpers for Option<BigDecimal> {
    fn round_half_up(&self, places: i64) -> BigDecimal {
        self.as_ref()
            .map(|bd| bd.round_half_up(places))
            .unwrap_or_else(|| BigDecimal::zero().with_scale(places))
    }
}

/// Currency amounts are always carried with two fractional digits.
pub fn to_money(value: &BigDecimal) -> BigDecimal {
    value.round_half_up(2)
}

/// quantity × unit price, as a currency amount.
pub fn line_total(unit_price: &BigDecimal, quantity: i32) -> BigDecimal {
    to_money(&(unit_price * BigDecimal::from(quantity)))
}

pub fn is_positive(value: &BigDecimal) -> bool {
    value > &BigDecimal::zero()
}

/// Writes the value with every fractional digit its scale carries, zero included
/// (`Display` collapses any zero to `"0"`).
pub fn to_fixed_string(value: &BigDecimal) -> String {
    value.to_plain_string()
}

/// Serde adapter for amounts that must keep their scale on the wire.
pub mod fixed {
    use bigdecimal::BigDecimal;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_fixed_string(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigDecimal, D::Error> {
        BigDecimal::deserialize(deserializer)
    }

    pub mod option {
        use bigdecimal::BigDecimal;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<BigDecimal>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => serializer.serialize_str(&super::super::to_fixed_string(value)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<BigDecimal>, D::Error> {
            Option::<BigDecimal>::deserialize(deserializer)
        }
    }
}
