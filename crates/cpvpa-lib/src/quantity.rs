//! Exact Kubernetes resource quantities
//!
//! Values are held as `i128` milli-units so parsing is exact for anything a
//! scaling rule can reasonably contain. Arithmetic on the computed targets
//! happens in `i64` milli-units (see [`Quantity::milli_value`]); a quantity
//! that does not fit there is reported, never truncated.

use crate::error::{QuantityError, ScalingError};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

const DECIMAL_SUFFIXES: [&str; 6] = ["k", "M", "G", "T", "P", "E"];
const BINARY_SUFFIXES: [&str; 6] = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];

/// How a quantity is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    /// Powers of 1000: `m`, `k`, `M`, `G`, ...
    #[default]
    DecimalSi,
    /// Powers of 1024: `Ki`, `Mi`, `Gi`, ...
    BinarySi,
    /// Scientific notation: `1e3`
    DecimalExponent,
}

/// Pick a rendering for a computed quantity based on its resource name.
///
/// Byte-denominated resources render with binary suffixes, everything else
/// (cpu and extended resources) with decimal suffixes.
pub fn guess_format(resource: &str) -> Format {
    match resource {
        "memory" | "storage" | "ephemeral-storage" => Format::BinarySi,
        r if r.starts_with("hugepages-") => Format::BinarySi,
        _ => Format::DecimalSi,
    }
}

/// An exact resource quantity such as `250m`, `2`, `512Mi` or `1e3`
#[derive(Clone, Copy, Default)]
pub struct Quantity {
    milli: i128,
    format: Format,
}

impl Quantity {
    /// A zero quantity
    pub fn zero() -> Self {
        Self::default()
    }

    /// Build a quantity from a milli-unit value
    pub fn from_milli(milli: i64, format: Format) -> Self {
        Self {
            milli: i128::from(milli),
            format,
        }
    }

    /// Build a quantity from a whole-unit value
    pub fn from_units(units: i64, format: Format) -> Self {
        Self {
            milli: i128::from(units) * 1000,
            format,
        }
    }

    /// Parse Kubernetes quantity syntax
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, unsigned) = match text.as_bytes()[0] {
            b'-' => (true, &text[1..]),
            b'+' => (false, &text[1..]),
            _ => (false, text),
        };

        let number_len = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_len);

        let (whole, fraction) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(QuantityError::Invalid(input.to_string()));
        }

        let out_of_range = || QuantityError::OutOfRange(input.to_string());

        let mut mantissa: i128 = 0;
        for digit in whole.bytes().chain(fraction.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(digit - b'0')))
                .ok_or_else(out_of_range)?;
        }

        let (format, exp10, exp2) = parse_suffix(input, suffix)?;

        // milli-units: shift the decimal exponent by 3
        let exp10 = i64::from(exp10) - fraction.len() as i64 + 3;

        let scaled = mantissa
            .checked_mul(1i128.checked_shl(exp2).ok_or_else(out_of_range)?)
            .ok_or_else(out_of_range)?;
        let signed = if negative { -scaled } else { scaled };

        // Sub-milli fractions round toward positive infinity.
        let milli = if exp10 >= 0 {
            u32::try_from(exp10)
                .ok()
                .and_then(|e| 10i128.checked_pow(e))
                .and_then(|p| signed.checked_mul(p))
                .ok_or_else(out_of_range)?
        } else {
            match u32::try_from(-exp10).ok().and_then(|e| 10i128.checked_pow(e)) {
                Some(divisor) => div_ceil(signed, divisor),
                None if signed > 0 => 1,
                None => 0,
            }
        };

        Ok(Self { milli, format })
    }

    /// The exact value in milli-units as a signed 64-bit integer
    pub fn milli_value(&self) -> Result<i64, ScalingError> {
        i64::try_from(self.milli)
            .map_err(|_| ScalingError::overflow(format!("quantity {}", self)))
    }

    /// The rendering format carried by this quantity
    pub fn format(&self) -> Format {
        self.format
    }

    /// The same value with a different rendering format
    pub fn with_format(self, format: Format) -> Self {
        Self { format, ..self }
    }

    pub fn is_zero(&self) -> bool {
        self.milli == 0
    }

    pub fn is_positive(&self) -> bool {
        self.milli > 0
    }

    pub fn is_negative(&self) -> bool {
        self.milli < 0
    }

    /// Whole units, rounded up; `None` if it doesn't fit in 64 bits
    pub fn ceil_units(&self) -> Option<i64> {
        i64::try_from(div_ceil(self.milli, 1000)).ok()
    }

    /// Whole units if the value has no fractional part
    pub fn whole_units(&self) -> Option<i64> {
        if self.milli % 1000 != 0 {
            return None;
        }
        i64::try_from(self.milli / 1000).ok()
    }

    /// Sum two quantities, keeping the format of `self`
    pub fn checked_add(&self, other: &Quantity) -> Option<Quantity> {
        Some(Self {
            milli: self.milli.checked_add(other.milli)?,
            format: self.format,
        })
    }
}

fn parse_suffix(input: &str, suffix: &str) -> Result<(Format, i32, u32), QuantityError> {
    let parsed = match suffix {
        "" => (Format::DecimalSi, 0, 0),
        "n" => (Format::DecimalSi, -9, 0),
        "u" => (Format::DecimalSi, -6, 0),
        "m" => (Format::DecimalSi, -3, 0),
        "k" => (Format::DecimalSi, 3, 0),
        "M" => (Format::DecimalSi, 6, 0),
        "G" => (Format::DecimalSi, 9, 0),
        "T" => (Format::DecimalSi, 12, 0),
        "P" => (Format::DecimalSi, 15, 0),
        "E" => (Format::DecimalSi, 18, 0),
        "Ki" => (Format::BinarySi, 0, 10),
        "Mi" => (Format::BinarySi, 0, 20),
        "Gi" => (Format::BinarySi, 0, 30),
        "Ti" => (Format::BinarySi, 0, 40),
        "Pi" => (Format::BinarySi, 0, 50),
        "Ei" => (Format::BinarySi, 0, 60),
        s if s.starts_with(['e', 'E']) => {
            let exp = s[1..]
                .parse::<i32>()
                .map_err(|_| QuantityError::Invalid(input.to_string()))?;
            (Format::DecimalExponent, exp, 0)
        }
        s => {
            return Err(QuantityError::UnknownSuffix {
                input: input.to_string(),
                suffix: s.to_string(),
            })
        }
    };
    Ok(parsed)
}

fn div_ceil(value: i128, divisor: i128) -> i128 {
    let quotient = value / divisor;
    if value % divisor > 0 {
        quotient + 1
    } else {
        quotient
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quantity::parse(s)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.milli % 1000 != 0 {
            return write!(f, "{}m", self.milli);
        }
        let units = self.milli / 1000;
        if units == 0 {
            return write!(f, "0");
        }

        match self.format {
            Format::BinarySi => {
                for (i, suffix) in BINARY_SUFFIXES.iter().enumerate().rev() {
                    let scale = 1i128 << (10 * (i as u32 + 1));
                    if units % scale == 0 {
                        return write!(f, "{}{}", units / scale, suffix);
                    }
                }
                write!(f, "{}", units)
            }
            Format::DecimalSi => {
                for (i, suffix) in DECIMAL_SUFFIXES.iter().enumerate().rev() {
                    let scale = 1000i128.pow(i as u32 + 1);
                    if units % scale == 0 {
                        return write!(f, "{}{}", units / scale, suffix);
                    }
                }
                write!(f, "{}", units)
            }
            Format::DecimalExponent => {
                let mut exp = 0u32;
                let mut mantissa = units;
                while mantissa % 1000 == 0 {
                    mantissa /= 1000;
                    exp += 3;
                }
                if exp == 0 {
                    write!(f, "{}", mantissa)
                } else {
                    write!(f, "{}e{}", mantissa, exp)
                }
            }
        }
    }
}

impl fmt::Debug for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Quantity({})", self)
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.milli == other.milli
    }
}

impl Eq for Quantity {}

impl Hash for Quantity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.milli.hash(state);
    }
}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.milli.cmp(&other.milli)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(QuantityVisitor)
    }
}

struct QuantityVisitor;

impl<'de> Visitor<'de> for QuantityVisitor {
    type Value = Quantity;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a quantity string such as \"250m\" or \"1Gi\", or a number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Quantity, E> {
        Quantity::parse(v).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Quantity, E> {
        Ok(Quantity {
            milli: i128::from(v) * 1000,
            format: Format::DecimalSi,
        })
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Quantity, E> {
        Ok(Quantity {
            milli: i128::from(v) * 1000,
            format: Format::DecimalSi,
        })
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Quantity, E> {
        if !v.is_finite() {
            return Err(E::custom(format!("quantity {} is not finite", v)));
        }
        Quantity::parse(&v.to_string()).map_err(E::custom)
    }
}
