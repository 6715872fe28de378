//! Integer-exact monetary amounts and percentages.

use serde::{Deserialize, Serialize};

const BASIS_POINTS_PER_WHOLE: i128 = 10_000;

/// Amount in minor units (cents). Signed so deltas can be expressed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Largest accepted unit price (one billion cents). Any `u32` quantity
    /// of it still fits in an `i64`.
    pub const MAX_UNIT_PRICE: Money = Money(1_000_000_000);

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Whole currency units, e.g. `from_major(100)` is 100.00.
    pub fn from_major(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Price times quantity. Callers keep amounts below
    /// [`Money::MAX_UNIT_PRICE`]; see [`Money::checked_times`] otherwise.
    pub fn times(&self, quantity: u32) -> Money {
        Self(self.0 * i64::from(quantity))
    }

    /// `None` on overflow.
    pub fn checked_times(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Self)
    }

    pub fn checked_add(&self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(&self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Self)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// A rate in basis points, `0..=10_000` (0% to 100%).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Percentage(u32);

impl Percentage {
    pub const ZERO: Percentage = Percentage(0);
    pub const FULL: Percentage = Percentage(10_000);

    /// Values above 100% are capped.
    pub fn from_basis_points(bp: u32) -> Self {
        Self(bp.min(Self::FULL.0))
    }

    /// Whole percent, e.g. `from_percent(10)` is 10%.
    pub fn from_percent(percent: u32) -> Self {
        Self::from_basis_points(percent.saturating_mul(100))
    }

    pub fn basis_points(&self) -> u32 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The share `part` is of `whole`, rounded half-up and capped at 100%.
    ///
    /// A non-positive `whole` yields 100% for any positive `part`.
    pub fn of(part: Money, whole: Money) -> Self {
        if part.cents() <= 0 {
            return Self::ZERO;
        }
        if whole.cents() <= 0 {
            return Self::FULL;
        }
        let part = i128::from(part.cents());
        let whole = i128::from(whole.cents());
        let bp = (part * BASIS_POINTS_PER_WHOLE + whole / 2) / whole;
        Self(bp.min(BASIS_POINTS_PER_WHOLE) as u32)
    }

    /// This rate of `amount`, rounded half away from zero to the cent.
    pub fn apply_to(&self, amount: Money) -> Money {
        let cents = i128::from(amount.cents()) * i128::from(self.0);
        let half = BASIS_POINTS_PER_WHOLE / 2;
        let rounded = if cents >= 0 {
            (cents + half) / BASIS_POINTS_PER_WHOLE
        } else {
            (cents - half) / BASIS_POINTS_PER_WHOLE
        };
        Money::from_cents(rounded as i64)
    }
}

impl std::fmt::Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}
