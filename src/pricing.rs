//! Pricing
//! 小計・税・送料・合計の計算（DB は整数、API は Decimal）
//!
//! 税は丸めない。単価は cents（小数第 2 位）なので、税率 0.13 を掛けた値は
//! 小数第 4 位で必ず割り切れる。注文金額はこの桁（1/10000 単位）で保存する。

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// 税率 13%
pub const TAX_RATE: Decimal = Decimal::from_parts(13, 0, 0, false, 2);
/// この金額を超えると送料無料
pub const FREE_SHIPPING_THRESHOLD: Decimal = Decimal::from_parts(100, 0, 0, false, 0);
/// 送料（固定）
pub const FLAT_SHIPPING: Decimal = Decimal::from_parts(15, 0, 0, false, 0);

/// 注文金額の保存スケール
pub const ORDER_AMOUNT_SCALE: u32 = 4;
const ORDER_AMOUNT_FACTOR: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

impl Totals {
    /// (単価, 数量) の明細から合計を計算（桁あふれは None）
    pub fn from_lines<I>(lines: I) -> Option<Self>
    where
        I: IntoIterator<Item = (Decimal, i64)>,
    {
        let mut subtotal = Decimal::ZERO;
        for (unit_price, qty) in lines {
            subtotal = subtotal.checked_add(unit_price.checked_mul(Decimal::from(qty))?)?;
        }
        Self::from_subtotal(subtotal)
    }

    pub fn from_subtotal(subtotal: Decimal) -> Option<Self> {
        let tax = subtotal.checked_mul(TAX_RATE)?;
        let shipping = if subtotal > FREE_SHIPPING_THRESHOLD {
            Decimal::ZERO
        } else {
            FLAT_SHIPPING
        };
        Some(Self {
            subtotal,
            tax,
            shipping,
            total: subtotal.checked_add(tax)?.checked_add(shipping)?,
        })
    }
}

/// 小数第 2 位で四捨五入
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn cents_to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Decimal → cents（負数・範囲外は None）
pub fn decimal_to_cents(amount: Decimal) -> Option<i64> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return None;
    }
    (round_money(amount) * Decimal::ONE_HUNDRED).to_i64()
}

pub fn units_to_decimal(units: i64) -> Decimal {
    Decimal::new(units, ORDER_AMOUNT_SCALE)
}

/// Decimal → 1/10000 単位（端数が残る・範囲外は None）
pub fn decimal_to_units(amount: Decimal) -> Option<i64> {
    let scaled = amount.checked_mul(ORDER_AMOUNT_FACTOR)?;
    if !scaled.fract().is_zero() {
        return None;
    }
    scaled.to_i64()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn subtotal_over_threshold_ships_free() {
        let totals = Totals::from_lines([(dec("60"), 2)]).unwrap();
        assert_eq!(totals.subtotal, dec("120"));
        assert_eq!(totals.tax, dec("15.6"));
        assert_eq!(totals.shipping, Decimal::ZERO);
        assert_eq!(totals.total, dec("135.6"));
    }

    #[test]
    fn subtotal_at_threshold_pays_flat_shipping() {
        let totals = Totals::from_lines([(dec("50"), 2)]).unwrap();
        assert_eq!(totals.subtotal, dec("100"));
        assert_eq!(totals.tax, dec("13"));
        assert_eq!(totals.shipping, dec("15"));
        assert_eq!(totals.total, dec("128"));
    }

    #[test]
    fn tax_is_not_rounded() {
        let totals = Totals::from_lines([(dec("19.99"), 3)]).unwrap();
        assert_eq!(totals.subtotal, dec("59.97"));
        assert_eq!(totals.tax, dec("7.7961"));
        assert_eq!(totals.total, dec("82.7661"));

        let totals = Totals::from_lines([(dec("19.99"), 3), (dec("5.25"), 1)]).unwrap();
        assert_eq!(totals.subtotal, dec("65.22"));
        assert_eq!(totals.tax, dec("8.4786"));
        assert_eq!(totals.total, dec("88.6986"));
    }

    #[test]
    fn overflowing_lines_are_rejected() {
        assert_eq!(Totals::from_lines([(Decimal::MAX, 2)]), None);
        assert_eq!(Totals::from_lines([(Decimal::MAX, 1), (Decimal::MAX, 1)]), None);
    }

    #[test]
    fn cents_conversion() {
        assert_eq!(cents_to_decimal(13560), dec("135.60"));
        assert_eq!(decimal_to_cents(dec("1899")), Some(189_900));
        assert_eq!(decimal_to_cents(dec("0.005")), Some(1));
        assert_eq!(decimal_to_cents(dec("-1")), None);
    }

    #[test]
    fn order_amount_units_are_exact() {
        assert_eq!(decimal_to_units(dec("7.7961")), Some(77_961));
        assert_eq!(units_to_decimal(827_661), dec("82.7661"));
        assert_eq!(decimal_to_units(dec("0.00001")), None);
    }
}
