//! Payment
//! 決済承認ストラテジー（差し替え可能）とカード番号ヘルパー

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;

use crate::models::{BillingInfo, PaymentDetails, PaymentStatus};

/// 決済ゲートウェイ
///
/// 承認 / 拒否のみを返す。テストでは固定結果の実装を注入する。
pub trait PaymentGateway: Send + Sync {
    fn authorize(&self, billing: &BillingInfo, amount: Decimal) -> PaymentDetails;
}

/// モック決済: N 回に 1 回拒否する
///
/// カウンタはインスタンスごと（AppState に保持）。
#[derive(Debug)]
pub struct MockGateway {
    decline_every: u64,
    calls: AtomicU64,
}

impl MockGateway {
    pub fn new(decline_every: u64) -> Self {
        Self {
            decline_every,
            calls: AtomicU64::new(0),
        }
    }
}

impl PaymentGateway for MockGateway {
    fn authorize(&self, _billing: &BillingInfo, _amount: Decimal) -> PaymentDetails {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let approved = self.decline_every == 0 || n % self.decline_every != 0;
        payment_details(approved)
    }
}

/// 常に同じ結果を返すゲートウェイ
#[derive(Debug, Clone, Copy)]
pub struct FixedGateway {
    pub approve: bool,
}

impl FixedGateway {
    pub fn approving() -> Self {
        Self { approve: true }
    }

    pub fn declining() -> Self {
        Self { approve: false }
    }
}

impl PaymentGateway for FixedGateway {
    fn authorize(&self, _billing: &BillingInfo, _amount: Decimal) -> PaymentDetails {
        payment_details(self.approve)
    }
}

fn payment_details(approved: bool) -> PaymentDetails {
    let (payment_status, message) = if approved {
        (PaymentStatus::Approved, "Payment successful")
    } else {
        (PaymentStatus::Declined, "Payment declined by issuer")
    };
    PaymentDetails {
        transaction_id: generate_transaction_id(),
        payment_status,
        payment_date: Utc::now(),
        message: Some(message.to_string()),
    }
}

// ========================================
// Card Helpers
// ========================================

/// スペース・ハイフンを除去
pub fn normalize_card_number(card_number: &str) -> String {
    card_number
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// 13〜19 桁 + Luhn チェック
pub fn validate_card(card_number: &str) -> bool {
    let cleaned = normalize_card_number(card_number);
    if !(13..=19).contains(&cleaned.len()) || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    let sum: u32 = cleaned
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}

/// カード番号からブランドを判定
pub fn card_brand(card_number: &str) -> &'static str {
    let cleaned = normalize_card_number(card_number);
    let prefix2: u32 = cleaned.get(..2).and_then(|p| p.parse().ok()).unwrap_or(0);

    if cleaned.starts_with('4') {
        "Visa"
    } else if (51..=55).contains(&prefix2) {
        "Mastercard"
    } else if prefix2 == 34 || prefix2 == 37 {
        "American Express"
    } else if cleaned.starts_with("6011") || cleaned.starts_with("65") {
        "Discover"
    } else {
        "Unknown"
    }
}

/// 下 4 桁のみ
pub fn last_four(card_number: &str) -> String {
    let cleaned = normalize_card_number(card_number);
    let skip = cleaned.chars().count().saturating_sub(4);
    cleaned.chars().skip(skip).collect()
}

/// TXN_<millis>_<random>
fn generate_transaction_id() -> String {
    let random_bytes: [u8; 5] = rand::thread_rng().gen();
    let encoded = base32::encode(base32::Alphabet::Crockford, &random_bytes);
    format!("TXN_{}_{}", Utc::now().timestamp_millis(), encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn billing() -> BillingInfo {
        serde_json::from_str(r#"{"cardNumber":"4111 1111 1111 1111"}"#).unwrap()
    }

    #[test]
    fn mock_gateway_declines_every_third_call() {
        let gateway = MockGateway::new(3);
        let statuses: Vec<PaymentStatus> = (0..6)
            .map(|_| gateway.authorize(&billing(), Decimal::ONE).payment_status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                PaymentStatus::Approved,
                PaymentStatus::Approved,
                PaymentStatus::Declined,
                PaymentStatus::Approved,
                PaymentStatus::Approved,
                PaymentStatus::Declined,
            ]
        );
    }

    #[test]
    fn mock_gateway_with_zero_never_declines() {
        let gateway = MockGateway::new(0);
        assert!((0..10).all(|_| {
            gateway.authorize(&billing(), Decimal::ONE).payment_status == PaymentStatus::Approved
        }));
    }

    #[test]
    fn fixed_gateway_is_deterministic() {
        let details = FixedGateway::declining().authorize(&billing(), Decimal::TEN);
        assert_eq!(details.payment_status, PaymentStatus::Declined);
        assert!(details.transaction_id.starts_with("TXN_"));
    }

    #[test]
    fn luhn_validation() {
        assert!(validate_card("4111 1111 1111 1111"));
        assert!(validate_card("5555-5555-5555-4444"));
        assert!(!validate_card("4111 1111 1111 1112"));
        assert!(!validate_card("4111"));
        assert!(!validate_card("4111abcd11111111"));
    }

    #[test]
    fn brand_detection() {
        assert_eq!(card_brand("4111111111111111"), "Visa");
        assert_eq!(card_brand("5500 0000 0000 0004"), "Mastercard");
        assert_eq!(card_brand("378282246310005"), "American Express");
        assert_eq!(card_brand("6011111111111117"), "Discover");
        assert_eq!(card_brand("3530111333300000"), "Unknown");
    }

    #[test]
    fn masking_keeps_last_four() {
        assert_eq!(last_four("4111 1111 1111 1234"), "1234");
        assert_eq!(last_four("12"), "12");
    }
}
