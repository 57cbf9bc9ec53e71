//! Operation classifier & delta calculator.
//!
//! `classify` is a pure function from a typed request to the computed total,
//! the stock deltas and the cash movement the request implies. It performs
//! every field check up front, so a rejected request never reaches storage.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use bahari_core::{DomainError, DomainResult, GradeId, ItemId, LocationId, UnitId};

use crate::serial::SerialPrefix;
use crate::stock::{StockDelta, StockKey};
use crate::wallet::{WalletMovement, WalletSide};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    PurchaseReceive,
    ColdStorageIn,
    Expense,
    SaleInvoice,
    LocalSale,
    CashTransfer,
    BankDeposit,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::PurchaseReceive => "PURCHASE_RECEIVE",
            OperationType::ColdStorageIn => "COLD_STORAGE_IN",
            OperationType::Expense => "EXPENSE",
            OperationType::SaleInvoice => "SALE_INVOICE",
            OperationType::LocalSale => "LOCAL_SALE",
            OperationType::CashTransfer => "CASH_TRANSFER",
            OperationType::BankDeposit => "BANK_DEPOSIT",
        }
    }

    pub fn serial_prefix(&self) -> SerialPrefix {
        match self {
            OperationType::PurchaseReceive => SerialPrefix::Rcv,
            OperationType::ColdStorageIn => SerialPrefix::Prd,
            OperationType::Expense => SerialPrefix::Exp,
            OperationType::SaleInvoice => SerialPrefix::Inv,
            OperationType::LocalSale => SerialPrefix::Sld,
            OperationType::CashTransfer | OperationType::BankDeposit => SerialPrefix::Txn,
        }
    }
}

impl core::fmt::Display for OperationType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Credit,
}

/// Direction of a cash transfer, seen from the location.
///
/// `In`: head office sends cash to the location. `Out`: the location remits
/// cash to head office.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferDirection {
    In,
    Out,
}

/// Inbound posting request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    #[serde(rename = "type")]
    pub op_type: OperationType,
    pub location_id: LocationId,
    #[serde(default)]
    pub unit_id: Option<UnitId>,
    #[serde(default)]
    pub item_id: Option<ItemId>,
    #[serde(default)]
    pub quantity_kg: Option<Decimal>,
    /// Raw input consumed by a cold-storage run; defaults to `quantity_kg`.
    #[serde(default)]
    pub raw_used_kg: Option<Decimal>,
    #[serde(default)]
    pub price_per_kg: Option<i64>,
    #[serde(default)]
    pub grade_id: Option<GradeId>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub transfer_direction: Option<TransferDirection>,
    #[serde(default)]
    pub description: Option<String>,
    /// Backdated business date, `YYYY-MM-DD` or RFC 3339.
    #[serde(default)]
    pub custom_date: Option<String>,
    #[serde(default)]
    pub skip_audit: bool,
}

impl OperationRequest {
    /// A request with only the routing fields set.
    pub fn new(op_type: OperationType, location_id: LocationId) -> Self {
        Self {
            op_type,
            location_id,
            unit_id: None,
            item_id: None,
            quantity_kg: None,
            raw_used_kg: None,
            price_per_kg: None,
            grade_id: None,
            payment_method: None,
            amount: None,
            transfer_direction: None,
            description: None,
            custom_date: None,
            skip_audit: false,
        }
    }
}

/// Result of classification: everything the commit needs, computed without IO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedOperation {
    pub op_type: OperationType,
    pub unit_id: Option<UnitId>,
    pub item_id: Option<ItemId>,
    pub grade_id: Option<GradeId>,
    pub quantity_kg: Option<Decimal>,
    pub raw_used_kg: Option<Decimal>,
    pub price_per_kg: Option<i64>,
    pub amount: Option<i64>,
    pub payment_method: Option<PaymentMethod>,
    pub transfer_direction: Option<TransferDirection>,
    pub description: Option<String>,
    pub total: i64,
    pub stock_deltas: Vec<StockDelta>,
    pub wallet_movement: Option<WalletMovement>,
    /// Output ÷ raw used × 100, for cold-storage runs.
    pub yield_pct: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
    pub skip_audit: bool,
}

impl ClassifiedOperation {
    pub fn serial_prefix(&self) -> crate::serial::SerialPrefix {
        self.op_type.serial_prefix()
    }
}

/// Classify a request and compute its totals and deltas.
///
/// `now` is used as the business timestamp unless the request carries a
/// `customDate`.
pub fn classify(request: &OperationRequest, now: DateTime<Utc>) -> DomainResult<ClassifiedOperation> {
    let occurred_at = resolve_timestamp(request.custom_date.as_deref(), now)?;

    let mut op = ClassifiedOperation {
        op_type: request.op_type,
        unit_id: request.unit_id.clone(),
        item_id: request.item_id.clone(),
        grade_id: None,
        quantity_kg: request.quantity_kg,
        raw_used_kg: None,
        price_per_kg: request.price_per_kg,
        amount: request.amount,
        payment_method: None,
        transfer_direction: None,
        description: non_blank(request.description.as_deref()),
        total: 0,
        stock_deltas: Vec::new(),
        wallet_movement: None,
        yield_pct: None,
        occurred_at,
        skip_audit: request.skip_audit,
    };

    match request.op_type {
        OperationType::PurchaseReceive => {
            let (_, item, qty) = require_stock_fields(request)?;
            let price = require_positive_i64(request.price_per_kg, "pricePerKg")?;
            let total = line_total(qty, price)?;
            let payment = request.payment_method.unwrap_or(PaymentMethod::Cash);

            op.total = total;
            op.payment_method = Some(payment);
            op.grade_id = Some(GradeId::not_applicable());
            op.stock_deltas.push(StockDelta {
                key: StockKey::raw(item),
                delta_kg: qty,
            });
            if payment == PaymentMethod::Cash {
                op.wallet_movement = Some(WalletMovement::debit(WalletSide::Location, total));
            }
        }
        OperationType::ColdStorageIn => {
            let (_, item, qty) = require_stock_fields(request)?;
            let raw_used = match request.raw_used_kg {
                Some(raw) if raw > Decimal::ZERO => raw,
                Some(_) => return Err(DomainError::validation("rawUsedKg must be positive")),
                None => qty,
            };
            let grade = grade_or_default(request.grade_id.as_ref());

            op.raw_used_kg = Some(raw_used);
            op.grade_id = Some(grade.clone());
            op.yield_pct = Some(yield_pct(qty, raw_used)?);
            op.stock_deltas.push(StockDelta {
                key: StockKey::raw(item.clone()),
                delta_kg: -raw_used,
            });
            op.stock_deltas.push(StockDelta {
                key: StockKey::cold(item, grade),
                delta_kg: qty,
            });
        }
        OperationType::Expense => {
            let amount = require_positive_i64(request.amount, "amount")?;
            require_description(&op)?;
            let payment = request.payment_method.unwrap_or(PaymentMethod::Cash);

            op.total = amount;
            op.payment_method = Some(payment);
            if payment == PaymentMethod::Cash {
                op.wallet_movement = Some(WalletMovement::debit(WalletSide::Location, amount));
            }
        }
        OperationType::SaleInvoice | OperationType::LocalSale => {
            let grade = request
                .grade_id
                .clone()
                .ok_or_else(|| DomainError::validation("gradeId is required for sales"))?;
            let (_, item, qty) = require_stock_fields(request)?;
            // Unpriced sales move stock only.
            let price = request.price_per_kg.unwrap_or(0);
            if price < 0 {
                return Err(DomainError::validation("pricePerKg cannot be negative"));
            }
            let total = line_total(qty, price)?;

            op.total = total;
            op.grade_id = Some(grade.clone());
            op.stock_deltas.push(StockDelta {
                key: StockKey::cold(item, grade),
                delta_kg: -qty,
            });
            if request.op_type == OperationType::LocalSale {
                op.payment_method = Some(PaymentMethod::Cash);
                if total > 0 {
                    op.wallet_movement = Some(WalletMovement::credit(WalletSide::Location, total));
                }
            } else {
                op.payment_method = Some(PaymentMethod::Credit);
            }
        }
        OperationType::CashTransfer => {
            let amount = require_positive_i64(request.amount, "amount")?;
            require_description(&op)?;
            let direction = request
                .transfer_direction
                .ok_or_else(|| DomainError::validation("transferDirection is required"))?;

            op.total = amount;
            op.payment_method = Some(PaymentMethod::Cash);
            op.transfer_direction = Some(direction);
            op.wallet_movement = Some(match direction {
                TransferDirection::In => {
                    WalletMovement::transfer(WalletSide::Hq, WalletSide::Location, amount)
                }
                TransferDirection::Out => {
                    WalletMovement::transfer(WalletSide::Location, WalletSide::Hq, amount)
                }
            });
        }
        OperationType::BankDeposit => {
            let amount = require_positive_i64(request.amount, "amount")?;

            op.total = amount;
            op.payment_method = Some(PaymentMethod::Transfer);
            op.wallet_movement = Some(WalletMovement::credit(WalletSide::Hq, amount));
        }
    }

    Ok(op)
}

fn require_stock_fields(request: &OperationRequest) -> DomainResult<(UnitId, ItemId, Decimal)> {
    let unit = request
        .unit_id
        .clone()
        .ok_or_else(|| DomainError::validation("unitId is required"))?;
    let item = request
        .item_id
        .clone()
        .ok_or_else(|| DomainError::validation("itemId is required"))?;
    let qty = request
        .quantity_kg
        .ok_or_else(|| DomainError::validation("quantityKg is required"))?;
    if qty <= Decimal::ZERO {
        return Err(DomainError::validation("quantityKg must be positive"));
    }
    Ok((unit, item, qty))
}

fn require_positive_i64(value: Option<i64>, field: &str) -> DomainResult<i64> {
    match value {
        Some(v) if v > 0 => Ok(v),
        Some(_) => Err(DomainError::validation(format!("{field} must be positive"))),
        None => Err(DomainError::validation(format!("{field} is required"))),
    }
}

fn require_description(op: &ClassifiedOperation) -> DomainResult<()> {
    if op.description.is_none() {
        return Err(DomainError::validation("description is required"));
    }
    Ok(())
}

fn grade_or_default(grade: Option<&GradeId>) -> GradeId {
    grade.cloned().unwrap_or_else(GradeId::not_applicable)
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// `qty × price`, rounded half away from zero to whole rupiah.
fn line_total(qty: Decimal, price_per_kg: i64) -> DomainResult<i64> {
    qty.checked_mul(Decimal::from(price_per_kg))
        .map(|t| t.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|t| t.to_i64())
        .ok_or_else(|| DomainError::validation("total overflows"))
}

fn yield_pct(output_kg: Decimal, raw_used_kg: Decimal) -> DomainResult<Decimal> {
    output_kg
        .checked_div(raw_used_kg)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(|pct| pct.round_dp(2))
        .ok_or_else(|| DomainError::validation("yield overflows"))
}

fn resolve_timestamp(custom: Option<&str>, now: DateTime<Utc>) -> DomainResult<DateTime<Utc>> {
    let Some(raw) = custom.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(now);
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| DomainError::validation(format!("customDate '{raw}' is not a date")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 2, 9, 30, 0).unwrap()
    }

    fn request(op_type: OperationType) -> OperationRequest {
        let mut r = OperationRequest::new(op_type, LocationId::new("kaimana").unwrap());
        r.unit_id = Some(UnitId::new("frozen_fish").unwrap());
        r.item_id = Some(ItemId::new("kakap_merah").unwrap());
        r
    }

    #[test]
    fn purchase_receive_computes_total_and_cash_debit() {
        let mut r = request(OperationType::PurchaseReceive);
        r.quantity_kg = Some(dec!(200));
        r.price_per_kg = Some(40_000);
        r.payment_method = Some(PaymentMethod::Cash);

        let op = classify(&r, now()).unwrap();
        assert_eq!(op.total, 8_000_000);
        assert_eq!(op.stock_deltas.len(), 1);
        assert_eq!(op.stock_deltas[0].key.as_key(), "RAW_kakap_merah");
        assert_eq!(op.stock_deltas[0].delta_kg, dec!(200));
        assert_eq!(
            op.wallet_movement,
            Some(WalletMovement::debit(WalletSide::Location, 8_000_000))
        );
        assert_eq!(op.serial_prefix(), SerialPrefix::Rcv);
    }

    #[test]
    fn purchase_on_credit_has_no_wallet_effect() {
        let mut r = request(OperationType::PurchaseReceive);
        r.quantity_kg = Some(dec!(1.5));
        r.price_per_kg = Some(33_333);
        r.payment_method = Some(PaymentMethod::Credit);

        let op = classify(&r, now()).unwrap();
        assert_eq!(op.total, 50_000);
        assert!(op.wallet_movement.is_none());
    }

    #[test]
    fn purchase_requires_positive_price() {
        let mut r = request(OperationType::PurchaseReceive);
        r.quantity_kg = Some(dec!(10));
        r.price_per_kg = Some(0);
        assert!(matches!(classify(&r, now()), Err(DomainError::Validation(_))));
    }

    #[test]
    fn cold_storage_uses_explicit_raw_consumption() {
        let mut r = request(OperationType::ColdStorageIn);
        r.quantity_kg = Some(dec!(50));
        r.raw_used_kg = Some(dec!(100));

        let op = classify(&r, now()).unwrap();
        assert_eq!(op.grade_id.as_ref().unwrap().as_str(), "NA");
        assert_eq!(op.stock_deltas[0].key.as_key(), "RAW_kakap_merah");
        assert_eq!(op.stock_deltas[0].delta_kg, dec!(-100));
        assert_eq!(op.stock_deltas[1].key.as_key(), "COLD_kakap_merah_NA");
        assert_eq!(op.stock_deltas[1].delta_kg, dec!(50));
        assert_eq!(op.yield_pct, Some(dec!(50)));
        assert!(op.wallet_movement.is_none());
        assert_eq!(op.serial_prefix(), SerialPrefix::Prd);
    }

    #[test]
    fn cold_storage_falls_back_to_one_to_one() {
        let mut r = request(OperationType::ColdStorageIn);
        r.quantity_kg = Some(dec!(30));
        r.grade_id = Some(GradeId::new("A").unwrap());

        let op = classify(&r, now()).unwrap();
        assert_eq!(op.stock_deltas[0].delta_kg, dec!(-30));
        assert_eq!(op.stock_deltas[1].key.as_key(), "COLD_kakap_merah_A");
        assert_eq!(op.yield_pct, Some(dec!(100)));
    }

    #[test]
    fn cold_storage_yield_overflow_is_rejected() {
        let mut r = request(OperationType::ColdStorageIn);
        r.quantity_kg = Some(Decimal::from_i128_with_scale(10_i128.pow(27), 0));
        r.raw_used_kg = Some(dec!(0.001));

        let err = classify(&r, now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(m) if m.contains("yield")));
    }

    #[test]
    fn expense_needs_description_and_amount() {
        let mut r = request(OperationType::Expense);
        r.amount = Some(150_000);
        assert!(matches!(classify(&r, now()), Err(DomainError::Validation(m)) if m.contains("description")));

        r.description = Some("  ".into());
        assert!(classify(&r, now()).is_err());

        r.description = Some("ice blocks".into());
        let op = classify(&r, now()).unwrap();
        assert_eq!(op.total, 150_000);
        assert_eq!(
            op.wallet_movement,
            Some(WalletMovement::debit(WalletSide::Location, 150_000))
        );
    }

    #[test]
    fn sale_invoice_without_grade_is_rejected() {
        let mut r = request(OperationType::SaleInvoice);
        r.quantity_kg = Some(dec!(10));
        r.price_per_kg = Some(90_000);
        let err = classify(&r, now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(m) if m.contains("gradeId")));
    }

    #[test]
    fn sale_invoice_is_a_receivable() {
        let mut r = request(OperationType::SaleInvoice);
        r.quantity_kg = Some(dec!(10));
        r.price_per_kg = Some(90_000);
        r.grade_id = Some(GradeId::new("A").unwrap());

        let op = classify(&r, now()).unwrap();
        assert_eq!(op.total, 900_000);
        assert_eq!(op.stock_deltas[0].delta_kg, dec!(-10));
        assert!(op.wallet_movement.is_none());
        assert_eq!(op.serial_prefix(), SerialPrefix::Inv);
    }

    #[test]
    fn local_sale_credits_location() {
        let mut r = request(OperationType::LocalSale);
        r.quantity_kg = Some(dec!(4));
        r.price_per_kg = Some(25_000);
        r.grade_id = Some(GradeId::new("B").unwrap());

        let op = classify(&r, now()).unwrap();
        assert_eq!(
            op.wallet_movement,
            Some(WalletMovement::credit(WalletSide::Location, 100_000))
        );
        assert_eq!(op.serial_prefix(), SerialPrefix::Sld);
    }

    #[test]
    fn unpriced_local_sale_moves_stock_only() {
        let mut r = request(OperationType::LocalSale);
        r.quantity_kg = Some(dec!(4));
        r.grade_id = Some(GradeId::new("B").unwrap());

        let op = classify(&r, now()).unwrap();
        assert_eq!(op.total, 0);
        assert_eq!(op.stock_deltas[0].delta_kg, dec!(-4));
        assert!(op.wallet_movement.is_none());
    }

    #[test]
    fn cash_transfer_direction_picks_wallets() {
        let mut r = OperationRequest::new(OperationType::CashTransfer, LocationId::new("kaimana").unwrap());
        r.amount = Some(500_000_000);
        r.description = Some("weekly float".into());
        assert!(classify(&r, now()).is_err());

        r.transfer_direction = Some(TransferDirection::In);
        let op = classify(&r, now()).unwrap();
        assert_eq!(
            op.wallet_movement,
            Some(WalletMovement::transfer(WalletSide::Hq, WalletSide::Location, 500_000_000))
        );

        r.transfer_direction = Some(TransferDirection::Out);
        let op = classify(&r, now()).unwrap();
        assert_eq!(
            op.wallet_movement,
            Some(WalletMovement::transfer(WalletSide::Location, WalletSide::Hq, 500_000_000))
        );
    }

    #[test]
    fn bank_deposit_credits_hq() {
        let mut r = OperationRequest::new(OperationType::BankDeposit, LocationId::new("kaimana").unwrap());
        r.amount = Some(1_000);
        let op = classify(&r, now()).unwrap();
        assert_eq!(op.wallet_movement, Some(WalletMovement::credit(WalletSide::Hq, 1_000)));
        assert_eq!(op.serial_prefix(), SerialPrefix::Txn);
    }

    #[test]
    fn custom_date_overrides_timestamp() {
        let mut r = OperationRequest::new(OperationType::BankDeposit, LocationId::new("kaimana").unwrap());
        r.amount = Some(1);
        r.custom_date = Some("2025-12-31".into());
        let op = classify(&r, now()).unwrap();
        assert_eq!(op.occurred_at.year(), 2025);

        r.custom_date = Some("yesterday".into());
        assert!(classify(&r, now()).is_err());
    }

    #[test]
    fn request_deserializes_from_wire_shape() {
        let json = r#"{
            "type": "PURCHASE_RECEIVE",
            "locationId": "kaimana",
            "unitId": "frozen_fish",
            "itemId": "kakap_merah",
            "quantityKg": 200,
            "pricePerKg": 40000,
            "paymentMethod": "CASH"
        }"#;
        let r: OperationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(r.op_type, OperationType::PurchaseReceive);
        assert_eq!(r.quantity_kg, Some(dec!(200)));
        assert!(!r.skip_audit);
    }
}
