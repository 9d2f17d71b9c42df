//! # Domain Types
//!
//! Records stored by the invoicing application.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────────┐   ┌─────────────────┐  │
//! │  │      Tax        │   │  DeliveryNoteLine    │   │ SequenceRecord  │  │
//! │  │  ─────────────  │   │  ──────────────────  │   │  ─────────────  │  │
//! │  │  code (PK)      │◄──│  tax_code            │   │  id (PK)        │  │
//! │  │  rate           │   │  delivery_note_id ───┼─┐ │  fiscal_year ───┼┐ │
//! │  │  surcharge      │   │  unit_price, total   │ │ │  series ────────┼┤ │
//! │  └─────────────────┘   └──────────────────────┘ │ │  8 counters     ││ │
//! │                                                  │ └─────────────────┘│ │
//! │  ┌─────────────────┐   ┌─────────────────┐      │  ┌──────────────┐  │ │
//! │  │  DeliveryNote   │◄──┼─────────────────┼──────┘  │ FiscalYear   │◄─┤ │
//! │  │  code, date     │   │     Series      │◄────────┼──────────────┼──┘ │
//! │  │  customer_name  │   │  code, descr.   │         │ code, name   │    │
//! │  └─────────────────┘   └─────────────────┘         └──────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//! Every record starts Transient (`Default`, key unset), becomes Persisted
//! when a repository saves it, and is stale once deleted.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::amount::{apply_discount, apply_rate};
use crate::error::CoreError;

// =============================================================================
// Tax
// =============================================================================

/// A tax (VAT) rate that articles and document lines refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Tax {
    /// Primary key, at most 10 characters (e.g. "IVA21").
    pub code: String,

    /// Ledger sub-account for sales.
    pub sales_account: Option<String>,

    /// Ledger sub-account for purchases.
    pub purchase_account: Option<String>,

    /// At most 50 characters.
    pub description: String,

    /// Tax percentage.
    pub rate: f64,

    /// Equivalence surcharge percentage.
    pub surcharge: f64,
}

impl Default for Tax {
    fn default() -> Self {
        Tax {
            code: String::new(),
            sales_account: None,
            purchase_account: None,
            description: String::new(),
            rate: 0.0,
            surcharge: 0.0,
        }
    }
}

impl Tax {
    /// Creates a tax with code, description and percentages.
    pub fn new(
        code: impl Into<String>,
        description: impl Into<String>,
        rate: f64,
        surcharge: f64,
    ) -> Self {
        Tax {
            code: code.into(),
            description: description.into(),
            rate,
            surcharge,
            ..Tax::default()
        }
    }

    /// True when the primary key has not been assigned yet.
    pub fn is_transient(&self) -> bool {
        self.code.trim().is_empty()
    }

    /// True if this is the configured default tax.
    pub fn is_default(&self, default_code: &str) -> bool {
        !self.is_transient() && self.code == default_code
    }
}

// =============================================================================
// Delivery Note Line
// =============================================================================

/// One line of a customer delivery note.
///
/// ## Stored totals
/// `total` and `total_without_discount` are denormalised: they are written
/// by the caller and re-checked against `unit_price`, `quantity` and
/// `discount_pct` before every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DeliveryNoteLine {
    /// Primary key, assigned by the database on insert.
    pub id: Option<i64>,

    /// Originating order line, if any.
    pub order_line_id: Option<i64>,

    /// Delivery note this line belongs to.
    pub delivery_note_id: Option<i64>,

    /// Order of the delivery note, if any.
    pub order_id: Option<i64>,

    /// Article reference.
    pub reference: Option<String>,

    /// Selected combination for articles with attributes.
    pub combination_code: Option<String>,

    pub description: String,

    pub quantity: f64,

    /// Discount percentage.
    pub discount_pct: f64,

    pub tax_code: Option<String>,

    /// Tax percentage copied from the tax at the time of the sale.
    pub tax_rate: f64,

    /// Net amount without taxes: `unit_price * quantity * (100 - discount) / 100`.
    pub total: f64,

    /// Net amount before discount: `unit_price * quantity`.
    pub total_without_discount: f64,

    pub unit_price: f64,

    /// IRPF withholding percentage.
    pub withholding_pct: f64,

    /// Equivalence surcharge percentage.
    pub surcharge_pct: f64,

    /// Position in the document; higher goes further down.
    pub sort_order: i64,

    /// When false the quantity column is hidden on print.
    pub show_quantity: bool,

    /// When false price, discount, taxes and total are hidden on print.
    pub show_price: bool,
}

impl Default for DeliveryNoteLine {
    fn default() -> Self {
        DeliveryNoteLine {
            id: None,
            order_line_id: None,
            delivery_note_id: None,
            order_id: None,
            reference: None,
            combination_code: None,
            description: String::new(),
            quantity: 0.0,
            discount_pct: 0.0,
            tax_code: None,
            tax_rate: 0.0,
            total: 0.0,
            total_without_discount: 0.0,
            unit_price: 0.0,
            withholding_pct: 0.0,
            surcharge_pct: 0.0,
            sort_order: 0,
            show_quantity: true,
            show_price: true,
        }
    }
}

impl DeliveryNoteLine {
    /// True when the line has not been inserted yet.
    pub fn is_transient(&self) -> bool {
        self.id.is_none()
    }

    /// Expected `total`: `unit_price * quantity * (100 - discount_pct) / 100`.
    pub fn expected_total(&self) -> f64 {
        apply_discount(self.unit_price * self.quantity, self.discount_pct)
    }

    /// Expected `total_without_discount`: `unit_price * quantity`.
    pub fn expected_total_without_discount(&self) -> f64 {
        self.unit_price * self.quantity
    }

    /// Recomputes both stored totals from price, quantity and discount.
    pub fn recalculate_totals(&mut self) {
        self.total = self.expected_total();
        self.total_without_discount = self.expected_total_without_discount();
    }

    /// Unit price with the line's tax applied.
    pub fn unit_price_with_tax(&self) -> f64 {
        apply_rate(self.unit_price, self.tax_rate)
    }

    /// Line total with tax and surcharge added and withholding subtracted.
    pub fn total_with_taxes(&self) -> f64 {
        apply_rate(
            self.total,
            self.tax_rate - self.withholding_pct + self.surcharge_pct,
        )
    }

    /// Price per unit with discount and tax applied; zero for empty lines.
    pub fn unit_total_with_tax(&self) -> f64 {
        if self.quantity == 0.0 {
            return 0.0;
        }

        apply_rate(self.total, self.tax_rate) / self.quantity
    }
}

// =============================================================================
// Delivery Note (header)
// =============================================================================

/// The delivery note header fields that lines display next to themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DeliveryNote {
    pub id: Option<i64>,

    /// Human-facing document code.
    pub code: String,

    #[ts(as = "String")]
    pub date: NaiveDate,

    pub customer_code: Option<String>,

    pub customer_name: String,

    /// Free-form observations.
    pub notes: String,
}

// =============================================================================
// Fiscal Year & Series
// =============================================================================

/// An accounting period with its own document numbering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct FiscalYear {
    /// Primary key (e.g. "2024").
    pub code: String,

    pub name: String,

    #[ts(as = "String")]
    pub start_date: NaiveDate,

    #[ts(as = "String")]
    pub end_date: NaiveDate,
}

/// A named subdivision of documents within a fiscal year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Series {
    /// Primary key (e.g. "A").
    pub code: String,

    pub description: String,
}

// =============================================================================
// Document Kind & Direction
// =============================================================================

/// Kinds of numbered business documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    DeliveryNote,
    Order,
    Quote,
}

impl DocumentKind {
    /// All kinds, in counter column order.
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::Invoice,
        DocumentKind::DeliveryNote,
        DocumentKind::Order,
        DocumentKind::Quote,
    ];
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::DeliveryNote => "delivery_note",
            DocumentKind::Order => "order",
            DocumentKind::Quote => "quote",
        };
        f.write_str(name)
    }
}

impl FromStr for DocumentKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "invoice" => Ok(DocumentKind::Invoice),
            "delivery_note" | "delivery-note" => Ok(DocumentKind::DeliveryNote),
            "order" => Ok(DocumentKind::Order),
            "quote" => Ok(DocumentKind::Quote),
            _ => Err(CoreError::UnknownDocumentKind(s.to_string())),
        }
    }
}

/// Whether a document is issued to a customer or received from a supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Customer,
    Supplier,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Customer, Direction::Supplier];
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Customer => f.write_str("customer"),
            Direction::Supplier => f.write_str("supplier"),
        }
    }
}

impl FromStr for Direction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "customer" => Ok(Direction::Customer),
            "supplier" => Ok(Direction::Supplier),
            _ => Err(CoreError::UnknownDirection(s.to_string())),
        }
    }
}

// =============================================================================
// Sequence Record
// =============================================================================

/// Next document numbers for one (fiscal year, series) pair.
///
/// ## Counter Layout
/// ```text
///               Invoice   DeliveryNote   Order   Quote
///  Customer     ncli_inv  ncli_dn        ...     ...
///  Supplier     nsup_inv  nsup_dn        ...     ...
/// ```
/// Every counter holds the NEXT number to hand out and starts at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SequenceRecord {
    /// Primary key, assigned by the database on insert.
    pub id: Option<i64>,

    pub fiscal_year: String,

    pub series: String,

    pub customer_invoice: i64,
    pub customer_delivery_note: i64,
    pub customer_order: i64,
    pub customer_quote: i64,
    pub supplier_invoice: i64,
    pub supplier_delivery_note: i64,
    pub supplier_order: i64,
    pub supplier_quote: i64,
}

impl Default for SequenceRecord {
    fn default() -> Self {
        SequenceRecord {
            id: None,
            fiscal_year: String::new(),
            series: String::new(),
            customer_invoice: 1,
            customer_delivery_note: 1,
            customer_order: 1,
            customer_quote: 1,
            supplier_invoice: 1,
            supplier_delivery_note: 1,
            supplier_order: 1,
            supplier_quote: 1,
        }
    }
}

impl SequenceRecord {
    /// Creates a record with every counter at 1.
    pub fn new(fiscal_year: impl Into<String>, series: impl Into<String>) -> Self {
        SequenceRecord {
            fiscal_year: fiscal_year.into(),
            series: series.into(),
            ..SequenceRecord::default()
        }
    }

    /// True when the record has not been inserted yet.
    pub fn is_transient(&self) -> bool {
        self.id.is_none()
    }

    /// Returns the next number for a document kind and direction.
    pub fn counter(&self, kind: DocumentKind, direction: Direction) -> i64 {
        *self.slot(kind, direction)
    }

    /// Hands out the next number and moves the counter forward.
    pub fn advance(&mut self, kind: DocumentKind, direction: Direction) -> i64 {
        let slot = self.slot_mut(kind, direction);
        let number = *slot;
        *slot += 1;
        number
    }

    /// All eight counters with their kind and direction.
    pub fn counters(&self) -> Vec<(DocumentKind, Direction, i64)> {
        Direction::ALL
            .iter()
            .flat_map(|&direction| {
                DocumentKind::ALL
                    .iter()
                    .map(move |&kind| (kind, direction, self.counter(kind, direction)))
            })
            .collect()
    }

    fn slot(&self, kind: DocumentKind, direction: Direction) -> &i64 {
        match (direction, kind) {
            (Direction::Customer, DocumentKind::Invoice) => &self.customer_invoice,
            (Direction::Customer, DocumentKind::DeliveryNote) => &self.customer_delivery_note,
            (Direction::Customer, DocumentKind::Order) => &self.customer_order,
            (Direction::Customer, DocumentKind::Quote) => &self.customer_quote,
            (Direction::Supplier, DocumentKind::Invoice) => &self.supplier_invoice,
            (Direction::Supplier, DocumentKind::DeliveryNote) => &self.supplier_delivery_note,
            (Direction::Supplier, DocumentKind::Order) => &self.supplier_order,
            (Direction::Supplier, DocumentKind::Quote) => &self.supplier_quote,
        }
    }

    fn slot_mut(&mut self, kind: DocumentKind, direction: Direction) -> &mut i64 {
        match (direction, kind) {
            (Direction::Customer, DocumentKind::Invoice) => &mut self.customer_invoice,
            (Direction::Customer, DocumentKind::DeliveryNote) => &mut self.customer_delivery_note,
            (Direction::Customer, DocumentKind::Order) => &mut self.customer_order,
            (Direction::Customer, DocumentKind::Quote) => &mut self.customer_quote,
            (Direction::Supplier, DocumentKind::Invoice) => &mut self.supplier_invoice,
            (Direction::Supplier, DocumentKind::DeliveryNote) => &mut self.supplier_delivery_note,
            (Direction::Supplier, DocumentKind::Order) => &mut self.supplier_order,
            (Direction::Supplier, DocumentKind::Quote) => &mut self.supplier_quote,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_line() -> DeliveryNoteLine {
        DeliveryNoteLine {
            reference: Some("ABC123".to_string()),
            quantity: 3.0,
            unit_price: 10.0,
            discount_pct: 10.0,
            tax_rate: 21.0,
            ..DeliveryNoteLine::default()
        }
    }

    #[test]
    fn test_defaults() {
        let line = DeliveryNoteLine::default();
        assert!(line.is_transient());
        assert!(line.show_quantity);
        assert!(line.show_price);
        assert_eq!(line.description, "");

        let tax = Tax::default();
        assert!(tax.is_transient());
        assert_eq!(tax.rate, 0.0);

        let seq = SequenceRecord::default();
        assert!(seq.counters().iter().all(|(_, _, n)| *n == 1));
        assert_eq!(seq.counters().len(), 8);
    }

    #[test]
    fn test_expected_totals() {
        let mut line = sample_line();
        assert_eq!(line.expected_total(), 27.0);
        assert_eq!(line.expected_total_without_discount(), 30.0);

        line.recalculate_totals();
        assert_eq!(line.total, 27.0);
        assert_eq!(line.total_without_discount, 30.0);
    }

    #[test]
    fn test_tax_helpers() {
        let mut line = sample_line();
        line.recalculate_totals();
        line.withholding_pct = 15.0;
        line.surcharge_pct = 5.2;

        assert!((line.unit_price_with_tax() - 12.1).abs() < 1e-9);
        // 27 * (100 + 21 - 15 + 5.2) / 100
        assert!((line.total_with_taxes() - 30.024).abs() < 1e-9);
        // 27 * 1.21 / 3
        assert!((line.unit_total_with_tax() - 10.89).abs() < 1e-9);

        line.quantity = 0.0;
        assert_eq!(line.unit_total_with_tax(), 0.0);
    }

    #[test]
    fn test_is_default_tax() {
        let tax = Tax::new("IVA21", "IVA 21%", 21.0, 5.2);
        assert!(tax.is_default("IVA21"));
        assert!(!tax.is_default("IVA10"));
        assert!(!Tax::default().is_default(""));
    }

    #[test]
    fn test_sequence_advance() {
        let mut seq = SequenceRecord::new("2024", "A");
        assert_eq!(seq.advance(DocumentKind::Invoice, Direction::Customer), 1);
        assert_eq!(seq.advance(DocumentKind::Invoice, Direction::Customer), 2);
        assert_eq!(seq.counter(DocumentKind::Invoice, Direction::Customer), 3);
        assert_eq!(seq.counter(DocumentKind::Invoice, Direction::Supplier), 1);
        assert_eq!(seq.customer_invoice, 3);
    }

    #[test]
    fn test_kind_and_direction_parsing() {
        assert_eq!(
            "delivery_note".parse::<DocumentKind>().unwrap(),
            DocumentKind::DeliveryNote
        );
        assert_eq!("Quote".parse::<DocumentKind>().unwrap(), DocumentKind::Quote);
        assert!("receipt".parse::<DocumentKind>().is_err());

        assert_eq!("supplier".parse::<Direction>().unwrap(), Direction::Supplier);
        assert!("vendor".parse::<Direction>().is_err());

        for kind in DocumentKind::ALL {
            assert_eq!(kind.to_string().parse::<DocumentKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_json_round_trip() {
        let mut line = sample_line();
        line.id = Some(7);
        line.delivery_note_id = Some(3);
        line.recalculate_totals();

        let json = serde_json::to_string(&line).unwrap();
        let back: DeliveryNoteLine = serde_json::from_str(&json).unwrap();
        assert_eq!(back, line);
    }
}
