//! # Validation Module
//!
//! Rules a record must pass before a repository stores it.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Web form                                                     │
//! │  └── Basic format checks, immediate feedback                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (called by every repository save)                │
//! │  ├── Sanitise free text (no_html)                                      │
//! │  ├── Required fields and maximum lengths                               │
//! │  └── Recompute line totals and compare                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── PRIMARY KEY / UNIQUE constraints                                  │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Unlike a fail-fast check, each `validate_*` function collects every
//! failure of the record into [`ValidationErrors`].
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::validate_tax;
//! use tally_core::Tax;
//!
//! let mut tax = Tax::new(" IVA21 ", "IVA 21%", 21.0, 5.2);
//! validate_tax(&mut tax).unwrap();
//! assert_eq!(tax.code, "IVA21");
//! ```

use crate::amount::{amounts_match, round_to, DEFAULT_AMOUNT_DECIMALS};
use crate::error::{ValidationError, ValidationErrors};
use crate::types::{DeliveryNoteLine, SequenceRecord, Tax};
use crate::{TAX_CODE_MAX_LEN, TAX_DESCRIPTION_MAX_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationErrors>;

/// Knobs that come from application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationSettings {
    /// Decimals used when comparing stored and recomputed totals.
    pub amount_decimals: u32,

    /// Name of the delivery note document used in messages.
    pub delivery_note_label: String,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        ValidationSettings {
            amount_decimals: DEFAULT_AMOUNT_DECIMALS,
            delivery_note_label: "delivery note".to_string(),
        }
    }
}

// =============================================================================
// Text Helpers
// =============================================================================

/// Escapes HTML-significant characters and trims the result.
///
/// ## Example
/// ```rust
/// use tally_core::validation::no_html;
///
/// assert_eq!(no_html("  <b>Box</b> \"XL\" "), "&lt;b&gt;Box&lt;/b&gt; &quot;XL&quot;");
/// ```
pub fn no_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.trim().chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Returns true for plain decimal numbers like `12`, `-3.5` or `1e3`.
pub fn is_numeric(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }

    // Rejects "inf"/"nan", which f64::from_str would accept
    let plain = text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));

    plain && text.parse::<f64>().map(f64::is_finite).unwrap_or(false)
}

/// How a free-text search query is matched against stored text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchPattern {
    /// Numeric query, matched verbatim (`LIKE '%12%'`).
    Numeric(String),

    /// Text query, matched against lowercased columns with spaces as
    /// wildcards (`lower(col) LIKE '%red%box%'`).
    Text(String),
}

impl SearchPattern {
    /// Builds the pattern for a raw user query.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::validation::SearchPattern;
    ///
    /// assert_eq!(
    ///     SearchPattern::from_query("Red Box"),
    ///     SearchPattern::Text("%red%box%".to_string())
    /// );
    /// assert_eq!(
    ///     SearchPattern::from_query("12"),
    ///     SearchPattern::Numeric("%12%".to_string())
    /// );
    /// ```
    pub fn from_query(query: &str) -> Self {
        let query = no_html(query).to_lowercase();

        if is_numeric(&query) {
            SearchPattern::Numeric(format!("%{}%", query))
        } else {
            SearchPattern::Text(format!("%{}%", query.replace(' ', "%")))
        }
    }

    /// The LIKE pattern to bind.
    pub fn like(&self) -> &str {
        match self {
            SearchPattern::Numeric(p) | SearchPattern::Text(p) => p,
        }
    }

    /// True when columns must be compared through `lower()`.
    pub fn is_case_folded(&self) -> bool {
        matches!(self, SearchPattern::Text(_))
    }
}

// =============================================================================
// String Validators
// =============================================================================

fn check_length(field: &str, value: &str, max: usize, errors: &mut ValidationErrors) {
    let len = value.chars().count();
    if len == 0 {
        errors.push(ValidationError::Required {
            field: field.to_string(),
        });
    } else if len > max {
        errors.push(ValidationError::TooLong {
            field: field.to_string(),
            max,
            actual: len,
        });
    }
}

// =============================================================================
// Record Validators
// =============================================================================

/// Normalises and validates a tax.
///
/// ## Rules
/// - `code` is trimmed; 1 to 10 characters
/// - `description` is sanitised with [`no_html`]; 1 to 50 characters
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_tax;
/// use tally_core::Tax;
///
/// let mut tax = Tax::new("IVA21", "", 21.0, 5.2);
/// let errors = validate_tax(&mut tax).unwrap_err();
/// assert!(errors.has_field("description"));
/// ```
pub fn validate_tax(tax: &mut Tax) -> ValidationResult<()> {
    tax.code = tax.code.trim().to_string();
    tax.description = no_html(&tax.description);

    let mut errors = ValidationErrors::new();
    check_length("code", &tax.code, TAX_CODE_MAX_LEN, &mut errors);
    check_length(
        "description",
        &tax.description,
        TAX_DESCRIPTION_MAX_LEN,
        &mut errors,
    );

    errors.into_result()
}

/// Normalises a delivery note line and checks its stored totals.
///
/// ## Rules
/// ```text
/// total                  == unit_price * quantity * (100 - discount) / 100
/// total_without_discount == unit_price * quantity
/// ```
/// Both sides are rounded to `settings.amount_decimals` before comparing.
/// NaN or infinite amounts are reported as `NotFinite` and the totals are
/// not compared. Messages name the line reference and the document label so the user
/// can find the line.
pub fn validate_delivery_note_line(
    line: &mut DeliveryNoteLine,
    settings: &ValidationSettings,
) -> ValidationResult<()> {
    line.description = no_html(&line.description);

    let decimals = settings.amount_decimals;
    let context = format!(
        "line {} of the {}",
        line.reference.as_deref().unwrap_or(""),
        settings.delivery_note_label
    );

    let mut errors = ValidationErrors::new();

    for (field, value) in [
        ("quantity", line.quantity),
        ("unit_price", line.unit_price),
        ("discount_pct", line.discount_pct),
        ("total", line.total),
        ("total_without_discount", line.total_without_discount),
    ] {
        if !value.is_finite() {
            errors.push(ValidationError::NotFinite {
                field: field.to_string(),
            });
        }
    }
    if !errors.is_empty() {
        return errors.into_result();
    }

    let expected = line.expected_total();
    if !amounts_match(line.total, expected, decimals) {
        errors.push(ValidationError::TotalMismatch {
            field: "total".to_string(),
            expected: round_to(expected, decimals),
            actual: line.total,
            context: context.clone(),
        });
    }

    let expected = line.expected_total_without_discount();
    if !amounts_match(line.total_without_discount, expected, decimals) {
        errors.push(ValidationError::TotalMismatch {
            field: "total_without_discount".to_string(),
            expected: round_to(expected, decimals),
            actual: line.total_without_discount,
            context,
        });
    }

    errors.into_result()
}

/// Validates a numbering sequence record.
///
/// ## Rules
/// - `fiscal_year` and `series` are trimmed and required
/// - every counter is at least 1
pub fn validate_sequence(record: &mut SequenceRecord) -> ValidationResult<()> {
    record.fiscal_year = record.fiscal_year.trim().to_string();
    record.series = record.series.trim().to_string();

    let mut errors = ValidationErrors::new();

    if record.fiscal_year.is_empty() {
        errors.push(ValidationError::Required {
            field: "fiscal_year".to_string(),
        });
    }
    if record.series.is_empty() {
        errors.push(ValidationError::Required {
            field: "series".to_string(),
        });
    }

    for (kind, direction, value) in record.counters() {
        if value < 1 {
            errors.push(ValidationError::MustBePositive {
                field: format!("{}_{}", direction, kind),
            });
        }
    }

    errors.into_result()
}

// =============================================================================
// Unit Tests
// =============================================================================
