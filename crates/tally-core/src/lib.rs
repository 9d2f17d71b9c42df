//! # tally-core: Records and Rules
//!
//! Pure record types and the rules that decide whether a record may be
//! stored. No database, no cache, no I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Web application (external)                   │   │
//! │  │        tax settings, delivery notes, numbering admin            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────┐                 │   │
//! │  │   │   types   │  │  amount   │  │ validation │                 │   │
//! │  │   │  Tax      │  │  rounding │  │  no_html   │                 │   │
//! │  │   │  Line     │  │  compare  │  │  totals    │                 │   │
//! │  │   │  Sequence │  │           │  │  search    │                 │   │
//! │  │   └───────────┘  └───────────┘  └────────────┘                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (Database Layer)                    │   │
//! │  │       SQLite repositories, list cache, reconciliation           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Records (Tax, DeliveryNoteLine, SequenceRecord, ...)
//! - [`amount`] - Rounding and comparison of amounts
//! - [`error`] - Domain error types
//! - [`record`] - The contract every stored record implements
//! - [`validation`] - Per-record validation and text helpers
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::validation::{validate_delivery_note_line, ValidationSettings};
//! use tally_core::DeliveryNoteLine;
//!
//! let mut line = DeliveryNoteLine {
//!     unit_price: 10.0,
//!     quantity: 3.0,
//!     discount_pct: 10.0,
//!     ..DeliveryNoteLine::default()
//! };
//! line.recalculate_totals();
//! assert_eq!(line.total, 27.0);
//!
//! line.total = 25.0;
//! assert!(validate_delivery_note_line(&mut line, &ValidationSettings::default()).is_err());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod amount;
pub mod error;
pub mod record;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, ValidationError, ValidationErrors};
pub use record::Record;
pub use types::*;
pub use validation::ValidationSettings;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of a tax code (`taxes.code` is VARCHAR(10)).
pub const TAX_CODE_MAX_LEN: usize = 10;

/// Maximum length of a tax description.
pub const TAX_DESCRIPTION_MAX_LEN: usize = 50;

/// Page size of paginated finders when configuration does not override it.
pub const DEFAULT_ITEM_LIMIT: u32 = 50;
