//! # Record Contract
//!
//! What every stored record shares, whatever its table.
//!
//! ## Save Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Generic Save Pipeline                              │
//! │                                                                         │
//! │  record.validate(settings)   ── Err ──► nothing stored, errors returned │
//! │       │ Ok                                                              │
//! │       ▼                                                                 │
//! │  cache.delete(R::CACHE_KEYS)  ← lists that contain the record           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  upsert (repository specific SQL)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  key written back (surrogate keys)                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::types::{DeliveryNoteLine, SequenceRecord, Tax};
use crate::validation::{
    validate_delivery_note_line, validate_sequence, validate_tax, ValidationResult,
    ValidationSettings,
};

/// Cache key of the full tax list.
pub const TAX_LIST_CACHE_KEY: &str = "taxes:all";

/// Cache key of the most delivered articles.
pub const TOP_ARTICLES_CACHE_KEY: &str = "delivery_note_lines:top_articles";

/// A record backed by one table.
pub trait Record: Clone + Send + Sync {
    /// Entity name used in logs and not-found errors.
    const ENTITY: &'static str;

    /// Cached lists that must be dropped whenever a record changes.
    const CACHE_KEYS: &'static [&'static str];

    /// Primary key rendered as text, `None` while transient.
    fn key(&self) -> Option<String>;

    /// Normalises the record in place and checks every rule.
    fn validate(&mut self, settings: &ValidationSettings) -> ValidationResult<()>;
}

impl Record for Tax {
    const ENTITY: &'static str = "Tax";
    const CACHE_KEYS: &'static [&'static str] = &[TAX_LIST_CACHE_KEY];

    fn key(&self) -> Option<String> {
        if self.is_transient() {
            None
        } else {
            Some(self.code.trim().to_string())
        }
    }

    fn validate(&mut self, _settings: &ValidationSettings) -> ValidationResult<()> {
        validate_tax(self)
    }
}

impl Record for DeliveryNoteLine {
    const ENTITY: &'static str = "DeliveryNoteLine";
    const CACHE_KEYS: &'static [&'static str] = &[TOP_ARTICLES_CACHE_KEY];

    fn key(&self) -> Option<String> {
        self.id.map(|id| id.to_string())
    }

    fn validate(&mut self, settings: &ValidationSettings) -> ValidationResult<()> {
        validate_delivery_note_line(self, settings)
    }
}

impl Record for SequenceRecord {
    const ENTITY: &'static str = "SequenceRecord";
    const CACHE_KEYS: &'static [&'static str] = &[];

    fn key(&self) -> Option<String> {
        self.id.map(|id| id.to_string())
    }

    fn validate(&mut self, _settings: &ValidationSettings) -> ValidationResult<()> {
        validate_sequence(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!(Tax::default().key(), None);
        assert_eq!(
            Tax::new(" IVA4 ", "IVA 4%", 4.0, 0.5).key(),
            Some("IVA4".to_string())
        );

        let line = DeliveryNoteLine {
            id: Some(12),
            ..DeliveryNoteLine::default()
        };
        assert_eq!(line.key(), Some("12".to_string()));
        assert_eq!(SequenceRecord::default().key(), None);
    }

    #[test]
    fn test_validate_dispatches_per_record() {
        let settings = ValidationSettings::default();

        let mut tax = Tax::default();
        assert!(Record::validate(&mut tax, &settings).is_err());

        let mut line = DeliveryNoteLine::default();
        assert!(Record::validate(&mut line, &settings).is_ok());

        let mut seq = SequenceRecord::new("2024", "A");
        assert!(Record::validate(&mut seq, &settings).is_ok());
    }

    #[test]
    fn test_cache_keys() {
        assert_eq!(Tax::CACHE_KEYS, &[TAX_LIST_CACHE_KEY]);
        assert!(SequenceRecord::CACHE_KEYS.is_empty());
    }
}
