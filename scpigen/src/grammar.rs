//! Mnemonic normalization and syntax checking.
//!
//! The authoritative SCPI grammar (short/long form case rules, bracketed
//! optional nodes) varies between vendors, so the normalization rule is a
//! trait rather than a hard-coded pass. The default grammar is deliberately
//! permissive: uppercase, whitespace stripped, trailing '?' removed.

/// Pluggable canonical-mnemonic rule used by the aggregator and validator.
pub trait MnemonicGrammar: Send + Sync {
    /// Fold a raw mnemonic to its canonical key form. The trailing query
    /// marker ('?') is stripped; query support is tracked as a flag instead.
    fn normalize(&self, raw: &str) -> String;

    /// Check a canonical mnemonic, returning a message describing the first
    /// violation if any.
    fn check(&self, mnemonic: &str) -> Result<(), String>;
}

/// Default grammar: ASCII uppercase, interior whitespace stripped, characters
/// limited to SCPI node syntax (`A-Z 0-9 : * [ ] _`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ScpiGrammar;

impl MnemonicGrammar for ScpiGrammar {
    fn normalize(&self, raw: &str) -> String {
        let mut canonical: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();
        if canonical.ends_with('?') {
            canonical.pop();
        }
        canonical
    }

    fn check(&self, mnemonic: &str) -> Result<(), String> {
        if mnemonic.is_empty() {
            return Err("mnemonic is empty".to_string());
        }
        for c in mnemonic.chars() {
            let ok = c.is_ascii_uppercase()
                || c.is_ascii_digit()
                || matches!(c, ':' | '*' | '[' | ']' | '_');
            if !ok {
                return Err(format!("invalid character '{}' in mnemonic", c));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_uppercases_and_strips() {
        let g = ScpiGrammar;
        assert_eq!(g.normalize("sour:volt"), "SOUR:VOLT");
        assert_eq!(g.normalize(" MEAS:VOLT? "), "MEAS:VOLT");
        assert_eq!(g.normalize("*rst"), "*RST");
        assert_eq!(g.normalize("[:SENSe]:VOLTage"), "[:SENSE]:VOLTAGE");
    }

    #[test]
    fn check_accepts_scpi_syntax() {
        let g = ScpiGrammar;
        assert!(g.check("*RST").is_ok());
        assert!(g.check("SOUR:VOLT").is_ok());
        assert!(g.check("[:SENSE]:VOLT:DC").is_ok());
        assert!(g.check("VOLT1").is_ok());
    }

    #[test]
    fn check_rejects_bad_input() {
        let g = ScpiGrammar;
        assert!(g.check("").is_err());
        assert!(g.check("sour:volt").is_err());
        assert!(g.check("VOLT AGE").is_err());
        assert!(g.check("VOLT;").is_err());
    }
}
