//! Party Code Generation and Parsing
//!
//! Human-friendly codes that identify a party in the registry.

use std::fmt;

use rand::Rng;

/// Characters used in party codes (unambiguous, uppercase)
/// Excludes: 0/O, 1/I/L, 5/S, 2/Z to avoid confusion
const ALPHABET: &[u8] = b"346789ABCDEFGHJKMNPQRTUVWXY";

/// Party code length
pub const CODE_LENGTH: usize = 8;

/// A party code that can be shared to join a party
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartyCode(String);

impl PartyCode {
    /// Generate a random party code
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();

        let code = (0..CODE_LENGTH)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        PartyCode(code)
    }

    /// Get the party code as a string (no separator)
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a party code from user input
    ///
    /// Separators and whitespace are dropped and letters uppercased, so
    /// `abcd-efgh` and `ABCDEFGH` name the same party.
    pub fn parse(input: &str) -> Option<Self> {
        let normalized: String = input
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if normalized.len() != CODE_LENGTH {
            return None;
        }

        if normalized.bytes().all(|b| ALPHABET.contains(&b)) {
            Some(PartyCode(normalized))
        } else {
            None
        }
    }
}

impl fmt::Display for PartyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", &self.0[..4], &self.0[4..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_party_code_parse() {
        let code = PartyCode::parse("ABCD-EFGH").unwrap();
        assert_eq!(code.as_str(), "ABCDEFGH");

        let code = PartyCode::parse("abcd efgh").unwrap();
        assert_eq!(code.as_str(), "ABCDEFGH");

        assert!(PartyCode::parse("ABC").is_none());
        assert!(PartyCode::parse("ABCDEFGHJ").is_none());
        // O is not in the alphabet
        assert!(PartyCode::parse("ABCDEFGO").is_none());
    }

    #[test]
    fn test_party_code_display() {
        let code = PartyCode::parse("ABCDEFGH").unwrap();
        assert_eq!(format!("{}", code), "ABCD-EFGH");
    }

    #[test]
    fn test_random_code_shape() {
        for _ in 0..100 {
            let code = PartyCode::random();
            assert_eq!(code.as_str().len(), 8);
            assert!(code
                .as_str()
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
            assert_eq!(PartyCode::parse(code.as_str()), Some(code.clone()));
        }
    }
}
