//! Two-factor recovery codes and their stored encoding.

use crate::error::{IdentityError, IdentityResult};

/// Separator used by the stored encoding. Codes containing it are
/// rejected at construction so the encoding stays reversible.
const SEPARATOR: &str = ";";

/// An ordered collection of one-time recovery codes.
///
/// The whole collection is persisted as a single delimited string under a
/// reserved internal token; [`RecoveryCodes::encode`] and
/// [`RecoveryCodes::decode`] are the only places that know the format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryCodes {
    codes: Vec<String>,
}

impl RecoveryCodes {
    /// Builds a collection from freshly generated codes.
    pub fn new(codes: impl IntoIterator<Item = String>) -> IdentityResult<Self> {
        let codes: Vec<String> = codes.into_iter().collect();
        for code in &codes {
            if code.is_empty() {
                return Err(IdentityError::InvalidArgument(
                    "recovery code must not be empty",
                ));
            }
            if code.contains(SEPARATOR) {
                return Err(IdentityError::InvalidArgument(
                    "recovery code must not contain the separator character",
                ));
            }
        }
        Ok(Self { codes })
    }

    /// Rebuilds the collection from its stored encoding. Empty segments
    /// are skipped, so an empty string decodes to zero codes.
    pub fn decode(encoded: &str) -> Self {
        Self {
            codes: encoded
                .split(SEPARATOR)
                .filter(|code| !code.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    pub fn encode(&self) -> String {
        self.codes.join(SEPARATOR)
    }

    /// Consumes `code` if present. Returns whether it was present; an
    /// unknown code leaves the collection unchanged.
    pub fn redeem(&mut self, code: &str) -> bool {
        match self.codes.iter().position(|c| c == code) {
            Some(index) => {
                self.codes.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.iter().any(|c| c == code)
    }

    pub fn count(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
