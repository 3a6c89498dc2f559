//! Mobile phone number normalization.
//!
//! Every phone-keyed record (OTP challenges, request logs, users) is stored under
//! the normalized `09XXXXXXXXX` form so that `+98 912 ...` and `0912...` share a key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalized Iranian mobile number (`09` followed by nine digits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Phone(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid phone number")]
pub struct InvalidPhone;

impl Phone {
    /// Normalize user input into a [`Phone`].
    ///
    /// Accepts `+98`, `0098` and bare `98` country prefixes, a missing leading zero,
    /// Persian/Arabic-Indic digits, and spaces, dashes or parentheses as separators.
    pub fn parse(raw: &str) -> Result<Self, InvalidPhone> {
        let mut digits = String::with_capacity(raw.len());
        for (i, c) in raw.trim().chars().enumerate() {
            match c {
                '0'..='9' => digits.push(c),
                '۰'..='۹' => digits.push(fold_digit(c, '۰')),
                '٠'..='٩' => digits.push(fold_digit(c, '٠')),
                ' ' | '-' | '(' | ')' => {}
                '+' if i == 0 => {}
                _ => return Err(InvalidPhone),
            }
        }

        let national = if let Some(rest) = digits.strip_prefix("0098") {
            format!("0{rest}")
        } else if digits.len() == 12 && digits.starts_with("98") {
            format!("0{}", &digits[2..])
        } else if digits.len() == 10 && digits.starts_with('9') {
            format!("0{digits}")
        } else {
            digits
        };

        if national.len() == 11 && national.starts_with("09") {
            Ok(Self(national))
        } else {
            Err(InvalidPhone)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

fn fold_digit(c: char, zero: char) -> char {
    let offset = c as u32 - zero as u32;
    char::from_digit(offset, 10).unwrap_or('0')
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Phone {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
