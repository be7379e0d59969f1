use std::fmt;
use std::str::FromStr;

use crate::common::Map;
use crate::common::error::DrmsError;

/// Key of the session name in a contact string.
pub const SESSION_KEY: &str = "session";

/// Parsed contact string: `name=value` pairs separated by `;`.
///
/// A contact without any `=` is a bare session name and is equivalent to `session=<contact>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactString {
    raw: String,
    items: Map<String, String>,
}

impl ContactString {
    pub fn parse(input: &str) -> crate::Result<ContactString> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(DrmsError::ConnectionError(
                "contact string is empty".to_string(),
            ));
        }

        let mut items = Map::new();
        if !raw.contains('=') {
            items.insert(SESSION_KEY.to_string(), raw.to_string());
        } else {
            for item in raw.split(';').map(str::trim).filter(|i| !i.is_empty()) {
                let (key, value) = item.split_once('=').ok_or_else(|| {
                    DrmsError::ConnectionError(format!(
                        "invalid contact item `{item}`, expected `name=value`"
                    ))
                })?;
                let key = key.trim();
                if key.is_empty() {
                    return Err(DrmsError::ConnectionError(format!(
                        "contact item `{item}` has an empty name"
                    )));
                }
                items.insert(key.to_string(), value.trim().to_string());
            }
        }
        Ok(ContactString {
            raw: raw.to_string(),
            items,
        })
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(|v| v.as_str())
    }

    pub fn session_name(&self) -> Option<&str> {
        self.get(SESSION_KEY)
    }
}

impl FromStr for ContactString {
    type Err = DrmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContactString::parse(s)
    }
}

impl fmt::Display for ContactString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
