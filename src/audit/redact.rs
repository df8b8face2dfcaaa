//! Credential stripping for recorded request bodies.

use serde_json::Value;

/// Placeholder written in place of a stripped value.
pub const REDACTED: &str = "[REDACTED]";

/// Case-insensitive set of body keys that never reach the audit log.
#[derive(Debug, Clone)]
pub struct Redactor {
    keys: Vec<String>,
}

impl Redactor {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(|k| normalize(k.as_ref()))
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    fn is_sensitive(&self, key: &str) -> bool {
        let key = normalize(key);
        self.keys.iter().any(|k| *k == key)
    }

    /// Clone `body` with every sensitive key replaced, at any depth.
    pub fn sanitize(&self, body: &Value) -> Value {
        let mut copy = body.clone();
        self.scrub(&mut copy);
        copy
    }

    fn scrub(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, v) in map.iter_mut() {
                    if self.is_sensitive(key) {
                        *v = Value::String(REDACTED.to_string());
                    } else {
                        self.scrub(v);
                    }
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|v| self.scrub(v)),
            _ => {}
        }
    }
}

/// `new_password`, `newPassword` and `New-Password` compare equal.
fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
