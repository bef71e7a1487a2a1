//! Request identity and fingerprinting.

use serde_json::Value;
use std::fmt;

/// One `(model, method, args)` invocation.
///
/// Immutable after construction. Two requests with JSON-equivalent
/// arguments share a [`Fingerprint`] and therefore share a cache slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    model: String,
    method: String,
    args: Vec<Value>,
}

impl Request {
    /// Create a new request.
    pub fn new(model: impl Into<String>, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            model: model.into(),
            method: method.into(),
            args,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// First positional argument, used as the batching key.
    ///
    /// Batched endpoints accumulate this argument across requests and send
    /// them as one list; any remaining arguments are expected to be shared
    /// by every request in the batch.
    pub fn batch_key(&self) -> Option<&Value> {
        self.args.first()
    }

    /// Canonical identity of the `(model, method, args)` triple.
    ///
    /// Stable under JSON-equivalent arguments: arrays serialize
    /// positionally and object keys are sorted, so logically identical
    /// requests map to the same slot no matter how the caller built them.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut out = String::with_capacity(32);
        out.push_str(&self.model);
        out.push('/');
        out.push_str(&self.method);
        out.push('(');
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write_canonical(arg, &mut out);
        }
        out.push(')');
        Fingerprint(out)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.model, self.method)
    }
}

/// Canonical string identity of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize a JSON value with object keys sorted recursively.
///
/// `serde_json` already sorts map keys with default features, but the
/// fingerprint must not silently change if `preserve_order` ever ends up
/// enabled through feature unification, so ordering is enforced here.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Key is serialized through serde_json to get JSON string escaping.
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
