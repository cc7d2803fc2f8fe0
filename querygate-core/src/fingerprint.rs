//! Tenant-scoped cache fingerprints.
//!
//! A `Fingerprint` can only be built from a [`TenantId`], an operation name
//! and a parameter set, so every cache key carries its tenant.
//!
//! # Format
//!
//! ```text
//! {tenant}:{operation}:{canonical params}
//! ```
//!
//! `%` and `:` inside the tenant and the operation are percent-escaped, so the
//! first two separators are always structural. That makes
//! [`Fingerprint::tenant_prefix`] an exact prefix of every key for that tenant
//! and of no key for any other tenant. Parameters are rendered as canonical
//! JSON (object keys sorted at every depth), so field order never changes the
//! fingerprint.

use crate::TenantId;
use serde_json::Value;
use std::fmt;

/// Separator between the fingerprint components.
const SEPARATOR: char = ':';

/// A deterministic, tenant-prefixed cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    /// Private - only `new()` can produce one.
    key: String,
    tenant_prefix_len: usize,
}

impl Fingerprint {
    /// Build the fingerprint for `(tenant, operation, params)`.
    pub fn new(tenant: &TenantId, operation: &str, params: &Value) -> Self {
        let prefix = Self::tenant_prefix(tenant);
        let tenant_prefix_len = prefix.len();

        let mut key = prefix;
        escape_component(operation, &mut key);
        key.push(SEPARATOR);
        write_canonical_json(params, &mut key);

        Self {
            key,
            tenant_prefix_len,
        }
    }

    /// Prefix shared by every fingerprint of `tenant`, separator included.
    pub fn tenant_prefix(tenant: &TenantId) -> String {
        let mut prefix = String::with_capacity(tenant.as_str().len() + 1);
        escape_component(tenant.as_str(), &mut prefix);
        prefix.push(SEPARATOR);
        prefix
    }

    /// True when this fingerprint was generated for `tenant`.
    pub fn belongs_to(&self, tenant: &TenantId) -> bool {
        &self.key[..self.tenant_prefix_len] == Self::tenant_prefix(tenant).as_str()
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn into_string(self) -> String {
        self.key
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

fn escape_component(raw: &str, out: &mut String) {
    for ch in raw.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
}

/// Render `value` as canonical JSON: object keys sorted at every depth,
/// array order preserved, no insignificant whitespace.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical_json(value, &mut out);
    out
}

fn write_canonical_json(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Serializing a str cannot fail.
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical_json(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_json(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
