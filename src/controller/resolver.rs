//! # Secret Value Resolver
//!
//! Turns the `data`, `annotations` and `labels` source maps of a target into
//! concrete values, using one store snapshot. Pure: no I/O, safe to call
//! concurrently.
//!
//! Resolution of one source:
//! 1. `project` set: the project must exist in the snapshot and restricts the
//!    secret lookup to it
//! 2. Non-empty literal `value`: used verbatim
//! 3. Otherwise `secret` is required and looked up by key (first match wins)
//! 4. `key` set: the value must be a map. A top-level key equal to `key` wins,
//!    otherwise `key` is split on `.` and walked
//! 5. Non-string results are serialized as JSON in document key order, with
//!    `", "` and `": "` separators and non-ASCII escaped, so values written by
//!    earlier releases of the operator compare equal
//!
//! The first failing source aborts the whole map.

use crate::controller::error::ResolutionError;
use crate::crd::SecretSource;
use crate::provider::StoreSnapshot;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use k8s_openapi::ByteString;
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io;

/// Resolve a source map into strings (annotations and labels)
///
/// `base64encode` only applies to Secret data and is ignored here.
pub fn resolve_strings(
    sources: &BTreeMap<String, SecretSource>,
    snapshot: &StoreSnapshot,
) -> Result<BTreeMap<String, String>, ResolutionError> {
    sources
        .iter()
        .map(|(key, source)| Ok((key.clone(), resolve_source(source, snapshot)?)))
        .collect()
}

/// Resolve a source map into Secret data bytes
///
/// With `base64encode: true` the UTF-8 bytes of the value are stored (the API
/// layer encodes them). With `false` the value is already base64 and is
/// decoded here.
pub fn resolve_data(
    sources: &BTreeMap<String, SecretSource>,
    snapshot: &StoreSnapshot,
) -> Result<BTreeMap<String, ByteString>, ResolutionError> {
    sources
        .iter()
        .map(|(key, source)| {
            let value = resolve_source(source, snapshot)?;
            let bytes = if source.base64encode {
                value.into_bytes()
            } else {
                STANDARD
                    .decode(value.trim())
                    .map_err(|source| ResolutionError::InvalidBase64 {
                        key: key.clone(),
                        source,
                    })?
            };
            Ok((key.clone(), ByteString(bytes)))
        })
        .collect()
}

/// Resolve one source to its string value
pub fn resolve_source(
    source: &SecretSource,
    snapshot: &StoreSnapshot,
) -> Result<String, ResolutionError> {
    let project_id = match source.project.as_deref() {
        Some(name) => Some(
            snapshot
                .project_by_name(name)
                .ok_or_else(|| ResolutionError::ProjectNotFound(name.to_string()))?
                .id
                .as_str(),
        ),
        None => None,
    };

    if let Some(literal) = source.value.as_deref().filter(|v| !v.is_empty()) {
        return Ok(literal.to_string());
    }

    let secret_key = source
        .secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(ResolutionError::NoSource)?;

    let secret = snapshot
        .find_secret(secret_key, project_id)
        .ok_or_else(|| match &source.project {
            Some(project) => ResolutionError::SecretNotFoundInProject {
                secret: secret_key.to_string(),
                project: project.clone(),
            },
            None => ResolutionError::SecretNotFound(secret_key.to_string()),
        })?;

    let value = match source.key.as_deref() {
        Some(nested_key) => lookup_nested(&secret.value, secret_key, nested_key)?,
        None => &secret.value,
    };

    Ok(match value {
        Value::String(s) => s.clone(),
        other => render_json(other),
    })
}

/// Serialize a structured value the way the managed Secrets have always held it
fn render_json(value: &Value) -> String {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, SpacedAsciiFormatter);
    match value.serialize(&mut serializer) {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => value.to_string(),
    }
}

/// Single-line JSON with `", "` / `": "` separators and `\uXXXX` for non-ASCII
struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(c.encode_utf8(&mut [0u8; 4]).as_bytes())?;
            } else {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units).iter() {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Extract `nested_key` from a structured value
fn lookup_nested<'a>(
    value: &'a Value,
    secret_key: &str,
    nested_key: &str,
) -> Result<&'a Value, ResolutionError> {
    let not_a_dictionary = || ResolutionError::NotADictionary {
        secret: secret_key.to_string(),
        key: nested_key.to_string(),
    };

    let map = value.as_object().ok_or_else(not_a_dictionary)?;
    // Keys such as `tls.key` are looked up verbatim first
    if let Some(found) = map.get(nested_key) {
        return Ok(found);
    }

    let mut current = value;
    for segment in nested_key.split('.') {
        current = current
            .as_object()
            .ok_or_else(not_a_dictionary)?
            .get(segment)
            .ok_or_else(|| ResolutionError::MissingKey {
                secret: secret_key.to_string(),
                key: nested_key.to_string(),
            })?;
    }
    Ok(current)
}
