use crate::error::{ApiError, ApiResult};
use crate::model::{EntityModel, KeyValue, PathSegment, ResourcePath};

const METADATA_SEGMENT: &str = "$metadata";
const BATCH_SEGMENT: &str = "$batch";

/// Parse a request path, relative to the route prefix, into typed segments.
///
/// Query strings are ignored. The first segment must name something the
/// model exposes; later segments that are neither properties nor bound
/// operations are kept as opaque navigation segments.
pub fn parse_path(model: &EntityModel, raw: &str) -> ApiResult<ResourcePath> {
    let path = raw.split('?').next().unwrap_or_default().trim_matches('/');
    if path.is_empty() {
        return Ok(ResourcePath::root());
    }

    // Decoded per segment so an escaped `/` stays inside its key
    let decoded = path
        .split('/')
        .map(percent_decode)
        .collect::<ApiResult<Vec<_>>>()?;
    let mut parts = decoded.iter().map(String::as_str);
    let mut segments = Vec::new();
    let mut current_type: Option<String> = None;

    if let Some(first) = parts.next() {
        match first {
            METADATA_SEGMENT => segments.push(PathSegment::Metadata),
            BATCH_SEGMENT => segments.push(PathSegment::Batch),
            _ => {
                let (name, key) = split_key(first)?;
                if let Some(set) = model.entity_set(name) {
                    segments.push(PathSegment::EntitySet(set.name.clone()));
                    current_type = Some(set.entity_type.clone());
                    if let Some(key) = key {
                        segments.push(PathSegment::Key(parse_key(key)?));
                    }
                } else if let Some(singleton) = model.singleton(name) {
                    reject_key(name, key)?;
                    segments.push(PathSegment::Singleton(singleton.name.clone()));
                    current_type = Some(singleton.entity_type.clone());
                } else {
                    let candidates = model.operation_candidates(name, None);
                    if candidates.is_empty() {
                        return Err(ApiError::not_found(format!(
                            "Resource '{}' does not exist",
                            name
                        )));
                    }
                    segments.push(PathSegment::OperationImport {
                        name: name.to_string(),
                        candidates,
                    });
                }
            }
        }
    }

    let mut opaque = false;
    for part in parts {
        if part.is_empty() {
            continue;
        }
        if opaque || matches!(segments.first(), Some(PathSegment::Metadata | PathSegment::Batch)) {
            segments.push(PathSegment::Navigation(part.to_string()));
            continue;
        }

        let (name, _) = split_key(part)?;
        let entity_type = current_type.as_deref().and_then(|t| model.entity_type(t));

        if entity_type.map_or(false, |t| t.properties.iter().any(|p| p == name)) {
            segments.push(PathSegment::Property(name.to_string()));
            opaque = true;
            continue;
        }

        let candidates = model.operation_candidates(name, current_type.as_deref());
        if !candidates.is_empty() {
            segments.push(PathSegment::Operation {
                name: name.to_string(),
                candidates,
            });
        } else {
            segments.push(PathSegment::Navigation(part.to_string()));
        }
        opaque = true;
    }

    Ok(ResourcePath::new(segments))
}

/// Split `Name(key)` into its name and the raw key text
fn split_key(segment: &str) -> ApiResult<(&str, Option<&str>)> {
    match segment.find('(') {
        None => Ok((segment, None)),
        Some(open) => {
            let inner = segment[open + 1..].strip_suffix(')').ok_or_else(|| {
                ApiError::malformed(format!("Unbalanced parentheses in segment '{}'", segment))
            })?;
            let key = if inner.is_empty() { None } else { Some(inner) };
            Ok((&segment[..open], key))
        }
    }
}

fn reject_key(name: &str, key: Option<&str>) -> ApiResult<()> {
    match key {
        Some(key) => Err(ApiError::malformed(format!(
            "'{}' cannot be addressed with key ({})",
            name, key
        ))),
        None => Ok(()),
    }
}

/// Integer keys or single-quoted strings, optionally written as `Name=value`
fn parse_key(raw: &str) -> ApiResult<KeyValue> {
    let value = match raw.split_once('=') {
        Some((_, value)) if !raw.starts_with('\'') => value,
        _ => raw,
    }
    .trim();

    if let Some(quoted) = value
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return Ok(KeyValue::String(quoted.replace("''", "'")));
    }

    value
        .parse::<i64>()
        .map(KeyValue::Int)
        .map_err(|_| ApiError::malformed(format!("Invalid key value '{}'", raw)))
}

fn percent_decode(input: &str) -> ApiResult<String> {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let byte = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = byte {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(decoded).map_err(|_| {
        ApiError::malformed(format!("Segment '{}' does not decode to valid UTF-8", input))
    })
}
