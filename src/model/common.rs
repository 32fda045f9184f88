use uuid::Uuid;

pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Weak entity tag derived from an entity version
pub fn etag_for_version(version: u64) -> String {
    format!("W/\"{}\"", version)
}

/// Parse a weak or strong entity tag back into its version number
pub fn version_from_etag(etag: &str) -> Option<u64> {
    let trimmed = etag.trim();
    let unweakened = trimmed.strip_prefix("W/").unwrap_or(trimmed);
    unweakened.trim_matches('"').parse().ok()
}
