use anyhow::{Result, anyhow};
use chrono::Utc;
use std::path::Path;

/// Version of the identity -> partition mapping in [`owner_partition`].
/// Stored with every record so a future rule change can be detected instead of silently drifting.
pub const PARTITION_SCHEME_VERSION: i32 = 1;

/// Longest accepted owner identity (the practical limit of an e-mail address),
/// which also keeps partition directory names under the usual 255 byte limit.
pub const MAX_OWNER_IDENTITY_LEN: usize = 254;

/// Longest sanitized filename kept inside a storage key.
const MAX_KEY_NAME_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Trims and checks a client supplied owner identity.
pub fn validate_owner_identity(raw: &str) -> Result<String> {
    let identity = raw.trim();

    if identity.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "MISSING_OWNER",
            message: "Owner identity is required".to_string(),
        }));
    }

    if identity.chars().count() > MAX_OWNER_IDENTITY_LEN {
        return Err(anyhow!(ValidationError {
            code: "OWNER_TOO_LONG",
            message: format!(
                "Owner identity exceeds {} characters",
                MAX_OWNER_IDENTITY_LEN
            ),
        }));
    }

    if identity.chars().any(|c| c.is_control()) {
        return Err(anyhow!(ValidationError {
            code: "INVALID_OWNER",
            message: "Owner identity contains control characters".to_string(),
        }));
    }

    Ok(identity.to_string())
}

/// Maps an owner identity to its filesystem-safe partition directory name.
///
/// `@` and `.` become `_` (so `jane.doe@clinic.org` maps to `jane_doe_clinic_org`), as does every
/// other character outside `[A-Za-z0-9_+-]`. Distinct identities can collide
/// (`a.b@x` and `a_b@x`); that is an accepted limitation of the scheme.
pub fn owner_partition(owner_identity: &str) -> String {
    owner_identity
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '+' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Last path component of a client supplied filename. Browsers on Windows may send full paths.
fn last_path_segment(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or("")
}

/// Name shown to users for an uploaded file: directory components dropped, otherwise as sent.
pub fn display_filename(filename: &str) -> String {
    match last_path_segment(filename).trim() {
        "" | "." | ".." => "unnamed".to_string(),
        name => name.to_string(),
    }
}

/// Sanitizes an uploaded filename for use inside a storage key.
/// Strips any directory components and replaces path separators and reserved characters.
pub fn sanitize_filename(filename: &str) -> String {
    let last_segment = last_path_segment(filename);
    let name = Path::new(last_segment)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from uploaded filename: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c.is_whitespace()
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
                || c == '%'
                || c == '#'
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.');

    let sanitized = if sanitized.len() > MAX_KEY_NAME_LEN {
        let mut end = MAX_KEY_NAME_LEN;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        &sanitized[..end]
    } else {
        sanitized
    };

    if sanitized.is_empty() {
        "report".to_string()
    } else {
        sanitized.to_string()
    }
}

/// Builds a storage key: `{unix millis}-{8 random hex}-{sanitized name}`.
///
/// The random component keeps keys distinct for uploads of the same name within one millisecond.
pub fn generate_storage_key(suggested_name: &str) -> String {
    let nonce: u32 = rand::random();
    format!(
        "{}-{}-{}",
        Utc::now().timestamp_millis(),
        hex::encode(nonce.to_be_bytes()),
        sanitize_filename(suggested_name)
    )
}

/// A storage key must be a single, visible path segment.
pub fn is_valid_storage_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && !key.contains(['/', '\\'])
        && !key.chars().any(|c| c.is_control())
}
