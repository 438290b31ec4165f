//! Blob key generation: `scans/<unix-millis>-<sanitized filename>`.

use rand::Rng;

pub const KEY_PREFIX: &str = "scans/";

const DEFAULT_FILENAME: &str = "leaf.jpg";
const MAX_FILENAME_CHARS: usize = 100;

/// Strip path components and anything outside `[A-Za-z0-9._-]`.
pub fn sanitize_filename(name: &str) -> String {
    // Only the final path component is kept
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");

    let sanitized: String = base
        .chars()
        .filter(|&c| c != '\0')
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    // Remove consecutive dots (path traversal prevention)
    let sanitized = sanitized.replace("..", "");
    let sanitized = sanitized.trim_start_matches('.').to_string();

    let sanitized: String = sanitized.chars().take(MAX_FILENAME_CHARS).collect();

    if sanitized.is_empty() {
        DEFAULT_FILENAME.into()
    } else {
        sanitized
    }
}

/// Primary key for an upload at `millis`.
pub fn scan_key(millis: i64, filename: &str) -> String {
    format!("{KEY_PREFIX}{millis}-{}", sanitize_filename(filename))
}

/// Disambiguated key used when the primary key is already taken
/// (two uploads of the same filename in the same millisecond).
pub fn scan_key_with_token(millis: i64, filename: &str) -> String {
    let token: u32 = rand::thread_rng().gen_range(0..0x0100_0000);
    format!(
        "{KEY_PREFIX}{millis}-{token:06x}-{}",
        sanitize_filename(filename)
    )
}

/// Accept keys with or without the `scans/` prefix, as clients receive
/// `imageKey` with the prefix while older links omit it.
pub fn normalize_image_key(raw: &str) -> String {
    let trimmed = raw.trim_start_matches('/');
    if trimmed.starts_with(KEY_PREFIX) {
        trimmed.to_string()
    } else {
        format!("{KEY_PREFIX}{trimmed}")
    }
}
