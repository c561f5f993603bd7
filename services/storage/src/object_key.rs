//! Object key construction.
//!
//! Keys have the shape `{prefix}/{uuid}-{name}` where `name` is the caller's
//! filename reduced to URL- and key-safe characters. Uniqueness comes from the
//! random UUID, never from the filename.

use std::fmt;
use uuid::Uuid;

/// Name used when nothing of the caller's filename survives sanitization
pub const FALLBACK_FILENAME: &str = "file";

/// Longest sanitized filename kept in a key, in bytes
pub const MAX_FILENAME_BYTES: usize = 255;

/// Extensions longer than this are not preserved when a name is shortened
const MAX_EXTENSION_BYTES: usize = 16;

/// Length of a hyphenated UUID
const UUID_LEN: usize = 36;

/// Namespace an object is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPrefix {
    /// Placeholder images produced by the generate endpoint
    GeneratedImages,
    /// Files uploaded directly by callers
    Uploads,
}

impl KeyPrefix {
    pub const ALL: [KeyPrefix; 2] = [KeyPrefix::GeneratedImages, KeyPrefix::Uploads];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyPrefix::GeneratedImages => "generated-images",
            KeyPrefix::Uploads => "uploads",
        }
    }

    /// Find the prefix of a key this service could have issued.
    ///
    /// The part after `{prefix}/` must be `{uuid}-{name}` with `name` already in
    /// sanitized form, so keys that navigate out of the prefix are rejected.
    pub fn of_key(key: &str) -> Option<KeyPrefix> {
        Self::ALL.into_iter().find(|prefix| {
            key.strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .is_some_and(is_issued_name)
        })
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unique, path-safe object key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKey {
    key: String,
    filename: String,
}

impl ObjectKey {
    /// Build a key with a freshly generated identifier
    pub fn new(prefix: KeyPrefix, filename: &str) -> Self {
        Self::with_id(prefix, filename, Uuid::new_v4())
    }

    /// Build a key from an explicit identifier
    pub fn with_id(prefix: KeyPrefix, filename: &str, id: Uuid) -> Self {
        let filename = sanitize_filename(filename);
        let key = format!("{}/{}-{}", prefix.as_str(), id, filename);
        Self { key, filename }
    }

    /// Full key as sent to the object store
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// The sanitized filename component
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// `Content-Disposition` value that renders the object inline under its sanitized name
    pub fn content_disposition(&self) -> String {
        format!("inline; filename=\"{}\"", self.filename)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Whether `rest` is a `{uuid}-{name}` pair as produced by [`ObjectKey`]
fn is_issued_name(rest: &str) -> bool {
    let (Some(id), Some(tail)) = (rest.get(..UUID_LEN), rest.get(UUID_LEN..)) else {
        return false;
    };
    if Uuid::parse_str(id).is_err() {
        return false;
    }

    match tail.strip_prefix('-') {
        Some(name) => !name.is_empty() && sanitize_filename(name) == name,
        None => false,
    }
}

/// Reduce a caller-supplied filename to `[A-Za-z0-9._-]`.
///
/// Directory components that only navigate (`.`, `..`, empty) are dropped and the
/// remaining components are joined with `_`, so no separator survives. Names longer
/// than [`MAX_FILENAME_BYTES`] are shortened, keeping a short extension.
pub fn sanitize_filename(filename: &str) -> String {
    let joined = filename
        .split(['/', '\\'])
        .filter(|component| !matches!(*component, "" | "." | ".."))
        .collect::<Vec<_>>()
        .join("_");

    let sanitized: String = joined
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect();

    if sanitized.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        truncate_filename(sanitized)
    }
}

// Input is ASCII after sanitization, so byte offsets are char boundaries
fn truncate_filename(name: String) -> String {
    if name.len() <= MAX_FILENAME_BYTES {
        return name;
    }

    let extension = name
        .rfind('.')
        .filter(|&dot| dot > 0 && name.len() - dot <= MAX_EXTENSION_BYTES)
        .map(|dot| &name[dot..])
        .unwrap_or("");

    let stem_len = MAX_FILENAME_BYTES - extension.len();
    format!("{}{}", &name[..stem_len], extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_safe(name: &str) -> bool {
        name.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    }

    #[test]
    fn test_sanitize_keeps_safe_names() {
        assert_eq!(sanitize_filename("photo-01_final.png"), "photo-01_final.png");
    }

    #[test]
    fn test_sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_filename("hello world.png"), "hello_world.png");
        assert_eq!(sanitize_filename("résumé.pdf"), "r_sum_.pdf");
        assert_eq!(sanitize_filename("a\"b;c.txt"), "a_b_c.txt");
    }

    #[test]
    fn test_sanitize_strips_traversal() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("..\\..\\windows\\win.ini"), "windows_win.ini");
        assert_eq!(sanitize_filename("/absolute/path.txt"), "absolute_path.txt");
        assert_eq!(sanitize_filename("./dir/./file"), "dir_file");
    }

    #[test]
    fn test_sanitize_output_has_only_safe_characters() {
        let inputs = [
            "../../etc/passwd",
            "C:\\Users\\me\\My Docs\\report (1).docx",
            "name\0with\nnulls",
            "emoji-🎨.png",
            "a/b\\c/../d",
            "?*<>|",
        ];

        for input in inputs {
            let sanitized = sanitize_filename(input);
            assert!(is_safe(&sanitized), "{input:?} -> {sanitized:?}");
            assert!(!sanitized.contains('/') && !sanitized.contains('\\'));
            assert!(!sanitized.is_empty());
        }
    }

    #[test]
    fn test_sanitize_falls_back_when_empty() {
        assert_eq!(sanitize_filename(""), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("/"), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("../.."), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("./"), FALLBACK_FILENAME);
    }

    #[test]
    fn test_fully_disallowed_characters_are_replaced_not_dropped() {
        // Every character maps to '_', so the name is non-empty
        assert_eq!(sanitize_filename("???"), "___");
    }

    #[test]
    fn test_key_format() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let key = ObjectKey::with_id(KeyPrefix::Uploads, "../../etc/passwd", id);

        assert_eq!(
            key.as_str(),
            "uploads/550e8400-e29b-41d4-a716-446655440000-etc_passwd"
        );
        assert_eq!(key.filename(), "etc_passwd");
        assert_eq!(key.content_disposition(), "inline; filename=\"etc_passwd\"");
    }

    #[test]
    fn test_keys_for_same_filename_differ() {
        let first = ObjectKey::new(KeyPrefix::GeneratedImages, "image.png");
        let second = ObjectKey::new(KeyPrefix::GeneratedImages, "image.png");

        assert_ne!(first, second);
        assert_eq!(first.filename(), second.filename());
        assert!(first.as_str().starts_with("generated-images/"));
    }

    #[test]
    fn test_long_filenames_are_capped_keeping_extension() {
        let sanitized = sanitize_filename(&format!("{}.png", "a".repeat(2000)));
        assert_eq!(sanitized.len(), MAX_FILENAME_BYTES);
        assert!(sanitized.ends_with("a.png"));

        let no_extension = sanitize_filename(&"b".repeat(2000));
        assert_eq!(no_extension, "b".repeat(MAX_FILENAME_BYTES));

        let key = ObjectKey::new(KeyPrefix::Uploads, &"a".repeat(2000));
        assert!(key.as_str().len() <= 1024);
        assert_eq!(KeyPrefix::of_key(key.as_str()), Some(KeyPrefix::Uploads));
    }

    #[test]
    fn test_prefix_of_key() {
        let id = "550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(
            KeyPrefix::of_key(&format!("uploads/{id}-file.txt")),
            Some(KeyPrefix::Uploads)
        );
        assert_eq!(
            KeyPrefix::of_key(&format!("generated-images/{id}-gen.png")),
            Some(KeyPrefix::GeneratedImages)
        );

        let issued = ObjectKey::new(KeyPrefix::GeneratedImages, "../x y.png");
        assert_eq!(
            KeyPrefix::of_key(issued.as_str()),
            Some(KeyPrefix::GeneratedImages)
        );

        assert_eq!(KeyPrefix::of_key("uploads/"), None);
        assert_eq!(KeyPrefix::of_key("uploadsx/abc"), None);
        assert_eq!(KeyPrefix::of_key("private/secret"), None);
        assert_eq!(KeyPrefix::of_key("uploads/abc-file.txt"), None);
    }

    #[test]
    fn test_prefix_of_key_rejects_navigation() {
        let id = "550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(KeyPrefix::of_key("uploads/../private/x"), None);
        assert_eq!(KeyPrefix::of_key(&format!("uploads/{id}-../../x")), None);
        assert_eq!(KeyPrefix::of_key(&format!("uploads/{id}-a/b")), None);
        assert_eq!(KeyPrefix::of_key(&format!("uploads/{id}-")), None);
        assert_eq!(KeyPrefix::of_key(&format!("uploads/{id}file")), None);
    }
}
