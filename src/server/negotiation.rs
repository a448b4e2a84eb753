//! Accept header parsing and response representation negotiation
//!
//! Chooses between the PDF-stream and JSON-metadata representations from
//! the request's declared acceptable media types, and derives the
//! suggested download filename for the PDF representation.

/// Fallback stem when the upload filename yields nothing usable
pub const DEFAULT_DOWNLOAD_NAME: &str = "document";

/// Represents a single entry in an Accept header with its quality value
#[derive(Debug, Clone, PartialEq)]
struct MediaPreference {
    media_type: String,
    quality: f32,
}

impl MediaPreference {
    /// Parse a single Accept entry (e.g., "application/json;q=0.8")
    fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        let mut parts = s.split(';');
        let media_type = parts.next()?.trim().to_lowercase();

        let mut quality = 1.0;
        for param in parts {
            let param = param.trim();
            if let Some(q_value) = param.strip_prefix("q=") {
                quality = q_value.parse::<f32>().unwrap_or(1.0);
            }
        }

        Some(MediaPreference {
            media_type,
            quality,
        })
    }

    /// Whether this entry matches the given concrete media type,
    /// including `type/*` and `*/*` wildcards
    fn matches(&self, target: &str) -> bool {
        if self.media_type == target || self.media_type == "*/*" || self.media_type == "*" {
            return true;
        }
        match (self.media_type.split_once('/'), target.split_once('/')) {
            (Some((own_type, "*")), Some((target_type, _))) => own_type == target_type,
            _ => false,
        }
    }
}

/// Highest quality the header assigns to a media type (0.0 = unacceptable)
fn quality_for(preferences: &[MediaPreference], target: &str) -> f32 {
    preferences
        .iter()
        .filter(|pref| pref.matches(target))
        .map(|pref| pref.quality)
        .fold(0.0, f32::max)
}

/// Decide whether the caller asked for the JSON summary representation.
///
/// JSON is selected only when the header makes `application/json`
/// acceptable with a strictly higher quality than `application/pdf`. An
/// absent header, a wildcard, a tie, or an explicit PDF preference all
/// select the PDF stream.
pub fn wants_json(accept: Option<&str>) -> bool {
    let Some(accept) = accept else {
        return false;
    };

    let preferences: Vec<MediaPreference> = accept
        .split(',')
        .filter_map(MediaPreference::parse)
        .collect();

    let json_quality = quality_for(&preferences, "application/json");
    let pdf_quality = quality_for(&preferences, "application/pdf");

    json_quality > 0.0 && json_quality > pdf_quality
}

/// Generate a safe, user-friendly name for the compressed file.
///
/// The original filename contributes only its sanitized stem; the result
/// is always `<stem>-compressed.pdf`.
pub fn derive_download_name(original: Option<&str>) -> String {
    let stem = original
        .map(sanitize_stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| DEFAULT_DOWNLOAD_NAME.to_string());
    format!("{}-compressed.pdf", stem)
}

fn sanitize_stem(name: &str) -> String {
    // Strip any path components the client sent along
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name);
    let stem = match base.rsplit_once('.') {
        Some((stem, _extension)) if !stem.is_empty() => stem,
        _ => base,
    };

    stem.chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}
