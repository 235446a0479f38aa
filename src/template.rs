//! Filename Template Engine for Image Stash
//!
//! This module provides functionality for:
//! 1. Expanding user-supplied filename templates (`{name}`, `{index}`, `{group}`,
//!    date/time tokens) against a per-item context
//! 2. Sanitizing expanded names for filesystem safety
//! 3. Extracting a (stem, extension) pair from a source URL, including data URIs

use chrono::{DateTime, Datelike, Local, Timelike};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Pattern for template tokens: a braced run of letters.
static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([A-Za-z]+)\}").unwrap());

/// Stems that carry no information about the image they name.
const GENERIC_STEMS: &[&str] = &[
    "image", "images", "img", "photo", "photos", "picture", "pictures", "pic", "pics", "thumb",
    "thumbnail", "media", "file", "download", "untitled", "full", "large", "original", "default",
];

const FALLBACK_STEM: &str = "image";
const FALLBACK_EXTENSION: &str = ".jpg";
const FALLBACK_GROUP: &str = "Ungrouped";

/// Per-item context for template expansion. Absent fields fall back to
/// documented defaults, so a context built from partial data never fails.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateContext {
    pub name: Option<String>,
    pub extension: Option<String>,
    /// 1-based position of the item within its numbering scope.
    pub index: Option<usize>,
    pub group: Option<String>,
}

/// Expand `template` against `ctx` and the given wall-clock instant, sanitize
/// the result, and append the extension.
///
/// Word tokens (`{name}`, `{original}`, `{index}`, `{group}`, `{date}`,
/// `{time}`, `{iso}`) are case-insensitive; date/time tokens are
/// case-sensitive (`{MM}` is the month, `{mm}` the minute). Unknown tokens
/// pass through literally. The extension is appended after sanitization and
/// is not itself sanitized.
///
/// Pure and total: deterministic for a fixed `now`, never fails.
pub fn apply_template(template: &str, ctx: &TemplateContext, now: DateTime<Local>) -> String {
    let expanded = TOKEN_PATTERN.replace_all(template, |caps: &Captures<'_>| {
        expand_token(&caps[1], ctx, now).unwrap_or_else(|| caps[0].to_string())
    });

    let extension = normalize_extension(ctx.extension.as_deref().unwrap_or(FALLBACK_EXTENSION));
    format!("{}{}", sanitize_component(&expanded), extension)
}

fn expand_token(token: &str, ctx: &TemplateContext, now: DateTime<Local>) -> Option<String> {
    // Date/time tokens are matched case-sensitively first so that `{MM}`
    // (month) and `{mm}` (minute) stay distinct.
    let expanded = match token {
        "YYYY" => now.format("%Y").to_string(),
        "YY" => now.format("%y").to_string(),
        "MM" => now.format("%m").to_string(),
        "M" => now.month().to_string(),
        "MMMM" => now.format("%B").to_string(),
        "MMM" => now.format("%b").to_string(),
        "DD" => now.format("%d").to_string(),
        "D" => now.day().to_string(),
        "dddd" => now.format("%A").to_string(),
        "ddd" => now.format("%a").to_string(),
        "hh" => now.format("%H").to_string(),
        "h" => now.hour().to_string(),
        "mm" => now.format("%M").to_string(),
        "m" => now.minute().to_string(),
        "ss" => now.format("%S").to_string(),
        "s" => now.second().to_string(),
        _ => match token.to_ascii_lowercase().as_str() {
            "name" | "original" => ctx.name.clone().unwrap_or_else(|| FALLBACK_STEM.to_string()),
            "index" => ctx.index.unwrap_or(1).to_string(),
            "group" => ctx.group.clone().unwrap_or_else(|| FALLBACK_GROUP.to_string()),
            "date" => now.format("%Y-%m-%d").to_string(),
            "time" => now.format("%H-%M-%S").to_string(),
            "iso" => now.format("%Y%m%dT%H%M%S").to_string(),
            _ => return None,
        },
    };
    Some(expanded)
}

/// Replace every character that is invalid in a filename component with `_`.
pub fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn normalize_extension(extension: &str) -> String {
    if extension.is_empty() {
        FALLBACK_EXTENSION.to_string()
    } else if extension.starts_with('.') {
        extension.to_string()
    } else {
        format!(".{extension}")
    }
}

/// Extract a (stem, extension) pair from a source URL.
///
/// Query string and fragment are stripped, the last path segment is split at
/// its final dot, and `data:image/<fmt>` URIs derive the extension from the
/// format (normalizing `jpeg` to `jpg`). When the segment is empty or one of
/// the known generic terms, the nearest meaningful earlier path segment is
/// preferred, then a hostname-derived stem, then `"image"`. The fallback
/// extension is `.jpg`. Never fails.
pub fn stem_and_extension(url: &str) -> (String, String) {
    if let Some(rest) = url.strip_prefix("data:image/") {
        let format: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '+' || *c == '-')
            .collect();
        return (FALLBACK_STEM.to_string(), data_uri_extension(&format));
    }

    let trimmed = url.split(['#', '?']).next().unwrap_or(url);
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let (host, path) = without_scheme
        .split_once('/')
        .unwrap_or((without_scheme, ""));

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let last = segments.last().copied().unwrap_or("");
    let (raw_stem, extension) = split_stem(last);

    let stem = if is_generic_stem(&raw_stem) {
        segments
            .iter()
            .rev()
            .skip(1)
            .find(|s| is_meaningful_segment(s))
            .map(|s| (*s).to_string())
            .or_else(|| host_stem(host))
            .unwrap_or_else(|| FALLBACK_STEM.to_string())
    } else {
        raw_stem
    };

    (stem, extension)
}

fn data_uri_extension(format: &str) -> String {
    match format {
        "" => FALLBACK_EXTENSION.to_string(),
        "jpeg" => ".jpg".to_string(),
        "svg+xml" => ".svg".to_string(),
        other => format!(".{}", other.to_ascii_lowercase()),
    }
}

fn split_stem(segment: &str) -> (String, String) {
    if let Some((stem, ext)) = segment.rsplit_once('.') {
        let ext = ext.to_ascii_lowercase();
        if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            let ext = if ext == "jpeg" { "jpg".to_string() } else { ext };
            return (stem.to_string(), format!(".{ext}"));
        }
    }
    (segment.to_string(), FALLBACK_EXTENSION.to_string())
}

fn is_generic_stem(stem: &str) -> bool {
    stem.is_empty() || GENERIC_STEMS.contains(&stem.to_ascii_lowercase().as_str())
}

fn is_meaningful_segment(segment: &str) -> bool {
    !is_generic_stem(segment) && segment.chars().any(|c| c.is_ascii_alphabetic())
}

fn host_stem(host: &str) -> Option<String> {
    let host = host.strip_prefix("www.").unwrap_or(host);
    let label = host.split('.').next().unwrap_or("");
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap()
    }

    fn ctx(name: &str, ext: &str) -> TemplateContext {
        TemplateContext {
            name: Some(name.to_string()),
            extension: Some(ext.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_name_token() {
        assert_eq!(
            apply_template("{name}", &ctx("photo", ".jpg"), fixed_now()),
            "photo.jpg"
        );
    }

    #[test]
    fn test_group_name_index() {
        let context = TemplateContext {
            name: Some("photo".to_string()),
            extension: Some(".jpg".to_string()),
            index: Some(3),
            group: Some("Travel".to_string()),
        };
        assert_eq!(
            apply_template("{group}_{name}_{index}", &context, fixed_now()),
            "Travel_photo_3.jpg"
        );
    }

    #[test]
    fn test_defaults_for_empty_context() {
        assert_eq!(
            apply_template("{group}_{name}_{index}", &TemplateContext::default(), fixed_now()),
            "Ungrouped_image_1.jpg"
        );
    }

    #[test]
    fn test_date_tokens_case_sensitive() {
        let now = fixed_now();
        assert_eq!(apply_template("{YYYY}-{MM}-{DD}", &ctx("x", ".png"), now), "2024-03-07.png");
        // {MM} is the month, {mm} the minute; {M} and {m} are unpadded.
        assert_eq!(apply_template("{MM}_{mm}_{M}_{m}", &ctx("x", ".png"), now), "03_05_3_5.png");
        assert_eq!(apply_template("{hh}-{ss}", &ctx("x", ".png"), now), "09-02.png");
        assert_eq!(apply_template("{iso}", &ctx("x", ".png"), now), "20240307T090502.png");
        assert_eq!(apply_template("{date}", &ctx("x", ".png"), now), "2024-03-07.png");
        assert_eq!(apply_template("{time}", &ctx("x", ".png"), now), "09-05-02.png");
    }

    #[test]
    fn test_word_tokens_case_insensitive() {
        assert_eq!(
            apply_template("{NAME}_{Original}", &ctx("cat", ".png"), fixed_now()),
            "cat_cat.png"
        );
    }

    #[test]
    fn test_unknown_token_passes_through() {
        assert_eq!(
            apply_template("{bogus}_{name}", &ctx("a", ".gif"), fixed_now()),
            "{bogus}_a.gif"
        );
    }

    #[test]
    fn test_output_never_contains_forbidden_characters() {
        let context = ctx("a<b>c:d\"e/f\\g|h?i*j", ".png");
        let out = apply_template("{name}", &context, fixed_now());
        assert_eq!(out, "a_b_c_d_e_f_g_h_i_j.png");
        for c in ['<', '>', ':', '"', '/', '\\', '|', '?', '*'] {
            assert!(!out.contains(c), "forbidden character {c:?} in {out:?}");
        }
    }

    #[test]
    fn test_extension_normalized() {
        assert_eq!(apply_template("{name}", &ctx("a", "png"), fixed_now()), "a.png");
        let no_ext = TemplateContext {
            name: Some("a".to_string()),
            ..Default::default()
        };
        assert_eq!(apply_template("{name}", &no_ext, fixed_now()), "a.jpg");
    }

    #[test]
    fn test_stem_and_extension_plain_url() {
        assert_eq!(
            stem_and_extension("https://example.com/gallery/sunset.png?w=800#top"),
            ("sunset".to_string(), ".png".to_string())
        );
    }

    #[test]
    fn test_stem_and_extension_jpeg_normalized() {
        assert_eq!(
            stem_and_extension("https://example.com/a.JPEG"),
            ("a".to_string(), ".jpg".to_string())
        );
    }

    #[test]
    fn test_stem_and_extension_data_uri() {
        assert_eq!(
            stem_and_extension("data:image/jpeg;base64,AAAA"),
            ("image".to_string(), ".jpg".to_string())
        );
        assert_eq!(
            stem_and_extension("data:image/svg+xml;utf8,<svg/>"),
            ("image".to_string(), ".svg".to_string())
        );
    }

    #[test]
    fn test_generic_stem_prefers_path_segment() {
        assert_eq!(
            stem_and_extension("https://cdn.example.com/albums/norway-2024/image.jpg"),
            ("norway-2024".to_string(), ".jpg".to_string())
        );
    }

    #[test]
    fn test_generic_stem_falls_back_to_hostname() {
        assert_eq!(
            stem_and_extension("https://www.example.com/photo.jpg"),
            ("example".to_string(), ".jpg".to_string())
        );
    }

    #[test]
    fn test_malformed_url_falls_back() {
        assert_eq!(
            stem_and_extension(""),
            ("image".to_string(), ".jpg".to_string())
        );
        assert_eq!(
            stem_and_extension("not a url at all"),
            ("not a url at all".to_string(), ".jpg".to_string())
        );
    }

    #[test]
    fn test_missing_extension_defaults() {
        assert_eq!(
            stem_and_extension("https://example.com/items/banner"),
            ("banner".to_string(), ".jpg".to_string())
        );
    }
}
