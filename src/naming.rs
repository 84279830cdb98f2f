use chrono::{DateTime, FixedOffset};

use crate::feed::Episode;

/// Date code used when an episode has no parseable publish date
const EPOCH_DATE_CODE: &str = "700101";

/// Folder name used when a channel title sanitizes to nothing
const FALLBACK_FOLDER: &str = "feed";

/// Characters that survive sanitization: spaces, ASCII alphanumerics and
/// Hangul syllables. Everything else is stripped.
fn is_kept_char(c: char) -> bool {
    c == ' ' || c.is_ascii_alphanumeric() || ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

/// Sanitize a title for use as a path component.
///
/// Trims surrounding whitespace, drops every character outside the kept
/// set, then collapses each remaining run of spaces into a single `_`.
pub fn sanitize_component(raw: &str) -> String {
    let stripped: String = raw.trim().chars().filter(|&c| is_kept_char(c)).collect();

    let mut out = String::with_capacity(stripped.len());
    let mut in_run = false;
    for c in stripped.chars() {
        if c == ' ' {
            if !in_run {
                out.push('_');
                in_run = true;
            }
        } else {
            out.push(c);
            in_run = false;
        }
    }

    out
}

/// Six-digit year-month-day code of a publish date
pub fn date_code(pub_date: Option<DateTime<FixedOffset>>) -> String {
    match pub_date {
        Some(dt) => dt.format("%y%m%d").to_string(),
        None => EPOCH_DATE_CODE.to_string(),
    }
}

/// The canonical media reference of an episode.
///
/// Feeds in the wild put the actual media URL in the guid at least as often
/// as in the enclosure; the guid wins whenever it is itself an http(s) URL.
pub fn media_source(episode: &Episode) -> Option<&str> {
    match episode.guid.as_deref() {
        Some(guid) if guid.starts_with("http://") || guid.starts_with("https://") => Some(guid),
        _ => episode.enclosure.as_ref().map(|e| e.url.as_str()),
    }
}

/// File suffix of a media reference, from the last period (inclusive)
pub fn extension_of(source: &str) -> Option<&str> {
    source.rfind('.').map(|pos| &source[pos..])
}

/// Derive the destination filename for an episode.
///
/// Format: `{date}-{sanitized_title}{extension}`. Returns the filename and
/// the extension it ends with, or `None` when the episode carries no media
/// reference or the reference has no suffix. Pure function of the episode.
pub fn episode_filename(episode: &Episode) -> Option<(String, String)> {
    let source = media_source(episode)?;
    let ext = extension_of(source)?.to_string();

    let filename = format!(
        "{}-{}{}",
        date_code(episode.pub_date),
        sanitize_component(&episode.title),
        ext
    );

    Some((filename, ext))
}

/// Derive the destination folder name from a channel title
pub fn folder_name(channel_title: &str) -> String {
    let sanitized = sanitize_component(channel_title);
    if sanitized.is_empty() {
        FALLBACK_FOLDER.to_string()
    } else {
        sanitized
    }
}

/// Normalize a user-supplied extension to its `.ext` form, lowercased
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.');
    format!(".{}", trimmed.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Enclosure;

    fn make_episode(title: &str, date: Option<&str>, guid: Option<&str>) -> Episode {
        Episode {
            title: title.to_string(),
            pub_date: date.and_then(|d| DateTime::parse_from_rfc2822(d).ok()),
            guid: guid.map(String::from),
            enclosure: None,
        }
    }

    // === Sanitization ===

    #[test]
    fn sanitize_preserves_alphanumerics() {
        assert_eq!(sanitize_component("Episode42"), "Episode42");
    }

    #[test]
    fn sanitize_preserves_hangul() {
        assert_eq!(sanitize_component("일밤 스피킹 7회"), "일밤_스피킹_7회");
    }

    #[test]
    fn sanitize_strips_punctuation() {
        assert_eq!(sanitize_component("What's up?!"), "Whats_up");
    }

    #[test]
    fn sanitize_collapses_whitespace_runs_to_underscore() {
        assert_eq!(sanitize_component("a   b  c"), "a_b_c");
    }

    #[test]
    fn sanitize_trims_before_stripping() {
        assert_eq!(sanitize_component("  hello world  "), "hello_world");
    }

    #[test]
    fn sanitize_strips_non_latin_non_hangul_letters() {
        assert_eq!(sanitize_component("Café résumé"), "Caf_rsum");
    }

    #[test]
    fn sanitize_handles_empty_and_all_invalid() {
        assert_eq!(sanitize_component(""), "");
        assert_eq!(sanitize_component("!!!///"), "");
    }

    #[test]
    fn sanitize_is_deterministic() {
        let title = " Episode  One! ";
        assert_eq!(sanitize_component(title), sanitize_component(title));
    }

    // === Date code ===

    #[test]
    fn date_code_formats_six_digits() {
        let dt = DateTime::parse_from_rfc2822("Mon, 02 Jan 2017 03:04:05 -0700").unwrap();
        assert_eq!(date_code(Some(dt)), "170102");
    }

    #[test]
    fn date_code_uses_epoch_placeholder_when_missing() {
        assert_eq!(date_code(None), "700101");
    }

    // === Media source and extension ===

    #[test]
    fn media_source_prefers_http_guid() {
        let mut episode = make_episode("Test", None, Some("http://x/ep1.mp3"));
        episode.enclosure = Some(Enclosure {
            url: "http://cdn/other.mp3".to_string(),
            length: None,
            mime_type: None,
        });

        assert_eq!(media_source(&episode), Some("http://x/ep1.mp3"));
    }

    #[test]
    fn media_source_falls_back_to_enclosure_for_opaque_guid() {
        let mut episode = make_episode("Test", None, Some("urn:uuid:1234"));
        episode.enclosure = Some(Enclosure {
            url: "http://cdn/ep.mp3".to_string(),
            length: None,
            mime_type: None,
        });

        assert_eq!(media_source(&episode), Some("http://cdn/ep.mp3"));
    }

    #[test]
    fn media_source_is_none_without_any_reference() {
        let episode = make_episode("Test", None, None);
        assert_eq!(media_source(&episode), None);
    }

    #[test]
    fn extension_is_suffix_from_last_period() {
        assert_eq!(extension_of("http://x/ep1.mp3"), Some(".mp3"));
        assert_eq!(extension_of("http://x/archive.tar.pdf"), Some(".pdf"));
        assert_eq!(extension_of("no-extension"), None);
    }

    // === Filename derivation ===

    #[test]
    fn derives_sample_scenario_names() {
        let episode = make_episode(
            " Episode  One! ",
            Some("Mon, 02 Jan 2017 03:04:05 -0700"),
            Some("http://x/ep1.mp3"),
        );

        let (filename, ext) = episode_filename(&episode).unwrap();
        assert_eq!(filename, "170102-Episode_One.mp3");
        assert_eq!(ext, ".mp3");
        assert_eq!(folder_name("My Show"), "My_Show");
    }

    #[test]
    fn filename_is_pure_function_of_episode() {
        let episode = make_episode(
            "Repeatable",
            Some("Tue, 03 Jan 2017 00:00:00 +0000"),
            Some("http://x/ep2.mp3"),
        );

        assert_eq!(episode_filename(&episode), episode_filename(&episode));
    }

    #[test]
    fn filename_uses_placeholder_date_on_unparseable_pub_date() {
        let episode = make_episode("Undated", None, Some("http://x/ep3.mp3"));

        let (filename, _) = episode_filename(&episode).unwrap();
        assert_eq!(filename, "700101-Undated.mp3");
    }

    #[test]
    fn filename_is_none_without_media_reference() {
        let episode = make_episode("Nothing", None, None);
        assert_eq!(episode_filename(&episode), None);
    }

    #[test]
    fn folder_name_falls_back_when_title_sanitizes_away() {
        assert_eq!(folder_name("!!!"), "feed");
        assert_eq!(folder_name(""), "feed");
    }

    // === Extension normalization ===

    #[test]
    fn normalize_extension_accepts_both_forms() {
        assert_eq!(normalize_extension("mp3"), ".mp3");
        assert_eq!(normalize_extension(".mp3"), ".mp3");
        assert_eq!(normalize_extension(" .M4A "), ".m4a");
    }
}
