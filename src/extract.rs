//! Entity extraction from free-form event text.
//!
//! Extraction never fails; text that matches nothing yields `None` or an
//! empty list and the caller degrades (placeholder art, fewer tiles).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A canonical city and country pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub country: String,
}

/// Venue aliases that name a location without spelling it out.
/// Matched case-insensitively as substrings of venue, then title.
const VENUE_ALIASES: &[(&str, &str, &str)] = &[
    ("wework chambers", "Kuala Lumpur", "Malaysia"),
    ("wework kl", "Kuala Lumpur", "Malaysia"),
    ("menara kembar", "Kuala Lumpur", "Malaysia"),
    ("marina bay sands", "Singapore", "Singapore"),
    ("suntec city", "Singapore", "Singapore"),
    ("bgc taguig", "Manila", "Philippines"),
    ("cyberjaya", "Cyberjaya", "Malaysia"),
];

/// Derive the event location from its venue line, falling back to the title.
///
/// The alias table wins over comma parsing so branded venue names
/// ("WeWork Chambers") resolve even when the text never names the city.
pub fn extract_location(venue: &str, title: &str) -> Option<Location> {
    let venue_folded = venue.to_lowercase();
    let title_folded = title.to_lowercase();
    for (alias, city, country) in VENUE_ALIASES {
        if venue_folded.contains(alias) || title_folded.contains(alias) {
            return Some(Location {
                city: (*city).to_string(),
                country: (*country).to_string(),
            });
        }
    }

    // "Somewhere, City, Country": the last two comma segments.
    let segments: Vec<&str> = venue
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.chars().any(char::is_alphabetic))
        .collect();
    if segments.len() >= 2 {
        let city = proper_case(segments[segments.len() - 2]);
        let country = proper_case(segments[segments.len() - 1]);
        return Some(Location { city, country });
    }
    None
}

struct ExtractionRule {
    name: &'static str,
    pattern: &'static LazyLock<Regex>,
}

// A capitalized multi-token run, allowing accented letters, apostrophes,
// and hyphens inside tokens ("O'Brien", "Díaz", "Al-Rashid").
const NAME: &str = r"([A-Z][\p{L}'’\-]+(?:\s+[A-Z][\p{L}'’\-]+)+)";

static RULE_ROLE_AFTER_COMMA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"{NAME}\s*,\s*(?:the\s+|a\s+|an\s+)?(?:[A-Z][a-z]+\s+)*(?:Director|Manager|President|Head|Chief|Founder|Co-Founder|Officer|Engineer|Strategist|Analyst|Professor|Leader|Lead|Evangelist|Advocate)"
    ))
    .unwrap()
});

static RULE_IS_WAS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"{NAME}\s+(?:is|was)\s+(?:the|a|an|our)\b")).unwrap());

static RULE_CREDENTIALS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"{NAME}\s+(?:boasts|has|brings|holds)\b")).unwrap());

/// Ordered by specificity; the first rule matching a paragraph wins.
static RULES: &[ExtractionRule] = &[
    ExtractionRule {
        name: "role-after-comma",
        pattern: &RULE_ROLE_AFTER_COMMA,
    },
    ExtractionRule {
        name: "is-was",
        pattern: &RULE_IS_WAS,
    },
    ExtractionRule {
        name: "credentials",
        pattern: &RULE_CREDENTIALS,
    },
];

/// Extract speaker names from a free-text bio block.
///
/// Each paragraph contributes at most one name. The community leader, when
/// given, is always first and deduplicates case-insensitively against
/// extracted names.
pub fn extract_speakers(raw_text: &str, community_leader: Option<&str>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    if let Some(leader) = community_leader {
        let leader = proper_case(leader.trim());
        if !leader.is_empty() {
            names.push(leader);
        }
    }

    for paragraph in raw_text.split("\n\n").flat_map(|p| p.split('\n')) {
        let paragraph = strip_numbering(paragraph.trim());
        if paragraph.is_empty() {
            continue;
        }
        for rule in RULES {
            if let Some(caps) = rule.pattern.captures(paragraph) {
                let name = proper_case(caps[1].trim());
                tracing::debug!(rule = rule.name, name = %name, "speaker extracted");
                if !names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
                    names.push(name);
                }
                break;
            }
        }
    }
    names
}

/// Extract a speaker's name from their own bio paragraph, used when a
/// structured speaker entry carries a bio but no name.
pub fn extract_name_from_bio(bio: &str) -> Option<String> {
    let text = strip_numbering(bio.trim());
    for rule in RULES {
        if let Some(caps) = rule.pattern.captures(text) {
            return Some(proper_case(caps[1].trim()));
        }
    }
    None
}

/// `"1. Jane Doe..."` and `"2) Jane Doe..."` prefixes on speaker lines.
fn strip_numbering(line: &str) -> &str {
    let trimmed = line.trim_start();
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 || digits > 2 {
        return trimmed;
    }
    let rest = &trimmed[digits..];
    rest.strip_prefix('.')
        .or_else(|| rest.strip_prefix(')'))
        .map_or(trimmed, str::trim_start)
}

/// Proper-case each whitespace-separated token, preserving inner
/// apostrophes and hyphen boundaries ("o'brien" -> "O'Brien").
pub fn proper_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(proper_case_token)
        .collect::<Vec<_>>()
        .join(" ")
}

fn proper_case_token(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut boundary = true;
    for ch in token.chars() {
        if boundary && ch.is_alphabetic() {
            out.extend(ch.to_uppercase());
            boundary = false;
        } else {
            out.extend(ch.to_lowercase());
        }
        if ch == '-' || ch == '\'' || ch == '’' {
            boundary = true;
        }
    }
    out
}
