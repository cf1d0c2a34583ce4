use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// Identity of one required asset, independent of where it is stored.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKey {
    /// City skyline or landmark backdrop.
    Landmark { city: String, country: String },
    /// The brand overlay frame shared by every poster.
    Overlay,
    /// Portrait photo for one named speaker.
    SpeakerPhoto { name: String },
}

impl AssetKey {
    /// Deterministic identity used for cache keys and in-flight claims.
    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            AssetKey::Landmark { city, country } => {
                Fingerprint::of_fields(["landmark", city, country])
            }
            AssetKey::Overlay => Fingerprint::of_fields(["overlay"]),
            AssetKey::SpeakerPhoto { name } => Fingerprint::of_fields(["speaker-photo", name]),
        }
    }

    /// Canonical hyphenated name used for repository matching and uploads.
    pub fn slug(&self) -> String {
        match self {
            AssetKey::Landmark { city, country } => {
                format!("landmark-{}-{}", slugify(city), slugify(country))
            }
            AssetKey::Overlay => "brand-overlay".to_string(),
            AssetKey::SpeakerPhoto { name } => slugify(name),
        }
    }

    /// Spelling variants a stored asset name may use for this key.
    ///
    /// Repositories are fed by humans; separator and casing conventions
    /// drift, so matching tries each variant against listing names and URLs.
    pub fn name_variants(&self) -> Vec<String> {
        let base = match self {
            AssetKey::Landmark { city, country } => format!("{city} {country}"),
            AssetKey::Overlay => "brand overlay".to_string(),
            AssetKey::SpeakerPhoto { name } => name.clone(),
        };
        let folded = fold_ascii(&base);
        let mut variants = vec![
            folded.replace(' ', "-"),
            folded.replace(' ', "_"),
            folded.replace(' ', ""),
            folded.clone(),
        ];
        if let AssetKey::Landmark { city, .. } = self {
            // City-only names are common for skyline photos.
            let city = fold_ascii(city);
            variants.push(city.replace(' ', "-"));
            variants.push(city.replace(' ', ""));
        }
        variants.dedup();
        variants
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.slug())
    }
}

/// Lowercase, strip diacritics, collapse everything else to single spaces.
pub fn fold_ascii(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_space = true;
    for ch in input.chars() {
        let mapped = fold_char(ch);
        match mapped {
            Some(c) if c.is_ascii_alphanumeric() => {
                out.push(c.to_ascii_lowercase());
                last_space = false;
            }
            _ => {
                if !last_space {
                    out.push(' ');
                    last_space = true;
                }
            }
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

fn slugify(input: &str) -> String {
    fold_ascii(input).replace(' ', "-")
}

fn fold_char(ch: char) -> Option<char> {
    if ch.is_ascii() {
        return Some(ch);
    }
    // Latin-1 and common Latin Extended-A letters seen in venue and
    // speaker names; anything else is treated as a separator.
    let folded = match ch {
        'à'..='å' | 'À'..='Å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'Ç' | 'ć' | 'č' => 'c',
        'è'..='ë' | 'È'..='Ë' | 'ē' | 'ė' | 'ę' => 'e',
        'ì'..='ï' | 'Ì'..='Ï' | 'ī' | 'į' => 'i',
        'ñ' | 'Ñ' | 'ń' => 'n',
        'ò'..='ö' | 'Ò'..='Ö' | 'ø' | 'Ø' | 'ō' => 'o',
        'ù'..='ü' | 'Ù'..='Ü' | 'ū' | 'ů' => 'u',
        'ý' | 'ÿ' | 'Ý' => 'y',
        'š' | 'ś' => 's',
        'ž' | 'ź' | 'ż' => 'z',
        _ => return None,
    };
    Some(folded)
}
