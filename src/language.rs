use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

pub const DEFAULT_LANGUAGE: &str = "en";

/// localized strings for one language, keyed by template placeholder
pub type Bundle = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum LocalisationError {
    #[error("failed to read translations file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid translations file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// every available bundle; always contains `en`
#[derive(Debug, Clone)]
pub struct Localisations {
    bundles: HashMap<String, Bundle>,
}

impl Default for Localisations {
    fn default() -> Self {
        let mut bundles = HashMap::new();
        bundles.insert("en".to_string(), bundle(EN));
        bundles.insert("fr".to_string(), bundle(FR));
        Self { bundles }
    }
}

impl Localisations {
    /// merge extra bundles over the defaults.
    ///
    /// each incoming bundle is laid over `en`, so a partial translation
    /// still renders every key.
    pub fn merge(&mut self, extra: HashMap<String, Bundle>) {
        for (tag, strings) in extra {
            let mut merged = self
                .bundles
                .get(&tag)
                .or_else(|| self.bundles.get(DEFAULT_LANGUAGE))
                .cloned()
                .unwrap_or_default();
            merged.extend(strings);
            self.bundles.insert(tag, merged);
        }
    }

    /// load a `{"tag": {"key": "text"}}` json file and merge it
    pub fn merge_file(&mut self, path: &Path) -> Result<(), LocalisationError> {
        let raw = std::fs::read_to_string(path).map_err(|source| LocalisationError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let extra: HashMap<String, Bundle> =
            serde_json::from_str(&raw).map_err(|source| LocalisationError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        tracing::debug!("Loaded {} translation bundle(s) from {:?}", extra.len(), path);
        self.merge(extra);
        Ok(())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.bundles.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.bundles.keys().map(String::as_str)
    }

    /// pick the bundle for a raw `Accept-Language` value
    pub fn negotiate(&self, header: Option<&str>) -> &Bundle {
        // `en` is inserted on construction and never removed
        &self.bundles[choose_language(header, self)]
    }
}

/// parse an `Accept-Language` value into tags, most preferred first.
///
/// entries are stable-sorted by ascending q and the result reversed, so among
/// equal weights the entry appearing later in the header comes first.
pub fn parse_accept_language(header: &str) -> Vec<String> {
    let mut accepted: Vec<(f32, String)> = header
        .split(',')
        .filter_map(|option| {
            let mut parts = option.split(';');
            let tag = parts.next()?.trim();
            if tag.is_empty() {
                return None;
            }
            let mut quality = 1.0;
            for param in parts {
                if let Some(value) = param.trim().strip_prefix("q=") {
                    quality = match value.trim().parse::<f32>() {
                        Ok(q) if q.is_finite() => q,
                        _ => 0.0,
                    };
                }
            }
            Some((quality, tag.to_string()))
        })
        .collect();

    accepted.sort_by(|a, b| a.0.total_cmp(&b.0));
    accepted.reverse();
    accepted.into_iter().map(|(_, tag)| tag).collect()
}

/// first accepted tag that has a bundle, else `en`
pub fn choose_language<'a>(header: Option<&str>, localisations: &'a Localisations) -> &'a str {
    let Some(header) = header else {
        return DEFAULT_LANGUAGE;
    };
    parse_accept_language(header)
        .iter()
        .find_map(|tag| localisations.bundles.get_key_value(tag))
        .map(|(tag, _)| tag.as_str())
        .unwrap_or(DEFAULT_LANGUAGE)
}

fn bundle(entries: &[(&str, &str)]) -> Bundle {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

const EN: &[(&str, &str)] = &[
    ("maintitle", "Send a file"),
    ("submit", "Send"),
    ("sending", "Sending"),
    ("successtitle", "File received"),
    ("received", "File received!"),
    ("another", "Send another file."),
    ("errortitle", "Problem"),
    ("problem", "There has been a problem!"),
    ("retry", "Retry."),
    ("discover", "Discover the address of this page"),
];

const FR: &[(&str, &str)] = &[
    ("maintitle", "Envoyer un fichier"),
    ("submit", "Envoyer"),
    ("sending", "Envoi en cours"),
    ("successtitle", "Fichier reçu"),
    ("received", "Fichier reçu !"),
    ("another", "Envoyer un autre fichier."),
    ("errortitle", "Problème"),
    ("problem", "Il y a eu un problème !"),
    ("retry", "Réessayer."),
    ("discover", "Découvrir l'adresse de cette page"),
];
