//! Heuristic relevance filter for media file names and captions.

use crate::config::FilterConfig;
use regex::Regex;

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png"];

/// Namespace prefixes stripped before matching (English and French wikis).
const FILE_PREFIXES: &[&str] = &["file:", "fichier:"];

/// Why a candidate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    BlockedName,
    Irrelevant,
    BlockedCaption,
}

pub struct ImageFilter {
    blocklist: Vec<String>,
    allowlist: Vec<String>,
    tags: Regex,
}

impl ImageFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            blocklist: lowered(&config.blocklist),
            allowlist: lowered(&config.allowlist),
            tags: Regex::new(r"<[^>]+>").expect("static regex"),
        }
    }

    /// Decide on a file. `place_token` must come from [`place_token`].
    /// Returns the cleaned caption on acceptance.
    pub fn check(&self, title: &str, caption_html: Option<&str>, place_token: &str) -> Result<Option<String>, Rejection> {
        let name = file_stem_key(title);
        if self.blocklist.iter().any(|bl| name.contains(bl.as_str())) {
            return Err(Rejection::BlockedName);
        }
        let named = !place_token.is_empty() && name.contains(place_token);
        if !(named || self.allowlist.iter().any(|kw| name.contains(kw.as_str()))) {
            return Err(Rejection::Irrelevant);
        }

        let caption = self.strip_tags(caption_html.unwrap_or(""));
        let lowered = caption.to_lowercase();
        if self.blocklist.iter().any(|bl| lowered.contains(bl.as_str())) {
            return Err(Rejection::BlockedCaption);
        }
        Ok(if caption.is_empty() { None } else { Some(caption) })
    }

    pub fn strip_tags(&self, html: &str) -> String {
        self.tags.replace_all(html, "").trim().to_string()
    }
}

/// Title is a raster image we can show.
pub fn is_image_title(title: &str) -> bool {
    let t = title.to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| t.ends_with(ext))
}

/// Lower-cased place name with spaces turned into underscores, as in file names.
pub fn place_token(place_name: &str) -> String {
    place_name.trim().to_lowercase().replace(' ', "_")
}

fn file_stem_key(title: &str) -> String {
    let lower = title.to_lowercase();
    for prefix in FILE_PREFIXES {
        if let Some(rest) = lower.strip_prefix(prefix) {
            return rest.to_string();
        }
    }
    lower
}

fn lowered(tokens: &[String]) -> Vec<String> {
    tokens
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> ImageFilter {
        ImageFilter::new(&FilterConfig::default())
    }

    #[test]
    fn test_blason_always_excluded() {
        let f = filter();
        assert_eq!(
            f.check("File:Blason_Marseille.png", None, "marseille"),
            Err(Rejection::BlockedName)
        );
        assert_eq!(
            f.check("Fichier:Église_et_blason.jpg", None, "marseille"),
            Err(Rejection::BlockedName)
        );
    }

    #[test]
    fn test_place_token_is_enough() {
        let f = filter();
        assert_eq!(f.check("File:Saint_Malo_2019.jpg", None, &place_token("Saint Malo")), Ok(None));
    }

    #[test]
    fn test_allowlist_without_place() {
        let f = filter();
        assert!(f.check("File:Vieux_pont_de_pierre.jpg", None, "avignon").is_ok());
        assert_eq!(
            f.check("File:DSC_0042.jpg", None, "avignon"),
            Err(Rejection::Irrelevant)
        );
    }

    #[test]
    fn test_caption_blocklist_after_strip() {
        let f = filter();
        let html = r#"<span class="x">Carte</span> de la ville"#;
        assert_eq!(
            f.check("File:Marseille_1.jpg", Some(html), "marseille"),
            Err(Rejection::BlockedCaption)
        );
        let ok = f.check("File:Marseille_2.jpg", Some("<b>Le Vieux-Port</b> au soir "), "marseille");
        assert_eq!(ok, Ok(Some("Le Vieux-Port au soir".to_string())));
    }

    #[test]
    fn test_custom_lists_replace_defaults() {
        let f = ImageFilter::new(&FilterConfig {
            blocklist: vec!["SUNSET".into()],
            allowlist: vec!["harbour".into()],
        });
        assert_eq!(f.check("File:harbour_sunset.jpg", None, "x"), Err(Rejection::BlockedName));
        assert!(f.check("File:blason_harbour.jpg", None, "x").is_ok());
    }

    #[test]
    fn test_is_image_title() {
        assert!(is_image_title("File:A.JPG"));
        assert!(is_image_title("File:a.jpeg"));
        assert!(is_image_title("File:a.png"));
        assert!(!is_image_title("File:a.svg"));
        assert!(!is_image_title("File:a.ogg"));
    }
}
