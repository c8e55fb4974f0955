//! Narrative generator backed by an OpenAI-compatible chat completions API.

use crate::config::GeneratorConfig;
use crate::media::providers::transport_timed_out;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// What the generator is asked to describe.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptionRequest {
    pub place_name: String,
    pub sub_region_name: Option<String>,
    pub region_name: Option<String>,
    pub lang: String,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generator is not configured (missing API key)")]
    NotConfigured,
    #[error("generator timed out")]
    Timeout,
    #[error("generator request failed: {0}")]
    Request(String),
    #[error("generator returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generator returned an unreadable response: {0}")]
    InvalidResponse(String),
    #[error("generator returned empty text")]
    Empty,
}

/// Produces free-form text for a place. Implementations must return a
/// non-empty string or an error.
pub trait Generator: Send + Sync {
    fn describe(&self, request: &DescriptionRequest) -> Result<String, GenerationError>;
}

// ─── OpenAI chat completions ────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    top_p: f64,
    frequency_penalty: f64,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct OpenAiGenerator {
    agent: ureq::Agent,
    config: GeneratorConfig,
}

impl OpenAiGenerator {
    pub fn new(config: &GeneratorConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self {
            agent,
            config: config.clone(),
        }
    }
}

impl Generator for OpenAiGenerator {
    fn describe(&self, request: &DescriptionRequest) -> Result<String, GenerationError> {
        let key = self.config.api_key.as_deref().ok_or(GenerationError::NotConfigured)?;
        info!(
            place = %request.place_name,
            sub_region = request.sub_region_name.as_deref().unwrap_or("?"),
            region = request.region_name.as_deref().unwrap_or("?"),
            lang = %request.lang,
            "requesting description"
        );

        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user".into(),
                content: build_prompt(request),
            }],
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            frequency_penalty: self.config.frequency_penalty,
        };

        let response = self
            .agent
            .post(&self.config.api_url)
            .set("Authorization", &format!("Bearer {}", key))
            .send_json(&body)
            .map_err(|e| match e {
                ureq::Error::Status(status, resp) => GenerationError::Status {
                    status,
                    body: resp.into_string().unwrap_or_default(),
                },
                ureq::Error::Transport(t) if transport_timed_out(&t) => GenerationError::Timeout,
                ureq::Error::Transport(t) => GenerationError::Request(t.to_string()),
            })?;

        let parsed: ChatResponse = response
            .into_json()
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        let text = extract_text(parsed)?;
        debug!(place = %request.place_name, chars = text.len(), "description generated");
        Ok(text)
    }
}

fn extract_text(response: ChatResponse) -> Result<String, GenerationError> {
    let text = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.trim().to_string())
        .ok_or_else(|| GenerationError::InvalidResponse("no choices".into()))?;
    if text.is_empty() {
        return Err(GenerationError::Empty);
    }
    Ok(text)
}

/// Fixed-layout prompt: description, history, then 1-5 attractions scaled to
/// the place's significance.
pub fn build_prompt(request: &DescriptionRequest) -> String {
    let place = request.place_name.as_str();
    let fr = request.lang.eq_ignore_ascii_case("fr");
    let dep = request.sub_region_name.as_deref();
    let reg = request.region_name.as_deref();

    if fr {
        let location = match (dep, reg) {
            (Some(d), Some(r)) => format!(", située dans le département de {}, en région {}, en France", d, r),
            (Some(d), None) => format!(", située dans le département de {}, en France", d),
            (None, Some(r)) => format!(", située en région {}, en France", r),
            (None, None) => ", en France".to_string(),
        };
        format!(
            "Fournis des informations détaillées sur {place}{location}. Suis exactement la structure ci-dessous :

DESCRIPTION:
[Une présentation de 2 à 3 phrases décrivant ce qui rend cette ville unique, attrayante ou intrigante pour les visiteurs.]

HISTORY:
[Un résumé en 2 à 3 phrases des origines de la ville, de son histoire marquante ou d'événements notables qui la définissent.]

ATTRACTIONS:
[Indique entre 1 et 5 attractions selon l'importance réelle de la ville. Choisis uniquement les lieux vraiment remarquables.
Pour les petits villages ou villes peu connues : 1 point d'intérêt majeur.
Pour les villes moyennes : 2 attractions principales.
Pour les grandes villes ou lieux à forte valeur historique : jusqu'à 5 attractions possibles.]
1. [Nom] - [Brève description de son intérêt et de sa localisation]
2. [Nom] - [Brève description de son intérêt et de sa localisation]
(…poursuivre la numérotation jusqu'au nombre d'attractions retenu)"
        )
    } else {
        let location = match (dep, reg) {
            (Some(d), Some(r)) => format!(", located in the {} department of the {} region of France", d, r),
            (Some(d), None) => format!(", located in the {} department of France", d),
            (None, Some(r)) => format!(", located in the {} region of France", r),
            (None, None) => ", in France".to_string(),
        };
        let answer_in = if request.lang.eq_ignore_ascii_case("en") {
            String::new()
        } else {
            format!(" Write the answer in the language with code '{}'.", request.lang)
        };
        format!(
            "Provide detailed information about {place}{location}. Use the following structure exactly:{answer_in}

DESCRIPTION:
[2-3 sentence overview detailing the town's uniqueness and what makes it intriguing.]

HISTORY:
[2-3 sentences briefly outlining the town's background and notable past events that define the town.]

ATTRACTIONS:
[Choose between 1 and 5 attractions, based on how many truly notable sites the town has. Pick anything that the town offers that is unique or interesting.
Small villages or lesser-known towns: 1 key point of interest.
Mid-sized towns: 2 main attractions.
Major cities or historically rich locales: up to 5.]
1. [Name] - [Short description of its significance and location]
2. [Name] - [Short description of its significance and location]
(…continue numbering up to the chosen count)"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(lang: &str) -> DescriptionRequest {
        DescriptionRequest {
            place_name: "Arles".into(),
            sub_region_name: Some("Bouches-du-Rhône".into()),
            region_name: Some("Provence-Alpes-Côte d'Azur".into()),
            lang: lang.into(),
        }
    }

    #[test]
    fn test_prompt_english() {
        let p = build_prompt(&request("en"));
        assert!(p.contains("about Arles, located in the Bouches-du-Rhône department"));
        assert!(p.contains("ATTRACTIONS:"));
        assert!(!p.contains("language with code"));
    }

    #[test]
    fn test_prompt_french() {
        let p = build_prompt(&request("fr"));
        assert!(p.starts_with("Fournis des informations détaillées sur Arles"));
        assert!(p.contains("HISTORY:"));
    }

    #[test]
    fn test_prompt_other_language_and_missing_parents() {
        let mut req = request("de");
        req.sub_region_name = None;
        req.region_name = None;
        let p = build_prompt(&req);
        assert!(p.contains("about Arles, in France."));
        assert!(p.contains("language with code 'de'"));
    }

    #[test]
    fn test_missing_key_not_configured() {
        let gen = OpenAiGenerator::new(&GeneratorConfig::default());
        assert!(matches!(gen.describe(&request("en")), Err(GenerationError::NotConfigured)));
    }

    #[test]
    fn test_extract_text() {
        let ok: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"  DESCRIPTION: x  "}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(ok).unwrap(), "DESCRIPTION: x");

        let empty: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":"  "}}]}"#).unwrap();
        assert!(matches!(extract_text(empty), Err(GenerationError::Empty)));

        let none: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(extract_text(none), Err(GenerationError::InvalidResponse(_))));
    }
}
