use crate::error::EngineError;
use crate::score::Composition;
use tracing::info;

pub const MIN_PROMPT_LEN: usize = 3;

const FALLBACK_TEMPO_BPM: f64 = 120.0;

#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub style: Option<String>,
    pub tempo: Option<f64>,
}

/// The remote text-to-composition collaborator. Returns the model's raw
/// textual response; the client digs the composition out of it.
pub trait GenerationBackend {
    fn generate(&self, request: &GenerationRequest) -> Result<String, String>;
}

pub struct GenerationClient<B> {
    backend: B,
}

impl<B: GenerationBackend> GenerationClient<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Validates the request, invokes the collaborator, and parses its
    /// response into a normalized composition. Nothing partial ever comes
    /// back: any parse problem fails the whole generation.
    pub fn generate(&self, request: &GenerationRequest) -> Result<Composition, EngineError> {
        if request.prompt.len() < MIN_PROMPT_LEN {
            return Err(EngineError::InvalidInput(format!(
                "prompt must be at least {} characters",
                MIN_PROMPT_LEN
            )));
        }

        let text = self
            .backend
            .generate(request)
            .map_err(EngineError::GenerationFailed)?;

        // Models wrap the payload in prose; take the outermost object.
        let json = extract_json_object(&text).ok_or_else(|| {
            EngineError::GenerationFailed("response contains no JSON object".into())
        })?;
        let mut composition: Composition =
            serde_json::from_str(json).map_err(|e| EngineError::GenerationFailed(e.to_string()))?;

        if composition.tempo_bpm <= 0.0 {
            composition.tempo_bpm = request
                .tempo
                .filter(|t| *t > 0.0)
                .unwrap_or(FALLBACK_TEMPO_BPM);
        }
        composition.normalize();

        info!(
            tracks = composition.tracks.len(),
            tempo = composition.tempo_bpm,
            "composition generated"
        );
        Ok(composition)
    }
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
