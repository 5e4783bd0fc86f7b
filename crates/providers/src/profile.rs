//! Provider profile registry: static per-backend configuration.
//!
//! Profiles are immutable and selected by [`ProviderId`]. They carry the
//! endpoint, auth scheme, request defaults, and the structured-output
//! strategy the task layer must apply.

use narragraph_core::ProviderId;

/// How the credential is presented to the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <secret>`
    Bearer,
}

impl AuthScheme {
    /// Header name and value for a secret.
    pub fn header(&self, secret: &str) -> (&'static str, String) {
        match self {
            Self::Bearer => ("Authorization", format!("Bearer {secret}")),
        }
    }
}

/// How a provider is made to answer in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredOutput {
    /// Schema-bound `response_format` directive in the request body
    NativeSchema,
    /// JSON-only instruction appended to the prompt
    PromptInstruction,
}

/// Fixed configuration identifying one LLM backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    pub id: ProviderId,
    pub base_url: &'static str,
    pub auth: AuthScheme,
    pub default_model: &'static str,
    pub default_temperature: f32,
    pub default_max_tokens: u32,
    pub structured_output: StructuredOutput,
    /// Text appended to structured prompts when output is prompt-driven
    pub prompt_augmentation: Option<&'static str>,
    /// Whether the backend sometimes answers in prose instead of JSON
    pub answers_in_prose: bool,
}

const CHATGLM_JSON_INSTRUCTION: &str =
    "\n\n请以有效的JSON格式回复。确保回复是完整的JSON对象，不要包含其他文本。";

const SMALL_JSON_INSTRUCTION: &str = "\n\nCRITICAL: Respond with pure JSON only. No markdown, no code blocks, no explanations. Start directly with { and end with }. No ```json or any other formatting.";

static OPENAI: ProviderProfile = ProviderProfile {
    id: ProviderId::OpenAi,
    base_url: "https://api.openai.com/v1",
    auth: AuthScheme::Bearer,
    default_model: "gpt-4o-2024-08-06",
    default_temperature: 0.0,
    default_max_tokens: 4096,
    structured_output: StructuredOutput::NativeSchema,
    prompt_augmentation: None,
    answers_in_prose: false,
};

static CHATGLM: ProviderProfile = ProviderProfile {
    id: ProviderId::ChatGlm,
    base_url: "https://open.bigmodel.cn/api/paas/v4",
    auth: AuthScheme::Bearer,
    default_model: "glm-4.5",
    default_temperature: 0.6,
    default_max_tokens: 1024,
    structured_output: StructuredOutput::PromptInstruction,
    prompt_augmentation: Some(CHATGLM_JSON_INSTRUCTION),
    answers_in_prose: false,
};

static SMALL: ProviderProfile = ProviderProfile {
    id: ProviderId::Small,
    base_url: "https://ai98.vip/v1",
    auth: AuthScheme::Bearer,
    default_model: "gpt-4o-2024-08-06",
    default_temperature: 0.7,
    default_max_tokens: 2048,
    structured_output: StructuredOutput::PromptInstruction,
    prompt_augmentation: Some(SMALL_JSON_INSTRUCTION),
    answers_in_prose: true,
};

/// Look up the profile for a provider.
pub fn profile(id: ProviderId) -> &'static ProviderProfile {
    match id {
        ProviderId::OpenAi => &OPENAI,
        ProviderId::ChatGlm => &CHATGLM,
        ProviderId::Small => &SMALL,
    }
}

/// Every predefined profile, in registry order.
pub fn all_profiles() -> impl Iterator<Item = &'static ProviderProfile> {
    ProviderId::ALL.into_iter().map(profile)
}

impl ProviderProfile {
    /// Whether the task layer must append a JSON-only instruction.
    pub fn needs_prompt_augmentation(&self) -> bool {
        self.structured_output == StructuredOutput::PromptInstruction
    }
}
