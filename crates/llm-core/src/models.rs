//! Catalogue of free OpenRouter models suited to planning and execution

/// A model the settings UI can offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.2-3b-instruct:free";

pub const FREE_MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: DEFAULT_MODEL,
        name: "Meta Llama 3.2 3B Instruct (Free)",
        description: "Recommended: fast and efficient for agent tasks",
    },
    ModelInfo {
        id: "google/gemma-2-9b-it:free",
        name: "Google Gemma 2 9B IT (Free)",
        description: "Recommended: strong reasoning, good at planning",
    },
    ModelInfo {
        id: "mistralai/mistral-7b-instruct:free",
        name: "Mistral 7B Instruct (Free)",
        description: "Recommended: balanced performance",
    },
    ModelInfo {
        id: "nousresearch/hermes-3-llama-3.1-405b:free",
        name: "Hermes 3 Llama 3.1 405B (Free)",
        description: "Highest quality, limited availability",
    },
    ModelInfo {
        id: "meta-llama/llama-3.1-70b-instruct:free",
        name: "Meta Llama 3.1 70B Instruct (Free)",
        description: "Very capable at complex reasoning",
    },
    ModelInfo {
        id: "meta-llama/llama-3.1-8b-instruct:free",
        name: "Meta Llama 3.1 8B Instruct (Free)",
        description: "Good performance with good speed",
    },
    ModelInfo {
        id: "microsoft/phi-3-mini-128k-instruct:free",
        name: "Microsoft Phi-3 Mini 128K (Free)",
        description: "Long context (128K)",
    },
    ModelInfo {
        id: "qwen/qwen-2.5-7b-instruct:free",
        name: "Qwen 2.5 7B Instruct (Free)",
        description: "Multilingual, improved reasoning and coding",
    },
    ModelInfo {
        id: "meta-llama/llama-3.2-1b-instruct:free",
        name: "Meta Llama 3.2 1B Instruct (Free)",
        description: "Ultra fast, for simple tasks",
    },
];

/// Look up a catalogue entry by id
pub fn find_model(id: &str) -> Option<&'static ModelInfo> {
    FREE_MODELS.iter().find(|m| m.id == id)
}
