use crate::config::LlmConfig;
use crate::models::{Speaker, TranscriptEntry};
use anyhow::Result;
use async_openai::{
    config::OpenAIConfig,
    types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
    Client,
};
use async_trait::async_trait;
use dotenv::dotenv;

/// Deterministic fallback lines used when the language model is
/// unavailable. Callers degrade to these rather than failing the
/// surrounding operation.
pub const SUMMARY_FALLBACK: &str = "Call completed. Transcript is available for review.";
pub const REPLY_FALLBACK: &str =
    "I apologize, but I'm experiencing some technical difficulties. Let me have someone call you back.";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub struct OpenAiClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl Default for OpenAiClientBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: "gpt-4o".to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}

impl OpenAiClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        dotenv().ok();
        let mut builder = Self::default();
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            builder.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            builder.base_url = Some(url);
        }
        builder
    }

    pub fn with_config(mut self, config: &LlmConfig) -> Self {
        self.model = config.model.clone();
        if config.api_key.is_some() {
            self.api_key = config.api_key.clone();
        }
        if config.base_url.is_some() {
            self.base_url = config.base_url.clone();
        }
        self.temperature = config.temperature;
        self.max_tokens = config.max_tokens;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn build(self) -> OpenAiClient {
        let mut config = OpenAIConfig::new();
        if let Some(api_key) = self.api_key {
            config = config.with_api_key(api_key);
        }
        if let Some(base_url) = self.base_url {
            config = config.with_api_base(base_url);
        }
        OpenAiClient {
            client: Client::with_config(config),
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(&self.model).messages(vec![
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
                .into(),
        ]);
        if let Some(temperature) = self.temperature {
            request.temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            request.max_tokens(max_tokens);
        }
        let response = self.client.chat().create(request.build()?).await?;
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("empty completion response"))?;
        Ok(content)
    }
}

/// Renders a transcript into a summary prompt, one speaker-tagged line per
/// turn.
pub fn summary_prompt(transcript: &[TranscriptEntry]) -> String {
    let mut prompt = String::from(
        "Summarize the following phone call in 2-3 sentences, noting the \
         outcome and any follow-up the recipient asked for.\n\n",
    );
    for entry in transcript {
        let speaker = match entry.speaker {
            Speaker::Agent => "AI",
            Speaker::User => "User",
        };
        prompt.push_str(speaker);
        prompt.push_str(": ");
        prompt.push_str(&entry.content);
        prompt.push('\n');
    }
    prompt
}

/// Prompt for a live conversational turn: instructions, history, then the
/// caller's latest message.
pub fn reply_prompt(
    instructions: Option<&str>,
    transcript: &[TranscriptEntry],
    user_message: &str,
) -> String {
    let mut prompt = String::new();
    if let Some(instructions) = instructions {
        prompt.push_str(instructions);
        prompt.push_str("\n\n");
    }
    if !transcript.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for entry in transcript {
            let speaker = match entry.speaker {
                Speaker::Agent => "AI",
                Speaker::User => "User",
            };
            prompt.push_str(speaker);
            prompt.push_str(": ");
            prompt.push_str(&entry.content);
            prompt.push('\n');
        }
        prompt.push('\n');
    }
    prompt.push_str("User: ");
    prompt.push_str(user_message);
    prompt.push_str("\nRespond as the AI in one short spoken sentence.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_prompt_tags_speakers() {
        let transcript = vec![
            TranscriptEntry::agent("Hi, this is Alex calling about the fund."),
            TranscriptEntry::user("Sure, send me the deck."),
        ];
        let prompt = summary_prompt(&transcript);
        assert!(prompt.contains("AI: Hi, this is Alex calling about the fund."));
        assert!(prompt.contains("User: Sure, send me the deck."));
    }

    #[test]
    fn test_reply_prompt_includes_history_and_message() {
        let transcript = vec![TranscriptEntry::agent("Hello, is this Jane?")];
        let prompt = reply_prompt(Some("Be brief."), &transcript, "Yes, speaking.");
        assert!(prompt.starts_with("Be brief."));
        assert!(prompt.contains("AI: Hello, is this Jane?"));
        assert!(prompt.contains("User: Yes, speaking."));
    }

    #[tokio::test]
    #[ignore] // Requires OpenAI API key, run with `cargo test -- --ignored`
    async fn test_generate() -> Result<()> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            println!("Skipping test as OPENAI_API_KEY is not set");
            return Ok(());
        }
        let client = OpenAiClientBuilder::from_env().build();
        let response = client.generate("Say hello in five words or fewer.").await?;
        assert!(!response.is_empty());
        Ok(())
    }
}
