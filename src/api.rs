//! HTTP client for the generation backends (background image + daily quote).

use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::quote;

pub const IMAGE_SIZE: &str = "720x1280";
pub const IMAGE_MODEL: &str = "cogview-3-flash";
pub const CHAT_MODEL: &str = "glm-4.6";
const SYSTEM_PROMPT: &str = "你是一个有用的AI助手。";

const BG_THEMES: &[&str] = &[
    "lush green forest",
    "clear blue sky with soft clouds",
    "radiant sunrise over ocean",
    "misty mountains golden light",
    "fresh morning meadow dew",
    "calm lake reflection",
    "modern city skyline morning",
    "peaceful zen garden",
    "tropical beach morning",
    "snowy pine forest sunrise",
    "blooming flower field morning",
];

const VISUAL_STYLES: &[&str] = &[
    "photorealistic",
    "cinematic lighting",
    "soft dreamy focus",
    "vibrant colors",
    "minimalist composition",
    "macro photography details",
];

const QUOTE_TOPICS: &[&str] = &[
    "Perseverance and Grit",
    "Innovation and Future",
    "Inner Peace and Mindfulness",
    "Learning and Growth",
    "Kindness and Empathy",
    "Leadership and Vision",
    "Nature and Harmony",
];

/// Random theme x style x seed, so repeated clicks don't return the same picture.
pub fn background_prompt<R: Rng + ?Sized>(rng: &mut R) -> String {
    let theme = BG_THEMES.choose(rng).copied().unwrap_or(BG_THEMES[0]);
    let style = VISUAL_STYLES.choose(rng).copied().unwrap_or(VISUAL_STYLES[0]);
    let seed: u32 = rng.gen_range(0..1_000_000);
    format!(
        "垂直9:16海报背景，主题：{theme}，风格：{style}。宁静清晨氛围，审美高级，极简，大量留白用于排版，不含任何文字。随机种子：{seed}"
    )
}

pub fn quote_prompt<R: Rng + ?Sized>(rng: &mut R) -> String {
    let topic = QUOTE_TOPICS.choose(rng).copied().unwrap_or(QUOTE_TOPICS[0]);
    let seed: u32 = rng.gen_range(0..1_000_000);
    format!(
        "主题: {topic}。种子: {seed}。请生成一条独特且鼓舞人心的英中双语金句，并只返回 JSON：{{\"english\":\"...\",\"chinese\":\"...\",\"source\":\"...\"}}"
    )
}

#[derive(Debug, Serialize)]
pub struct ImageRequest<'a> {
    pub prompt: &'a str,
    pub size: &'a str,
    pub model: &'a str,
    pub watermark_enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    data_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub temperature: f32,
    pub stream: bool,
}

/// The two generation calls the editor makes. Implemented over HTTP by
/// [`GenerationClient`]; tests swap in canned fakes.
pub trait Generator: Send + Sync {
    /// A raw (still watermarked) background as a data URL.
    fn background(&self, prompt: &str) -> Result<String, ApiError>;
    /// Final proverb text, already parsed and formatted.
    fn quote(&self, prompt: &str) -> Result<String, ApiError>;
}

pub struct GenerationClient {
    client: Client,
    base: String,
}

impl GenerationClient {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, base: api_base.trim_end_matches('/').to_string() })
    }

    fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base, path);
        tracing::debug!(%url, "POST");
        let res = self.client.post(&url).json(body).send()?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().unwrap_or_default();
            return Err(ApiError::Status { status: status.as_u16(), body });
        }
        res.json::<Value>().map_err(|e| ApiError::Malformed(e.to_string()))
    }
}

impl Generator for GenerationClient {
    fn background(&self, prompt: &str) -> Result<String, ApiError> {
        let body = ImageRequest { prompt, size: IMAGE_SIZE, model: IMAGE_MODEL, watermark_enabled: false };
        let value = self.post("/api/image", &body)?;
        let parsed: ImageResponse =
            serde_json::from_value(value).map_err(|e| ApiError::Malformed(e.to_string()))?;
        parsed.data_url.filter(|u| !u.is_empty()).ok_or(ApiError::MissingImage)
    }

    fn quote(&self, prompt: &str) -> Result<String, ApiError> {
        let body = ChatRequest {
            model: CHAT_MODEL,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: 1.0,
            stream: false,
        };
        let value = self.post("/api/chat", &body)?;
        Ok(quote::content_from_response(&value))
    }
}
