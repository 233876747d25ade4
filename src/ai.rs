//! Chat-completions client that turns free text into structured tasks and notes.
//!
//! Request building and reply parsing are plain functions; only
//! [`AiClient::complete`] touches the network.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{clock, NoteExtraction, Settings, TaskExtraction};

pub const TASK_PROMPT: &str = r#"你是一个日程提取助手。

请基于文末提供的【当前基准日期】(Reference Date) 来计算任务的具体日期。

提取规则：
1. **Task**: 提取核心事项，去除"帮我记"、"打算"等冗余词。
2. **Date**: 必须基于【当前基准日期】进行推算。
   - "明天" = 基准日期 + 1天
   - "后天" = 基准日期 + 2天
   - "周五" = 基准日期之后的最近一个周五
   - 若未提及日期，默认为【当前基准日期】。
   - 格式: YYYY-MM-DD
3. **Time**: 提取具体时刻 (HH:mm)。
   - "下午3点" -> "15:00"
   - 若只有模糊时间词(如"下午")，Time字段留空，并将"下午"保留在 Task 内容中。
4. **Location**: 提取地点信息。若文中包含地点（如“在会议室”、“去上海”），提取该地点；否则留空。

返回 JSON: { "task": "string", "date": "string", "time": "string", "location": "string" }

【当前基准日期】: "#;

pub const NOTE_PROMPT: &str = r#"你是一个专业的口播文案编辑。用户的输入是一段口语化的灵感或日记。
请完成两件事：
1. 将内容改写为一段通顺、口语化、适合朗读的口播文案，自动分段排版。
2. 提炼一个简短吸引人的标题。
返回 JSON 格式：{ "title": "标题", "content": "改写后的正文" }。"#;

const USER_AGENT: &str = concat!("sxj/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum AiError {
    #[error("API key is not configured, open Settings to add one")]
    MissingApiKey,
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("AI returned no content")]
    EmptyContent,
    #[error("AI reply is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("AI reply does not match the expected shape: {0}")]
    Schema(String),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatReplyMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatRequest {
    fn new(model: &str, system: String, user: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: system },
                ChatMessage { role: "user".to_string(), content: user.to_string() },
            ],
            response_format: ResponseFormat { kind: "json_object".to_string() },
        }
    }
}

/// Request asking the model to pull a task out of `text`, resolving relative
/// dates against `reference_date`.
pub fn task_request(settings: &Settings, text: &str, reference_date: NaiveDate) -> ChatRequest {
    let system = format!("{}{}", TASK_PROMPT, reference_date.format("%Y-%m-%d"));
    ChatRequest::new(&settings.model, system, text)
}

pub fn note_request(settings: &Settings, text: &str) -> ChatRequest {
    ChatRequest::new(&settings.model, NOTE_PROMPT.to_string(), text)
}

/// Content of the first choice; a missing or blank body is an error
pub fn reply_content(response: ChatResponse) -> Result<String, AiError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(AiError::EmptyContent)
}

fn parse_object(content: &str) -> Result<Map<String, Value>, AiError> {
    match serde_json::from_str::<Value>(content.trim())? {
        Value::Object(fields) => Ok(fields),
        other => Err(AiError::Schema(format!("expected a JSON object, got {}", kind_of(&other)))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Trimmed string field; absent, null and blank all read as `None`
fn optional_str(fields: &Map<String, Value>, name: &str) -> Result<Option<String>, AiError> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => Err(AiError::Schema(format!(
            "field `{}` should be a string, got {}",
            name,
            kind_of(other)
        ))),
    }
}

fn required_str(fields: &Map<String, Value>, name: &str) -> Result<String, AiError> {
    optional_str(fields, name)?
        .ok_or_else(|| AiError::Schema(format!("field `{}` is missing or empty", name)))
}

/// Validate a task reply. A missing date means the reference date.
pub fn parse_task_reply(content: &str, reference_date: NaiveDate) -> Result<TaskExtraction, AiError> {
    let fields = parse_object(content)?;

    let task = required_str(&fields, "task")?;

    let date = match optional_str(&fields, "date")? {
        Some(raw) => crate::utils::parse_date(&raw)
            .map_err(|e| AiError::Schema(format!("field `date` is not YYYY-MM-DD ({}): {}", raw, e)))?,
        None => reference_date,
    };

    let time: Option<NaiveTime> = match optional_str(&fields, "time")? {
        Some(raw) => Some(
            clock::parse(&raw)
                .map_err(|e| AiError::Schema(format!("field `time` is not HH:mm ({}): {}", raw, e)))?,
        ),
        None => None,
    };

    let location = optional_str(&fields, "location")?;

    Ok(TaskExtraction { task, date, time, location })
}

pub fn parse_note_reply(content: &str) -> Result<NoteExtraction, AiError> {
    let fields = parse_object(content)?;
    Ok(NoteExtraction {
        title: required_str(&fields, "title")?,
        content: required_str(&fields, "content")?,
    })
}

/// HTTP client bound to one settings snapshot
#[derive(Debug, Clone)]
pub struct AiClient {
    http: reqwest::Client,
    settings: Settings,
}

impl AiClient {
    /// Fails fast when no API key is configured
    pub fn new(settings: Settings) -> Result<Self, AiError> {
        if !settings.has_api_key() {
            return Err(AiError::MissingApiKey);
        }
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { http, settings })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }

    pub async fn extract_task(&self, text: &str, reference_date: NaiveDate) -> Result<TaskExtraction, AiError> {
        let request = task_request(&self.settings, text, reference_date);
        let content = self.complete(&request).await?;
        parse_task_reply(&content, reference_date)
    }

    pub async fn extract_note(&self, text: &str) -> Result<NoteExtraction, AiError> {
        let request = note_request(&self.settings, text);
        let content = self.complete(&request).await?;
        parse_note_reply(&content)
    }

    /// Send one chat request and return the reply text. Not retried.
    pub async fn complete(&self, request: &ChatRequest) -> Result<String, AiError> {
        let endpoint = self.endpoint();
        tracing::debug!(%endpoint, model = %request.model, "Sending chat completion request");

        let response = self.http
            .post(&endpoint)
            .bearer_auth(self.settings.api_key.trim())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Chat completion request rejected");
            return Err(AiError::Status { status: status.as_u16(), body });
        }

        let reply: ChatResponse = response.json().await?;
        reply_content(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            api_key: "sk-test".to_string(),
            base_url: "https://example.test/v1/".to_string(),
            model: "qwen-plus".to_string(),
        }
    }

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn task_request_carries_reference_date_and_json_mode() {
        let request = task_request(&settings(), "明天下午3点在会议室开会", reference());
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["model"], "qwen-plus");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][0]["content"].as_str().unwrap().ends_with("2026-10-19"));
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "明天下午3点在会议室开会");
    }

    #[test]
    fn note_request_uses_note_prompt() {
        let request = note_request(&settings(), "今天散步想到一个点子");
        assert_eq!(request.messages[0].content, NOTE_PROMPT);
        assert_eq!(request.messages.len(), 2);
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = AiClient::new(settings()).unwrap();
        assert_eq!(client.endpoint(), "https://example.test/v1/chat/completions");
    }

    #[test]
    fn client_requires_api_key() {
        let mut s = settings();
        s.api_key = "  ".to_string();
        assert!(matches!(AiClient::new(s), Err(AiError::MissingApiKey)));
    }

    #[test]
    fn full_task_reply_is_parsed() {
        let reply = r#"{"task":"开会","date":"2026-10-20","time":"15:00","location":"会议室"}"#;
        let parsed = parse_task_reply(reply, reference()).unwrap();
        assert_eq!(parsed.task, "开会");
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2026, 10, 20).unwrap());
        assert_eq!(parsed.time, clock::parse("15:00").ok());
        assert_eq!(parsed.location.as_deref(), Some("会议室"));
    }

    #[test]
    fn missing_date_defaults_to_reference_date() {
        let parsed = parse_task_reply(r#"{"task":"下午整理书桌"}"#, reference()).unwrap();
        assert_eq!(parsed.date, reference());
        assert_eq!(parsed.time, None);
        assert_eq!(parsed.location, None);

        let parsed = parse_task_reply(r#"{"task":"x","date":"","time":"","location":""}"#, reference()).unwrap();
        assert_eq!(parsed.date, reference());
        assert_eq!(parsed.time, None);
        assert_eq!(parsed.location, None);
    }

    #[test]
    fn non_json_reply_is_an_error() {
        let err = parse_task_reply("好的，已经帮你记下了", reference()).unwrap_err();
        assert!(matches!(err, AiError::InvalidJson(_)));
        let err = parse_note_reply("```json\n{").unwrap_err();
        assert!(matches!(err, AiError::InvalidJson(_)));
    }

    #[test]
    fn schema_mismatches_are_rejected() {
        assert!(matches!(parse_task_reply("[]", reference()), Err(AiError::Schema(_))));
        assert!(matches!(parse_task_reply(r#"{"date":"2026-10-20"}"#, reference()), Err(AiError::Schema(_))));
        assert!(matches!(parse_task_reply(r#"{"task":1}"#, reference()), Err(AiError::Schema(_))));
        assert!(matches!(parse_task_reply(r#"{"task":"x","date":"明天"}"#, reference()), Err(AiError::Schema(_))));
        assert!(matches!(parse_task_reply(r#"{"task":"x","time":"下午"}"#, reference()), Err(AiError::Schema(_))));
        assert!(matches!(parse_note_reply(r#"{"title":"只有标题"}"#), Err(AiError::Schema(_))));
    }

    #[test]
    fn note_reply_is_parsed() {
        let parsed = parse_note_reply(r#"{"title":"散步的灵感","content":"第一段。\n\n第二段。"}"#).unwrap();
        assert_eq!(parsed.title, "散步的灵感");
        assert_eq!(parsed.content, "第一段。\n\n第二段。");
    }

    #[test]
    fn empty_reply_content_is_an_error() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[{"message":{"content":""}}]}"#).unwrap();
        assert!(matches!(reply_content(response), Err(AiError::EmptyContent)));

        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(reply_content(response), Err(AiError::EmptyContent)));

        let response: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":"{\"task\":\"a\"}"}}]}"#).unwrap();
        assert_eq!(reply_content(response).unwrap(), r#"{"task":"a"}"#);
    }
}
