//! OpenAI-compatible chat-completion client.
//!
//! Sends `POST {base_url}/chat/completions` with bearer auth and returns
//! the first choice's message content. Works against any endpoint that
//! speaks the same wire format.
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{ChatClient, ChatMessage, GenerationError};
use crate::config::GenerationConfig;

/// Longest body excerpt kept in an API error.
const MAX_ERROR_BODY: usize = 500;

pub struct OpenAiChatClient {
    api_key: String,
    endpoint: String,
    model: String,
    max_retries: u32,
    backoff: Duration,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(api_key: &str, config: &GenerationConfig) -> Result<Self, GenerationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_http_client(api_key, config, client))
    }

    /// Use a caller-built HTTP client (proxy, TLS or timeout overrides).
    pub fn with_http_client(
        api_key: &str,
        config: &GenerationConfig,
        client: reqwest::blocking::Client,
    ) -> Self {
        Self {
            api_key: api_key.to_string(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
            client,
        }
    }

    fn send_once(&self, body: &serde_json::Value) -> Result<String, GenerationError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .map_err(map_reqwest_error)?;

        let status = resp.status();
        let text = resp.text().map_err(map_reqwest_error)?;

        if !status.is_success() {
            let mut excerpt = text;
            if excerpt.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !excerpt.is_char_boundary(cut) {
                    cut -= 1;
                }
                excerpt.truncate(cut);
            }
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body: excerpt,
            });
        }

        parse_completion(&text)
    }
}

impl ChatClient for OpenAiChatClient {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
        });

        let mut attempt = 0u32;
        loop {
            match self.send_once(&body) {
                Ok(answer) => return Ok(answer),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff.saturating_mul(2u32.saturating_pow(attempt));
                    warn!(attempt = attempt + 1, ?delay, "chat completion failed, retrying: {e}");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Transport(e.to_string())
    }
}

/// Extract the first choice's text from a chat-completion response body.
fn parse_completion(body: &str) -> Result<String, GenerationError> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::Malformed(e.to_string()))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(GenerationError::EmptyResponse)?;

    debug!(chars = content.len(), "chat completion received");
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Use irsdk."}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "Use irsdk.");
    }

    #[test]
    fn test_parse_completion_empty() {
        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(GenerationError::EmptyResponse)
        ));
        assert!(matches!(
            parse_completion(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#),
            Err(GenerationError::EmptyResponse)
        ));
        assert!(matches!(
            parse_completion(r#"{"choices":[{"message":{"content":"   "}}]}"#),
            Err(GenerationError::EmptyResponse)
        ));
    }

    #[test]
    fn test_parse_completion_malformed() {
        assert!(matches!(
            parse_completion("<html>bad gateway</html>"),
            Err(GenerationError::Malformed(_))
        ));
    }

    /// Serve `responses` one connection each, returning the request bodies.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut bodies = Vec::new();
            for (status, body) in responses {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream);
                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                    let lower = line.to_ascii_lowercase();
                    if let Some(v) = lower.strip_prefix("content-length:") {
                        content_length = v.trim().parse().unwrap();
                    }
                }
                let mut buf = vec![0u8; content_length];
                reader.read_exact(&mut buf).unwrap();
                bodies.push(String::from_utf8(buf).unwrap());

                let reply = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let mut stream = reader.into_inner();
                stream.write_all(reply.as_bytes()).unwrap();
                stream.flush().unwrap();
            }
            bodies
        });
        (format!("http://{addr}/v1"), handle)
    }

    fn local_client(api_key: &str, config: &GenerationConfig) -> OpenAiChatClient {
        let http = reqwest::blocking::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();
        OpenAiChatClient::with_http_client(api_key, config, http)
    }

    fn config(base_url: String, max_retries: u32) -> GenerationConfig {
        GenerationConfig {
            base_url,
            max_retries,
            backoff_ms: 1,
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn test_complete_round_trip() {
        let (url, server) = serve(vec![(
            200,
            r#"{"choices":[{"message":{"role":"assistant","content":"42"}}]}"#,
        )]);
        let client = local_client("sk-test", &config(url, 0));

        let answer = client
            .complete(&[ChatMessage::system("sys"), ChatMessage::user("question")])
            .unwrap();
        assert_eq!(answer, "42");

        let bodies = server.join().unwrap();
        let sent: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
        assert_eq!(sent["model"], GenerationConfig::default().model);
        assert_eq!(sent["messages"][1]["content"], "question");
        assert_eq!(sent["messages"][0]["role"], "system");
    }

    #[test]
    fn test_no_retry_by_default() {
        let (url, server) = serve(vec![(503, r#"{"error":"overloaded"}"#)]);
        let client = local_client("sk-test", &config(url, 0));

        match client.complete(&[ChatMessage::user("q")]) {
            Err(GenerationError::Api { status, .. }) => assert_eq!(status, 503),
            other => panic!("expected API error, got {other:?}"),
        }
        assert_eq!(server.join().unwrap().len(), 1);
    }

    #[test]
    fn test_retries_transient_when_enabled() {
        let (url, server) = serve(vec![
            (503, r#"{"error":"overloaded"}"#),
            (200, r#"{"choices":[{"message":{"content":"ok"}}]}"#),
        ]);
        let client = local_client("sk-test", &config(url, 2));

        assert_eq!(client.complete(&[ChatMessage::user("q")]).unwrap(), "ok");
        assert_eq!(server.join().unwrap().len(), 2);
    }

    #[test]
    fn test_client_error_not_retried() {
        let (url, server) = serve(vec![(401, r#"{"error":"bad key"}"#)]);
        let client = local_client("sk-bad", &config(url, 3));

        assert!(matches!(
            client.complete(&[ChatMessage::user("q")]),
            Err(GenerationError::Api { status: 401, .. })
        ));
        assert_eq!(server.join().unwrap().len(), 1);
    }
}
