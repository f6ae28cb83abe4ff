//! Hosted model backend.
//!
//! Each model name is routed to its vendor (see [`crate::providers::route`]);
//! the request and response shapes follow that vendor's wire format.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::parser::extract_guess;
use crate::core::types::{GameConfig, ProviderDescriptor, ProviderMode, TokenUsage, TurnRecord};
use crate::io::config::ApiSection;
use crate::io::prompt::{PromptBuilder, PromptStyle};
use crate::providers::route::{ANTHROPIC_VERSION, Route, Wire, resolve_route};
use crate::providers::{GuessProvider, ProviderError, ProviderReply};

const RESCUE_MAX_TOKENS: u32 = 100;

/// Assistant text plus usage from one completion.
#[derive(Debug, Clone, PartialEq)]
struct Completion {
    content: String,
    tokens: TokenUsage,
}

/// One failed HTTP exchange.
#[derive(Debug)]
struct CallFailure {
    message: String,
    retriable: bool,
}

/// A resolved route plus the key sent with it.
#[derive(Debug, Clone)]
struct Endpoint {
    route: Route,
    api_key: Option<String>,
}

impl Endpoint {
    fn from_env(route: Route) -> Self {
        let api_key = std::env::var(&route.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!(vendor = route.vendor, env = %route.api_key_env, "api key not set, sending unauthenticated requests");
        }
        Self { route, api_key }
    }
}

/// Calls the routed vendor endpoint once per guess.
pub struct ApiProvider {
    client: Client,
    /// Name as given on the command line; recorded in results.
    model: String,
    target: Endpoint,
    parser: Endpoint,
    settings: ApiSection,
    prompts: PromptBuilder,
}

impl ApiProvider {
    /// Build a provider whose keys are read from each route's key variable.
    pub fn new(model: impl Into<String>, game: GameConfig, settings: ApiSection) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .context("build http client")?;
        let model = model.into();
        let target = Endpoint::from_env(resolve_route(&model, &settings));
        let parser = if settings.parser_fallback {
            Endpoint::from_env(resolve_route(&settings.parser_model, &settings))
        } else {
            Endpoint {
                route: resolve_route(&settings.parser_model, &settings),
                api_key: None,
            }
        };
        Ok(Self::from_parts(client, model, target, parser, game, settings))
    }

    /// Build a provider that sends `api_key` to every route.
    pub fn with_client(
        client: Client,
        api_key: Option<String>,
        model: impl Into<String>,
        game: GameConfig,
        settings: ApiSection,
    ) -> Self {
        let model = model.into();
        let target = Endpoint {
            route: resolve_route(&model, &settings),
            api_key: api_key.clone(),
        };
        let parser = Endpoint {
            route: resolve_route(&settings.parser_model, &settings),
            api_key,
        };
        Self::from_parts(client, model, target, parser, game, settings)
    }

    fn from_parts(
        client: Client,
        model: String,
        target: Endpoint,
        parser: Endpoint,
        game: GameConfig,
        settings: ApiSection,
    ) -> Self {
        debug!(%model, vendor = target.route.vendor, url = %target.route.url(), "api route");
        Self {
            client,
            model,
            target,
            parser,
            settings,
            prompts: PromptBuilder::new(game, PromptStyle::Strict),
        }
    }

    /// POST a request, retrying transient failures with exponential backoff.
    fn chat(
        &self,
        endpoint: &Endpoint,
        system: Option<&str>,
        user: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<Completion, ProviderError> {
        let body = endpoint
            .route
            .request_body(system, user, temperature, max_tokens);
        let attempts = self.settings.max_attempts.max(1);
        let initial = Duration::from_millis(self.settings.retry_initial_delay_ms);
        let mut attempt = 0u32;
        loop {
            match self.send_once(endpoint, &body) {
                Ok(completion) => return Ok(completion),
                Err(failure) if failure.retriable && attempt + 1 < attempts => {
                    let delay = backoff_delay(initial, attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %failure.message, "transient api failure, backing off");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(failure) => {
                    warn!(attempt, error = %failure.message, "api call failed");
                    return Err(ProviderError::Request(failure.message));
                }
            }
        }
    }

    fn send_once(&self, endpoint: &Endpoint, body: &Value) -> Result<Completion, CallFailure> {
        let url = endpoint.route.url();
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &endpoint.api_key {
            request = match endpoint.route.wire {
                Wire::OpenAiChat => request.bearer_auth(key),
                Wire::AnthropicMessages => request
                    .header("x-api-key", key)
                    .header("anthropic-version", ANTHROPIC_VERSION),
                Wire::GeminiGenerate => request.header("x-goog-api-key", key),
            };
        } else if endpoint.route.wire == Wire::AnthropicMessages {
            request = request.header("anthropic-version", ANTHROPIC_VERSION);
        }
        let response = request.send().map_err(|err| CallFailure {
            retriable: err.is_timeout() || err.is_connect(),
            message: format!("request {url}: {err}"),
        })?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(CallFailure {
                message: format!("HTTP {status}: {}", detail.trim()),
                retriable: is_retriable_status(status),
            });
        }
        let value: Value = response.json().map_err(|err| CallFailure {
            message: format!("decode response: {err}"),
            retriable: false,
        })?;
        let (content, tokens) = endpoint.route.read_reply(&value);
        Ok(Completion { content, tokens })
    }

    /// Ask the parser model to restate the guess. Failures count as "no guess".
    fn rescue(&self, raw: &str) -> (Option<Vec<Value>>, TokenUsage) {
        let prompt = match self.prompts.rescue(raw) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(%err, "render rescue prompt");
                return (None, TokenUsage::default());
            }
        };
        match self.chat(&self.parser, None, &prompt, 0.0, RESCUE_MAX_TOKENS) {
            Ok(completion) => (extract_guess(&completion.content), completion.tokens),
            Err(err) => {
                warn!(%err, parser_model = %self.settings.parser_model, "parser fallback failed");
                (None, TokenUsage::default())
            }
        }
    }
}

impl GuessProvider for ApiProvider {
    #[instrument(skip_all, fields(model = %self.model, retry_count = retry_count))]
    fn next_guess(
        &mut self,
        history: &[TurnRecord],
        retry_count: u32,
    ) -> Result<ProviderReply, ProviderError> {
        let system = self.prompts.system()?;
        let user = self.prompts.turn(history, retry_count)?;
        let completion = self.chat(
            &self.target,
            Some(&system),
            &user,
            self.settings.temperature,
            self.settings.max_tokens,
        )?;

        let mut tokens = completion.tokens;
        let mut guess = extract_guess(&completion.content);
        if guess.is_none() && self.settings.parser_fallback {
            debug!("local parse failed, asking parser model");
            let (rescued, usage) = self.rescue(&completion.content);
            tokens += usage;
            guess = rescued;
        }
        Ok(ProviderReply::with_guess(
            completion.content,
            guess,
            Some(tokens),
        ))
    }

    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            mode: ProviderMode::Api,
            model: self.model.clone(),
            temperature: Some(self.settings.temperature),
            max_tokens: Some(self.settings.max_tokens),
            parser_model: self
                .settings
                .parser_fallback
                .then(|| self.settings.parser_model.clone()),
        }
    }
}

/// Rate limits and server errors are worth another attempt.
fn is_retriable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// `initial * 2^attempt`, saturating.
fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    initial.saturating_mul(1u32 << attempt.min(16))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};

    fn completion_body(content: &str, input: u64, output: u64) -> String {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": input, "completion_tokens": output},
        })
        .to_string()
    }

    /// Serve canned `(status, body)` responses, one per connection, and return the raw requests.
    fn serve(responses: Vec<(u16, String)>) -> (String, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().expect("accept");
                requests.push(read_request(&mut stream));
                let reply = format!(
                    "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(reply.as_bytes()).expect("write reply");
            }
            requests
        });
        (format!("http://{addr}/v1"), handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).expect("read request");
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn settings(base_url: &str) -> ApiSection {
        ApiSection {
            base_url: base_url.to_string(),
            retry_initial_delay_ms: 1,
            ..ApiSection::default()
        }
    }

    fn provider(settings: ApiSection) -> ApiProvider {
        provider_for("gpt-test", settings)
    }

    fn provider_for(model: &str, settings: ApiSection) -> ApiProvider {
        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("client");
        ApiProvider::with_client(
            client,
            Some("sk-test".to_string()),
            model,
            GameConfig::default(),
            settings,
        )
    }

    #[test]
    fn transient_statuses_are_retriable() {
        assert!(is_retriable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retriable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retriable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retriable_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let initial = Duration::from_millis(1000);
        assert_eq!(backoff_delay(initial, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(initial, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(initial, 2), Duration::from_secs(4));
    }

    #[test]
    fn descriptor_reports_parser_model_only_with_fallback() {
        let mut cfg = settings("http://localhost");
        assert_eq!(provider(cfg.clone()).descriptor().parser_model, None);
        cfg.parser_fallback = true;
        let descriptor = provider(cfg).descriptor();
        assert_eq!(descriptor.mode, ProviderMode::Api);
        assert_eq!(descriptor.model, "gpt-test");
        assert_eq!(descriptor.temperature, Some(0.7));
        assert_eq!(descriptor.max_tokens, Some(500));
        assert_eq!(descriptor.parser_model.as_deref(), Some("gpt-3.5-turbo"));
    }

    #[test]
    fn next_guess_posts_chat_request_and_parses_reply() {
        let (base_url, server) = serve(vec![(
            200,
            completion_body("{\"guess\": [0, 1, 2, 3]}", 50, 8),
        )]);
        let mut api = provider(settings(&base_url));

        let reply = api.next_guess(&[], 0).expect("reply");
        assert!(reply.parsed);
        assert_eq!(reply.guess, Some(vec![json!(0), json!(1), json!(2), json!(3)]));
        assert_eq!(
            reply.tokens,
            Some(TokenUsage {
                input: 50,
                output: 8
            })
        );

        let requests = server.join().expect("server");
        let request = requests[0].to_lowercase();
        assert!(request.starts_with("post /v1/chat/completions"));
        assert!(request.contains("authorization: bearer sk-test"));
        assert!(requests[0].contains("\"model\":\"gpt-test\""));
        assert!(requests[0].contains("Make your first guess."));
    }

    #[test]
    fn prefixed_model_is_routed_and_recorded_verbatim() {
        let (base_url, server) = serve(vec![(200, completion_body("{\"guess\": [0, 1, 2, 3]}", 5, 1))]);
        let mut cfg = settings("http://unused.invalid/v1");
        cfg.deepseek.base_url = base_url;
        let mut api = provider_for("deepseek/deepseek-chat", cfg);

        assert!(api.next_guess(&[], 0).expect("reply").parsed);
        assert_eq!(api.descriptor().model, "deepseek/deepseek-chat");
        let requests = server.join().expect("server");
        assert!(requests[0].to_lowercase().starts_with("post /v1/chat/completions"));
        assert!(requests[0].contains("\"model\":\"deepseek-chat\""));
    }

    #[test]
    fn anthropic_models_use_messages_api() {
        let body = json!({
            "content": [{"type": "text", "text": "{\"guess\": [3, 2, 1, 0]}"}],
            "usage": {"input_tokens": 40, "output_tokens": 6},
        })
        .to_string();
        let (base_url, server) = serve(vec![(200, body)]);
        let mut cfg = settings("http://unused.invalid/v1");
        cfg.anthropic.base_url = base_url;
        let mut api = provider_for("claude-3-5-sonnet-20241022", cfg);

        let reply = api.next_guess(&[], 0).expect("reply");
        assert_eq!(reply.guess, Some(vec![json!(3), json!(2), json!(1), json!(0)]));
        assert_eq!(reply.tokens, Some(TokenUsage { input: 40, output: 6 }));

        let requests = server.join().expect("server");
        let request = requests[0].to_lowercase();
        assert!(request.starts_with("post /v1/messages"));
        assert!(request.contains("x-api-key: sk-test"));
        assert!(request.contains("anthropic-version: 2023-06-01"));
        assert!(!request.contains("authorization:"));
        assert!(requests[0].contains("\"system\":"));
    }

    #[test]
    fn gemini_models_use_generate_content() {
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "{\"guess\": [1, 1, 2, 2]}"}]}}],
            "usageMetadata": {"promptTokenCount": 30, "candidatesTokenCount": 4},
        })
        .to_string();
        let (base_url, server) = serve(vec![(200, body)]);
        let mut cfg = settings("http://unused.invalid/v1");
        cfg.gemini.base_url = base_url;
        let mut api = provider_for("gemini/gemini-1.5-pro", cfg);

        let reply = api.next_guess(&[], 0).expect("reply");
        assert!(reply.parsed);
        assert_eq!(reply.tokens, Some(TokenUsage { input: 30, output: 4 }));

        let requests = server.join().expect("server");
        let request = requests[0].to_lowercase();
        assert!(request.starts_with("post /v1/models/gemini-1.5-pro:generatecontent"));
        assert!(request.contains("x-goog-api-key: sk-test"));
        assert!(requests[0].contains("\"systemInstruction\""));
    }

    #[test]
    fn server_errors_are_retried_then_succeed() {
        let (base_url, server) = serve(vec![
            (503, "{\"error\": \"busy\"}".to_string()),
            (200, completion_body("{\"guess\": [5, 5, 5, 5]}", 1, 1)),
        ]);
        let mut api = provider(settings(&base_url));
        let reply = api.next_guess(&[], 0).expect("reply");
        assert!(reply.parsed);
        assert_eq!(server.join().expect("server").len(), 2);
    }

    #[test]
    fn client_errors_fail_without_retry() {
        let (base_url, server) = serve(vec![(401, "{\"error\": \"bad key\"}".to_string())]);
        let mut api = provider(settings(&base_url));
        let err = api.next_guess(&[], 0).unwrap_err();
        assert!(matches!(err, ProviderError::Request(ref msg) if msg.contains("401")));
        assert_eq!(server.join().expect("server").len(), 1);
    }

    #[test]
    fn parser_fallback_rescues_prose_and_adds_tokens() {
        let (base_url, server) = serve(vec![
            (200, completion_body("I will go with red green blue red.", 30, 10)),
            (200, completion_body("{\"guess\": [1, 2, 3, 1]}", 20, 5)),
        ]);
        let mut cfg = settings(&base_url);
        cfg.parser_fallback = true;
        let mut api = provider(cfg);

        let reply = api.next_guess(&[], 0).expect("reply");
        assert!(reply.parsed);
        assert_eq!(reply.raw_response, "I will go with red green blue red.");
        assert_eq!(reply.guess, Some(vec![json!(1), json!(2), json!(3), json!(1)]));
        assert_eq!(
            reply.tokens,
            Some(TokenUsage {
                input: 50,
                output: 15
            })
        );
        let requests = server.join().expect("server");
        assert!(requests[1].contains("\"model\":\"gpt-3.5-turbo\""));
        assert!(requests[1].contains("Extract the Mastermind guess"));
    }

    #[test]
    fn unparseable_reply_without_fallback_is_not_an_error() {
        let (base_url, server) = serve(vec![(200, completion_body("no idea", 3, 2))]);
        let mut api = provider(settings(&base_url));
        let reply = api.next_guess(&[], 0).expect("reply");
        assert!(!reply.parsed);
        assert_eq!(reply.error.as_deref(), Some(crate::providers::PARSE_FAILURE));
        server.join().expect("server");
    }
}
