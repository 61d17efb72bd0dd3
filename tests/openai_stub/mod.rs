use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct OpenAiStubConfig {
    pub expected_api_key: String,
    pub behavior: StubBehavior,
}

impl Default for OpenAiStubConfig {
    fn default() -> Self {
        Self {
            expected_api_key: "sk-stub".to_owned(),
            behavior: StubBehavior::Complete,
        }
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum StubBehavior {
    /// Fill every schema property with `"<description>的值"`.
    Complete,
    /// Like `Complete` but omit one top-level key.
    DropField(&'static str),
    /// Answer with a 500 and an OpenAI-style error body.
    ServerError,
    /// Answer 200 with message content that is not JSON.
    InvalidContent,
}

pub struct OpenAiStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Value>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OpenAiStub {
    pub fn spawn(config: OpenAiStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start openai stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post || path != "/v1/chat/completions" {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }

                let expected_auth = format!("Bearer {}", config.expected_api_key);
                let authorized = request
                    .headers()
                    .iter()
                    .any(|h| h.field.equiv("Authorization") && h.value.as_str() == expected_auth);
                if !authorized {
                    let _ = request.respond(json_response(
                        401,
                        &serde_json::json!({ "error": { "message": "invalid api key" } }),
                    ));
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }

                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json").with_status_code(400),
                        );
                        continue;
                    }
                };
                seen.lock().expect("stub request log").push(parsed.clone());

                if matches!(config.behavior, StubBehavior::ServerError) {
                    let _ = request.respond(json_response(
                        500,
                        &serde_json::json!({ "error": { "message": "stub upstream failure" } }),
                    ));
                    continue;
                }

                let Some(schema) = parsed.pointer("/response_format/json_schema/schema") else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("missing json_schema")
                            .with_status_code(400),
                    );
                    continue;
                };

                let mut content = fill(schema);
                if let (StubBehavior::DropField(key), Value::Object(map)) =
                    (config.behavior, &mut content)
                {
                    map.remove(key);
                }
                let content = match config.behavior {
                    StubBehavior::InvalidContent => "当然，以下是提取结果：{".to_owned(),
                    _ => content.to_string(),
                };

                let response_body = serde_json::json!({
                    "id": "chatcmpl_stub",
                    "object": "chat.completion",
                    "model": parsed.get("model").cloned().unwrap_or(Value::String("stub-model".to_owned())),
                    "choices": [
                        {
                            "index": 0,
                            "message": {
                                "role": "assistant",
                                "content": content,
                                "refusal": null
                            },
                            "finish_reason": "stop"
                        }
                    ]
                });
                let _ = request.respond(json_response(200, &response_body));
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Request bodies received so far.
    #[allow(dead_code)]
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().expect("stub request log").clone()
    }

    /// Provider store YAML pointing at this stub.
    #[allow(dead_code)]
    pub fn providers_yaml(&self, provider: &str, api_key: &str) -> String {
        format!(
            "{provider}:\n  api_key: {api_key}\n  base_url: {}\n",
            self.base_url
        )
    }
}

impl Drop for OpenAiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn json_response(status: u16, body: &Value) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("build header");
    tiny_http::Response::from_string(body.to_string())
        .with_status_code(status)
        .with_header(header)
}

fn fill(schema: &Value) -> Value {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Value::String("未提及".to_owned());
    };
    let mut out = Map::new();
    for (key, prop) in properties {
        let value = if prop.get("type").and_then(Value::as_str) == Some("object") {
            fill(prop)
        } else {
            let label = prop
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or(key.as_str());
            Value::String(format!("{label}的值"))
        };
        out.insert(key.clone(), value);
    }
    Value::Object(out)
}
