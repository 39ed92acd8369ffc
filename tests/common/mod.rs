use axum::body::Body;
use axum::http::{Request, Response};
use lexai::chat::ChatService;
use lexai::config::Config;
use lexai::engines::{Engine, ScriptedEngine};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

#[allow(dead_code)]
pub fn test_config(log_dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.log_dir = log_dir.to_path_buf();
    config.chat.warm_up = false;
    config
}

/// Chat service whose configured variants all answer from scripted engines
#[allow(dead_code)]
pub fn scripted_service(engines: Vec<ScriptedEngine>) -> (ChatService, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let service =
        ChatService::from_config(test_config(tmp.path())).expect("failed to create chat service");
    for engine in engines {
        let variant = engine.info().variant.clone();
        service
            .registry()
            .register(&variant, Arc::new(engine), false)
            .expect("failed to register engine");
    }
    let variants: Vec<String> = service.config().variants.keys().cloned().collect();
    for variant in variants {
        if !service.registry().is_loaded(&variant) {
            service
                .registry()
                .register(&variant, Arc::new(ScriptedEngine::new(variant.clone())), false)
                .expect("failed to register engine");
        }
    }
    (service, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("failed to build request")
}

#[allow(dead_code)]
pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("failed to build request")
}

#[allow(dead_code)]
pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    String::from_utf8(bytes.to_vec()).expect("body is not utf-8")
}

#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).expect("body is not json")
}

/// `data:` payloads of a server-sent event body, in order
#[allow(dead_code)]
pub fn sse_data(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim_start().to_string())
        .collect()
}

/// Parsed JSON events of an SSE body, excluding the `[DONE]` marker
#[allow(dead_code)]
pub fn sse_events(body: &str) -> Vec<Value> {
    sse_data(body)
        .iter()
        .filter(|data| data.as_str() != "[DONE]")
        .map(|data| serde_json::from_str(data).expect("event is not json"))
        .collect()
}
