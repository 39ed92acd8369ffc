//! Engine wire-format integration tests
//!
//! Each engine is pointed at a `wiremock` server replaying the payloads
//! the real inference server would send.
//!
//! # wiremock body helpers
//!
//! Use `set_body_raw(bytes, mime)` for SSE and NDJSON responses so the
//! `Content-Type` is exact; `set_body_json` is fine for plain JSON.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lexai::config::{Framework, GenerationConfig, VariantConfig};
use lexai::engines::{
    generate_reply, stream_reply, Engine, HfEngine, Message, MlxEngine, OllamaEngine, StreamChunk,
    VllmEngine,
};
use lexai::error::LexaiError;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn variant(framework: Framework, model: &str, server: &MockServer) -> VariantConfig {
    VariantConfig::new(framework, model).with_host(server.uri())
}

fn prompt() -> Vec<Message> {
    vec![
        Message::system("당신은 법률 전문가입니다."),
        Message::user("전세 계약 해지 방법은?"),
    ]
}

fn sse_body(frames: &[Value]) -> Vec<u8> {
    let mut body = String::new();
    for frame in frames {
        body.push_str(&format!("data: {}\n\n", frame));
    }
    body.push_str("data: [DONE]\n\n");
    body.into_bytes()
}

async fn collect(engine: Arc<dyn Engine>) -> Vec<StreamChunk> {
    stream_reply(engine, prompt())
        .await
        .expect("stream should start")
        .map(|chunk| chunk.expect("chunk should be ok"))
        .collect()
        .await
}

async fn last_request_body(server: &MockServer) -> Value {
    let requests = server.received_requests().await.expect("recording enabled");
    let request = requests.last().expect("at least one request");
    serde_json::from_slice(&request.body).expect("request body is json")
}

// ---------------------------------------------------------------------------
// vLLM
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_vllm_generate_uses_adapter_as_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "<think>검토</think>\n해지 통지를 하세요."}}],
            "usage": {"prompt_tokens": 30, "completion_tokens": 8, "total_tokens": 38}
        })))
        .mount(&server)
        .await;

    let mut config = variant(Framework::Vllm, "Qwen/Qwen3-1.7B", &server);
    config.adapter = Some("lexai".to_string());
    let engine = VllmEngine::new("finetuned", &config, GenerationConfig::default()).unwrap();

    let reply = generate_reply(&engine, &prompt()).await.unwrap();
    assert_eq!(reply.text, "해지 통지를 하세요.");
    assert_eq!(reply.thinking.as_deref(), Some("검토"));
    assert_eq!(reply.usage.map(|u| u.total_tokens), Some(38));

    let body = last_request_body(&server).await;
    assert_eq!(body["model"], "lexai");
    assert_eq!(body["max_tokens"], 8192);
    assert_eq!(body["stream"], false);
    assert_eq!(body["messages"][0]["role"], "system");
}

#[tokio::test]
async fn test_vllm_stream_strips_thinking_and_reports_usage() {
    let server = MockServer::start().await;
    let frames = [
        json!({"choices": [{"delta": {"role": "assistant"}}]}),
        json!({"choices": [{"delta": {"content": "<thi"}}]}),
        json!({"choices": [{"delta": {"content": "nk>고민 중</think>"}}]}),
        json!({"choices": [{"delta": {"content": "임대인에게 "}}]}),
        json!({"choices": [{"delta": {"content": "통지하세요."}}]}),
        json!({"choices": [], "usage": {"prompt_tokens": 12, "completion_tokens": 9, "total_tokens": 21}}),
    ];
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body(&frames), "text/event-stream"))
        .mount(&server)
        .await;

    let config = variant(Framework::Vllm, "Qwen/Qwen3-1.7B", &server);
    let engine = Arc::new(VllmEngine::new("baseline", &config, GenerationConfig::default()).unwrap());

    let chunks = collect(engine).await;
    assert!(chunks.iter().all(|c| !c.text.contains("<thi")));
    let finished: Vec<_> = chunks.iter().filter(|c| c.finished).collect();
    assert_eq!(finished.len(), 1);
    let last = chunks.last().unwrap();
    assert!(last.finished);
    assert_eq!(last.text, "임대인에게 통지하세요.");
    assert_eq!(last.thinking.as_deref(), Some("고민 중"));
    let usage = last.usage.unwrap();
    assert_eq!(usage.total_tokens, usage.prompt_tokens + usage.completion_tokens);
    assert_eq!(usage.total_tokens, 21);

    let body = last_request_body(&server).await;
    assert_eq!(body["stream"], true);
    assert_eq!(body["stream_options"]["include_usage"], true);
}

#[tokio::test]
async fn test_vllm_error_status_is_engine_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("CUDA out of memory"))
        .mount(&server)
        .await;

    let config = variant(Framework::Vllm, "Qwen/Qwen3-1.7B", &server);
    let engine = VllmEngine::new("baseline", &config, GenerationConfig::default()).unwrap();

    let err = generate_reply(&engine, &prompt()).await.unwrap_err();
    match err.downcast_ref::<LexaiError>() {
        Some(LexaiError::Engine(message)) => {
            assert!(message.contains("500"));
            assert!(message.contains("CUDA out of memory"));
        }
        other => panic!("expected engine error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_vllm_ping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let config = variant(Framework::Vllm, "Qwen/Qwen3-1.7B", &server);
    let engine = VllmEngine::new("baseline", &config, GenerationConfig::default()).unwrap();
    assert!(engine.ping().await.is_ok());
}

// ---------------------------------------------------------------------------
// MLX
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_mlx_sends_adapter_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "답변입니다."}}]
        })))
        .mount(&server)
        .await;

    let mut config = variant(Framework::Mlx, "mlx-community/Qwen3-1.7B-4bit", &server);
    config.adapter = Some("adapters/lexai".to_string());
    let engine = MlxEngine::new("finetuned", &config, GenerationConfig::default()).unwrap();

    let reply = generate_reply(&engine, &prompt()).await.unwrap();
    assert_eq!(reply.text, "답변입니다.");
    assert!(reply.usage.is_none());

    let body = last_request_body(&server).await;
    assert_eq!(body["model"], "mlx-community/Qwen3-1.7B-4bit");
    assert_eq!(body["adapters"], "adapters/lexai");
}

// ---------------------------------------------------------------------------
// Ollama
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_ollama_generate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "qwen3:1.7b",
            "message": {"role": "assistant", "content": "보증금을 돌려받을 수 있습니다.", "thinking": "판례 확인"},
            "done": true,
            "prompt_eval_count": 25,
            "eval_count": 11
        })))
        .mount(&server)
        .await;

    let config = variant(Framework::Ollama, "qwen3:1.7b", &server);
    let engine = OllamaEngine::new("baseline", &config, GenerationConfig::default()).unwrap();

    let reply = generate_reply(&engine, &prompt()).await.unwrap();
    assert_eq!(reply.text, "보증금을 돌려받을 수 있습니다.");
    assert_eq!(reply.thinking.as_deref(), Some("판례 확인"));
    assert_eq!(reply.usage.map(|u| u.total_tokens), Some(36));

    let body = last_request_body(&server).await;
    assert_eq!(body["model"], "qwen3:1.7b");
    assert_eq!(body["stream"], false);
    assert_eq!(body["options"]["num_predict"], 8192);
}

#[tokio::test]
async fn test_ollama_stream_ndjson() {
    let server = MockServer::start().await;
    let lines = [
        json!({"message": {"role": "assistant", "content": "", "thinking": "생각"}, "done": false}),
        json!({"message": {"role": "assistant", "content": "계약 "}, "done": false}),
        json!({"message": {"role": "assistant", "content": "해지"}, "done": false}),
        json!({"message": {"role": "assistant", "content": ""}, "done": true, "prompt_eval_count": 7, "eval_count": 2}),
    ];
    let body: String = lines.iter().map(|l| format!("{}\n", l)).collect();
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "application/x-ndjson"))
        .mount(&server)
        .await;

    let config = variant(Framework::Ollama, "qwen3:1.7b", &server);
    let engine = Arc::new(OllamaEngine::new("baseline", &config, GenerationConfig::default()).unwrap());

    let chunks = collect(engine).await;
    let last = chunks.last().unwrap();
    assert!(last.finished);
    assert_eq!(last.text, "계약 해지");
    assert_eq!(last.thinking.as_deref(), Some("생각"));
    assert_eq!(last.usage.map(|u| u.total_tokens), Some(9));
    assert_eq!(chunks.iter().filter(|c| c.finished).count(), 1);
}

#[tokio::test]
async fn test_ollama_stream_error_line() {
    let server = MockServer::start().await;
    let body = format!(
        "{}\n{}\n",
        json!({"message": {"role": "assistant", "content": "부분"}, "done": false}),
        json!({"error": "model 'lexai' not found"})
    );
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "application/x-ndjson"))
        .mount(&server)
        .await;

    let config = variant(Framework::Ollama, "lexai", &server);
    let engine = Arc::new(OllamaEngine::new("finetuned", &config, GenerationConfig::default()).unwrap());

    let items: Vec<_> = stream_reply(engine, prompt()).await.unwrap().collect().await;
    assert!(items[0].is_ok());
    let err = items.last().unwrap().as_ref().unwrap_err();
    assert!(err.to_string().contains("not found"));
    assert!(!items.iter().any(|i| matches!(i, Ok(c) if c.finished)));
}

// ---------------------------------------------------------------------------
// text-generation-inference
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_hf_generate_renders_chatml() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "generated_text": "통지하세요.<|im_end|>",
            "details": {
                "finish_reason": "stop_sequence",
                "generated_tokens": 5,
                "prefill": [{"id": 1, "text": "a"}, {"id": 2, "text": "b"}, {"id": 3, "text": "c"}]
            }
        })))
        .mount(&server)
        .await;

    let config = variant(Framework::Hf, "lexai-merged", &server);
    let engine = HfEngine::new("finetuned", &config, GenerationConfig::default()).unwrap();

    let reply = generate_reply(&engine, &prompt()).await.unwrap();
    assert_eq!(reply.text, "통지하세요.");
    let usage = reply.usage.unwrap();
    assert_eq!((usage.prompt_tokens, usage.completion_tokens), (3, 5));

    let body = last_request_body(&server).await;
    let inputs = body["inputs"].as_str().unwrap();
    assert!(inputs.contains("<|im_start|>system\n당신은 법률 전문가입니다.<|im_end|>"));
    assert!(inputs.ends_with("<|im_start|>assistant\n"));
    assert_eq!(body["parameters"]["do_sample"], false);
    assert_eq!(body["parameters"]["max_new_tokens"], 8192);
    assert!(body["parameters"].get("temperature").is_none());
}

#[tokio::test]
async fn test_hf_stream_skips_special_tokens() {
    let server = MockServer::start().await;
    let frames = [
        json!({"token": {"id": 1, "text": "보증금", "special": false}}),
        json!({"token": {"id": 2, "text": " 반환", "special": false}}),
        json!({"token": {"id": 3, "text": "<|im_end|>", "special": true},
               "generated_text": "보증금 반환",
               "details": {"generated_tokens": 3, "input_length": 14}}),
    ];
    let mut body = String::new();
    for frame in &frames {
        body.push_str(&format!("data:{}\n\n", frame));
    }
    Mock::given(method("POST"))
        .and(path("/generate_stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/event-stream"))
        .mount(&server)
        .await;

    let config = variant(Framework::Hf, "lexai-merged", &server);
    let engine = Arc::new(HfEngine::new("finetuned", &config, GenerationConfig::default()).unwrap());

    let chunks = collect(engine).await;
    let last = chunks.last().unwrap();
    assert!(last.finished);
    assert_eq!(last.text, "보증금 반환");
    assert_eq!(last.usage.map(|u| u.total_tokens), Some(17));
}
