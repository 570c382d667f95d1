use std::sync::{Arc, Mutex};

use penguiflow_llm::{CallRequest, ChatMessage, FinishReason, LlmClient, MockLlmClient};

#[tokio::test]
async fn mock_client_plays_back_script_in_order() {
    let client = MockLlmClient::with_responses(vec!["first", "second"]);

    let first = client
        .call(CallRequest::new(vec![ChatMessage::user("hi")]), None)
        .await
        .unwrap();
    assert_eq!(first.content, "first");
    assert_eq!(first.finish_reason, FinishReason::Stop);

    let second = client
        .call(CallRequest::new(vec![ChatMessage::user("again")]), None)
        .await
        .unwrap();
    assert_eq!(second.content, "second");
}

#[tokio::test]
async fn mock_client_errors_when_script_exhausted() {
    let client = MockLlmClient::with_responses(vec!["only"]);
    client
        .call(CallRequest::new(vec![ChatMessage::user("hi")]), None)
        .await
        .unwrap();

    let err = client
        .call(CallRequest::new(vec![ChatMessage::user("hi")]), None)
        .await;
    assert!(err.is_err());
}

#[tokio::test]
async fn mock_client_streams_chunk_when_requested() {
    let client = MockLlmClient::with_responses(vec!["streamed content"]);
    let received = Arc::new(Mutex::new(String::new()));
    let sink = received.clone();

    let request = CallRequest::new(vec![ChatMessage::user("hi")]).with_stream(true);
    client
        .call(
            request,
            Some(Arc::new(move |chunk: &str| {
                sink.lock().unwrap().push_str(chunk);
            })),
        )
        .await
        .unwrap();

    assert_eq!(*received.lock().unwrap(), "streamed content");
}

#[tokio::test]
async fn call_request_builder_sets_fields() {
    let request = CallRequest::new(vec![ChatMessage::system("sys"), ChatMessage::user("hi")])
        .with_temperature(0.7)
        .with_max_tokens(256)
        .with_tools(vec![serde_json::json!({"name": "search"})]);

    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.temperature, 0.7);
    assert_eq!(request.max_tokens, 256);
    assert!(request.tools.is_some());
}
