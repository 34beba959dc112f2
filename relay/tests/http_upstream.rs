use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use relay::{
    GenerationRequest, HttpUpstream, Relay, RelayConfig, RelayError, RelayEvent, Termination,
    Upstream,
};
use std::sync::Arc;
use tokio_stream::StreamExt;

fn relay_for(base_url: String) -> Relay {
    let config = RelayConfig {
        base_url,
        ..RelayConfig::default()
    };
    let upstream = Arc::new(HttpUpstream::new(&config).unwrap());
    Relay::new(config, upstream)
}

#[tokio::test]
async fn streams_ndjson_body() {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/chat");
        then.status(200)
            .header("content-type", "application/x-ndjson")
            .body(concat!(
                "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
                "{\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
                "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
            ));
    });

    let relay = relay_for(server.base_url());
    let request = relay.validate(&GenerationRequest::new("hi")).unwrap();
    let mut stream = relay.submit(&request).await.unwrap();
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        text.push_str(event.content().unwrap());
    }
    assert_eq!(text, "Hello");
    assert_eq!(stream.finish().await, Termination::Completed);
    mock.assert();
}

#[tokio::test]
async fn sends_ollama_chat_payload() {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/chat")
            .json_body_partial(r#"{"model":"llama3","stream":true,"keep_alive":"10m","options":{"num_predict":512}}"#);
        then.status(200).body("{\"done\":true}\n");
    });

    let relay = relay_for(server.base_url());
    let request = relay
        .validate(&GenerationRequest::new("hi").model("llama3").max_tokens(512))
        .unwrap();
    assert_eq!(relay.complete(&request).await.unwrap(), "");
    mock.assert();
}

#[tokio::test]
async fn error_status_becomes_error_event() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/api/chat");
        then.status(404)
            .header("content-type", "application/json")
            .body("{\"error\":\"model 'nope' not found\"}");
    });

    let relay = relay_for(server.base_url());
    let request = relay.validate(&GenerationRequest::new("hi").model("nope")).unwrap();
    let mut stream = relay.submit(&request).await.unwrap();
    let events: Vec<RelayEvent> = (&mut stream).collect().await;
    assert_eq!(
        events,
        vec![RelayEvent::Error("upstream returned 404: model 'nope' not found".into())]
    );
    assert_eq!(stream.finish().await, Termination::UpstreamError);
}

#[tokio::test]
async fn connection_refused_is_unreachable() {
    let relay = relay_for("http://127.0.0.1:9".into());
    let request = relay.validate(&GenerationRequest::new("hi")).unwrap();
    let err = relay.submit(&request).await.err().unwrap();
    assert!(matches!(err, RelayError::UpstreamUnreachable(_)), "{err}");
    assert!(!relay.upstream_reachable().await);
}

#[tokio::test]
async fn health_probe_hits_tags() {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(GET).path("/api/tags");
        then.status(200).body("{\"models\":[]}");
    });
    let config = RelayConfig {
        base_url: server.base_url(),
        ..RelayConfig::default()
    };
    let upstream = HttpUpstream::new(&config).unwrap();
    assert!(upstream.is_reachable().await);
    mock.assert();
}
