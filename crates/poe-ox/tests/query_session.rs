use std::time::Duration;

use futures_util::StreamExt;
use poe_ox::{
    Poe, PoeRequestError, ProtocolMessage, QueryOutcome, QueryRequest, RetryPolicy, SessionUpdate,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SSE_OK: &str = "event: text\ndata: {\"text\": \"Hello\"}\n\nevent: done\ndata: {}\n\n";

fn client(server: &MockServer, base_delay: Duration) -> Poe {
    Poe::builder()
        .base_url(server.uri())
        .retry_policy(RetryPolicy::new(2, base_delay))
        .build()
}

fn request() -> QueryRequest {
    QueryRequest::builder()
        .message(ProtocolMessage::user("hi"))
        .conversation_id("conv")
        .message_id("msg-1")
        .api_key("test-key")
        .build()
}

async fn drain(client: &Poe, cancel: CancellationToken) -> Vec<SessionUpdate> {
    client
        .stream_query("TestBot", &request(), "test-key", cancel)
        .collect()
        .await
}

#[tokio::test]
async fn test_query_sends_expected_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/TestBot"))
        .and(header("authorization", "Bearer test-key"))
        .and(header("accept", "text/event-stream"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(serde_json::json!({
            "version": "1.1",
            "type": "query",
            "api_key": "test-key",
            "query": [{"role": "user", "content": "hi"}]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(SSE_OK),
        )
        .expect(1)
        .mount(&server)
        .await;

    let events = client(&server, Duration::from_millis(10))
        .query("TestBot", &request(), "test-key", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event, "text");
    assert_eq!(events[0].data, "{\"text\": \"Hello\"}");
    assert_eq!(events[1].event, "done");
}

#[tokio::test]
async fn test_retry_after_server_error_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/TestBot"))
        .respond_with(ResponseTemplate::new(500).set_body_string("temporarily broken"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/TestBot"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(SSE_OK),
        )
        .with_priority(2)
        .mount(&server)
        .await;

    let updates = drain(&client(&server, Duration::from_millis(10)), CancellationToken::new()).await;

    assert!(matches!(
        updates.first(),
        Some(SessionUpdate::AttemptDiscarded { attempt: 1, .. })
    ));
    let events: Vec<_> = updates
        .iter()
        .filter_map(|update| match update {
            SessionUpdate::Event(event) => Some(event.event.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(events, vec!["text", "done"]);
    assert!(matches!(
        updates.last(),
        Some(SessionUpdate::Finished(QueryOutcome::Succeeded { attempts: 2 }))
    ));
}

#[tokio::test]
async fn test_all_attempts_fail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/TestBot"))
        .respond_with(ResponseTemplate::new(503).set_body_string("{\"error\":{\"message\":\"overloaded\"}}"))
        .expect(3)
        .mount(&server)
        .await;

    let updates = drain(&client(&server, Duration::from_millis(10)), CancellationToken::new()).await;

    let discarded = updates
        .iter()
        .filter(|update| matches!(update, SessionUpdate::AttemptDiscarded { .. }))
        .count();
    assert_eq!(discarded, 3);

    match updates.last() {
        Some(SessionUpdate::Finished(QueryOutcome::Failed(PoeRequestError::RetriesExhausted {
            bot,
            attempts,
            source,
        }))) => {
            assert_eq!(bot, "TestBot");
            assert_eq!(*attempts, 3);
            assert_eq!(source.status(), Some(503));
            assert!(source.to_string().contains("overloaded"));
        }
        other => panic!("unexpected final update: {other:?}"),
    }
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SSE_OK))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client(&server, Duration::from_millis(10))
        .query("TestBot", &request(), "test-key", cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PoeRequestError::Cancelled));
}

#[tokio::test]
async fn test_cancel_during_backoff_skips_remaining_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client(&server, Duration::from_secs(30));
    let cancel = CancellationToken::new();
    let mut session = client.stream_query("TestBot", &request(), "test-key", cancel.clone());

    let first = session.next().await;
    assert!(matches!(
        first,
        Some(SessionUpdate::AttemptDiscarded { attempt: 1, .. })
    ));

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        })
    };

    let next = tokio::time::timeout(Duration::from_secs(5), session.next())
        .await
        .expect("cancellation should interrupt the backoff sleep");
    assert!(matches!(
        next,
        Some(SessionUpdate::Finished(QueryOutcome::Cancelled))
    ));
    assert!(session.next().await.is_none());
    canceller.await.unwrap();

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
