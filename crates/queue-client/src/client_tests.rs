//! Contract tests for QueueClient implementations.

use super::*;
use crate::providers::InMemoryQueueClient;
use bytes::Bytes;

async fn seeded_client(queue: &QueueName, bodies: &[&str]) -> InMemoryQueueClient {
    let client = InMemoryQueueClient::new();
    client.create_queue(queue).await.unwrap();
    for body in bodies {
        client
            .send_message(queue, Message::new(Bytes::from(body.to_string())))
            .await
            .unwrap();
    }
    client
}

// ============================================================================
// Contract Tests - QueueClient Trait
// ============================================================================

/// Contract test helper validating receive against any QueueClient
async fn test_receive_returns_seeded_message<C: QueueClient>(client: &C, queue: &QueueName) {
    let request = ReceiveRequest::new().with_wait_time(Duration::seconds(1));

    let received = client.receive_messages(queue, &request).await.unwrap();

    assert_eq!(received.len(), 1);
    assert!(!received[0].receipt_handle.handle().is_empty());
    assert_eq!(received[0].receive_count, 1);
}

/// Contract test helper validating delete after receive
async fn test_delete_after_receive<C: QueueClient>(client: &C, queue: &QueueName) {
    let request = ReceiveRequest::new().with_wait_time(Duration::seconds(1));
    let received = client.receive_messages(queue, &request).await.unwrap();

    let result = client
        .delete_message(queue, &received[0].receipt_handle)
        .await;

    assert!(result.is_ok(), "Delete with valid receipt should succeed");
}

#[tokio::test]
async fn test_in_memory_client_satisfies_receive_contract() {
    let queue = QueueName::new("contract-queue".to_string()).unwrap();
    let client = seeded_client(&queue, &["one"]).await;

    test_receive_returns_seeded_message(&client, &queue).await;
}

#[tokio::test]
async fn test_in_memory_client_satisfies_delete_contract() {
    let queue = QueueName::new("contract-queue".to_string()).unwrap();
    let client = seeded_client(&queue, &["one"]).await;

    test_delete_after_receive(&client, &queue).await;
}

#[tokio::test]
async fn test_receive_from_missing_queue_fails() {
    let client = InMemoryQueueClient::new();
    let queue = QueueName::new("nonexistent".to_string()).unwrap();
    let request = ReceiveRequest::new().with_wait_time(Duration::zero());

    let result = client.receive_messages(&queue, &request).await;

    match result.unwrap_err() {
        QueueError::QueueNotFound { queue_name } => assert_eq!(queue_name, "nonexistent"),
        other => panic!("Expected QueueNotFound, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_send_to_missing_queue_fails() {
    let client = InMemoryQueueClient::new();
    let queue = QueueName::new("nonexistent".to_string()).unwrap();

    let result = client.send_message(&queue, Message::new("body".into())).await;

    assert!(matches!(result, Err(QueueError::QueueNotFound { .. })));
}

#[tokio::test]
async fn test_queue_exists_and_create() {
    let client = InMemoryQueueClient::new();
    let queue = QueueName::new("lifecycle-queue".to_string()).unwrap();

    assert!(!client.queue_exists(&queue).await.unwrap());
    client.create_queue(&queue).await.unwrap();
    assert!(client.queue_exists(&queue).await.unwrap());

    // Idempotent
    client.create_queue(&queue).await.unwrap();
    assert!(client.queue_exists(&queue).await.unwrap());
}

#[tokio::test]
async fn test_queue_attributes_filtered_by_names() {
    let client = InMemoryQueueClient::new();
    let queue = QueueName::new("attr-queue".to_string()).unwrap();
    client.create_queue(&queue).await.unwrap();
    client
        .set_queue_attribute(&queue, "ApproximateNumberOfMessages".to_string(), "3".to_string())
        .await
        .unwrap();
    client
        .set_queue_attribute(&queue, "QueueArn".to_string(), "arn:test".to_string())
        .await
        .unwrap();

    let attributes = client
        .queue_attributes(&queue, &["QueueArn".to_string()])
        .await
        .unwrap();

    assert_eq!(attributes.len(), 1);
    assert_eq!(attributes.get("QueueArn"), Some(&"arn:test".to_string()));
}
