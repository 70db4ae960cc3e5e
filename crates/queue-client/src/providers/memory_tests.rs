//! Tests for the in-memory provider.

use super::*;

async fn client_with_queue(name: &str) -> (InMemoryQueueClient, QueueName) {
    let client = InMemoryQueueClient::new();
    let queue = QueueName::new(name.to_string()).unwrap();
    client.create_queue(&queue).await.unwrap();
    (client, queue)
}

fn quick_receive() -> ReceiveRequest {
    ReceiveRequest::new()
        .with_max_messages(10)
        .with_wait_time(Duration::zero())
}

#[tokio::test]
async fn test_receive_moves_message_in_flight() {
    let (client, queue) = client_with_queue("memory-queue").await;
    client
        .send_message(&queue, Message::new("payload".into()))
        .await
        .unwrap();

    let received = client
        .receive_messages(&queue, &quick_receive())
        .await
        .unwrap();

    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body, Bytes::from("payload"));
    assert_eq!(client.available_count(&queue).await.unwrap(), 0);
    assert_eq!(client.in_flight_count(&queue).await.unwrap(), 1);
}

#[tokio::test]
async fn test_receive_caps_batch_at_max_messages() {
    let (client, queue) = client_with_queue("memory-queue").await;
    for i in 0..5 {
        client
            .send_message(&queue, Message::new(format!("m{}", i).into()))
            .await
            .unwrap();
    }

    let request = quick_receive().with_max_messages(3);
    let received = client.receive_messages(&queue, &request).await.unwrap();

    assert_eq!(received.len(), 3);
    assert_eq!(client.available_count(&queue).await.unwrap(), 2);
}

#[tokio::test]
async fn test_empty_queue_returns_after_wait() {
    let (client, queue) = client_with_queue("memory-queue").await;

    let request = quick_receive().with_wait_time(Duration::milliseconds(50));
    let received = client.receive_messages(&queue, &request).await.unwrap();

    assert!(received.is_empty());
}

#[tokio::test]
async fn test_visibility_expiry_redelivers_with_incremented_count() {
    let (client, queue) = client_with_queue("memory-queue").await;
    client
        .send_message(&queue, Message::new("payload".into()))
        .await
        .unwrap();

    let request = quick_receive().with_visibility_timeout(Duration::milliseconds(20));
    let first = client.receive_messages(&queue, &request).await.unwrap();
    assert_eq!(first[0].receive_count, 1);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let second = client.receive_messages(&queue, &request).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].receive_count, 2);
    assert_eq!(second[0].message_id, first[0].message_id);
    assert_ne!(
        second[0].receipt_handle.handle(),
        first[0].receipt_handle.handle()
    );
}

#[tokio::test]
async fn test_stale_receipt_rejected_after_redelivery() {
    let (client, queue) = client_with_queue("memory-queue").await;
    client
        .send_message(&queue, Message::new("payload".into()))
        .await
        .unwrap();

    let request = quick_receive().with_visibility_timeout(Duration::milliseconds(20));
    let first = client.receive_messages(&queue, &request).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // Old receipt is invalid for both delete and visibility change
    let delete = client.delete_message(&queue, &first[0].receipt_handle).await;
    assert!(matches!(delete, Err(QueueError::ReceiptInvalid { .. })));

    let change = client
        .change_visibility(&queue, &first[0].receipt_handle, Duration::seconds(30))
        .await;
    assert!(matches!(change, Err(QueueError::ReceiptInvalid { .. })));
}

#[tokio::test]
async fn test_change_visibility_to_zero_releases_immediately() {
    let (client, queue) = client_with_queue("memory-queue").await;
    client
        .send_message(&queue, Message::new("payload".into()))
        .await
        .unwrap();

    let received = client
        .receive_messages(&queue, &quick_receive())
        .await
        .unwrap();

    client
        .change_visibility(&queue, &received[0].receipt_handle, Duration::zero())
        .await
        .unwrap();

    assert_eq!(client.available_count(&queue).await.unwrap(), 1);
    assert_eq!(client.in_flight_count(&queue).await.unwrap(), 0);
}

#[tokio::test]
async fn test_change_visibility_extends_lease() {
    let (client, queue) = client_with_queue("memory-queue").await;
    client
        .send_message(&queue, Message::new("payload".into()))
        .await
        .unwrap();

    let request = quick_receive().with_visibility_timeout(Duration::milliseconds(30));
    let received = client.receive_messages(&queue, &request).await.unwrap();

    client
        .change_visibility(&queue, &received[0].receipt_handle, Duration::seconds(30))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(60)).await;

    // Lease was extended past the original timeout, so nothing is available
    assert_eq!(client.available_count(&queue).await.unwrap(), 0);
    assert_eq!(client.in_flight_count(&queue).await.unwrap(), 1);
}

#[tokio::test]
async fn test_batch_delete_respects_limit_and_skips_stale() {
    let (client, queue) = client_with_queue("memory-queue").await;
    for i in 0..3 {
        client
            .send_message(&queue, Message::new(format!("m{}", i).into()))
            .await
            .unwrap();
    }

    let received = client
        .receive_messages(&queue, &quick_receive())
        .await
        .unwrap();
    let mut receipts: Vec<ReceiptHandle> =
        received.iter().map(|m| m.receipt_handle.clone()).collect();
    receipts.push(ReceiptHandle::new("stale".to_string(), queue.clone()));

    client.delete_messages(&queue, &receipts).await.unwrap();
    assert_eq!(client.deleted_count(&queue).await.unwrap(), 3);

    // Oversized batch rejected outright
    let oversized: Vec<ReceiptHandle> = (0..11)
        .map(|i| ReceiptHandle::new(format!("r{}", i), queue.clone()))
        .collect();
    let result = client.delete_messages(&queue, &oversized).await;
    assert!(matches!(result, Err(QueueError::BatchTooLarge { .. })));
}

#[tokio::test]
async fn test_attribute_filtering_on_receive() {
    let (client, queue) = client_with_queue("memory-queue").await;
    let message = Message::new("payload".into())
        .with_attribute("trace-id".to_string(), "t-1".to_string())
        .with_attribute("tenant".to_string(), "acme".to_string());
    client.send_message(&queue, message).await.unwrap();

    let request = quick_receive()
        .with_attribute_names(AttributeSet::Named(vec!["trace-id".to_string()]));
    let received = client.receive_messages(&queue, &request).await.unwrap();

    assert_eq!(received[0].attributes.len(), 1);
    assert_eq!(received[0].attributes.get("trace-id"), Some(&"t-1".to_string()));
}
