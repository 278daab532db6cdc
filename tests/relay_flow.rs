//! End-to-end relay flow over in-memory backends.
//!
//! Run with: cargo test --test relay_flow
//!
//! Producer enqueues, the ingestion worker appends to the channel log and a
//! tail reader catches up and follows it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use chat_relay::config::Config;
use chat_relay::producer::run_producer;
use chat_relay::queue::{
    encode_payload, ChatMessageQueue, IngestOutcome, IngestionWorker, MemoryWorkQueue, WorkQueue,
};
use chat_relay::repository::ChatMessageRepository;
use chat_relay::services::RelayServices;
use chat_relay::storage::MemoryTableStore;
use chat_relay::tail::{TailEvent, TailReader};
use chat_relay::{channel_id_for_name, ChatMessage};

fn message(channel: Uuid, offset_ms: i64, body: &str) -> ChatMessage {
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    ChatMessage::at(
        channel,
        Uuid::new_v4(),
        t0 + ChronoDuration::milliseconds(offset_ms),
        "tester",
        body,
    )
}

fn repository() -> ChatMessageRepository {
    ChatMessageRepository::new(Arc::new(MemoryTableStore::new()))
}

#[tokio::test]
async fn test_out_of_order_appends_read_back_in_order() {
    let repository = repository();
    let channel = channel_id_for_name("ordering");

    let m1 = message(channel, 0, "first");
    let m2 = message(channel, 10, "second");
    let m3 = message(channel, 20, "third");
    for m in [&m3, &m1, &m2] {
        repository.append(m).await.unwrap();
    }

    let history: Vec<_> = repository.history(channel).try_collect().await.unwrap();
    assert_eq!(history, vec![m1, m2, m3]);
}

#[tokio::test]
async fn test_tail_sees_everything_after_catch_up() {
    let repository = repository();
    let channel = channel_id_for_name("completeness");
    let all: Vec<_> = (0..8)
        .map(|i| message(channel, i * 100, &format!("m{i}")))
        .collect();

    for m in &all[..5] {
        repository.append(m).await.unwrap();
    }

    let mut reader = TailReader::new(repository.clone(), channel).with_history(3);
    let history = reader.catch_up().await.unwrap();
    assert_eq!(history, all[2..5]);

    for m in &all[5..] {
        repository.append(m).await.unwrap();
    }

    let live = reader.poll().await.unwrap();
    assert_eq!(live, all[5..]);
    assert!(reader.poll().await.unwrap().is_empty(), "nothing is emitted twice");
}

#[tokio::test]
async fn test_tail_after_cursor_boundaries() {
    let repository = repository();
    let channel = channel_id_for_name("boundaries");
    let all: Vec<_> = (0..3)
        .map(|i| message(channel, i * 100, &format!("m{i}")))
        .collect();
    for m in &all {
        repository.append(m).await.unwrap();
    }

    let after_first: Vec<_> = repository
        .tail_after(channel, Some(all[0].message_id))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(after_first, all[1..]);

    let after_last: Vec<_> = repository
        .tail_after(channel, Some(all[2].message_id))
        .try_collect()
        .await
        .unwrap();
    assert!(after_last.is_empty());

    let from_start: Vec<_> = repository
        .tail_after(channel, None)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(from_start, all);
}

#[tokio::test]
async fn test_redelivered_message_is_stored_once() {
    let repository = repository();
    let queue = Arc::new(MemoryWorkQueue::new("chat-messages", Duration::from_secs(30)));
    let poison = Arc::new(MemoryWorkQueue::new("chat-messages-poison", Duration::from_secs(30)));
    let worker = IngestionWorker::new(repository.clone(), queue.clone(), poison.clone());

    let channel = channel_id_for_name("idempotent");
    let m = message(channel, 0, "once");
    let payload = encode_payload(&m).unwrap();
    queue.enqueue(&payload).await.unwrap();
    queue.enqueue(&payload).await.unwrap();

    let deliveries = queue.receive(10).await.unwrap();
    assert_eq!(deliveries.len(), 2);
    assert_eq!(worker.handle(&deliveries[0]).await.unwrap(), IngestOutcome::Stored);
    assert_eq!(
        worker.handle(&deliveries[1]).await.unwrap(),
        IngestOutcome::AlreadyStored
    );

    assert!(queue.is_empty().await, "both deliveries are acknowledged");
    assert!(poison.is_empty().await);

    let history: Vec<_> = repository.history(channel).try_collect().await.unwrap();
    assert_eq!(history, vec![m]);
}

#[tokio::test]
async fn test_enqueued_message_round_trips_unchanged() {
    let services = RelayServices::build(&Config::for_test()).await.unwrap();
    let channel = channel_id_for_name("round-trip");
    let m = ChatMessage::at(
        channel,
        Uuid::new_v4(),
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + ChronoDuration::nanoseconds(123_456_789),
        "O'Brien",
        "quotes \" dots . and unicode ✓",
    );

    services.queue().enqueue(&m).await.unwrap();
    assert_eq!(services.ingestion_worker().poll_once().await.unwrap(), 1);

    let history: Vec<_> = services
        .repository()
        .history(channel)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(history, vec![m]);
}

#[tokio::test]
async fn test_producer_to_tail_end_to_end() {
    let mut config = Config::for_test();
    config.producer.min_delay_ms = 1;
    config.producer.max_delay_ms = 5;
    let services = RelayServices::build(&config).await.unwrap();

    let channel = channel_id_for_name("end-to-end");
    let token = CancellationToken::new();

    let worker = services.ingestion_worker();
    let worker_task = tokio::spawn({
        let token = token.clone();
        async move { worker.run(token).await }
    });

    let producer_task = tokio::spawn(run_producer(
        services.message_generator(channel),
        services.queue().clone(),
        Duration::from_millis(config.retry.delay_ms),
        token.clone(),
    ));

    let mut reader = services.tail_reader(channel);
    let mut events = Vec::new();
    let stop = token.clone();
    let tail = reader.run(&token, |event| {
        match event {
            TailEvent::History(m) => events.push(("history", m.clone())),
            TailEvent::Live => {}
            TailEvent::Message(m) => events.push(("live", m.clone())),
        }
        if events.iter().filter(|(kind, _)| *kind == "live").count() >= 5 {
            stop.cancel();
        }
    });
    tokio::time::timeout(Duration::from_secs(10), tail)
        .await
        .expect("tail should see five live messages");

    producer_task.await.unwrap();
    worker_task.await.unwrap();

    let seen: Vec<_> = events.into_iter().map(|(_, m)| m).collect();
    assert!(seen.len() >= 5);
    assert!(seen.iter().all(|m| m.channel_id == channel));
    assert!(
        seen.windows(2)
            .all(|w| (w[0].sent_at, w[0].message_id) < (w[1].sent_at, w[1].message_id)),
        "tail output is strictly ordered with no repeats"
    );

    let stored: Vec<_> = services
        .repository()
        .history(channel)
        .try_collect()
        .await
        .unwrap();
    let start = stored
        .iter()
        .position(|m| m.message_id == seen[0].message_id)
        .expect("first tailed message is stored");
    assert_eq!(stored[start..start + seen.len()], seen[..]);
}

#[tokio::test]
async fn test_reader_and_gateway_share_nothing_but_the_store() {
    let store = Arc::new(MemoryTableStore::new());
    let queue: Arc<dyn WorkQueue> =
        Arc::new(MemoryWorkQueue::new("chat-messages", Duration::from_secs(30)));
    let poison: Arc<dyn WorkQueue> =
        Arc::new(MemoryWorkQueue::new("chat-messages-poison", Duration::from_secs(30)));

    let gateway = ChatMessageQueue::new(queue.clone());
    let worker = IngestionWorker::new(
        ChatMessageRepository::new(store.clone()),
        queue,
        poison,
    );
    let mut reader = TailReader::new(ChatMessageRepository::new(store), channel_id_for_name("shared"))
        .with_history(0);

    assert!(reader.catch_up().await.unwrap().is_empty());

    let m = ChatMessage::new(reader.channel_id(), "alice", "hello");
    gateway.enqueue(&m).await.unwrap();
    assert!(reader.poll().await.unwrap().is_empty(), "not ingested yet");

    worker.poll_once().await.unwrap();
    assert_eq!(reader.poll().await.unwrap(), vec![m]);
}
