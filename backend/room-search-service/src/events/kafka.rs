use std::sync::Arc;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::RoomEvent;
use crate::services::IndexSyncService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConsumerConfig {
    pub brokers: String,
    pub group_id: String,
    pub room_events_topic: String,
}

/// Decode one record payload: a single room event as JSON.
pub fn decode_room_event(payload: &[u8]) -> Result<RoomEvent, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Spawn a Tokio task feeding room events into the index synchronization.
pub fn spawn_room_event_consumer(
    sync: Arc<IndexSyncService>,
    config: KafkaConsumerConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = run_consumer(sync, config).await {
            error!("Kafka consumer terminated with error: {err}");
        }
    })
}

async fn run_consumer(
    sync: Arc<IndexSyncService>,
    config: KafkaConsumerConfig,
) -> Result<(), KafkaError> {
    info!(
        topic = %config.room_events_topic,
        group_id = %config.group_id,
        "Starting Kafka consumer for room search indexing"
    );

    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("group.id", &config.group_id)
        .set("enable.auto.commit", "false")
        .set("enable.partition.eof", "false")
        .set("session.timeout.ms", "45000")
        .set("max.poll.interval.ms", "300000")
        .create()?;

    consumer.subscribe(&[config.room_events_topic.as_str()])?;

    loop {
        match consumer.recv().await {
            Ok(record) => {
                match record.payload() {
                    None => debug!(
                        topic = record.topic(),
                        offset = record.offset(),
                        "Received Kafka record with empty payload"
                    ),
                    Some(data) => match decode_room_event(data) {
                        Ok(event) => sync.handle_event(&event).await,
                        Err(err) => warn!(
                            topic = record.topic(),
                            partition = record.partition(),
                            offset = record.offset(),
                            "Failed to decode room event: {err}"
                        ),
                    },
                }

                // Handlers never block the stream; drift is repaired by restore.
                if let Err(commit_err) = consumer.commit_message(&record, CommitMode::Async) {
                    warn!("Failed to commit Kafka offset: {commit_err}");
                }
            }
            Err(err) => {
                error!("Kafka error: {err}");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
