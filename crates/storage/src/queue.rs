//! Redis Streams-based work queue for build requests.
//!
//! Envelopes are self-contained JSON; a consumer group gives manual
//! acknowledgement, and unacknowledged entries are reclaimed after a
//! visibility timeout so delivery is at-least-once.

use chrono::{DateTime, Utc};
use redis::{
    aio::MultiplexedConnection,
    streams::{StreamAutoClaimOptions, StreamAutoClaimReply, StreamReadOptions, StreamReadReply},
    AsyncCommands, Client,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use metget_common::{MetGetError, MetGetResult};

const STREAM_KEY: &str = "metget:requests";
const CONSUMER_GROUP: &str = "builders";

fn queue_err(e: redis::RedisError) -> MetGetError {
    MetGetError::Queue(e.to_string())
}

/// A self-contained build request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub request_id: String,
    pub spec_json: Value,
    pub api_key: String,
    pub submitted_at: DateTime<Utc>,
}

/// A claimed queue entry awaiting acknowledgement.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub entry_id: String,
    pub envelope: RequestEnvelope,
}

/// Redis Streams request queue.
pub struct RequestQueue {
    conn: MultiplexedConnection,
    stream: String,
    group: String,
}

impl RequestQueue {
    /// Connect to Redis and ensure the stream and consumer group exist.
    pub async fn connect(redis_url: &str) -> MetGetResult<Self> {
        Self::connect_with(redis_url, STREAM_KEY, CONSUMER_GROUP).await
    }

    pub async fn connect_with(
        redis_url: &str,
        stream: &str,
        group: &str,
    ) -> MetGetResult<Self> {
        let client = Client::open(redis_url).map_err(queue_err)?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(queue_err)?;

        // Create consumer group if it doesn't exist
        let created: Result<(), _> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        if let Err(e) = created {
            if !e.to_string().contains("BUSYGROUP") {
                return Err(queue_err(e));
            }
        }

        Ok(Self {
            conn,
            stream: stream.to_string(),
            group: group.to_string(),
        })
    }

    /// Publish an envelope. Returns the stream entry id.
    pub async fn publish(&mut self, envelope: &RequestEnvelope) -> MetGetResult<String> {
        let body = serde_json::to_string(envelope)
            .map_err(|e| MetGetError::Internal(format!("Envelope serialization failed: {}", e)))?;

        let entry_id: String = redis::cmd("XADD")
            .arg(&self.stream)
            .arg("*")
            .arg("request_id")
            .arg(&envelope.request_id)
            .arg("data")
            .arg(&body)
            .query_async(&mut self.conn)
            .await
            .map_err(queue_err)?;

        Ok(entry_id)
    }

    /// Claim the next unseen envelope for this consumer, blocking up to
    /// `block_ms` milliseconds.
    pub async fn claim(
        &mut self,
        consumer: &str,
        block_ms: usize,
    ) -> MetGetResult<Option<Delivery>> {
        let opts = StreamReadOptions::default()
            .group(&self.group, consumer)
            .count(1)
            .block(block_ms);

        let reply: StreamReadReply = self
            .conn
            .xread_options(&[&self.stream], &[">"], &opts)
            .await
            .map_err(queue_err)?;

        for stream_key in reply.keys {
            for entry in stream_key.ids {
                if let Some(delivery) = Self::decode_entry(&entry.id, &entry.map)? {
                    return Ok(Some(delivery));
                }
            }
        }

        Ok(None)
    }

    /// Reclaim envelopes whose consumer went silent for longer than
    /// `min_idle_ms`. Redelivered entries keep their original entry id.
    pub async fn reclaim(
        &mut self,
        consumer: &str,
        min_idle_ms: usize,
    ) -> MetGetResult<Vec<Delivery>> {
        let opts = StreamAutoClaimOptions::default().count(8);
        let reply: StreamAutoClaimReply = self
            .conn
            .xautoclaim_options(
                &self.stream,
                &self.group,
                consumer,
                min_idle_ms,
                "0-0",
                opts,
            )
            .await
            .map_err(queue_err)?;

        let mut out = Vec::new();
        for entry in reply.claimed {
            if let Some(delivery) = Self::decode_entry(&entry.id, &entry.map)? {
                out.push(delivery);
            }
        }
        Ok(out)
    }

    /// Acknowledge an envelope, removing it from the pending list.
    pub async fn ack(&mut self, entry_id: &str) -> MetGetResult<()> {
        let _: i64 = redis::cmd("XACK")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(entry_id)
            .query_async(&mut self.conn)
            .await
            .map_err(queue_err)?;
        Ok(())
    }

    /// Total entries in the stream.
    pub async fn depth(&mut self) -> MetGetResult<u64> {
        let len: u64 = self.conn.xlen(&self.stream).await.map_err(queue_err)?;
        Ok(len)
    }

    fn decode_entry(
        id: &str,
        map: &std::collections::HashMap<String, redis::Value>,
    ) -> MetGetResult<Option<Delivery>> {
        let Some(data) = map.get("data") else {
            return Ok(None);
        };
        let bytes: Vec<u8> = redis::from_redis_value(data)
            .map_err(|e| MetGetError::Queue(format!("Malformed queue entry: {}", e)))?;
        let envelope: RequestEnvelope = serde_json::from_slice(&bytes)
            .map_err(|e| MetGetError::Queue(format!("Malformed envelope: {}", e)))?;
        Ok(Some(Delivery {
            entry_id: id.to_string(),
            envelope,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_round_trip() {
        let envelope = RequestEnvelope {
            request_id: "7c9e6679-7425-40de-944b-e07fc1f90ae7".to_string(),
            spec_json: json!({
                "start_date": "2024-01-01 00:00:00",
                "domains": [{"name": "gulf", "service": "gfs-ncep"}]
            }),
            api_key: "key".to_string(),
            submitted_at: Utc::now(),
        };

        let body = serde_json::to_string(&envelope).unwrap();
        let parsed: RequestEnvelope = serde_json::from_str(&body).unwrap();

        assert_eq!(parsed.request_id, envelope.request_id);
        assert_eq!(parsed.spec_json, envelope.spec_json);
        assert_eq!(parsed.submitted_at, envelope.submitted_at);
    }

    #[test]
    fn test_decode_entry_ignores_foreign_fields() {
        let mut map = std::collections::HashMap::new();
        map.insert("other".to_string(), redis::Value::Nil);
        let result = RequestQueue::decode_entry("1-0", &map).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_decode_entry_rejects_garbage() {
        let mut map = std::collections::HashMap::new();
        map.insert(
            "data".to_string(),
            redis::Value::BulkString(b"not json".to_vec()),
        );
        assert!(RequestQueue::decode_entry("1-0", &map).is_err());
    }
}
