//! Broadcast publisher.
//!
//! Fans one event out to several exchanges over a single broker channel.
//! For each channel, in caller order: resolve the topology, declare the
//! exchange, encode the payload, publish with the event name as routing key.

use crate::broadcaster::{AuthDecision, AuthRequest, BroadcastError, Broadcaster};
use crate::metrics;
use crate::resolver::ExchangeResolver;
use async_trait::async_trait;
use herald_protocol::{OutboundMessage, Payload};
use serde_json::Value;
use tenvis_herald_transport::{BrokerChannel, TransportError};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Publishes events to exchanges named after their channels.
///
/// Write-only: it never authorizes client subscriptions.
pub struct ExchangeBroadcaster<C> {
    /// The broker channel. Held for a whole broadcast call, so at most one
    /// call is in flight on it.
    channel: Mutex<C>,
    /// Exchange configuration.
    resolver: ExchangeResolver,
    /// Transport name, captured at construction.
    transport: &'static str,
}

impl<C: BrokerChannel> ExchangeBroadcaster<C> {
    /// Create a broadcaster owning `channel`.
    #[must_use]
    pub fn new(channel: C, resolver: ExchangeResolver) -> Self {
        Self {
            transport: channel.name(),
            channel: Mutex::new(channel),
            resolver,
        }
    }

    /// Close the broker channel. Waits for an in-flight broadcast to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to close cleanly.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.channel.lock().await.close().await
    }
}

#[async_trait]
impl<C: BrokerChannel> Broadcaster for ExchangeBroadcaster<C> {
    async fn broadcast(
        &self,
        channels: &[String],
        event: &str,
        payload: &dyn Payload,
    ) -> Result<(), BroadcastError> {
        let channel = self.channel.lock().await;

        for (published, exchange) in channels.iter().enumerate() {
            let transport_failed = |source: TransportError| {
                warn!(exchange = %exchange, event = %event, error = %source, "Broadcast failed");
                BroadcastError::Transport {
                    channel: exchange.clone(),
                    published,
                    source,
                }
            };

            let topology = self.resolver.resolve(exchange);
            channel
                .declare_exchange(exchange, &topology)
                .await
                .map_err(transport_failed)?;

            let body = payload.encode().map_err(|source| {
                warn!(exchange = %exchange, event = %event, error = %source, "Payload encoding failed");
                BroadcastError::Serialization {
                    event: event.to_string(),
                    published,
                    source,
                }
            })?;

            let message = OutboundMessage::new(exchange.as_str(), event, body);
            channel.publish(&message).await.map_err(transport_failed)?;

            metrics::record_message(message.body_size());
            debug!(
                exchange = %exchange,
                event = %event,
                bytes = message.body_size(),
                "Published event"
            );
        }

        Ok(())
    }

    fn authorize(&self, request: &AuthRequest) -> AuthDecision {
        debug!(channel = %request.channel_name, "Rejecting subscription authorization");
        AuthDecision::Denied
    }

    fn is_valid_auth_response(&self, _request: &AuthRequest, _result: &Value) -> bool {
        false
    }

    async fn is_open(&self) -> bool {
        self.channel.lock().await.is_open()
    }

    fn transport(&self) -> &'static str {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExchangeSettings, LooseBool, RawExchangeConfig};
    use herald_protocol::{decode_body, ExchangeKind, ExchangeTopology};
    use serde::{Serialize, Serializer};
    use crate::metrics::names;
    use ::metrics::{
        Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
    };
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tenvis_herald_transport::{BrokerOp, MemoryChannel};

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("cyclic reference"))
        }
    }

    /// Keeps counter totals by metric name.
    #[derive(Default)]
    struct CountingRecorder {
        counters: std::sync::Mutex<HashMap<String, Arc<AtomicU64>>>,
    }

    impl CountingRecorder {
        fn total(&self, name: &str) -> u64 {
            self.counters
                .lock()
                .unwrap()
                .get(name)
                .map_or(0, |counter| counter.load(Ordering::Relaxed))
        }
    }

    impl Recorder for CountingRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            let counter = self
                .counters
                .lock()
                .unwrap()
                .entry(key.name().to_string())
                .or_default()
                .clone();
            Counter::from_arc(counter)
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    fn channels(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    fn broadcaster(memory: &MemoryChannel) -> ExchangeBroadcaster<MemoryChannel> {
        ExchangeBroadcaster::new(memory.clone(), ExchangeResolver::new(ExchangeKind::Fanout))
    }

    #[tokio::test]
    async fn test_order_created_scenario() {
        let durable_fanout = ExchangeTopology {
            durable: true,
            ..ExchangeTopology::with_kind(ExchangeKind::Fanout)
        };
        // A passive declare only succeeds against an existing exchange.
        let memory = MemoryChannel::new().with_exchange("orders", durable_fanout);
        let resolver = ExchangeResolver::from_config(
            ExchangeKind::Fanout,
            [(
                "orders".to_string(),
                RawExchangeConfig {
                    durable: Some(LooseBool::Bool(true)),
                    ..Default::default()
                },
            )],
        );
        let broadcaster = ExchangeBroadcaster::new(memory.clone(), resolver);

        broadcaster
            .broadcast(
                &channels(&["orders", "notifications"]),
                "order.created",
                &json!({"id": 42}),
            )
            .await
            .unwrap();

        let body = br#"{"id":42}"#.to_vec();
        assert_eq!(
            memory.operations(),
            vec![
                BrokerOp::Declare {
                    exchange: "orders".to_string(),
                    topology: ExchangeTopology {
                        kind: ExchangeKind::Fanout,
                        passive: true,
                        durable: true,
                        auto_delete: true,
                        internal: false,
                    },
                },
                BrokerOp::Publish(OutboundMessage::new("orders", "order.created", body.clone())),
                BrokerOp::Declare {
                    exchange: "notifications".to_string(),
                    topology: ExchangeTopology {
                        kind: ExchangeKind::Fanout,
                        passive: false,
                        durable: false,
                        auto_delete: true,
                        internal: false,
                    },
                },
                BrokerOp::Publish(OutboundMessage::new("notifications", "order.created", body)),
            ]
        );
    }

    #[tokio::test]
    async fn test_durable_exchange_must_exist() {
        let memory = MemoryChannel::new();
        let resolver = ExchangeResolver::new(ExchangeKind::Fanout).with_exchange(
            "orders",
            ExchangeSettings {
                durable: true,
                ..Default::default()
            },
        );
        let broadcaster = ExchangeBroadcaster::new(memory.clone(), resolver);

        let error = broadcaster
            .broadcast(&channels(&["orders"]), "order.created", &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(error, BroadcastError::Transport { .. }));
        assert!(memory.published().is_empty());

        // NOT_FOUND closes the channel; nothing goes through afterwards.
        assert!(!broadcaster.is_open().await);
        let error = broadcaster
            .broadcast(&channels(&["notifications"]), "order.created", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            BroadcastError::Transport {
                source: TransportError::ConnectionClosed,
                published: 0,
                ..
            }
        ));
        assert!(memory.exchange("notifications").is_none());
    }

    #[tokio::test]
    async fn test_body_round_trips() {
        let memory = MemoryChannel::new();
        let payload = json!({
            "id": 7,
            "items": [{"sku": "a-1", "qty": 2}, {"sku": "b-2", "qty": 1}],
            "note": null,
            "paid": true,
            "total": 12.5
        });

        broadcaster(&memory)
            .broadcast(&channels(&["a", "b", "c"]), "order.paid", &payload)
            .await
            .unwrap();

        let published = memory.published();
        assert_eq!(published.len(), 3);
        for (message, exchange) in published.iter().zip(["a", "b", "c"]) {
            assert_eq!(message.exchange, exchange);
            assert_eq!(message.routing_key, "order.paid");
            assert_eq!(decode_body::<Value>(&message.body).unwrap(), payload);
        }
    }

    #[tokio::test]
    async fn test_serialization_failure_stops_broadcast() {
        let memory = MemoryChannel::new();
        let payload = BTreeMap::from([("value", Unencodable)]);

        let error = broadcaster(&memory)
            .broadcast(&channels(&["a", "b"]), "broken", &payload)
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            BroadcastError::Serialization { published: 0, .. }
        ));
        // The first exchange was declared before encoding; nothing was published.
        assert_eq!(memory.exchange_count(), 1);
        assert!(memory.published().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_earlier_publishes() {
        let memory = MemoryChannel::new();
        memory.fail_publish_on("b");

        let error = broadcaster(&memory)
            .broadcast(&channels(&["a", "b", "c"]), "tick", &json!({"n": 1}))
            .await
            .unwrap_err();

        assert!(matches!(
            &error,
            BroadcastError::Transport { channel, published: 1, .. } if channel == "b"
        ));
        let published = memory.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].exchange, "a");
        assert!(memory.exchange("c").is_none());
    }

    #[test]
    fn test_metrics_count_published_messages() {
        let recorder = CountingRecorder::default();
        let memory = MemoryChannel::new();
        memory.fail_publish_on("c");
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        let result = ::metrics::with_local_recorder(&recorder, || {
            runtime.block_on(broadcaster(&memory).broadcast(
                &channels(&["a", "b", "c"]),
                "tick",
                &json!({"n": 1}),
            ))
        });

        assert_eq!(result.unwrap_err().published(), 2);
        assert_eq!(recorder.total(names::MESSAGES_TOTAL), 2);
        assert_eq!(
            recorder.total(names::MESSAGES_BYTES),
            2 * br#"{"n":1}"#.len() as u64
        );
    }

    #[tokio::test]
    async fn test_declare_failure() {
        let memory = MemoryChannel::new();
        memory.fail_declare_on("a");

        let error = broadcaster(&memory)
            .broadcast(&channels(&["a", "b"]), "tick", &json!({}))
            .await
            .unwrap_err();

        assert_eq!(error.published(), 0);
        assert!(memory.operations().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_broadcasts_redeclare_idempotently() {
        let memory = MemoryChannel::new();
        let broadcaster = broadcaster(&memory);

        for n in 0..3 {
            broadcaster
                .broadcast(&channels(&["orders"]), "tick", &json!({"n": n}))
                .await
                .unwrap();
        }

        assert_eq!(memory.exchange_count(), 1);
        assert_eq!(memory.published().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_channel_list() {
        let memory = MemoryChannel::new();
        broadcaster(&memory)
            .broadcast(&[], "tick", &json!({}))
            .await
            .unwrap();
        assert!(memory.operations().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_broadcasts_do_not_interleave() {
        let memory = MemoryChannel::new();
        let broadcaster = Arc::new(broadcaster(&memory));
        let targets = channels(&["a", "b", "c"]);

        let first = {
            let broadcaster = broadcaster.clone();
            let targets = targets.clone();
            tokio::spawn(async move { broadcaster.broadcast(&targets, "first", &json!({})).await })
        };
        let second = {
            let broadcaster = broadcaster.clone();
            let targets = targets.clone();
            tokio::spawn(async move { broadcaster.broadcast(&targets, "second", &json!({})).await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let events: Vec<_> = memory
            .published()
            .into_iter()
            .map(|message| message.routing_key)
            .collect();
        assert_eq!(events.len(), 6);
        assert!(events[..3].iter().all(|e| e == &events[0]));
        assert!(events[3..].iter().all(|e| e == &events[3]));
    }

    #[tokio::test]
    async fn test_authorization_is_always_denied() {
        let memory = MemoryChannel::new();
        let broadcaster = broadcaster(&memory);

        let requests = [
            AuthRequest::default(),
            AuthRequest {
                channel_name: "private-orders".to_string(),
                socket_id: Some("1234.5678".to_string()),
                user_id: Some("42".to_string()),
            },
        ];

        for request in &requests {
            assert!(broadcaster.authorize(request).is_denied());
            assert!(!broadcaster.is_valid_auth_response(request, &json!({"auth": "x"})));
            assert!(!broadcaster.is_valid_auth_response(request, &Value::Null));
        }
    }

    #[tokio::test]
    async fn test_close() {
        let memory = MemoryChannel::new();
        let broadcaster = broadcaster(&memory);
        assert_eq!(broadcaster.transport(), "memory");
        assert!(broadcaster.is_open().await);

        broadcaster.close().await.unwrap();
        assert!(!broadcaster.is_open().await);

        let error = broadcaster
            .broadcast(&channels(&["a"]), "tick", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            BroadcastError::Transport {
                source: TransportError::ConnectionClosed,
                ..
            }
        ));
    }
}
