use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::error::DispatchError;
use crate::ports;
use crate::push::delivery::{self, DeliveryOutcome, PushRequest, Urgency};
use crate::push::jwt::VapidSigner;
use crate::push::payload::PushPayload;
use crate::types::push::Subscription;

/// Sends encrypted, VAPID-signed messages straight to push services over HTTPS.
#[derive(Clone)]
pub struct HttpPushSender {
    client: reqwest::Client,
    signer: Arc<VapidSigner>,
    ttl: Duration,
    urgency: Urgency,
}

impl HttpPushSender {
    pub fn new(
        signer: VapidSigner,
        ttl: Duration,
        request_timeout: Duration,
    ) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            signer: Arc::new(signer),
            ttl,
            urgency: Urgency::default(),
        })
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    async fn post(&self, request: PushRequest) -> DeliveryOutcome {
        let mut builder = self.client.post(&request.endpoint).body(request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        match builder.send().await {
            Ok(response) => delivery::classify_status(response.status()),
            Err(err) => DeliveryOutcome::Failed(format!("transport error: {err}")),
        }
    }
}

impl ports::PushSender for HttpPushSender {
    type Fut<'a>
        = Pin<Box<dyn Future<Output = DeliveryOutcome> + Send + 'a>>
    where
        Self: 'a;

    fn send<'a>(&'a self, subscription: &'a Subscription, payload: &'a PushPayload) -> Self::Fut<'a> {
        Box::pin(async move {
            let request = match delivery::prepare_request(
                &self.signer,
                subscription,
                payload,
                self.ttl,
                self.urgency,
                OffsetDateTime::now_utc(),
            ) {
                Ok(request) => request,
                Err(err) => {
                    tracing::warn!(
                        user_id = %subscription.user_id,
                        endpoint = %subscription.endpoint,
                        error = %err,
                        "could not build push request"
                    );
                    return DeliveryOutcome::Failed(err.to_string());
                }
            };

            let outcome = self.post(request).await;
            match &outcome {
                DeliveryOutcome::Delivered => tracing::debug!(
                    user_id = %subscription.user_id,
                    tag = %payload.tag,
                    "push delivered"
                ),
                DeliveryOutcome::Gone => tracing::info!(
                    user_id = %subscription.user_id,
                    endpoint = %subscription.endpoint,
                    "push endpoint gone"
                ),
                DeliveryOutcome::Failed(reason) => tracing::warn!(
                    user_id = %subscription.user_id,
                    endpoint = %subscription.endpoint,
                    reason = %reason,
                    "push delivery failed"
                ),
            }
            outcome
        })
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::ports::PushSender;
    use crate::push::payload::test_subscription;
    use crate::push::vapid::test_keys;
    use axum::Router;
    use axum::body::Bytes;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Clone, Default)]
    struct Captured {
        requests: Arc<Mutex<Vec<(HeaderMap, Bytes)>>>,
    }

    async fn push_service(
        State(captured): State<Captured>,
        Path(status): Path<u16>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        captured
            .requests
            .lock()
            .expect("requests lock")
            .push((headers, body));
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    async fn spawn_push_service() -> (SocketAddr, Captured) {
        let captured = Captured::default();
        let app = Router::new()
            .route("/push/{status}", post(push_service))
            .with_state(captured.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        (addr, captured)
    }

    fn sender() -> HttpPushSender {
        HttpPushSender::new(
            VapidSigner::new(test_keys()),
            Duration::from_secs(3600),
            Duration::from_secs(5),
        )
        .expect("sender")
    }

    fn payload() -> PushPayload {
        PushPayload {
            title: "Hora do briefing".to_string(),
            body: "Prepare o dia de amanhã".to_string(),
            tag: "briefing-reminder".to_string(),
            icon: "/pwa-192.png".to_string(),
            badge: "/pwa-192.png".to_string(),
            url: "/briefing".to_string(),
        }
    }

    async fn send_with_status(addr: SocketAddr, status: u16) -> DeliveryOutcome {
        let subscription =
            test_subscription(Uuid::new_v4(), &format!("http://{addr}/push/{status}"));
        sender().send(&subscription, &payload()).await
    }

    #[tokio::test]
    async fn send__should_map_statuses_to_outcomes() {
        // Given
        let (addr, _) = spawn_push_service().await;

        // Then
        assert_eq!(send_with_status(addr, 201).await, DeliveryOutcome::Delivered);
        assert_eq!(send_with_status(addr, 404).await, DeliveryOutcome::Gone);
        assert_eq!(send_with_status(addr, 410).await, DeliveryOutcome::Gone);
        assert!(matches!(
            send_with_status(addr, 500).await,
            DeliveryOutcome::Failed(_)
        ));
        assert!(matches!(
            send_with_status(addr, 429).await,
            DeliveryOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn send__should_post_signed_encrypted_body() {
        // Given
        let (addr, captured) = spawn_push_service().await;
        let sender = sender().with_urgency(Urgency::High);
        let subscription = test_subscription(Uuid::new_v4(), &format!("http://{addr}/push/201"));

        // When
        let outcome = sender.send(&subscription, &payload()).await;

        // Then
        assert_eq!(outcome, DeliveryOutcome::Delivered);
        let requests = captured.requests.lock().expect("requests lock");
        assert_eq!(requests.len(), 1);
        let (headers, body) = &requests[0];
        assert_eq!(headers["content-encoding"], "aes128gcm");
        assert_eq!(headers["content-type"], "application/octet-stream");
        assert_eq!(headers["ttl"], "3600");
        assert_eq!(headers["urgency"], "high");
        let authorization = headers["authorization"].to_str().expect("ascii header");
        assert!(authorization.starts_with("vapid t="));
        assert!(!body.is_empty());
        assert!(!body.windows(8).any(|window| window == b"briefing"));
    }

    #[tokio::test]
    async fn send__should_report_unreachable_service_as_failed() {
        // Given
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        // When
        let outcome = send_with_status(addr, 201).await;

        // Then
        assert!(matches!(outcome, DeliveryOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn send__should_fail_without_request_for_bad_subscription_keys() {
        // Given
        let (addr, captured) = spawn_push_service().await;
        let subscription = Subscription {
            user_id: Uuid::new_v4(),
            endpoint: format!("http://{addr}/push/201"),
            p256dh: "short".to_string(),
            auth: "auth".to_string(),
        };

        // When
        let outcome = sender().send(&subscription, &payload()).await;

        // Then
        assert!(matches!(outcome, DeliveryOutcome::Failed(_)));
        assert!(captured.requests.lock().expect("requests lock").is_empty());
    }
}
