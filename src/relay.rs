use reqwest::Client;
use serde_json::json;

/// Outbound client for the signaling relay's message-forwarding endpoint.
/// The relay pushes forwarded messages to connected clients so they know
/// to re-pull room state. Delivery is best effort: failures are logged,
/// never retried, never surfaced to the caller.
#[derive(Clone, Default)]
pub struct RelayNotifier {
    http: Client,
}

impl RelayNotifier {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    /// POST {post_url}/{rid}/{from_uid}/{to_uid} with a JSON payload. An
    /// empty `to_uid` addresses every client in the room.
    pub async fn forward(
        &self,
        post_url: &str,
        rid: &str,
        from_uid: &str,
        to_uid: &str,
        payload: &serde_json::Value,
    ) {
        let url = format!("{}/{}/{}/{}", post_url, rid, from_uid, to_uid);
        tracing::debug!(url = %url, "forwarding message to relay");

        match self.http.post(&url).json(payload).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::error!(
                    status = %response.status(),
                    url = %url,
                    "relay rejected forwarded message"
                );
            }
            Err(err) => {
                tracing::error!(error = %err, url = %url, "failed to reach relay");
            }
        }
    }

    /// Tells every client in the room that call state changed.
    pub async fn notify_call(&self, post_url: &str, rid: &str, from_uid: &str) {
        self.forward(post_url, rid, from_uid, "", &json!({ "type": "call" }))
            .await;
    }
}
