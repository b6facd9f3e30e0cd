//! Time-boxed credentials for the transit (TURN) relay.
//!
//! Long-term-credential scheme: the username carries an expiry timestamp
//! and the credential is an HMAC-SHA1 of the username under a secret
//! shared with the relay, so the relay can verify without a lookup.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;

use crate::config::Config;

type HmacSha1 = Hmac<Sha1>;

/// ICE server entry handed to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

/// Credentials valid for `transit_ttl_seconds` from now.
pub fn ice_servers(config: &Config) -> Vec<IceServer> {
    ice_servers_at(config, Utc::now().timestamp())
}

fn ice_servers_at(config: &Config, now: i64) -> Vec<IceServer> {
    let expiry = now + config.transit_ttl_seconds as i64;
    let username = format!("{}:{}", expiry, config.transit_user);

    let mut mac = HmacSha1::new_from_slice(config.transit_secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(username.as_bytes());
    let credential = BASE64.encode(mac.finalize().into_bytes());

    vec![IceServer {
        urls: vec![
            format!("stun:{}:3478", config.ice_server_host),
            format!("turn:{}:3478", config.ice_server_host),
        ],
        username,
        credential,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            server_host: "localhost".to_string(),
            server_port: 8080,
            redis_url: "redis://localhost".to_string(),
            room_ttl_seconds: 7200,
            room_size: 8,
            auto_destroy_room_size: 0,
            wss_host_port_pair: "localhost:8089".to_string(),
            ice_server_host: "turn.example.net".to_string(),
            transit_secret: "test-secret".to_string(),
            transit_user: "peercall".to_string(),
            transit_ttl_seconds: 600,
        }
    }

    #[test]
    fn username_carries_expiry_and_user() {
        let servers = ice_servers_at(&test_config(), 1_700_000_000);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].username, "1700000600:peercall");
        assert_eq!(
            servers[0].urls,
            vec![
                "stun:turn.example.net:3478".to_string(),
                "turn:turn.example.net:3478".to_string(),
            ]
        );
    }

    #[test]
    fn credential_is_base64_of_sha1_digest() {
        let servers = ice_servers_at(&test_config(), 1_700_000_000);
        let digest = BASE64.decode(&servers[0].credential).unwrap();
        assert_eq!(digest.len(), 20);
    }

    #[test]
    fn credential_is_deterministic_for_a_timestamp() {
        let config = test_config();
        let a = ice_servers_at(&config, 1_700_000_000);
        let b = ice_servers_at(&config, 1_700_000_000);
        assert_eq!(a[0].credential, b[0].credential);

        let later = ice_servers_at(&config, 1_700_000_001);
        assert_ne!(a[0].credential, later[0].credential);
    }

    #[test]
    fn credential_depends_on_the_shared_secret() {
        let config = test_config();
        let mut other = test_config();
        other.transit_secret = "different-secret".to_string();

        let a = ice_servers_at(&config, 1_700_000_000);
        let b = ice_servers_at(&other, 1_700_000_000);
        assert_eq!(a[0].username, b[0].username);
        assert_ne!(a[0].credential, b[0].credential);
    }
}
