use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub redis_url: String,
    pub room_ttl_seconds: u64,
    pub room_size: usize,
    pub auto_destroy_room_size: usize,
    pub wss_host_port_pair: String,
    pub ice_server_host: String,
    pub transit_secret: String,
    pub transit_user: String,
    pub transit_ttl_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            room_ttl_seconds: env::var("ROOM_TTL_SECONDS")
                .unwrap_or_else(|_| "7200".to_string())
                .parse()
                .unwrap_or(7200),
            room_size: env::var("ROOM_SIZE")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .unwrap_or(8),
            auto_destroy_room_size: env::var("AUTO_DESTROY_ROOM_SIZE")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
            wss_host_port_pair: env::var("WSS_HOST_PORT_PAIR")
                .unwrap_or_else(|_| "localhost:8089".to_string()),
            ice_server_host: env::var("ICE_SERVER_HOST")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),
            transit_secret: env::var("TRANSIT_SECRET")
                .map_err(|_| ConfigError::MissingTransitSecret)?,
            transit_user: env::var("TRANSIT_USER").unwrap_or_else(|_| "peercall".to_string()),
            transit_ttl_seconds: env::var("TRANSIT_TTL_SECONDS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .unwrap_or(600),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server port")]
    InvalidPort,
    #[error("TRANSIT_SECRET environment variable is required")]
    MissingTransitSecret,
}
