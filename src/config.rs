use std::str::FromStr;

// ============================================================================
// Configuration
// ============================================================================
//
// Runtime configuration comes from the environment (a .env file is honored
// in development). Defaults mirror a small single-event deployment.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the API server binds to.
    pub bind_addr: String,
    /// Port for the Prometheus metrics endpoint.
    pub metrics_port: u16,
    /// Capacity used for the all-events statistics scope, which has no
    /// event row to read a cap from.
    pub max_tickets_global: u32,
    /// Per-user ticket limit when neither a user override nor the event
    /// configures one.
    pub tickets_per_user: u32,
    /// Whether buyers may download their own ticket documents. Admins are
    /// exempt from this gate.
    pub allow_user_ticket_download: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            metrics_port: 9090,
            max_tickets_global: 200,
            tickets_per_user: 10,
            allow_user_ticket_download: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        // Best effort: absence of a .env file is not an error.
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        Self {
            bind_addr: env_or("BALLPASS_BIND_ADDR", defaults.bind_addr),
            metrics_port: env_or("BALLPASS_METRICS_PORT", defaults.metrics_port),
            max_tickets_global: env_or("BALLPASS_MAX_TICKETS_GLOBAL", defaults.max_tickets_global),
            tickets_per_user: env_or("BALLPASS_TICKETS_PER_USER", defaults.tickets_per_user),
            allow_user_ticket_download: env_or(
                "BALLPASS_ALLOW_TICKET_DOWNLOAD",
                defaults.allow_user_ticket_download,
            ),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or(default),
        Err(_) => default,
    }
}
