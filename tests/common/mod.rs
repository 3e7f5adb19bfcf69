//! Common helpers for tests that need a real MySQL server.
//!
//! These tests skip themselves when no server is reachable. To run them
//! against a local container:
//!
//! ```bash
//! docker run -d --name rdstore-mysql -p 3306:3306 \
//!   -e MYSQL_ROOT_PASSWORD=rdstore -e MYSQL_DATABASE=rdstore_test mysql:8
//! cargo test --test live_mysql_tests
//! ```
//!
//! | Environment Variable       | Default Value  |
//! |----------------------------|----------------|
//! | `RDSTORE_MYSQL_HOST`       | "127.0.0.1"    |
//! | `RDSTORE_MYSQL_PORT`       | 3306           |
//! | `RDSTORE_MYSQL_USER`       | "root"         |
//! | `RDSTORE_MYSQL_PASSWORD`   | "rdstore"      |
//! | `RDSTORE_MYSQL_DATABASE`   | "rdstore_test" |

use rdstore::{ConnectionConfig, Session};
use std::env;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_PASSWORD: &str = "rdstore";
pub const DEFAULT_DATABASE: &str = "rdstore_test";

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

pub fn test_config() -> ConnectionConfig {
    let port = env::var("RDSTORE_MYSQL_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let mut config = ConnectionConfig::new(
        var_or("RDSTORE_MYSQL_HOST", DEFAULT_HOST),
        var_or("RDSTORE_MYSQL_USER", DEFAULT_USER),
        var_or("RDSTORE_MYSQL_PASSWORD", DEFAULT_PASSWORD),
        var_or("RDSTORE_MYSQL_DATABASE", DEFAULT_DATABASE),
        port,
    );
    config.probe_timeout_secs = Some(1);
    config
}

/// A session connected to the test database, or `None` when no server is
/// reachable (the calling test then returns early).
pub fn live_session() -> Option<Session> {
    let mut session = Session::new(test_config());
    if !session.probe_reachability() {
        eprintln!("MySQL not reachable, skipping live test");
        return None;
    }
    match session.connect_to_database() {
        Ok(()) => Some(session),
        Err(e) => {
            eprintln!("MySQL reachable but connection failed ({}), skipping live test", e);
            None
        }
    }
}

/// A name no other test run will collide with.
pub fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}
