use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use tracing::info;

use crate::error::HarnessError;

/// Open a single-connection pool for `url`.
///
/// One connection keeps `sqlite::memory:` databases alive for the whole
/// run and guarantees the test transaction sees every statement.
pub async fn connect(url: &str) -> Result<DatabaseConnection, HarnessError> {
    let mut opt = ConnectOptions::new(url);
    opt.min_connections(1)
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(2))
        .sqlx_logging(true);

    let conn = Database::connect(opt).await.map_err(|e| {
        HarnessError::config(format!(
            "failed to connect to database {}: {e}",
            sanitize_db_url(url)
        ))
    })?;

    info!(db_url = %sanitize_db_url(url), backend = ?conn.get_database_backend(), "database connected");
    Ok(conn)
}

/// Sanitize database URL by masking password in connection strings.
pub fn sanitize_db_url(url: &str) -> String {
    let Some((auth_part, host_part)) = url.split_once('@') else {
        return url.to_string();
    };
    if host_part.contains('@') {
        return url.to_string();
    }
    match auth_part.rfind(':') {
        Some(colon_pos) if auth_part[..colon_pos].contains("//") => {
            format!("{}:***@{}", &auth_part[..colon_pos], host_part)
        }
        _ => url.to_string(),
    }
}
