use std::sync::OnceLock;
use std::time::Instant;

use deadpool_postgres::GenericClient;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Error as PgError, Row};
use tracing::warn;

pub type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

fn slow_query_threshold_ms() -> Option<u64> {
    static CACHE: OnceLock<Option<u64>> = OnceLock::new();

    *CACHE.get_or_init(|| parse_threshold(std::env::var("IV_DB_LOG_MIN_DURATION_MS").ok()))
}

fn parse_threshold(raw: Option<String>) -> Option<u64> {
    raw.and_then(|raw| raw.trim().parse::<i64>().ok())
        .map(|v| v.max(0) as u64)
        .filter(|v| *v > 0)
}

fn maybe_log_slow_query(label: &str, started_at: Instant) {
    if let Some(threshold_ms) = slow_query_threshold_ms() {
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        if elapsed_ms >= threshold_ms {
            warn!(query = label, elapsed_ms, "slow_query_detected");
        }
    }
}

pub async fn query_cached<C>(
    client: &C,
    statement: &str,
    params: Params<'_>,
    label: &str,
) -> Result<Vec<Row>, PgError>
where
    C: GenericClient + Sync,
{
    let started = Instant::now();
    let prepared = client.prepare_cached(statement).await?;
    let result = client.query(&prepared, params).await;
    maybe_log_slow_query(label, started);
    result
}

pub async fn query_opt_cached<C>(
    client: &C,
    statement: &str,
    params: Params<'_>,
    label: &str,
) -> Result<Option<Row>, PgError>
where
    C: GenericClient + Sync,
{
    let started = Instant::now();
    let prepared = client.prepare_cached(statement).await?;
    let result = client.query_opt(&prepared, params).await;
    maybe_log_slow_query(label, started);
    result
}

pub async fn query_one_cached<C>(
    client: &C,
    statement: &str,
    params: Params<'_>,
    label: &str,
) -> Result<Row, PgError>
where
    C: GenericClient + Sync,
{
    let started = Instant::now();
    let prepared = client.prepare_cached(statement).await?;
    let result = client.query_one(&prepared, params).await;
    maybe_log_slow_query(label, started);
    result
}

pub async fn execute_cached<C>(
    client: &C,
    statement: &str,
    params: Params<'_>,
    label: &str,
) -> Result<u64, PgError>
where
    C: GenericClient + Sync,
{
    let started = Instant::now();
    let prepared = client.prepare_cached(statement).await?;
    let result = client.execute(&prepared, params).await;
    maybe_log_slow_query(label, started);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_ignores_zero_negative_and_garbage() {
        assert_eq!(parse_threshold(None), None);
        assert_eq!(parse_threshold(Some("0".into())), None);
        assert_eq!(parse_threshold(Some("-5".into())), None);
        assert_eq!(parse_threshold(Some("slow".into())), None);
        assert_eq!(parse_threshold(Some(" 250 ".into())), Some(250));
    }
}
