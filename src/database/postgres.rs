//! PostgreSQL-backed record store
use async_trait::async_trait;
use log::info;
use tokio_postgres::{Client, Row};

use super::connection::connect;
use super::store::{RecordQuery, RecordStore, StoreResult};
use crate::models::{DistanceReading, Reading, Record, RecordId, RecordKind, Transmission};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sensor_reading (
    id BIGSERIAL PRIMARY KEY,
    device_id VARCHAR(50) NOT NULL,
    timestamp_origin BIGINT NOT NULL,
    timestamp_receive BIGINT NOT NULL,
    illumination DOUBLE PRECISION NOT NULL,
    temperature DOUBLE PRECISION NOT NULL,
    pressure DOUBLE PRECISION NOT NULL,
    moisture DOUBLE PRECISION NOT NULL,
    UNIQUE (device_id, timestamp_origin)
);
CREATE TABLE IF NOT EXISTS distance_reading (
    id BIGSERIAL PRIMARY KEY,
    mac VARCHAR(50) NOT NULL,
    timestamp_origin BIGINT NOT NULL,
    timestamp_receive BIGINT NOT NULL,
    distance DOUBLE PRECISION NOT NULL,
    UNIQUE (mac, timestamp_origin)
);
";

// Optional predicates are passed as NULL so every statement stays static
const READING_FILTER: &str = "($1::TEXT IS NULL OR device_id = $1)
    AND ($2::BIGINT IS NULL OR timestamp_origin >= $2)
    AND ($3::BIGINT IS NULL OR timestamp_origin <= $3)";

const DISTANCE_FILTER: &str = "($1::TEXT IS NULL OR mac = $1)
    AND ($2::BIGINT IS NULL OR timestamp_origin >= $2)
    AND ($3::BIGINT IS NULL OR timestamp_origin <= $3)";

pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using a database URL (see [`connect`])
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        Ok(Self::new(connect(database_url).await?))
    }

    /// Create the tables if they do not exist yet
    pub async fn migrate(&self) -> StoreResult<()> {
        self.client.batch_execute(SCHEMA).await?;
        info!("Database schema ready");
        Ok(())
    }

    fn select(kind: RecordKind, tail: &str) -> String {
        match kind {
            RecordKind::Reading => format!(
                "SELECT id, device_id, timestamp_origin, timestamp_receive, illumination, temperature, pressure, moisture
                 FROM sensor_reading WHERE {} {}",
                READING_FILTER, tail
            ),
            RecordKind::Distance => format!(
                "SELECT id, mac, timestamp_origin, timestamp_receive, distance
                 FROM distance_reading WHERE {} {}",
                DISTANCE_FILTER, tail
            ),
        }
    }

    async fn query_records(&self, query: &RecordQuery, tail: &str) -> StoreResult<Vec<Record>> {
        let sql = Self::select(query.kind, tail);
        let rows = self
            .client
            .query(sql.as_str(), &[&query.device, &query.since, &query.until])
            .await?;
        rows.iter().map(|row| record_from_row(query.kind, row)).collect()
    }
}

fn record_from_row(kind: RecordKind, row: &Row) -> StoreResult<Record> {
    let transmission = match kind {
        RecordKind::Reading => Transmission::Reading(Reading {
            device_id: row.try_get(1)?,
            timestamp_origin: row.try_get(2)?,
            timestamp_receive: row.try_get(3)?,
            illumination: row.try_get(4)?,
            temperature: row.try_get(5)?,
            pressure: row.try_get(6)?,
            moisture: row.try_get(7)?,
        }),
        RecordKind::Distance => Transmission::Distance(DistanceReading {
            mac: row.try_get(1)?,
            timestamp_origin: row.try_get(2)?,
            timestamp_receive: row.try_get(3)?,
            distance: row.try_get(4)?,
        }),
    };

    Ok(Record {
        id: row.try_get(0)?,
        transmission,
    })
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn create(&self, transmission: &Transmission) -> StoreResult<RecordId> {
        // A redelivered transmission hits the unique key and resolves to the stored row
        let inserted = match transmission {
            Transmission::Reading(r) => {
                self.client
                    .query_opt(
                        "INSERT INTO sensor_reading(device_id, timestamp_origin, timestamp_receive, illumination, temperature, pressure, moisture)
                         VALUES ($1, $2, $3, $4, $5, $6, $7)
                         ON CONFLICT (device_id, timestamp_origin) DO NOTHING
                         RETURNING id",
                        &[
                            &r.device_id,
                            &r.timestamp_origin,
                            &r.timestamp_receive,
                            &r.illumination,
                            &r.temperature,
                            &r.pressure,
                            &r.moisture,
                        ],
                    )
                    .await?
            }
            Transmission::Distance(d) => {
                self.client
                    .query_opt(
                        "INSERT INTO distance_reading(mac, timestamp_origin, timestamp_receive, distance)
                         VALUES ($1, $2, $3, $4)
                         ON CONFLICT (mac, timestamp_origin) DO NOTHING
                         RETURNING id",
                        &[&d.mac, &d.timestamp_origin, &d.timestamp_receive, &d.distance],
                    )
                    .await?
            }
        };

        if let Some(row) = inserted {
            return Ok(row.try_get(0)?);
        }

        let existing = match transmission {
            Transmission::Reading(r) => {
                self.client
                    .query_one(
                        "SELECT id FROM sensor_reading WHERE device_id = $1 AND timestamp_origin = $2",
                        &[&r.device_id, &r.timestamp_origin],
                    )
                    .await?
            }
            Transmission::Distance(d) => {
                self.client
                    .query_one(
                        "SELECT id FROM distance_reading WHERE mac = $1 AND timestamp_origin = $2",
                        &[&d.mac, &d.timestamp_origin],
                    )
                    .await?
            }
        };
        Ok(existing.try_get(0)?)
    }

    async fn filter(&self, query: &RecordQuery) -> StoreResult<Vec<Record>> {
        self.query_records(query, "ORDER BY id ASC").await
    }

    async fn count(&self, query: &RecordQuery) -> StoreResult<u64> {
        let sql = match query.kind {
            RecordKind::Reading => format!("SELECT COUNT(*) FROM sensor_reading WHERE {}", READING_FILTER),
            RecordKind::Distance => format!("SELECT COUNT(*) FROM distance_reading WHERE {}", DISTANCE_FILTER),
        };
        let row = self
            .client
            .query_one(sql.as_str(), &[&query.device, &query.since, &query.until])
            .await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn last(&self, query: &RecordQuery) -> StoreResult<Option<Record>> {
        Ok(self
            .query_records(query, "ORDER BY id DESC LIMIT 1")
            .await?
            .into_iter()
            .next())
    }
}
