use log::{error, info};
use std::sync::Arc;
use time::OffsetDateTime;

use greenhouse_ingest::config::IngestConfig;
use greenhouse_ingest::database::{Persister, PostgresStore};
use greenhouse_ingest::decoder::Router;
use greenhouse_ingest::ingest::Ingestor;
use greenhouse_ingest::mqtt::{ConnectionManager, MqttBroker, Supervisor};
use greenhouse_ingest::utils::format_datetime;

async fn main_loop(config: IngestConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Starting greenhouse ingestion service at {}",
        format_datetime(&OffsetDateTime::now_utc())
    );

    // Record store
    let store = PostgresStore::connect(&config.database_url).await?;
    store.migrate().await?;

    // Broker connection and message pipeline
    let (broker, notifier) = MqttBroker::new(&config.mqtt);
    let manager = ConnectionManager::new(broker, config.mqtt.topics.all().to_vec());
    let persister = Persister::new(Arc::new(store), Arc::new(notifier), config.notify_topic.clone());
    let ingestor = Ingestor::new(Router::new(&config.mqtt.topics), persister);

    info!(
        "Connecting to broker {}:{}",
        config.mqtt.host, config.mqtt.port
    );
    let supervisor = Supervisor::new(manager, ingestor);

    match supervisor.run().await {
        Ok(never) => match never {},
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match IngestConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            // Keep the sender alive so the service is not mistaken for stopped
            std::future::pending::<()>().await;
        }
        let _ = tx.send(());
    });

    // Run ingestion or wait for shutdown signal
    tokio::select! {
        result = main_loop(config) => {
            if let Err(e) = result {
                error!("Fatal error: {}", e);
                return Err(e);
            }
        }
        _ = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    Ok(())
}
