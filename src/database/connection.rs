use log::{error, info};
use openssl::ssl::{SslConnector, SslMethod};
use postgres_openssl::MakeTlsConnector;
use tokio_postgres::{Client, NoTls};
use url::Url;

use crate::error::StoreError;

pub fn create_ssl_connector(sslrootcert_path: &str) -> Result<MakeTlsConnector, StoreError> {
    let mut builder = SslConnector::builder(SslMethod::tls())
        .map_err(|e| StoreError::Unavailable(format!("SSL builder error: {}", e)))?;

    builder
        .set_ca_file(sslrootcert_path)
        .map_err(|e| StoreError::Unavailable(format!("Error loading CA cert: {}", e)))?;

    Ok(MakeTlsConnector::new(builder.build()))
}

/// Connection target split out of a database URL
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectTarget {
    /// URL without the `sslrootcert` parameter
    pub url: String,
    /// CA certificate to verify the server against; TLS is used only when set
    pub sslrootcert: Option<String>,
}

/// Separate the `sslrootcert` query parameter from the rest of the URL
pub fn parse_database_url(database_url: &str) -> Result<ConnectTarget, StoreError> {
    let url = Url::parse(database_url)
        .map_err(|e| StoreError::Unavailable(format!("URL parse error: {}", e)))?;

    let mut sslrootcert = None;
    let mut clean_params = Vec::new();
    for (key, value) in url.query_pairs() {
        if key == "sslrootcert" {
            sslrootcert = Some(value.to_string());
        } else {
            clean_params.push((key.into_owned(), value.into_owned()));
        }
    }

    let mut clean_url = url.clone();
    clean_url.set_query(None);
    if !clean_params.is_empty() {
        let query = clean_params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        clean_url.set_query(Some(&query));
    }

    Ok(ConnectTarget {
        url: clean_url.to_string(),
        sslrootcert,
    })
}

/// Open one PostgreSQL connection and drive it on a background task
///
/// No retries: a failure here is reported to the caller.
pub async fn connect(database_url: &str) -> Result<Client, StoreError> {
    let target = parse_database_url(database_url)?;

    let client = match &target.sslrootcert {
        Some(path) => {
            let connector = create_ssl_connector(path)?;
            let (client, connection) = tokio_postgres::connect(&target.url, connector).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("Connection error: {}", e);
                }
            });
            client
        }
        None => {
            let (client, connection) = tokio_postgres::connect(&target.url, NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("Connection error: {}", e);
                }
            });
            client
        }
    };

    info!(
        "Connected to database{}",
        if target.sslrootcert.is_some() { " over TLS" } else { "" }
    );
    Ok(client)
}
