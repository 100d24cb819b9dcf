use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod models;
mod services;

use config::{AppConfig, Command};
use services::{
    depot_service::DepotService,
    metadata_store::PgMetadataStore,
    object_downloader::{Alignment, ObjectDownloader},
    url_resolver::BulkUrlResolver,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args().context("loading configuration")?;

    tracing::debug!("Starting depot-fetch with config: {:?}", cfg);

    // --- Connect to the depot database ---
    let store = PgMetadataStore::connect(&cfg.database_url(), cfg.max_connections)
        .await
        .with_context(|| format!("connecting to depot database at {}", cfg.database))?;

    // --- Build downloader ---
    let client = Client::new();
    let alignment = if cfg.allow_truncation {
        Alignment::Truncate
    } else {
        Alignment::Strict
    };
    let downloader = ObjectDownloader::new(
        client.clone(),
        BulkUrlResolver::new(client, cfg.bulk_endpoint.clone()),
    )
    .with_alignment(alignment)
    .with_verbose(cfg.verbose);

    let service = DepotService::new(Arc::new(store), downloader);
    let dest = cfg.destination.as_path();

    // --- Run the selected download ---
    let written = match &command {
        Command::Series { study, series } => service
            .download_series(cfg.modality, study, series, dest)
            .await
            .with_context(|| format!("downloading study {study} series {series}"))?,
        Command::Patient { patient_id } => service
            .download_patient(cfg.modality, patient_id, dest)
            .await
            .with_context(|| format!("downloading patient {patient_id}"))?,
        Command::Identifier { identifier } => service
            .download_patient_by_identifier(cfg.modality, identifier, dest)
            .await
            .with_context(|| format!("downloading patient with identifier {identifier}"))?,
        Command::Study { study } => service
            .download_study(cfg.modality, study, dest)
            .await
            .with_context(|| format!("downloading study {study}"))?,
    };

    tracing::info!(
        "Wrote {} files under {}",
        written,
        cfg.destination.display()
    );

    Ok(())
}
