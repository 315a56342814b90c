//! Run one cache refresh against a configured Odie backend and print the
//! resulting POI listing.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use color_eyre::eyre::{Context, Result, eyre};
use mockable::DefaultClock;
use ortho_config::OrthoConfig;
use tokio::runtime::Builder;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use urbo::UrboSettings;
use urbo::domain::ports::{
    EngineEvents, PutResponse, RecognitionEngine, RecognitionEngineError,
};
use urbo::domain::{
    BackendSlot, BlobUploader, LocationFix, Poi, RequestId, Snapshot, SnapshotId, SyncScheduler,
    SyncSchedulerPorts,
};
use urbo::outbound::blob::HttpBlobSink;
use urbo::outbound::image_store::CapStdImageStore;
use urbo::outbound::odie::OdieBackendFactory;

/// `urbo-probe` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "urbo-probe",
    about = "Request the POI listing for one location through the sync scheduler",
    version
)]
struct CliArgs {
    /// Latitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,
    /// Longitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    lon: f64,
    /// Horizontal accuracy in metres.
    #[arg(long, default_value_t = 20.0)]
    accuracy: f32,
    /// Backend endpoint. Falls back to `URBO_ENDPOINT` and then the default.
    #[arg(long, value_name = "url")]
    endpoint: Option<String>,
    /// API key. Falls back to `URBO_API_KEY`.
    #[arg(long = "api-key", value_name = "key")]
    api_key: Option<String>,
}

/// Engine stand-in that hands the terminal listing back to `main`.
struct ListingEngine {
    answer: Mutex<Option<oneshot::Sender<Option<Vec<Poi>>>>>,
}

impl RecognitionEngine for ListingEngine {
    fn push_location(&self, _fix: LocationFix) {}

    fn take_snapshot(&self) -> bool {
        false
    }

    fn get_snapshot(&self, _id: SnapshotId) -> bool {
        false
    }

    fn get_poi_shortlist(&self, _for_search: bool) -> Vec<Poi> {
        Vec::new()
    }

    fn tag_snapshot(&self, snapshot: &Snapshot, _poi: &Poi) -> Result<(), RecognitionEngineError> {
        Err(RecognitionEngineError::not_found(snapshot.id.0))
    }

    fn confirm_recognition(&self, id: SnapshotId) -> Result<(), RecognitionEngineError> {
        Err(RecognitionEngineError::not_found(id.0))
    }

    fn reject_recognition(&self, id: SnapshotId) -> Result<(), RecognitionEngineError> {
        Err(RecognitionEngineError::not_found(id.0))
    }

    fn force_cache_refresh(&self) {}

    fn current_location(&self) -> Option<LocationFix> {
        None
    }

    fn restart_live_feed(&self) {}

    fn stop_live_feed(&self) {}

    fn poi_cache_request_callback(
        &self,
        request_id: RequestId,
        _fix: LocationFix,
        pois: Option<Vec<Poi>>,
    ) -> bool {
        let accepted = pois.is_some();
        let sender = match self.answer.lock() {
            Ok(mut answer) => answer.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(sender) => {
                let _ = sender.send(pois);
            }
            None => warn!(request_id = %request_id, "unexpected second answer"),
        }
        accepted
    }

    fn poi_cache_update_callback(&self, _response: &PutResponse) {}

    fn bind_events(&self, _events: Weak<dyn EngineEvents>) {}
}

fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        eprintln!("tracing init failed: {e}");
    }

    let args = CliArgs::parse();
    let settings = UrboSettings::load_from_iter([OsString::from("urbo-probe")])
        .map_err(|err| eyre!("failed to load configuration: {err}"))?;
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("create Tokio runtime")?;
    runtime.block_on(request_listing(args, settings))
}

async fn request_listing(args: CliArgs, settings: UrboSettings) -> Result<()> {
    let timeout = settings.request_timeout();
    let backend = Arc::new(BackendSlot::new(Arc::new(OdieBackendFactory::new(timeout))));
    backend.set_endpoint(args.endpoint.as_deref().unwrap_or(settings.endpoint()))?;
    let api_key = args
        .api_key
        .or_else(|| settings.api_key.clone())
        .ok_or_else(|| eyre!("an API key is required (--api-key or URBO_API_KEY)"))?;
    backend.set_api_key(&api_key)?;

    let image_dir = settings.image_dir();
    let images = CapStdImageStore::open(&image_dir, settings.max_image_cache_bytes())
        .wrap_err_with(|| format!("open image directory {}", image_dir.display()))?;
    let sink = HttpBlobSink::new(timeout).wrap_err("build blob sink")?;
    let uploader = Arc::new(BlobUploader::new(Arc::new(sink)));

    let (answer, listing) = oneshot::channel();
    let engine = Arc::new(ListingEngine {
        answer: Mutex::new(Some(answer)),
    });
    let options = settings.urbo_options();
    let scheduler = SyncScheduler::new(
        SyncSchedulerPorts::new(backend, engine, Arc::clone(&uploader), Arc::new(images)),
        Arc::new(DefaultClock),
        options.scheduler.clone(),
    );

    let fix = LocationFix::new(args.lat, args.lon, args.accuracy, Utc::now())?;
    info!(lat = args.lat, lon = args.lon, "requesting POI listing");
    scheduler.submit_cache_request(RequestId(1), fix)?;

    let deadline = options.scheduler.poll_ceiling + timeout + Duration::from_secs(5);
    let pois = tokio::time::timeout(deadline, listing)
        .await
        .wrap_err("no answer before the poll deadline")?
        .wrap_err("scheduler dropped the request")?;
    scheduler.shutdown().await;

    let Some(pois) = pois else {
        return Err(eyre!("cache refresh failed; see logs for the backend error"));
    };
    println!("{} POIs", pois.len());
    for poi in &pois {
        println!(
            "{}\t{}\t{}",
            poi.client_id,
            poi.server_id.as_deref().unwrap_or("-"),
            poi.name
        );
    }
    match uploader.target() {
        Some(target) => println!("upload target: s3://{}/{}", target.bucket, target.folder),
        None => println!("upload target: none"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use env_lock::lock_env;
    use rstest::rstest;

    #[rstest]
    fn negative_coordinates_parse_as_values() {
        let args = CliArgs::try_parse_from([
            "urbo-probe",
            "--lat",
            "-33.9",
            "--lon",
            "-151.2",
            "--api-key",
            "key",
        ])
        .expect("arguments parse");

        assert_eq!(args.lat, -33.9);
        assert_eq!(args.lon, -151.2);
        assert_eq!(args.accuracy, 20.0);
        assert_eq!(args.api_key.as_deref(), Some("key"));
        assert!(args.endpoint.is_none());
    }

    #[rstest]
    fn missing_coordinates_are_rejected() {
        assert!(CliArgs::try_parse_from(["urbo-probe", "--lat", "1.0"]).is_err());
    }

    #[rstest]
    fn settings_load_with_only_the_program_name() {
        let _guard = lock_env([
            ("URBO_ENDPOINT", None::<&str>),
            ("URBO_API_KEY", None),
            ("URBO_REQUEST_TIMEOUT_SECS", Some("7")),
        ]);

        let settings = UrboSettings::load_from_iter([OsString::from("urbo-probe")])
            .expect("settings load");

        assert_eq!(settings.request_timeout(), Duration::from_secs(7));
        assert!(settings.api_key.is_none());
    }
}
