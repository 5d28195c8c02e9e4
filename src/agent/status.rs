//! Device-side status endpoint polled by the collector

use std::sync::Arc;

use rocket::{Build, Rocket, State, figment::Figment, get, http::Status, routes, serde::json::Json};
use tracing::{instrument, warn};

use crate::config::StatusHttpConfig;
use crate::protocol::PollResponse;
use crate::sensors::SensorSource;

struct Sensors(Arc<dyn SensorSource>);

#[get("/status")]
#[instrument(skip_all)]
async fn status(sensors: &State<Sensors>) -> Result<Json<PollResponse>, Status> {
    let sensors = Arc::clone(&sensors.0);

    let readings = rocket::tokio::task::spawn_blocking(move || {
        Ok::<_, crate::error::MonitorError>((sensors.battery()?, sensors.storage()?))
    })
    .await;

    match readings {
        Ok(Ok((battery, storage))) => Ok(Json(PollResponse::new(
            battery.percent.min(100),
            storage.summary(),
        ))),
        Ok(Err(e)) => {
            warn!("sensor read failed: {e}");
            Err(Status::ServiceUnavailable)
        }
        Err(e) => {
            warn!("sensor task failed: {e}");
            Err(Status::InternalServerError)
        }
    }
}

#[get("/ping")]
fn ping() {}

fn get_config(config: &StatusHttpConfig) -> Figment {
    rocket::Config::figment()
        .merge(("port", config.port))
        .merge(("address", config.addr))
        .merge(("workers", 1))
}

/// Build the status server without launching it.
pub fn build(config: &StatusHttpConfig, sensors: Arc<dyn SensorSource>) -> Rocket<Build> {
    rocket::custom(get_config(config))
        .manage(Sensors(sensors))
        .mount("/", routes![status, ping])
}
