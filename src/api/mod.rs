pub mod board;
pub mod departures;
pub mod directions;
pub mod error;
pub mod trips;

pub use error::{internal_error, not_found, ErrorResponse};

use std::sync::Arc;
use utoipa::OpenApi;

use crate::providers::cicero::CiceroClient;
use crate::providers::italo::ItaloClient;
use crate::providers::motis::MotisClient;
use crate::providers::trentino::TrentinoClient;
use crate::providers::viaggiatreno::ViaggiatrenoClient;
use crate::stations::StationDirectory;
use crate::stream::PollConfig;

#[derive(Clone)]
pub struct AppState {
    pub stations: Arc<StationDirectory>,
    pub viaggiatreno: Arc<ViaggiatrenoClient>,
    pub italo: Arc<ItaloClient>,
    pub trentino: Arc<TrentinoClient>,
    pub cicero: Arc<CiceroClient>,
    pub motis: Arc<MotisClient>,
    pub poll: PollConfig,
}

#[derive(OpenApi)]
#[openapi(tags(
    (name = "trips", description = "Live trip tracking"),
    (name = "departures", description = "Nearby stop departures"),
    (name = "board", description = "Station departure boards"),
    (name = "directions", description = "Journey planning")
))]
pub struct ApiDoc;
