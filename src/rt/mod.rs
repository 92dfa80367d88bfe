pub mod departures;
pub mod directions;
pub mod position;
pub mod reconcile;
pub mod time;
