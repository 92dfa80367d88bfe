pub mod board;
pub mod departures;
pub mod directions;
pub mod trips;
