mod geo;
mod observation;
mod response;

pub use geo::GeoPoint;
pub use observation::ObservationRow;
pub use response::{HourlyResponse, HourlySeries};
