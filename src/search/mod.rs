//! Container search pipeline: geocoder, query builder, distance ranker, paginator.

pub mod distance;
pub mod geocoder;
pub mod paginate;
pub mod query;

pub use distance::{haversine_miles, rank_by_distance, within_radius, Coordinate, Located, RadiusPolicy};
pub use geocoder::{geocode_location, geocode_postal_code, GeocodeResult};
pub use paginate::{paginate, parse_page, Page};
pub use query::{order_by_sql, ContainerFilter};
