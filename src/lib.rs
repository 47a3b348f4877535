pub mod config;
pub mod map;
pub mod route;
pub mod search;
pub mod services;
pub mod session;
pub mod storage;

use thiserror::Error;

pub type GenericError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum NearbyError {
    #[error("Address not found.")]
    AddressNotFound(),
    #[error("Invalid coordinate ({0}, {1}).")]
    InvalidCoordinate(f64, f64),
    #[error("{service} responded with status {status}.")]
    RemoteStatus { service: &'static str, status: u16 },
    #[error("No route between the selected points.")]
    RouteNotFound(),
    #[error("No result number {0} to route to.")]
    NoSuchResult(usize),
    #[error("Configuration error: {0}")]
    Config(String),
}
