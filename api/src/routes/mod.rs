//! API route definitions.
//!
//! This module organizes all HTTP routes for the Spanhouse query service.

mod error;
mod health;
mod services;
mod traces;

pub use error::ErrorResponse;
pub use health::health_routes;
pub use services::{services_routes, DataResponse};
pub use traces::{traces_routes, FindTracesQuery, ParamError, TraceResponse};
