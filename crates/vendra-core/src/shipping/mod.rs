//! Shipping: coverage matching, delivery fees, dispatch and tracking

pub mod coverage;
pub mod dispatch;
pub mod fees;
pub mod providers;
pub mod tracking;

pub use coverage::CoverageResolver;
pub use dispatch::{DeliveryDispatcher, DispatchRequest};
pub use fees::FeeCalculator;
pub use providers::{
    HttpProviderClient, ProviderClient, ProviderShipmentRequest, ProviderShipmentResponse,
};
pub use tracking::{DeliveryTracker, TrackingUpdate};
