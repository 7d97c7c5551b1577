mod order_lifecycle_api;

pub use order_lifecycle_api::{DeliveryOutcome, LifecycleSettings, OrderLifecycleApi};
