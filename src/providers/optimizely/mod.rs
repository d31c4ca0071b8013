mod changes;
mod client;
mod custom_goals;
mod provider;
mod targeting;
mod traffic_allocation;
mod types;

pub use client::OptimizelyClient;
pub use custom_goals::DEFAULT_ANALYTICS_MARKER;
pub use provider::OptimizelyProvider;
pub use traffic_allocation::DEFAULT_TOTAL_ALLOCATION;
pub use types::EntityId;
