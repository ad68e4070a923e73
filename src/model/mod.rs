pub mod config_store;
pub mod identity;
pub mod layout;
pub mod server;
mod space;

pub use config_store::{ConfigEvent, ConfigStore, SubscriptionToken};
pub use identity::{Resolution, SharedResolver, SpaceResolver, Tier};
pub use layout::{LayoutCache, SpaceLayout};
pub use space::{SpaceId, SpaceOrder};
