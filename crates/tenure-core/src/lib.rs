mod identity;
mod traits;

pub use identity::{DEFAULT_NAMESPACE, InstanceId, LeaseKeys, ParseInstanceIdError};
pub use traits::{
    Broadcast, LeaseCommand, LeaseStore, Operation, Outcome, Store, StoreError, Subscription,
};
