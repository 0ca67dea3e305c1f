pub mod error;
pub mod host_policy;
pub mod schema;
pub mod store;
pub mod types;

pub use error::{StoreError, Result};
pub use host_policy::HostPolicyConfig;
pub use store::{ClaimedWork, Store, StoreConfig, TuneForIndex, WorkKind};
pub use types::{
    DisabledReason, HostRow, TuneRow, TunebookRow, TunebookStatus, UrlRow, UrlStatus,
    ERASED_SENTINEL,
};
