pub mod bootstrap;
pub mod derive;
pub mod error;
pub mod lifecycle;
pub mod naming;
pub mod provisioner;
pub mod registry;
pub mod selector;

pub use bootstrap::TenantBootstrap;
pub use derive::{ConfigDeriver, DefaultConfigDeriver, HostTemplate, TenantConfig};
pub use error::{FailureKind, TenantError};
pub use lifecycle::{LifecycleSync, MetadataGate};
pub use provisioner::{Provisioner, StorageProvisioner};
pub use registry::{AdmitAll, TenantGate, TenantRegistry, TenantState, TenantStatus};
pub use selector::{select, AliasLookup, RequestAttributes};
