//! Cloud collaborators used by the provisioning pipeline
//!
//! ## Backends
//!
//! - **AWS** (feature `aws`): EC2, CloudWatch, SNS, IAM and STS through the AWS SDK
//! - **In-Memory**: no network access, for tests and dry runs
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use ec2_alarms::services::memory::MemoryCloud;
//! use ec2_alarms::orchestrator::Services;
//!
//! let cloud = Arc::new(MemoryCloud::new());
//! let services = Services::uniform(cloud);
//! ```

#[cfg(feature = "aws")]
pub mod aws;
pub mod backend;
pub mod memory;

pub use backend::{
    Discovery, IdentityResolver, InstancePage, MetricCatalog, Monitoring, NotificationResolver,
};
