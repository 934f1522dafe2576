//! # kindling-core
//!
//! Provisioning pipeline for a local Kubernetes environment: a Lima VM
//! running Docker, a Docker CLI context pointing at it, and a multi-node kind
//! cluster with Calico networking.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   kindling-core (host)                   │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌─────────────────┐     ┌──────────────────────────┐   │
//! │  │  Environment    │────▶│  StepGraph<Context>      │   │
//! │  │   - up()        │     │   topological run,       │   │
//! │  │   - down()      │     │   concurrent branches    │   │
//! │  │   - verify()    │     └──────────────────────────┘   │
//! │  │   - plan()      │                │                   │
//! │  └─────────────────┘                ▼                   │
//! │                          ┌──────────────────────────┐   │
//! │                          │  Steps                   │   │
//! │                          │  dirs, topology, VM,     │   │
//! │                          │  boot agent, context,    │   │
//! │                          │  cluster, credentials,   │   │
//! │                          │  CNI, verification       │   │
//! │                          └──────────────────────────┘   │
//! │                                     │                   │
//! │                                     ▼                   │
//! │  ┌─────────────────┐     ┌──────────────────────────┐   │
//! │  │  CommandRunner  │◀────│  LimaVm, ClusterManager, │   │
//! │  │ (kindling-vm)   │     │  Kubectl, Cni, Health    │   │
//! │  └─────────────────┘     └──────────────────────────┘   │
//! │                                                          │
//! └──────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//!        limactl · docker · kind · kubectl · launchctl
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use kindling_core::{Environment, Settings, SettingsOverrides};
//!
//! # async fn example() -> kindling_core::Result<()> {
//! let settings = Settings::load(None, SettingsOverrides::default())?;
//! let env = Environment::for_host(settings, None)?;
//!
//! let report = env.up().await?;
//! println!("kubeconfig: {}", report.outputs.kubeconfig_path.display());
//!
//! // Point-in-time health, never fails.
//! println!("{}", env.verify().await);
//!
//! // Best-effort removal of everything up() created.
//! env.down().await;
//! # Ok(())
//! # }
//! ```
//!
//! Every step re-queries the outside world before acting, so `up` can be run
//! again on a provisioned machine and will only do what is missing.

pub mod cluster;
pub mod cni;
pub mod config;
mod context;
pub mod credentials;
pub mod dag;
mod error;
pub mod health;
pub mod kube;
pub mod paths;
mod pipeline;
pub mod profile;
pub mod steps;
pub mod topology;

pub use config::{Settings, SettingsOverrides};
pub use context::Context;
pub use dag::{RunReport, Step, StepGraph, StepReport, StepStatus};
pub use error::{CoreError, Result};
pub use health::{CheckResult, CheckStatus, HealthReport};
pub use paths::{Paths, Platform};
pub use pipeline::{Environment, Outputs, UpReport};
