//! # magikengine
//!
//! **Dual-Backend Container Engine Facade**
//!
//! One operation surface for container engine calls, realized either
//! in-process against a local runtime (Direct) or over a connection to an
//! engine service (Remote). The backend is chosen once, at construction,
//! from configuration.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          magikengine                                │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────────┐    │
//! │  │                 ContainerEngine Trait                       │    │
//! │  │  health_check_run │ auto_update │ events │ network_update   │    │
//! │  │  artifact_pull │ image_untag │ info │ show/set_trust        │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! │                 │                               │                   │
//! │  ┌──────────────┴─────────────┐  ┌──────────────┴────────────────┐  │
//! │  │        DirectEngine        │  │         RemoteEngine          │  │
//! │  │  LocalRuntime + Storage    │  │  CapabilityTable              │  │
//! │  │  AutoUpdater, TrustPolicy  │  │  protocol: params, auth, map  │  │
//! │  └────────────────────────────┘  └──────────────┬────────────────┘  │
//! │                                                 │                   │
//! │                                  ┌──────────────┴────────────────┐  │
//! │                                  │  ClientContext (negotiated)   │  │
//! │                                  │  unix │ npipe │ tcp (+TLS)    │  │
//! │                                  └──────────────┬────────────────┘  │
//! ├─────────────────────────────────────────────────┼───────────────────┤
//! │                   Machine-mediated targets      │                   │
//! │  ┌──────────────┐ ┌──────────────┐ ┌────────────┴─┐ ┌────────────┐  │
//! │  │ QemuStubber  │ │LibKrunStubber│ │AppleHvStubber│ │ WslStubber │  │
//! │  └──────────────┘ └──────────────┘ └──────────────┘ └────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Error Parity
//!
//! Every failure classifies into one [`ErrorKind`]. The same logical outcome
//! produces the same kind whichever backend served the call:
//!
//! | Outcome                    | Direct                  | Remote          | Kind        |
//! |----------------------------|-------------------------|-----------------|-------------|
//! | container missing          | `ContainerNotFound`     | HTTP 404        | NotFound    |
//! | no health check / stopped  | `HealthCheckNotDefined` | HTTP 409        | Conflict    |
//! | operation not in mode      | n/a                     | local, no call  | Unsupported |
//! | VM down, dial/TLS failure  | n/a                     | `Connection`    | TransportFailure |
//!
//! # Example
//!
//! ```rust,ignore
//! use magikengine::{EngineBuilder, HealthCheckOptions, config};
//!
//! #[tokio::main]
//! async fn main() -> magikengine::Result<()> {
//!     let config = config::load(None)?;
//!     let engine = EngineBuilder::new(config).build().await?;
//!     let report = engine
//!         .health_check_run("web", HealthCheckOptions::default())
//!         .await?;
//!     println!("{}", report.status);
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod constants;
pub mod engine;
pub mod error;
pub mod machine;
pub mod platform;
pub mod protocol;
pub mod runtime;
pub mod transport;

// Re-exports
pub use client::{ClientContext, negotiate};
pub use config::{EngineConfig, EngineMode, RuntimeConfig};
pub use connection::{ConnectionDescriptor, TlsMaterial};
pub use engine::{
    CapabilityTable, ContainerEngine, DirectEngine, EngineBuilder, EventSubscription, EventsEnd,
    HealthCheckOptions, HealthCheckResults, HealthCheckStatus, Operation, RemoteEngine,
    new_container_engine,
};
pub use error::{Error, ErrorKind, Result};
pub use machine::{MachineConfig, MachineProvider, MachineState, MachineStubber, VmType};
pub use platform::{Arch, Os, Platform, TransportFamily};
pub use transport::{
    AddressKind, ApiRequest, ApiResponse, Connector, HttpConnector, HttpTransport, Transport,
    TransportAddress, resolve_address,
};
