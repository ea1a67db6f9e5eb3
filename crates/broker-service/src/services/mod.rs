//! Service layer for the meeting broker.
//!
//! # Components
//!
//! - `provider_client` - REST client for the provider, plus an in-memory mock
//! - `overlap` - per-host overlap detection
//! - `host_allocator` - first-fit allocation across the host list
//! - `reports` - read-only cross-host reports
//! - `workspaces` - workspace, reservation and room location pass-throughs

pub mod host_allocator;
pub mod overlap;
pub mod provider_client;
pub mod reports;
pub mod workspaces;

pub use host_allocator::{AllocationLimits, AllocationOutcome, AllocationRequest, HostAllocator};
pub use overlap::OverlapDetector;
pub use provider_client::{ProviderApi, ProviderClient};
// Mock provider exposed for integration tests
pub use provider_client::mock::MockProvider;
pub use reports::ReportService;
pub use workspaces::WorkspaceService;
