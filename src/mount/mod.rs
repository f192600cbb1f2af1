//! Mount - reconciling layouts with live platform content.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────────────────────┐
//!  LayoutState ────▶ │ MountState                   │ ──▶ HostContainer::mount / move / unmount
//!  visible rect ───▶ │   items: id → MountItem      │
//!                    │   pools: type → content      │ ◀── ContentFactory
//!                    └──────────────────────────────┘
//!                       │          │            │
//!                 Incremental  Visibility  WorkingRanges
//! ```
//!
//! The platform is reached only through the traits of the platform module, so the
//! whole pipeline runs against recording fakes in tests.

mod incremental;
mod mount_item;
mod mount_state;
mod platform;
mod pool;
mod visibility;
mod working_range;

pub use incremental::*;
pub use mount_item::*;
pub use mount_state::*;
pub use platform::*;
pub use pool::*;
pub use visibility::*;
pub use working_range::*;
