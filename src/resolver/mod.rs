//! Playback resolution: link classification, the per-view resolver state
//! machine, and the desktop surfaces that realise its effects.

pub mod classify;
pub mod machine;
pub mod surface;

pub use classify::{classify, Strategy, SurfaceKind};
pub use machine::{
    Effect, FetchPurpose, FetchTicket, RefreshPhase, Resolver, ResolverSettings, ResolverState, SurfacePlan,
    SurfaceRequest, SurfaceSignal,
};
pub use surface::{HostSettings, SurfaceEvent, SurfaceHost};
