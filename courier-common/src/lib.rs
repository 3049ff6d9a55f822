pub mod identity;
pub mod logging;
pub mod protocol;

pub use tracing;

/// Control signals broadcast to every serving component.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
    Finalised,
}
