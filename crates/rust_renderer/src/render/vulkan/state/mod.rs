//! Per-frame state: swapchain lifecycle, synchronization objects and the
//! frame slot protocol

pub mod frame;
pub mod swapchain;
pub mod sync;

pub use frame::{FrameBackend, FrameStatus, FrameSynchronizer};
pub use swapchain::{
    AcquireStatus, PresentStatus, RecreateSteps, SwapchainLifecycle, SwapchainManager, SwapchainPhase, SwapchainState,
};
pub use sync::{Fence, FrameSlot, Semaphore};
