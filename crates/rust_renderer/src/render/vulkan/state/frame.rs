//! Frame slot protocol
//!
//! `FrameSynchronizer` runs one frame per call against slot
//! `current_frame % frames_in_flight`:
//!
//! 1. wait for the slot's fence
//! 2. acquire an image (out of date: recreate, return without advancing)
//! 3. prepare per-slot data for the acquired image
//! 4. reset the fence, re-record the command buffer
//! 5. submit
//! 6. present (suboptimal, out of date or a pending resize: recreate)
//! 7. advance to the next slot
//!
//! If any of steps 3 to 5 fails, the acquired image is abandoned: its
//! semaphore is consumed by an empty submission that signals the slot's fence,
//! and the swapchain is rebuilt to release the image. The error is returned
//! and the slot can be used again on the next call.
//!
//! The Vulkan work behind each step is supplied by a [`FrameBackend`].

use crate::render::vulkan::state::swapchain::{AcquireStatus, PresentStatus};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Outcome of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was submitted and presented
    Continue,
    /// The swapchain was rebuilt during this frame
    Recreated,
}

/// Steps of the frame protocol for one slot
pub trait FrameBackend {
    /// Block until the slot's previous submission has completed
    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()>;

    /// Acquire the next image, signaling the slot's image-available semaphore
    fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireStatus>;

    /// Update per-slot data before anything is reset
    fn prepare(&mut self, slot: usize, image_index: u32) -> VulkanResult<()>;

    /// Reset the slot's fence and command buffer
    fn reset_slot(&mut self, slot: usize) -> VulkanResult<()>;

    /// Record the slot's command buffer against `image_index`
    fn record(&mut self, slot: usize, image_index: u32) -> VulkanResult<()>;

    /// Submit the slot's command buffer, signaling its fence on completion
    fn submit(&mut self, slot: usize) -> VulkanResult<()>;

    /// Give up on the acquired image: consume the slot's image-available
    /// semaphore and leave its fence signaled, without rendering
    fn abandon_image(&mut self, slot: usize) -> VulkanResult<()>;

    /// Present `image_index` once the slot's rendering has finished
    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentStatus>;

    /// Consume a pending resize notification
    fn take_resize_request(&mut self) -> bool;

    /// Rebuild the swapchain and everything sized by it
    fn recreate_swapchain(&mut self) -> VulkanResult<()>;
}

/// Round-robin frame slot driver
#[derive(Debug, Clone)]
pub struct FrameSynchronizer {
    frames_in_flight: usize,
    current_frame: usize,
}

impl FrameSynchronizer {
    /// Driver for `frames_in_flight` slots, starting at slot 0
    pub fn new(frames_in_flight: usize) -> VulkanResult<Self> {
        if frames_in_flight == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "at least one frame in flight is required".to_string(),
            });
        }

        Ok(Self {
            frames_in_flight,
            current_frame: 0,
        })
    }

    /// Number of slots
    pub const fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Slot the next frame will use
    pub const fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Run one frame through `backend`
    pub fn draw_frame<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> VulkanResult<FrameStatus> {
        let slot = self.current_frame;

        backend.wait_for_slot(slot)?;

        let image_index = match backend.acquire_image(slot)? {
            AcquireStatus::Acquired { image_index, suboptimal } => {
                if suboptimal {
                    log::debug!("Acquired image {} from a suboptimal swapchain", image_index);
                }
                image_index
            }
            AcquireStatus::OutOfDate => {
                log::warn!("Swapchain out of date during acquire, dropping frame");
                backend.recreate_swapchain()?;
                return Ok(FrameStatus::Recreated);
            }
        };

        if let Err(e) = Self::submit_frame(backend, slot, image_index) {
            log::error!("Frame on slot {} failed before submission: {}", slot, e);
            Self::abandon(backend, slot);
            return Err(e);
        }

        let presented = backend.present(slot, image_index)?;

        self.current_frame = (self.current_frame + 1) % self.frames_in_flight;

        let resized = backend.take_resize_request();
        if presented.needs_recreation() || resized {
            if presented.needs_recreation() {
                log::warn!("Swapchain {:?} during present, recreating", presented);
            } else {
                log::debug!("Framebuffer resized, recreating swapchain");
            }
            backend.recreate_swapchain()?;
            return Ok(FrameStatus::Recreated);
        }

        Ok(FrameStatus::Continue)
    }

    fn submit_frame<B: FrameBackend + ?Sized>(backend: &mut B, slot: usize, image_index: u32) -> VulkanResult<()> {
        backend.prepare(slot, image_index)?;
        backend.reset_slot(slot)?;
        backend.record(slot, image_index)?;
        backend.submit(slot)
    }

    // The first error is the one reported; these are logged only
    fn abandon<B: FrameBackend + ?Sized>(backend: &mut B, slot: usize) {
        if let Err(e) = backend.abandon_image(slot) {
            log::error!("Failed to release slot {}: {}", slot, e);
        }
        if let Err(e) = backend.recreate_swapchain() {
            log::error!("Failed to recreate swapchain after an abandoned frame: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::initialization::window::SurfaceProvider;
    use crate::render::vulkan::state::swapchain::wait_for_drawable_size;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Prepare(usize, u32),
        Reset(usize),
        Record(usize, u32),
        Submit(usize),
        Abandon(usize),
        Present(usize, u32),
        Recreate,
    }

    /// Tracks fence and semaphore state per slot like the device would
    ///
    /// A fence is only signaled again by a submission, so waiting on a fence
    /// that was reset and never resubmitted panics instead of hanging.
    struct MockBackend {
        calls: Vec<Call>,
        signaled: Vec<bool>,
        observed: Vec<bool>,
        image_ready: Vec<bool>,
        acquires: VecDeque<AcquireStatus>,
        presents: VecDeque<PresentStatus>,
        resize_pending: bool,
        fail_prepare: bool,
        fail_record: bool,
        next_image: u32,
    }

    impl MockBackend {
        fn new(slots: usize) -> Self {
            Self {
                calls: Vec::new(),
                signaled: vec![true; slots],
                observed: vec![false; slots],
                image_ready: vec![false; slots],
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                resize_pending: false,
                fail_prepare: false,
                fail_record: false,
                next_image: 0,
            }
        }

        fn count(&self, call: &Call) -> usize {
            self.calls.iter().filter(|c| *c == call).count()
        }
    }

    impl FrameBackend for MockBackend {
        fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
            assert!(self.signaled[slot], "slot {} waits on a fence nothing will signal", slot);
            self.observed[slot] = true;
            self.calls.push(Call::Wait(slot));
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireStatus> {
            self.calls.push(Call::Acquire(slot));
            let status = self.acquires.pop_front().unwrap_or_else(|| {
                let image_index = self.next_image;
                self.next_image = (self.next_image + 1) % 3;
                AcquireStatus::Acquired { image_index, suboptimal: false }
            });
            if let AcquireStatus::Acquired { .. } = status {
                assert!(!self.image_ready[slot], "slot {} acquired with a semaphore still signaled", slot);
                self.image_ready[slot] = true;
            }
            Ok(status)
        }

        fn prepare(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
            assert!(self.observed[slot], "slot {} prepared before its fence was waited on", slot);
            self.calls.push(Call::Prepare(slot, image_index));
            if std::mem::take(&mut self.fail_prepare) {
                return Err(VulkanError::InvalidOperation {
                    reason: "uniform update failed".to_string(),
                });
            }
            Ok(())
        }

        fn reset_slot(&mut self, slot: usize) -> VulkanResult<()> {
            assert!(self.observed[slot], "slot {} reset before its fence was waited on", slot);
            assert!(self.signaled[slot], "slot {} reset while still in flight", slot);
            self.signaled[slot] = false;
            self.observed[slot] = false;
            self.calls.push(Call::Reset(slot));
            Ok(())
        }

        fn record(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
            assert!(!self.signaled[slot]);
            self.calls.push(Call::Record(slot, image_index));
            if std::mem::take(&mut self.fail_record) {
                return Err(VulkanError::Api(ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY));
            }
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> VulkanResult<()> {
            assert!(self.image_ready[slot]);
            self.image_ready[slot] = false;
            self.signaled[slot] = true;
            self.calls.push(Call::Submit(slot));
            Ok(())
        }

        fn abandon_image(&mut self, slot: usize) -> VulkanResult<()> {
            self.image_ready[slot] = false;
            self.signaled[slot] = true;
            self.observed[slot] = false;
            self.calls.push(Call::Abandon(slot));
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentStatus> {
            self.calls.push(Call::Present(slot, image_index));
            Ok(self.presents.pop_front().unwrap_or(PresentStatus::Presented))
        }

        fn take_resize_request(&mut self) -> bool {
            std::mem::take(&mut self.resize_pending)
        }

        fn recreate_swapchain(&mut self) -> VulkanResult<()> {
            self.calls.push(Call::Recreate);
            Ok(())
        }
    }

    #[test]
    fn test_zero_frames_rejected() {
        assert!(FrameSynchronizer::new(0).is_err());
    }

    #[test]
    fn test_slots_used_round_robin() {
        for frames in [1, 2, 3] {
            let mut sync = FrameSynchronizer::new(frames).unwrap();
            let mut backend = MockBackend::new(frames);
            let rounds = 4;

            for _ in 0..frames * rounds {
                assert_eq!(sync.draw_frame(&mut backend).unwrap(), FrameStatus::Continue);
            }

            for slot in 0..frames {
                assert_eq!(backend.count(&Call::Submit(slot)), rounds);
                assert_eq!(backend.count(&Call::Wait(slot)), rounds);
            }
            assert_eq!(sync.current_frame(), 0);
        }
    }

    #[test]
    fn test_step_order_within_frame() {
        let mut sync = FrameSynchronizer::new(2).unwrap();
        let mut backend = MockBackend::new(2);

        sync.draw_frame(&mut backend).unwrap();

        assert_eq!(
            backend.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Prepare(0, 0),
                Call::Reset(0),
                Call::Record(0, 0),
                Call::Submit(0),
                Call::Present(0, 0),
            ]
        );
        assert_eq!(sync.current_frame(), 1);
    }

    #[test]
    fn test_out_of_date_acquire_drops_frame() {
        let mut sync = FrameSynchronizer::new(2).unwrap();
        let mut backend = MockBackend::new(2);
        backend.acquires.push_back(AcquireStatus::OutOfDate);

        assert_eq!(sync.draw_frame(&mut backend).unwrap(), FrameStatus::Recreated);
        assert_eq!(backend.calls, vec![Call::Wait(0), Call::Acquire(0), Call::Recreate]);
        assert_eq!(sync.current_frame(), 0);
        // Fence left signaled so the retry does not block forever
        assert!(backend.signaled[0]);

        assert_eq!(sync.draw_frame(&mut backend).unwrap(), FrameStatus::Continue);
        assert_eq!(backend.count(&Call::Submit(0)), 1);
        assert_eq!(sync.current_frame(), 1);
    }

    #[test]
    fn test_suboptimal_acquire_still_renders() {
        let mut sync = FrameSynchronizer::new(2).unwrap();
        let mut backend = MockBackend::new(2);
        backend.acquires.push_back(AcquireStatus::Acquired { image_index: 2, suboptimal: true });

        assert_eq!(sync.draw_frame(&mut backend).unwrap(), FrameStatus::Continue);
        assert_eq!(backend.count(&Call::Present(0, 2)), 1);
        assert_eq!(backend.count(&Call::Recreate), 0);
    }

    #[test]
    fn test_present_suboptimal_or_out_of_date_recreates_after_submit() {
        for status in [PresentStatus::Suboptimal, PresentStatus::OutOfDate] {
            let mut sync = FrameSynchronizer::new(2).unwrap();
            let mut backend = MockBackend::new(2);
            backend.presents.push_back(status);

            assert_eq!(sync.draw_frame(&mut backend).unwrap(), FrameStatus::Recreated);
            assert_eq!(backend.calls.last(), Some(&Call::Recreate));
            assert_eq!(backend.count(&Call::Submit(0)), 1);
            assert_eq!(sync.current_frame(), 1);
        }
    }

    #[test]
    fn test_resize_notification_recreates_once() {
        let mut sync = FrameSynchronizer::new(2).unwrap();
        let mut backend = MockBackend::new(2);
        backend.resize_pending = true;

        assert_eq!(sync.draw_frame(&mut backend).unwrap(), FrameStatus::Recreated);
        assert_eq!(sync.draw_frame(&mut backend).unwrap(), FrameStatus::Continue);
        assert_eq!(backend.count(&Call::Recreate), 1);
    }

    /// Recreation that waits on a minimized window like the swapchain does
    struct MinimizedDuringAcquire {
        inner: MockBackend,
        sizes: VecDeque<(u32, u32)>,
        recreated_at: Option<(u32, u32)>,
    }

    impl SurfaceProvider for MinimizedDuringAcquire {
        fn framebuffer_size(&self) -> (u32, u32) {
            self.sizes.front().copied().unwrap_or((0, 0))
        }
        fn wait_events(&mut self) {
            if self.sizes.len() > 1 {
                self.sizes.pop_front();
            }
        }
        fn take_resize_notification(&mut self) -> bool {
            false
        }
    }

    impl FrameBackend for MinimizedDuringAcquire {
        fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
            self.inner.wait_for_slot(slot)
        }
        fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireStatus> {
            self.inner.acquire_image(slot)
        }
        fn prepare(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
            self.inner.prepare(slot, image_index)
        }
        fn reset_slot(&mut self, slot: usize) -> VulkanResult<()> {
            self.inner.reset_slot(slot)
        }
        fn record(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
            self.inner.record(slot, image_index)
        }
        fn submit(&mut self, slot: usize) -> VulkanResult<()> {
            self.inner.submit(slot)
        }
        fn abandon_image(&mut self, slot: usize) -> VulkanResult<()> {
            self.inner.abandon_image(slot)
        }
        fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentStatus> {
            self.inner.present(slot, image_index)
        }
        fn take_resize_request(&mut self) -> bool {
            false
        }
        fn recreate_swapchain(&mut self) -> VulkanResult<()> {
            self.recreated_at = Some(wait_for_drawable_size(self));
            self.inner.recreate_swapchain()
        }
    }

    #[test]
    fn test_minimized_window_blocks_recreation_until_restored() {
        let mut sync = FrameSynchronizer::new(2).unwrap();
        let mut backend = MinimizedDuringAcquire {
            inner: MockBackend::new(2),
            sizes: VecDeque::from([(0, 0), (0, 0), (640, 480)]),
            recreated_at: None,
        };
        backend.inner.acquires.push_back(AcquireStatus::OutOfDate);

        assert_eq!(sync.draw_frame(&mut backend).unwrap(), FrameStatus::Recreated);
        assert_eq!(backend.recreated_at, Some((640, 480)));
        assert_eq!(sync.current_frame(), 0);

        assert_eq!(sync.draw_frame(&mut backend).unwrap(), FrameStatus::Continue);
        assert_eq!(sync.current_frame(), 1);
    }

    struct FailingSubmit(MockBackend);

    impl FrameBackend for FailingSubmit {
        fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
            self.0.wait_for_slot(slot)
        }
        fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireStatus> {
            self.0.acquire_image(slot)
        }
        fn prepare(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
            self.0.prepare(slot, image_index)
        }
        fn reset_slot(&mut self, slot: usize) -> VulkanResult<()> {
            self.0.reset_slot(slot)
        }
        fn record(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
            self.0.record(slot, image_index)
        }
        fn submit(&mut self, _slot: usize) -> VulkanResult<()> {
            Err(VulkanError::Api(ash::vk::Result::ERROR_DEVICE_LOST))
        }
        fn abandon_image(&mut self, slot: usize) -> VulkanResult<()> {
            self.0.abandon_image(slot)
        }
        fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentStatus> {
            self.0.present(slot, image_index)
        }
        fn take_resize_request(&mut self) -> bool {
            self.0.take_resize_request()
        }
        fn recreate_swapchain(&mut self) -> VulkanResult<()> {
            self.0.recreate_swapchain()
        }
    }

    #[test]
    fn test_submit_failure_propagates_without_advancing() {
        let mut sync = FrameSynchronizer::new(2).unwrap();
        let mut backend = FailingSubmit(MockBackend::new(2));

        let err = sync.draw_frame(&mut backend).unwrap_err();
        assert!(matches!(err, VulkanError::Api(ash::vk::Result::ERROR_DEVICE_LOST)));
        assert_eq!(sync.current_frame(), 0);
        assert_eq!(backend.0.count(&Call::Present(0, 0)), 0);
        assert_eq!(backend.0.count(&Call::Abandon(0)), 1);
        assert!(backend.0.signaled[0]);
    }

    #[test]
    fn test_prepare_failure_keeps_slot_usable() {
        let mut sync = FrameSynchronizer::new(1).unwrap();
        let mut backend = MockBackend::new(1);
        backend.fail_prepare = true;

        let err = sync.draw_frame(&mut backend).unwrap_err();
        assert!(matches!(err, VulkanError::InvalidOperation { .. }));
        assert_eq!(
            backend.calls,
            vec![Call::Wait(0), Call::Acquire(0), Call::Prepare(0, 0), Call::Abandon(0), Call::Recreate]
        );
        assert_eq!(sync.current_frame(), 0);

        // Same slot again: the fence wait returns and acquire gets a clean semaphore
        assert_eq!(sync.draw_frame(&mut backend).unwrap(), FrameStatus::Continue);
        assert_eq!(backend.count(&Call::Submit(0)), 1);
        assert_eq!(backend.count(&Call::Reset(0)), 1);
    }

    #[test]
    fn test_record_failure_after_reset_keeps_slot_usable() {
        let mut sync = FrameSynchronizer::new(1).unwrap();
        let mut backend = MockBackend::new(1);
        backend.fail_record = true;

        assert!(sync.draw_frame(&mut backend).is_err());
        assert_eq!(backend.count(&Call::Reset(0)), 1);
        assert_eq!(backend.count(&Call::Submit(0)), 0);
        assert_eq!(backend.count(&Call::Abandon(0)), 1);

        assert_eq!(sync.draw_frame(&mut backend).unwrap(), FrameStatus::Continue);
        assert_eq!(backend.count(&Call::Submit(0)), 1);
        assert_eq!(sync.current_frame(), 0);
    }
}
