//! Frame orchestration against a scripted backend.
//!
//! The mock models fences, semaphores and command buffer lifecycles and
//! returns an error on any ordering violation, which stops the orchestrator
//! and fails the test.

use std::cell::Cell;
use std::collections::VecDeque;

use frameloop_renderer::{
    AcquireResult, FrameBackend, FrameError, FrameOrchestrator, FrameOutcome, FrameState,
    RhiError, RhiResult, SurfaceStatus, vk,
};
use frameloop_rhi::command::CommandBufferState;

const EXTENT: vk::Extent2D = vk::Extent2D {
    width: 800,
    height: 600,
};

const ZERO: vk::Extent2D = vk::Extent2D {
    width: 0,
    height: 0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Wait(usize),
    Acquire(usize),
    ResetFence(usize),
    Begin(usize),
    BeginPass { slot: usize, image: u32 },
    EndPass(usize),
    End(usize),
    Submit(usize),
    Present { slot: usize, image: u32 },
    Recreate,
    Rebuild,
}

#[derive(Default)]
struct Recorder {
    draws: Cell<u32>,
}

impl Recorder {
    fn draw(&self) {
        self.draws.set(self.draws.get() + 1);
    }
}

enum Scripted<T> {
    Status(T),
    Fail(vk::Result),
}

struct MockBackend {
    calls: Vec<Call>,
    image_count: u32,
    next_image: u32,
    generation: u64,
    target_generation: u64,
    framebuffers: u32,
    fence_signalled: Vec<bool>,
    waited: Vec<bool>,
    image_available: Vec<bool>,
    render_finished: Vec<bool>,
    cmd_state: Vec<CommandBufferState>,
    recorders: Vec<Recorder>,
    acquires: VecDeque<Scripted<AcquireResult>>,
    presents: VecDeque<Scripted<SurfaceStatus>>,
    /// Remaining recreate calls that report a zero-area surface
    zero_area_polls: u32,
    /// Image count after the next successful recreate
    recreated_image_count: Option<u32>,
    fail_submit: Option<vk::Result>,
}

impl MockBackend {
    fn new(frames: usize, image_count: u32) -> Self {
        Self {
            calls: Vec::new(),
            image_count,
            next_image: 0,
            generation: 0,
            target_generation: 0,
            framebuffers: image_count,
            fence_signalled: vec![true; frames],
            waited: vec![false; frames],
            image_available: vec![false; frames],
            render_finished: vec![false; frames],
            cmd_state: vec![CommandBufferState::Initial; frames],
            recorders: (0..frames).map(|_| Recorder::default()).collect(),
            acquires: VecDeque::new(),
            presents: VecDeque::new(),
            zero_area_polls: 0,
            recreated_image_count: None,
            fail_submit: None,
        }
    }

    /// Queues results for upcoming acquires; unscripted acquires succeed.
    fn script_acquire(&mut self, results: impl IntoIterator<Item = Scripted<AcquireResult>>) {
        self.acquires.extend(results);
    }

    fn script_present(&mut self, results: impl IntoIterator<Item = Scripted<SurfaceStatus>>) {
        self.presents.extend(results);
    }

    fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    fn count(&self, call: Call) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    fn violation(msg: impl Into<String>) -> RhiError {
        RhiError::InvalidHandle(msg.into())
    }

    fn next_index(&mut self) -> u32 {
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        index
    }
}

impl FrameBackend for MockBackend {
    type Commands = Recorder;

    fn frames_in_flight(&self) -> usize {
        self.fence_signalled.len()
    }

    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.calls.push(Call::Wait(slot));
        if !self.fence_signalled[slot] {
            // An unsignalled fence that nothing will signal: a real wait hangs
            return Err(RhiError::VulkanError(vk::Result::TIMEOUT));
        }
        self.waited[slot] = true;
        self.cmd_state[slot] = self.cmd_state[slot].retire();
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireResult> {
        self.calls.push(Call::Acquire(slot));
        if self.image_available[slot] {
            return Err(Self::violation("image-available signalled twice"));
        }

        let result = match self.acquires.pop_front() {
            Some(Scripted::Fail(e)) => return Err(RhiError::VulkanError(e)),
            Some(Scripted::Status(AcquireResult::Ready { status, .. })) => AcquireResult::Ready {
                index: self.next_index(),
                status,
            },
            Some(Scripted::Status(AcquireResult::OutOfDate)) => AcquireResult::OutOfDate,
            None => AcquireResult::Ready {
                index: self.next_index(),
                status: SurfaceStatus::Ok,
            },
        };

        if let AcquireResult::Ready { .. } = result {
            self.image_available[slot] = true;
        }
        Ok(result)
    }

    fn reset_slot_fence(&mut self, slot: usize) -> RhiResult<()> {
        self.calls.push(Call::ResetFence(slot));
        if !self.waited[slot] {
            return Err(Self::violation("fence reset before its wait returned"));
        }
        self.fence_signalled[slot] = false;
        Ok(())
    }

    fn begin_commands(&mut self, slot: usize) -> RhiResult<()> {
        self.calls.push(Call::Begin(slot));
        if !self.waited[slot] {
            return Err(Self::violation("command buffer recorded before fence wait"));
        }
        self.waited[slot] = false;
        self.cmd_state[slot] = self.cmd_state[slot].begin()?;
        Ok(())
    }

    fn begin_pass(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        self.calls.push(Call::BeginPass {
            slot,
            image: image_index,
        });
        if self.target_generation != self.generation {
            return Err(RhiError::StaleRenderTarget {
                target: self.target_generation,
                surface: self.generation,
            });
        }
        if image_index >= self.framebuffers {
            return Err(Self::violation("no framebuffer for image"));
        }
        Ok(())
    }

    fn commands(&self, slot: usize) -> &Recorder {
        &self.recorders[slot]
    }

    fn end_pass(&mut self, slot: usize) -> RhiResult<()> {
        self.calls.push(Call::EndPass(slot));
        Ok(())
    }

    fn end_commands(&mut self, slot: usize) -> RhiResult<()> {
        self.calls.push(Call::End(slot));
        self.cmd_state[slot] = self.cmd_state[slot].end()?;
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> RhiResult<()> {
        self.calls.push(Call::Submit(slot));
        if let Some(e) = self.fail_submit {
            return Err(RhiError::VulkanError(e));
        }
        if !self.image_available[slot] {
            return Err(Self::violation("submit waits on an unsignalled semaphore"));
        }
        if self.render_finished[slot] {
            return Err(Self::violation("render-finished signalled twice"));
        }
        if self.fence_signalled[slot] {
            return Err(Self::violation("submit signals a fence that was not reset"));
        }
        self.cmd_state[slot] = self.cmd_state[slot].submit()?;
        self.image_available[slot] = false;
        self.render_finished[slot] = true;
        // The GPU finishes instantly
        self.fence_signalled[slot] = true;
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<SurfaceStatus> {
        self.calls.push(Call::Present {
            slot,
            image: image_index,
        });
        if !self.render_finished[slot] {
            return Err(Self::violation("present waits on an unsignalled semaphore"));
        }
        self.render_finished[slot] = false;

        match self.presents.pop_front() {
            Some(Scripted::Status(status)) => Ok(status),
            Some(Scripted::Fail(e)) => Err(RhiError::VulkanError(e)),
            None => Ok(SurfaceStatus::Ok),
        }
    }

    fn surface_generation(&self) -> u64 {
        self.generation
    }

    fn target_generation(&self) -> u64 {
        self.target_generation
    }

    fn target_extent(&self) -> vk::Extent2D {
        EXTENT
    }

    fn recreate_surface(&mut self, extent: vk::Extent2D) -> RhiResult<bool> {
        self.calls.push(Call::Recreate);
        if extent.width == 0 || extent.height == 0 {
            return Err(Self::violation("recreate called with a zero extent"));
        }
        if self.zero_area_polls > 0 {
            self.zero_area_polls -= 1;
            return Ok(false);
        }
        if let Some(count) = self.recreated_image_count.take() {
            self.image_count = count;
        }
        self.next_image = 0;
        self.generation += 1;
        Ok(true)
    }

    fn rebuild_render_targets(&mut self) -> RhiResult<()> {
        self.calls.push(Call::Rebuild);
        self.framebuffers = self.image_count;
        self.target_generation = self.generation;
        Ok(())
    }

    fn image_count(&self) -> u32 {
        self.image_count
    }

    fn wait_idle(&self) -> RhiResult<()> {
        Ok(())
    }
}

fn orchestrator(frames: usize, images: u32) -> FrameOrchestrator<MockBackend> {
    FrameOrchestrator::new(MockBackend::new(frames, images)).unwrap()
}

fn draw(orch: &mut FrameOrchestrator<MockBackend>) -> Result<FrameOutcome, FrameError> {
    orch.draw_frame(EXTENT, |cmds, _| {
        cmds.draw();
        Ok(())
    })
}

fn presented_slot(outcome: FrameOutcome) -> usize {
    match outcome {
        FrameOutcome::Presented { slot, .. } => slot,
        other => panic!("expected a presented frame, got {:?}", other),
    }
}

#[test]
fn test_five_cycles_alternate_two_slots() {
    let mut orch = orchestrator(2, 3);

    let slots: Vec<_> = (0..5)
        .map(|_| presented_slot(draw(&mut orch).unwrap()))
        .collect();

    assert_eq!(slots, vec![0, 1, 0, 1, 0]);
    assert_eq!(orch.slot(), 1);

    let mock = orch.backend();
    for slot in 0..2 {
        let cycles = if slot == 0 { 3 } else { 2 };
        assert_eq!(mock.count(Call::Submit(slot)), cycles);
        assert_eq!(mock.count(Call::ResetFence(slot)), cycles);
    }
    let presents = mock
        .calls
        .iter()
        .filter(|c| matches!(c, Call::Present { .. }))
        .count();
    assert_eq!(presents, 5);
    // Every render-finished signal was consumed by its present
    assert!(mock.render_finished.iter().all(|signalled| !signalled));
}

#[test]
fn test_cycle_follows_wait_acquire_reset_record_submit_present() {
    let mut orch = orchestrator(2, 2);
    draw(&mut orch).unwrap();

    assert_eq!(
        orch.backend_mut().take_calls(),
        vec![
            Call::Wait(0),
            Call::Acquire(0),
            Call::ResetFence(0),
            Call::Begin(0),
            Call::BeginPass { slot: 0, image: 0 },
            Call::EndPass(0),
            Call::End(0),
            Call::Submit(0),
            Call::Present { slot: 0, image: 0 },
        ]
    );
    assert_eq!(orch.state(), FrameState::Idle);
    assert_eq!(orch.backend().recorders[0].draws.get(), 1);
}

#[test]
fn test_slot_is_cycle_count_mod_frames_in_flight() {
    for frames in 1..=4 {
        let mut orch = orchestrator(frames, 3);
        for cycles in 1..=10 {
            draw(&mut orch).unwrap();
            assert_eq!(orch.slot(), cycles % frames, "frames in flight {}", frames);
        }
    }
}

#[test]
fn test_image_index_is_independent_of_slot() {
    let mut orch = orchestrator(2, 3);

    let pairs: Vec<_> = (0..4)
        .map(|_| match draw(&mut orch).unwrap() {
            FrameOutcome::Presented { slot, image_index } => (slot, image_index),
            other => panic!("unexpected {:?}", other),
        })
        .collect();

    assert_eq!(pairs, vec![(0, 0), (1, 1), (0, 2), (1, 0)]);
}

#[test]
fn test_record_callback_sees_slot_and_image() {
    let mut orch = orchestrator(2, 3);
    let mut seen = Vec::new();

    for _ in 0..3 {
        orch.draw_frame(EXTENT, |_, info| {
            seen.push((info.slot, info.image_index, info.frame_number));
            assert_eq!(info.extent, EXTENT);
            Ok(())
        })
        .unwrap();
    }

    assert_eq!(seen, vec![(0, 0, 0), (1, 1, 1), (0, 2, 2)]);
}

#[test]
fn test_out_of_date_acquire_rebuilds_without_advancing() {
    let mut orch = orchestrator(2, 3);
    orch.backend_mut().script_acquire([
        Scripted::Status(AcquireResult::Ready {
            index: 0,
            status: SurfaceStatus::Ok,
        }),
        Scripted::Status(AcquireResult::Ready {
            index: 0,
            status: SurfaceStatus::Ok,
        }),
        Scripted::Status(AcquireResult::OutOfDate),
    ]);

    assert_eq!(presented_slot(draw(&mut orch).unwrap()), 0);
    assert_eq!(presented_slot(draw(&mut orch).unwrap()), 1);
    let slot_after_cycle_two = orch.slot();
    orch.backend_mut().take_calls();

    // Cycle 3: acquire reports out-of-date
    assert_eq!(draw(&mut orch).unwrap(), FrameOutcome::Recreated);
    let calls = orch.backend_mut().take_calls();
    assert_eq!(
        calls,
        vec![
            Call::Wait(slot_after_cycle_two),
            Call::Acquire(slot_after_cycle_two),
            Call::Recreate,
            Call::Rebuild,
        ]
    );
    assert_eq!(orch.slot(), slot_after_cycle_two);

    let mock = orch.backend();
    // Nothing was submitted, so the fence must still be signalled
    assert!(mock.fence_signalled[slot_after_cycle_two]);
    assert_eq!(mock.generation, 1);
    assert_eq!(mock.framebuffers, mock.image_count);

    // Cycle 4 proceeds normally from the same slot
    assert_eq!(presented_slot(draw(&mut orch).unwrap()), slot_after_cycle_two);
    assert_eq!(orch.stats().recreates(), 1);
    assert_eq!(orch.stats().presented(), 3);
    assert_eq!(orch.stats().skipped(), 1);
}

#[test]
fn test_zero_area_defers_until_window_has_area() {
    let mut orch = orchestrator(2, 3);
    orch.notify_resized();

    for _ in 0..3 {
        let outcome = orch.draw_frame(ZERO, |_, _| Ok(())).unwrap();
        assert_eq!(outcome, FrameOutcome::Deferred);
    }
    // Deferral touches no GPU object
    assert!(orch.backend().calls.is_empty());

    let outcome = draw(&mut orch).unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { slot: 0, .. }));

    let mock = orch.backend();
    assert_eq!(mock.count(Call::Recreate), 1);
    assert_eq!(mock.count(Call::Rebuild), 1);
    assert_eq!(mock.generation, 1);
    assert_eq!(orch.stats().recreates(), 1);
    assert_eq!(orch.stats().skipped(), 3);
}

#[test]
fn test_surface_reporting_zero_area_keeps_polling() {
    let mut orch = orchestrator(2, 3);
    orch.backend_mut().zero_area_polls = 3;
    orch.notify_resized();

    for _ in 0..3 {
        assert_eq!(draw(&mut orch).unwrap(), FrameOutcome::Deferred);
    }
    let mock = orch.backend();
    assert_eq!(mock.count(Call::Recreate), 3);
    assert_eq!(mock.count(Call::Rebuild), 0);
    assert_eq!(mock.generation, 0);

    assert!(matches!(
        draw(&mut orch).unwrap(),
        FrameOutcome::Presented { .. }
    ));
    assert_eq!(orch.backend().generation, 1);
    assert_eq!(orch.backend().count(Call::Rebuild), 1);
}

#[test]
fn test_present_out_of_date_rebuilds_without_advancing() {
    let mut orch = orchestrator(2, 3);
    orch.backend_mut()
        .script_present([Scripted::Status(SurfaceStatus::OutOfDate)]);

    assert_eq!(draw(&mut orch).unwrap(), FrameOutcome::Recreated);
    assert_eq!(orch.slot(), 0);

    let calls = orch.backend_mut().take_calls();
    assert_eq!(
        &calls[calls.len() - 3..],
        &[
            Call::Present { slot: 0, image: 0 },
            Call::Recreate,
            Call::Rebuild
        ]
    );

    // The submission signalled the fence, so the same slot is usable again
    assert_eq!(presented_slot(draw(&mut orch).unwrap()), 0);
    assert_eq!(presented_slot(draw(&mut orch).unwrap()), 1);
}

#[test]
fn test_present_suboptimal_is_treated_as_out_of_date() {
    let mut orch = orchestrator(2, 3);
    orch.backend_mut()
        .script_present([Scripted::Status(SurfaceStatus::Suboptimal)]);

    assert_eq!(
        draw(&mut orch).unwrap(),
        FrameOutcome::PresentedThenRecreated {
            slot: 0,
            image_index: 0
        }
    );
    assert_eq!(orch.backend().generation, 1);
    assert_eq!(orch.slot(), 0);
    // A suboptimal present still reached the screen
    assert_eq!(orch.stats().presented(), 1);
    assert_eq!(orch.stats().skipped(), 0);
}

#[test]
fn test_out_of_date_present_counts_as_skipped() {
    let mut orch = orchestrator(2, 3);
    orch.backend_mut()
        .script_present([Scripted::Status(SurfaceStatus::OutOfDate)]);

    let outcome = draw(&mut orch).unwrap();
    assert!(!outcome.is_presented());
    assert_eq!(orch.stats().presented(), 0);
    assert_eq!(orch.stats().skipped(), 1);
}

#[test]
fn test_present_out_of_date_on_zero_area_surface_defers() {
    let mut orch = orchestrator(2, 3);
    orch.backend_mut()
        .script_present([Scripted::Status(SurfaceStatus::OutOfDate)]);
    orch.backend_mut().zero_area_polls = 1;

    assert_eq!(draw(&mut orch).unwrap(), FrameOutcome::Deferred);
    assert_eq!(orch.slot(), 0);

    // The owed rebuild runs first on the next cycle
    assert_eq!(presented_slot(draw(&mut orch).unwrap()), 0);
    assert_eq!(orch.stats().recreates(), 1);
}

#[test]
fn test_zero_frames_in_flight_is_rejected() {
    let result = FrameOrchestrator::new(MockBackend::new(0, 3));
    assert!(matches!(result, Err(FrameError::NoFrameSlots)));
}

#[test]
fn test_suboptimal_acquire_presents_then_rebuilds() {
    let mut orch = orchestrator(2, 3);
    orch.backend_mut()
        .script_acquire([Scripted::Status(AcquireResult::Ready {
            index: 0,
            status: SurfaceStatus::Suboptimal,
        })]);

    assert_eq!(
        draw(&mut orch).unwrap(),
        FrameOutcome::PresentedThenRecreated {
            slot: 0,
            image_index: 0
        }
    );
    assert_eq!(orch.stats().presented(), 1);
    assert_eq!(orch.stats().skipped(), 0);
    assert_eq!(orch.stats().recreates(), 1);

    let mock = orch.backend();
    assert_eq!(mock.count(Call::Present { slot: 0, image: 0 }), 1);
    assert_eq!(mock.count(Call::Recreate), 1);
    // The acquired semaphore was consumed by the submit
    assert!(!mock.image_available[0]);
}

#[test]
fn test_resize_flag_rebuilds_before_next_acquire() {
    let mut orch = orchestrator(2, 3);
    draw(&mut orch).unwrap();
    orch.backend_mut().take_calls();

    orch.notify_resized();
    orch.notify_resized();
    assert_eq!(presented_slot(draw(&mut orch).unwrap()), 1);

    let calls = orch.backend_mut().take_calls();
    assert_eq!(&calls[..3], &[Call::Recreate, Call::Rebuild, Call::Wait(1)]);
    assert_eq!(orch.stats().recreates(), 1);
}

#[test]
fn test_rebuild_tracks_new_image_count() {
    let mut orch = orchestrator(2, 2);
    orch.backend_mut().recreated_image_count = Some(4);
    orch.notify_resized();

    let mut images = Vec::new();
    for _ in 0..4 {
        if let FrameOutcome::Presented { image_index, .. } = draw(&mut orch).unwrap() {
            images.push(image_index);
        }
    }

    let mock = orch.backend();
    assert_eq!(mock.framebuffers, 4);
    assert_eq!(mock.target_generation, mock.generation);
    assert_eq!(images, vec![0, 1, 2, 3]);
}

#[test]
fn test_stale_render_targets_are_rebuilt_before_recording() {
    let mut orch = orchestrator(2, 3);
    draw(&mut orch).unwrap();

    // Surface moved on without its targets
    orch.backend_mut().generation += 1;
    orch.backend_mut().take_calls();

    assert!(matches!(
        draw(&mut orch).unwrap(),
        FrameOutcome::Presented { .. }
    ));
    let calls = orch.backend_mut().take_calls();
    let rebuild = calls.iter().position(|c| *c == Call::Rebuild).unwrap();
    let begin_pass = calls
        .iter()
        .position(|c| matches!(c, Call::BeginPass { .. }))
        .unwrap();
    assert!(rebuild < begin_pass);
    assert_eq!(orch.backend().target_generation, 1);
}

#[test]
fn test_submit_failure_stops_the_loop() {
    let mut orch = orchestrator(2, 3);
    orch.backend_mut().fail_submit = Some(vk::Result::ERROR_DEVICE_LOST);

    let err = draw(&mut orch).unwrap_err();
    assert!(matches!(err, FrameError::Submit(_)));
    assert_eq!(err.stage(), "submit");
    assert!(err.is_device_lost());
    assert!(orch.is_stopped());
    assert_eq!(orch.state(), FrameState::Stopped);

    // Later frames do nothing
    orch.backend_mut().fail_submit = None;
    orch.backend_mut().take_calls();
    assert!(matches!(draw(&mut orch), Err(FrameError::Stopped)));
    assert!(orch.backend().calls.is_empty());
}

#[test]
fn test_acquire_failure_is_fatal() {
    let mut orch = orchestrator(2, 3);
    orch.backend_mut()
        .script_acquire([Scripted::Fail(vk::Result::ERROR_SURFACE_LOST_KHR)]);

    let err = draw(&mut orch).unwrap_err();
    assert!(matches!(err, FrameError::Acquire(_)));
    assert!(err.is_device_lost());
    // Fence untouched by a failed acquire
    assert!(orch.backend().fence_signalled[0]);
}

#[test]
fn test_present_failure_is_fatal() {
    let mut orch = orchestrator(2, 3);
    orch.backend_mut()
        .script_present([Scripted::Fail(vk::Result::ERROR_DEVICE_LOST)]);

    let err = draw(&mut orch).unwrap_err();
    assert!(matches!(err, FrameError::Present(_)));
    assert!(orch.is_stopped());
}

#[test]
fn test_record_error_is_fatal() {
    let mut orch = orchestrator(2, 3);

    let err = orch
        .draw_frame(EXTENT, |_, _| {
            Err(RhiError::InvalidHandle("pipeline".to_string()))
        })
        .unwrap_err();

    assert!(matches!(err, FrameError::Record(_)));
    assert_eq!(err.stage(), "record");
    assert!(orch.is_stopped());
    assert_eq!(orch.backend().count(Call::Submit(0)), 0);
}

#[test]
fn test_command_buffers_are_recorded_only_after_their_fence() {
    let mut orch = orchestrator(3, 2);
    for _ in 0..9 {
        draw(&mut orch).unwrap();
    }

    let calls = &orch.backend().calls;
    for (i, call) in calls.iter().enumerate() {
        if let Call::Begin(slot) = call {
            let last_wait = calls[..i]
                .iter()
                .rposition(|c| *c == Call::Wait(*slot))
                .expect("begin without a wait");
            let last_submit = calls[..i].iter().rposition(|c| *c == Call::Submit(*slot));
            assert!(last_submit.is_none_or(|submit| submit < last_wait));
        }
    }
    assert!(
        orch.backend()
            .cmd_state
            .iter()
            .all(|state| *state == CommandBufferState::Pending)
    );
}
