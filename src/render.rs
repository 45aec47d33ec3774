//! Background render loop.
//!
//! One named thread repeatedly locks the surface, runs a render pass and posts
//! the frame. The loop checks its state between iterations only, so a stop
//! request takes effect once the current frame is posted.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::color::{Color, ColorTable};
use crate::compositor::CompositorSlot;
use crate::grid::{read_grid, SharedGrid};
use crate::surface::{Canvas, DrawError, SharedSurface, SurfaceHost};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
    StopRequested,
}

impl LoopState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => LoopState::Running,
            2 => LoopState::StopRequested,
            _ => LoopState::Stopped,
        }
    }

    fn raw(self) -> u8 {
        match self {
            LoopState::Stopped => 0,
            LoopState::Running => 1,
            LoopState::StopRequested => 2,
        }
    }
}

/// Frame counters, readable while the loop runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Frames locked and posted, whether or not the pass succeeded.
    pub presented: u64,
    /// Iterations where the surface could not be locked.
    pub skipped: u64,
    /// Passes that returned an error or panicked.
    pub failed: u64,
}

#[derive(Default)]
struct LoopShared {
    state: AtomicU8,
    presented: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl LoopShared {
    fn state(&self) -> LoopState {
        LoopState::from_raw(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: LoopState) {
        self.state.store(state.raw(), Ordering::Release);
    }
}

/// Signals the owner when the render thread exits, including by panic.
struct ExitSignal(Sender<()>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// What a render pass draws each frame.
#[derive(Clone)]
pub enum Painter {
    /// Clear, then fill every occupied block in its pointer color.
    Direct {
        grid: SharedGrid,
        colors: ColorTable,
        background: Color,
    },
    /// Blit the off-screen buffer.
    Composite { compositor: CompositorSlot },
}

impl Painter {
    pub fn paint<C: Canvas + ?Sized>(&self, canvas: &mut C) -> Result<(), DrawError> {
        match self {
            Painter::Direct {
                grid,
                colors,
                background,
            } => {
                let grid = read_grid(grid);
                canvas.clear(*background);
                for block in grid.occupied() {
                    canvas.fill_rect(grid.block_rect(block.location), colors.color_for(block.touch_id));
                }
                Ok(())
            }
            Painter::Composite { compositor } => compositor
                .get()
                .ok_or(DrawError::NoBuffer)?
                .present(canvas),
        }
    }
}

pub struct RenderLoop {
    name: String,
    shared: Arc<LoopShared>,
    handle: Option<JoinHandle<()>>,
    exited: Option<Receiver<()>>,
}

impl RenderLoop {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(LoopShared::default()),
            handle: None,
            exited: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.shared.state()
    }

    pub fn stats(&self) -> RenderStats {
        RenderStats {
            presented: self.shared.presented.load(Ordering::Relaxed),
            skipped: self.shared.skipped.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
        }
    }

    /// Spawn the render thread. No-op unless the loop is stopped.
    pub fn start<H, F>(&mut self, surface: Arc<SharedSurface<H>>, mut pass: F) -> std::io::Result<()>
    where
        H: SurfaceHost + 'static,
        F: FnMut(&mut H::Canvas) -> Result<(), DrawError> + Send + 'static,
    {
        if self.state() != LoopState::Stopped {
            log::debug!("[{}] already running", self.name);
            return Ok(());
        }
        // A thread that already exited on its own still needs joining.
        self.join();

        self.shared.set_state(LoopState::Running);
        let shared = Arc::clone(&self.shared);
        let (exit_tx, exit_rx) = mpsc::channel();
        let name = self.name.clone();
        let spawned = thread::Builder::new().name(self.name.clone()).spawn(move || {
            let _exit = ExitSignal(exit_tx);
            run_loop(&name, &shared, &surface, &mut pass);
        });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                self.exited = Some(exit_rx);
                log::info!("[{}] render thread started", self.name);
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(LoopState::Stopped);
                Err(e)
            }
        }
    }

    /// Ask the loop to exit after its current iteration.
    pub fn request_stop(&self) -> bool {
        self.shared
            .state
            .compare_exchange(
                LoopState::Running.raw(),
                LoopState::StopRequested.raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Block until the render thread has terminated.
    ///
    /// Waits without bound: the thread must observe the stop request for this
    /// to return.
    pub fn join(&mut self) {
        self.exited = None;
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.join() {
                log::error!("[{}] render thread panicked: {:?}", self.name, e);
            }
            self.shared.set_state(LoopState::Stopped);
            log::debug!("[{}] render thread joined", self.name);
        }
    }

    /// Like [`join`](Self::join) but gives up after `timeout`.
    ///
    /// Returns false on timeout; the thread stays owned and a later join can
    /// finish the teardown.
    pub fn join_timeout(&mut self, timeout: Duration) -> bool {
        if self.handle.is_none() {
            return true;
        }
        if let Some(exited) = &self.exited {
            if let Err(RecvTimeoutError::Timeout) = exited.recv_timeout(timeout) {
                log::warn!("[{}] render thread still running after {:?}", self.name, timeout);
                return false;
            }
        }
        self.join();
        true
    }

    /// Request a stop and wait for the thread.
    pub fn stop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        self.request_stop();
        self.join();
        log::info!("[{}] render thread stopped", self.name);
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop<H, F>(name: &str, shared: &LoopShared, surface: &SharedSurface<H>, pass: &mut F)
where
    H: SurfaceHost,
    F: FnMut(&mut H::Canvas) -> Result<(), DrawError>,
{
    while shared.state() == LoopState::Running {
        let Some(mut frame) = surface.lock_frame() else {
            shared.skipped.fetch_add(1, Ordering::Relaxed);
            thread::yield_now();
            continue;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| pass(&mut *frame)));
        // Posted on every path, including after a failed pass.
        drop(frame);

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("[{}] frame abandoned: {}", name, e);
            }
            Err(_) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                log::error!("[{}] render pass panicked, frame abandoned", name);
            }
        }

        let presented = shared.presented.fetch_add(1, Ordering::Relaxed) + 1;
        log_frame_progress(name, presented);
    }
    shared.set_state(LoopState::Stopped);
    log::debug!("[{}] render loop exited", name);
}

fn log_frame_progress(name: &str, presented: u64) {
    if presented == 1 {
        log::info!("[{}] first frame posted", name);
    } else if presented % 500 == 0 {
        log::debug!("[{}] frames posted: {}", name, presented);
    }
}
