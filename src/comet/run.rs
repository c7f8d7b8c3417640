//! Lifecycle of the comet overlay surface
//!
//! A `CometRun` is created when the overlay is launched and lives until the
//! flight finishes. It keeps the canvas sized to the surface and drives the
//! simulator from frame callbacks. Once the flight has finished, configures
//! and frame callbacks that arrive late are ignored: nothing is drawn and no
//! further frame is requested.

use super::canvas::{Canvas, PixelCanvas};
use super::{CometSimulator, Step};
use crate::error::AnimError;
use crate::scheduler::{FrameClock, FrameLoop, FrameRequester, Tick};
use log::debug;

/// Destination of a drawn comet frame
pub trait FrameSink {
    /// Copy `canvas` into a buffer and commit it
    fn present(&mut self, canvas: &mut PixelCanvas) -> Result<(), AnimError>;
}

#[derive(Default)]
pub struct CometRun {
    sim: Option<CometSimulator>,
    canvas: Option<PixelCanvas>,
    frame_loop: FrameLoop,
    clock: FrameClock,
}

impl CometRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.frame_loop.is_disposed()
    }

    /// Handle a configure of the overlay to `width`×`height`.
    ///
    /// The first one fixes the flight path, presents a cleared frame to map
    /// the surface and starts the frame loop. Later ones only resize the
    /// canvas.
    pub fn configure<S, R>(
        &mut self,
        width: u32,
        height: u32,
        sink: &mut S,
        requester: &mut R,
    ) -> Result<(), AnimError>
    where
        S: FrameSink,
        R: FrameRequester,
    {
        if self.is_finished() {
            return Ok(());
        }
        let size = (width.max(1), height.max(1));
        if self.canvas.as_ref().is_none_or(|c| c.size() != size) {
            self.canvas = Some(PixelCanvas::new(size.0, size.1)?);
        }
        if self.sim.is_some() {
            // The path stays where it was launched
            return Ok(());
        }
        let Some(canvas) = self.canvas.as_mut() else {
            return Ok(());
        };

        canvas.clear();
        sink.present(canvas)?;
        self.sim = Some(CometSimulator::start(size.0, size.1));
        self.frame_loop.start(requester);
        Ok(())
    }

    /// Handle one frame callback carrying the raw compositor timestamp
    pub fn on_frame<S, R>(&mut self, stamp: u32, sink: &mut S, requester: &mut R) -> Result<Step, AnimError>
    where
        S: FrameSink,
        R: FrameRequester,
    {
        if self.frame_loop.on_callback(requester) == Tick::Idle {
            return Ok(Step::Idle);
        }
        let now_ms = self.clock.advance(stamp);
        let (Some(sim), Some(canvas)) = (self.sim.as_mut(), self.canvas.as_mut()) else {
            return Ok(Step::Idle);
        };

        let step = sim.advance(now_ms, canvas);
        if step != Step::Idle {
            sink.present(canvas)?;
        }
        if step == Step::Finished {
            debug!("Comet run over, frame loop disposed");
            self.frame_loop.dispose();
        }
        Ok(step)
    }
}
