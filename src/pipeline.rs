use crate::capture::{CaptureSource, VideoFrame};
use crate::composite::{CompositeMode, CompositeParameters, FrameCompositor};
use crate::controls::ControlState;
use crate::output::{flatten_over, BackdropLibrary, OutputSink};
use crate::segmentation::{ModelFactory, Preprocessor, SegmentationModel, Segmentation, SegmenterConfig};
use anyhow::{Context, Result};
use image::imageops;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// How a single cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Rendered,
    /// Inference failed; the previous output was shown again
    Skipped,
}

#[derive(Debug, Default)]
struct CycleStats {
    frames: u64,
    skipped: u64,
    capture: Duration,
    segment: Duration,
    composite: Duration,
    output: Duration,
}

impl CycleStats {
    fn log(&self) {
        let avg = |total: Duration| total.as_secs_f64() * 1000.0 / self.frames as f64;
        let capture_ms = avg(self.capture);
        let segment_ms = avg(self.segment);
        let composite_ms = avg(self.composite);
        let output_ms = avg(self.output);
        let total_ms = capture_ms + segment_ms + composite_ms + output_ms;

        tracing::info!(
            "Frame {}: capture={:.1}ms, segment={:.1}ms, composite={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}, skipped={}",
            self.frames,
            capture_ms,
            segment_ms,
            composite_ms,
            output_ms,
            total_ms,
            1000.0 / total_ms,
            self.skipped
        );
    }
}

/// Cooperative frame loop: capture, segment, composite, present, repeat.
///
/// Cycles never overlap. Parameters are snapshotted once per cycle, and a
/// mode change reloads the segmentation model before the next frame renders.
pub struct Pipeline<C, O> {
    capture: C,
    output: O,
    factory: Arc<dyn ModelFactory>,
    segmenter_config: SegmenterConfig,
    model: Option<Box<dyn SegmentationModel>>,
    loaded_epoch: Option<u64>,
    compositor: FrameCompositor,
    backdrops: BackdropLibrary,
    state: watch::Receiver<ControlState>,
    frame_interval: Duration,
    show_matte: bool,
    stats: CycleStats,
}

/// Tick period for `target_fps`, never zero
fn frame_interval(target_fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / target_fps.max(1) as f64).max(Duration::from_nanos(1))
}

impl<C, O> Pipeline<C, O>
where
    C: CaptureSource,
    O: OutputSink,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        capture: C,
        output: O,
        factory: Arc<dyn ModelFactory>,
        segmenter_config: SegmenterConfig,
        backdrops: BackdropLibrary,
        state: watch::Receiver<ControlState>,
        surface_size: (u32, u32),
        target_fps: u32,
    ) -> Self {
        Self {
            capture,
            output,
            factory,
            segmenter_config,
            model: None,
            loaded_epoch: None,
            compositor: FrameCompositor::new(surface_size.0, surface_size.1),
            backdrops,
            state,
            frame_interval: frame_interval(target_fps),
            show_matte: false,
            stats: CycleStats::default(),
        }
    }

    /// Present the grayscale segmentation instead of the composite
    pub fn with_show_matte(mut self, show_matte: bool) -> Self {
        self.show_matte = show_matte;
        self
    }

    #[cfg(test)]
    pub fn compositor(&self) -> &FrameCompositor {
        &self.compositor
    }

    /// Run cycles at the display rate until `stop` turns true or its sender goes away
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Starting compositing loop");

        loop {
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            if *stop.borrow() {
                break;
            }

            let outcome = self.run_cycle().await?;

            if outcome == CycleOutcome::Rendered && self.stats.frames % 30 == 0 {
                self.stats.log();
            }
        }

        tracing::info!("Compositing loop stopped after {} frames", self.stats.frames);
        Ok(())
    }

    /// One compositing cycle against a single parameter snapshot
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let state = *self.state.borrow_and_update();
        let params = state.params;

        if self.loaded_epoch != Some(state.model_epoch) {
            self.reinitialize(&state).await?;
        }

        let capture_start = Instant::now();
        let frame = self.capture.capture_frame().context("Failed to capture frame")?;
        let frame = self.fit_to_surface(frame);
        self.stats.capture += capture_start.elapsed();

        let segment_start = Instant::now();
        let inferred = self.segment(frame).await?;
        self.stats.segment += segment_start.elapsed();

        let (frame, segmentation) = match inferred {
            (frame, Ok(segmentation)) => (frame, segmentation),
            (_, Err(err)) => {
                tracing::warn!("Segmentation failed, skipping frame: {:#}", err);
                self.stats.skipped += 1;
                self.present(&params, None)?;
                return Ok(CycleOutcome::Skipped);
            }
        };

        let composite_start = Instant::now();
        let composited = match params.mode {
            CompositeMode::Blur => self.compositor.run_blur_cycle(&frame, &segmentation, &params),
            CompositeMode::Image => self.compositor.run_image_cycle(&frame, &segmentation, &params),
        };
        composited.context("Failed to composite frame")?;
        self.stats.composite += composite_start.elapsed();

        let matte = self.show_matte.then_some(&segmentation);
        self.present(&params, matte)?;
        self.stats.frames += 1;

        Ok(CycleOutcome::Rendered)
    }

    /// Drop the current model and configure a fresh one for the new mode
    async fn reinitialize(&mut self, state: &ControlState) -> Result<()> {
        tracing::info!(
            "Initializing segmentation model for {:?} mode (epoch {})",
            state.params.mode,
            state.model_epoch
        );

        self.model = None;

        let factory = Arc::clone(&self.factory);
        let config = self.segmenter_config.clone();
        let model = tokio::task::spawn_blocking(move || factory.configure(&config))
            .await
            .context("Model initialization task panicked")??;

        let (input_width, input_height) = model.input_size();
        tracing::debug!("Model input {}x{}", input_width, input_height);

        self.model = Some(model);
        self.loaded_epoch = Some(state.model_epoch);
        Ok(())
    }

    /// Run inference off the loop thread; the frame is handed back alongside the result
    async fn segment(&mut self, frame: VideoFrame) -> Result<(VideoFrame, Result<Segmentation>)> {
        let mut model = self
            .model
            .take()
            .context("Segmentation model not initialized")?;

        let (model, frame, result) = tokio::task::spawn_blocking(move || {
            let result = model.segment(&frame);
            (model, frame, result)
        })
        .await
        .context("Segmentation task panicked")?;

        self.model = Some(model);
        Ok((frame, result))
    }

    fn fit_to_surface(&self, frame: VideoFrame) -> VideoFrame {
        let (width, height) = self.compositor.surface().dimensions();
        if frame.dimensions() == (width, height) {
            frame
        } else {
            imageops::resize(&frame, width, height, imageops::FilterType::Triangle)
        }
    }

    fn present(&mut self, params: &CompositeParameters, matte: Option<&Segmentation>) -> Result<()> {
        let output_start = Instant::now();

        let frame = match matte {
            Some(segmentation) => {
                let (width, height) = segmentation.dimensions();
                Preprocessor::matte_to_rgb(segmentation.matte(), width, height)
            }
            None => flatten_over(self.compositor.surface(), self.backdrops.backdrop_for(params)),
        };

        self.output
            .write_frame(&frame)
            .context("Failed to write frame")?;

        self.stats.output += output_start.elapsed();
        Ok(())
    }
}
