//! The display side of the pipeline.

use async_trait::async_trait;

use crate::matrix::Color;

/// Something that can show one frame at a time.
///
/// Writes are fire-and-forget: a sink logs its own failures and never
/// reports them back to the scheduler.
#[async_trait]
pub trait FrameSink: Send {
    /// Show `frame`, a `rows * columns` window in strip order.
    async fn send_frame(&mut self, frame: &[Color]);
}

#[async_trait]
impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    async fn send_frame(&mut self, frame: &[Color]) {
        (**self).send_frame(frame).await
    }
}
