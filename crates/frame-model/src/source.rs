//! Frame producers.
//!
//! Capture devices, decoders, and test generators implement
//! [`FrameSource`]. A source hands out frames in non-decreasing timestamp
//! order; it may drop frames under load but never reorders them.

use std::collections::VecDeque;

use crate::frame::{Dimensions, Frame};

/// A pull-based stream of frames.
pub trait FrameSource {
    /// The next frame, or `None` when the stream has ended.
    fn next_frame(&mut self) -> Option<Frame>;

    /// Nominal dimensions of the frames this source produces, if known.
    fn dimensions(&self) -> Option<Dimensions> {
        None
    }
}

/// A source backed by an in-memory list of frames.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    frames: VecDeque<Frame>,
}

impl VecSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for VecSource {
    fn next_frame(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    fn dimensions(&self) -> Option<Dimensions> {
        self.frames.front().map(|f| f.dimensions)
    }
}

/// Adapts any frame iterator into a source.
#[derive(Debug, Clone)]
pub struct IterSource<I>(pub I);

impl<I> FrameSource for IterSource<I>
where
    I: Iterator<Item = Frame>,
{
    fn next_frame(&mut self) -> Option<Frame> {
        self.0.next()
    }
}
