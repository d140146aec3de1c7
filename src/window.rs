// src/window.rs

use crate::types::FeatureVector;
use std::collections::VecDeque;

/// Fill state of the streaming window buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Fewer than `T` feature vectors buffered; no prediction yet.
    Filling,
    /// Buffer at capacity; every new frame yields a fresh window.
    Ready,
}

impl BufferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BufferState::Filling => "FILLING",
            BufferState::Ready => "READY",
        }
    }
}

/// Streaming-mode windower for the live demo: a fixed-capacity ring of
/// per-frame feature vectors. Push evicts the oldest entry once `T` is
/// exceeded, so after the buffer first fills a new stride-1 window is
/// available on every subsequent frame.
pub struct StreamingWindow {
    capacity: usize,
    frames: VecDeque<FeatureVector>,
}

impl StreamingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            frames: VecDeque::with_capacity(capacity + 1),
        }
    }

    pub fn push(&mut self, features: FeatureVector) {
        self.frames.push_back(features);
        if self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }

    pub fn state(&self) -> BufferState {
        if self.frames.len() >= self.capacity {
            BufferState::Ready
        } else {
            BufferState::Filling
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The current window, oldest frame first, flattened for the
    /// classifier. `None` until the buffer has filled once.
    pub fn window(&self) -> Option<Vec<f32>> {
        if self.state() != BufferState::Ready {
            return None;
        }

        let per_frame = self.frames.front().map_or(0, |f| f.len());
        let mut flat = Vec::with_capacity(self.capacity * per_frame);
        for frame in &self.frames {
            flat.extend_from_slice(frame);
        }
        Some(flat)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_of(value: f32, len: usize) -> FeatureVector {
        vec![value; len]
    }

    #[test]
    fn test_fills_then_becomes_ready_on_tth_frame() {
        let mut buffer = StreamingWindow::new(10);

        for i in 0..9 {
            buffer.push(vec_of(i as f32, 4));
            assert_eq!(buffer.state(), BufferState::Filling);
            assert!(buffer.window().is_none());
        }

        buffer.push(vec_of(9.0, 4));
        assert_eq!(buffer.state(), BufferState::Ready);

        let window = buffer.window().unwrap();
        assert_eq!(window.len(), 10 * 4);
        assert_eq!(window[0], 0.0); // oldest frame first
        assert_eq!(window[window.len() - 1], 9.0);
    }

    #[test]
    fn test_push_past_capacity_evicts_oldest() {
        let mut buffer = StreamingWindow::new(3);
        for i in 0..3 {
            buffer.push(vec_of(i as f32, 2));
        }
        buffer.push(vec_of(3.0, 2));

        assert_eq!(buffer.len(), 3);
        let window = buffer.window().unwrap();
        // Frame 0 evicted; window now covers frames 1..=3
        assert_eq!(window, vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
    }

    #[test]
    fn test_stays_ready_on_every_subsequent_frame() {
        let mut buffer = StreamingWindow::new(2);
        buffer.push(vec_of(0.0, 1));
        buffer.push(vec_of(1.0, 1));

        for i in 2..6 {
            buffer.push(vec_of(i as f32, 1));
            assert_eq!(buffer.state(), BufferState::Ready);
            assert!(buffer.window().is_some());
        }
    }

    #[test]
    fn test_clear_returns_to_filling() {
        let mut buffer = StreamingWindow::new(2);
        buffer.push(vec_of(0.0, 1));
        buffer.push(vec_of(1.0, 1));
        assert_eq!(buffer.state(), BufferState::Ready);

        buffer.clear();
        assert_eq!(buffer.state(), BufferState::Filling);
        assert!(buffer.window().is_none());
        assert!(buffer.is_empty());
    }
}
