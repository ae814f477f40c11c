//! Audio signal streams.
//!
//! An [`AudioSignal`] owns a *stream*: an ordered list of equally sized
//! sample buffers. Three values describe its shape and are kept consistent
//! after every mutation:
//!
//! - `length` equals the number of buffers in the stream,
//! - `last_frame` is the count of valid frames in the tail buffer
//!   (`1..=buffer_size` for a non-empty stream, `0` for an empty one),
//! - the cursor either points at a buffer inside the stream or is unset.
//!
//! The frame content of a signal is the concatenation of its buffers cut off
//! after `last_frame` frames of the tail buffer; see
//! [`frame_count`](AudioSignal::frame_count) and
//! [`samples`](AudioSignal::samples).
//!
//! # Templates and instances
//!
//! Every [`Recycling`](crate::Recycling) holds exactly one template signal.
//! Run instances are produced from it with [`tile`](AudioSignal::tile) (cyclic
//! replication to a target frame count) or
//! [`duplicate_stream`](AudioSignal::duplicate_stream) (verbatim copy).

use crate::error::{Error, Result};
use crate::format::{AudioGeometry, SampleFormat, validate_buffer_size};
use crate::recall_id::SharedRecallId;

/// A resizable stream of fixed-size sample buffers bound to a recall id.
#[derive(Debug, Clone)]
pub struct AudioSignal {
    samplerate: u32,
    buffer_size: usize,
    format: SampleFormat,
    length: usize,
    last_frame: usize,
    stream: Vec<Vec<f32>>,
    cursor: Option<usize>,
    recall_id: Option<SharedRecallId>,
    template: bool,
    delay: usize,
    attack: usize,
}

impl AudioSignal {
    /// Creates an empty instance signal with the given geometry.
    pub fn new(geometry: &AudioGeometry) -> Self {
        Self {
            samplerate: geometry.samplerate(),
            buffer_size: geometry.buffer_size(),
            format: geometry.format(),
            length: 0,
            last_frame: 0,
            stream: Vec::new(),
            cursor: None,
            recall_id: None,
            template: false,
            delay: 0,
            attack: 0,
        }
    }

    /// Creates an empty template signal.
    pub fn template(geometry: &AudioGeometry) -> Self {
        let mut signal = Self::new(geometry);
        signal.template = true;
        signal
    }

    /// Creates an empty, unbound instance with this signal's geometry.
    pub fn empty_like(&self) -> Self {
        Self {
            samplerate: self.samplerate,
            buffer_size: self.buffer_size,
            format: self.format,
            length: 0,
            last_frame: 0,
            stream: Vec::new(),
            cursor: None,
            recall_id: None,
            template: false,
            delay: 0,
            attack: 0,
        }
    }

    /// Creates a signal holding `length` silent buffers.
    pub fn with_length(geometry: &AudioGeometry, length: usize) -> Self {
        let mut signal = Self::new(geometry);
        signal.resize(length);
        signal
    }

    /// Creates a signal from contiguous frames, zero-padding the tail buffer.
    pub fn from_samples(geometry: &AudioGeometry, samples: &[f32]) -> Self {
        let mut signal = Self::new(geometry);
        signal.write_frames(0, samples.iter().copied(), samples.len());
        signal
    }

    /// Samplerate in Hz.
    pub fn samplerate(&self) -> u32 {
        self.samplerate
    }

    /// Frames per buffer.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Semantic sample format.
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Resolution in bits.
    pub fn resolution(&self) -> u8 {
        self.format.bits()
    }

    /// Number of buffers in the stream.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Returns `true` if the stream holds no buffers.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Valid frames in the tail buffer.
    pub fn last_frame(&self) -> usize {
        self.last_frame
    }

    /// Total count of valid frames.
    pub fn frame_count(&self) -> usize {
        if self.length == 0 {
            0
        } else {
            (self.length - 1) * self.buffer_size + self.last_frame
        }
    }

    /// Index of the buffer under the cursor.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Recall id this signal belongs to.
    pub fn recall_id(&self) -> Option<&SharedRecallId> {
        self.recall_id.as_ref()
    }

    /// Binds the signal to a run.
    pub fn set_recall_id(&mut self, recall_id: Option<SharedRecallId>) {
        self.recall_id = recall_id;
    }

    /// Returns `true` for a recycling's template signal.
    pub fn is_template(&self) -> bool {
        self.template
    }

    pub(crate) fn set_template(&mut self, template: bool) {
        self.template = template;
    }

    /// Whole-buffer placement offset applied by `duplicate_stream`.
    pub fn delay(&self) -> usize {
        self.delay
    }

    /// Frame placement offset applied by `duplicate_stream`.
    pub fn attack(&self) -> usize {
        self.attack
    }

    /// Sets the placement offsets used when copying a template in.
    ///
    /// `attack` is reduced modulo the buffer size.
    pub fn set_placement(&mut self, delay: usize, attack: usize) {
        self.delay = delay;
        self.attack = attack % self.buffer_size;
    }

    /// Buffer at `index`.
    pub fn buffer(&self, index: usize) -> Option<&[f32]> {
        self.stream.get(index).map(Vec::as_slice)
    }

    /// Mutable buffer at `index`.
    pub fn buffer_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        self.stream.get_mut(index).map(Vec::as_mut_slice)
    }

    /// Buffer under the cursor.
    pub fn current_buffer(&self) -> Option<&[f32]> {
        self.cursor.and_then(|c| self.buffer(c))
    }

    /// Mutable buffer under the cursor.
    pub fn current_buffer_mut(&mut self) -> Option<&mut [f32]> {
        let cursor = self.cursor?;
        self.buffer_mut(cursor)
    }

    /// Iterates over all buffers head to tail.
    pub fn buffers(&self) -> impl Iterator<Item = &[f32]> {
        self.stream.iter().map(Vec::as_slice)
    }

    /// Iterates over the valid frames head to tail.
    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        self.stream.iter().flatten().copied().take(self.frame_count())
    }

    /// Moves the cursor to the head buffer, or unsets it on an empty stream.
    pub fn rewind(&mut self) {
        self.cursor = if self.length > 0 { Some(0) } else { None };
    }

    /// Moves the cursor to `index`; out-of-range indices unset it.
    pub fn seek(&mut self, index: usize) {
        self.cursor = (index < self.length).then_some(index);
    }

    /// Advances the cursor by one buffer.
    ///
    /// Returns `false` and unsets the cursor when it moves past the tail.
    pub fn advance_cursor(&mut self) -> bool {
        match self.cursor {
            Some(c) if c + 1 < self.length => {
                self.cursor = Some(c + 1);
                true
            }
            _ => {
                self.cursor = None;
                false
            }
        }
    }

    /// Zeroes every buffer.
    pub fn clear(&mut self) {
        for buffer in &mut self.stream {
            buffer.fill(0.0);
        }
    }

    /// Appends one silent buffer at the tail.
    pub fn add_buffer(&mut self) {
        self.stream.push(vec![0.0; self.buffer_size]);
        self.length += 1;
        self.last_frame = self.buffer_size;
        self.check_invariants();
    }

    /// Buffers from the head through the cursor, inclusive.
    ///
    /// Zero when the cursor is unset.
    pub fn length_till_cursor(&self) -> usize {
        self.cursor.map_or(0, |c| c + 1)
    }

    /// Grows with silent buffers or truncates from the tail.
    ///
    /// A length below [`length_till_cursor`](Self::length_till_cursor) is
    /// refused and leaves the signal untouched. Use
    /// [`safe_resize`](Self::safe_resize) to clamp instead, or
    /// [`try_resize`](Self::try_resize) to get the refusal as an error.
    pub fn resize(&mut self, new_length: usize) {
        let required = self.length_till_cursor();
        if new_length < required {
            #[cfg(feature = "tracing")]
            tracing::warn!(requested = new_length, required, "stream resize below cursor ignored");
            return;
        }
        self.set_length(new_length);
    }

    /// Grows or truncates, unsetting a cursor that falls off the tail.
    fn set_length(&mut self, new_length: usize) {
        if new_length == self.length {
            return;
        }
        if new_length > self.length {
            let buffer_size = self.buffer_size;
            self.stream
                .resize_with(new_length, || vec![0.0; buffer_size]);
        } else {
            self.stream.truncate(new_length);
            if self.cursor.is_some_and(|c| c >= new_length) {
                self.cursor = None;
            }
        }
        self.length = new_length;
        self.last_frame = if new_length == 0 { 0 } else { self.buffer_size };
        self.check_invariants();
    }

    /// Resizes without truncating below the cursor.
    ///
    /// The resulting length is `max(new_length, length_till_cursor())`.
    pub fn safe_resize(&mut self, new_length: usize) {
        self.resize(new_length.max(self.length_till_cursor()));
    }

    /// Resizes, refusing to truncate below the cursor.
    pub fn try_resize(&mut self, new_length: usize) -> Result<()> {
        let required = self.length_till_cursor();
        if new_length < required {
            #[cfg(feature = "tracing")]
            tracing::warn!(requested = new_length, required, "stream resize refused");
            return Err(Error::ResizeBelowCursor {
                requested: new_length,
                required,
            });
        }
        self.set_length(new_length);
        Ok(())
    }

    /// Re-chunks the valid frames into buffers of `new_buffer_size`.
    ///
    /// The frame sequence is preserved exactly; the new tail buffer is
    /// zero-padded. The cursor follows the frame it pointed at.
    pub fn realloc_buffer_size(&mut self, new_buffer_size: usize) -> Result<()> {
        validate_buffer_size(new_buffer_size)?;
        if new_buffer_size == self.buffer_size {
            return Ok(());
        }
        let frames: Vec<f32> = self.samples().collect();
        let cursor_frame = self.cursor.map(|c| c * self.buffer_size);

        self.buffer_size = new_buffer_size;
        self.stream.clear();
        self.length = 0;
        self.last_frame = 0;
        self.write_frames(0, frames.iter().copied(), frames.len());

        self.cursor = cursor_frame
            .filter(|_| self.length > 0)
            .map(|f| (f / new_buffer_size).min(self.length - 1));
        self.check_invariants();
        Ok(())
    }

    /// Fills the stream with `frame_count` frames of `template` repeated
    /// cyclically.
    ///
    /// The template's valid frames are consumed across destination buffer
    /// boundaries with a carried offset, so the output is
    /// `out[i] == template[i mod template_frames]` whatever the two buffer
    /// sizes are. An empty template yields silence.
    pub fn tile(&mut self, template: &AudioSignal, frame_count: usize) {
        let source: Vec<f32> = template.samples().collect();
        let buffer_size = self.buffer_size;
        let length = frame_count.div_ceil(buffer_size);
        self.stream.clear();
        self.stream.resize_with(length, || vec![0.0; buffer_size]);
        self.length = length;
        self.last_frame = frame_count - length.saturating_sub(1) * self.buffer_size;

        if !source.is_empty() {
            let mut remaining = frame_count;
            // offset into the template carried from one buffer to the next
            let mut offcut = 0;
            for buffer in &mut self.stream {
                let mut filled = 0;
                let wanted = remaining.min(buffer.len());
                while filled < wanted {
                    let n = (wanted - filled).min(source.len() - offcut);
                    buffer[filled..filled + n].copy_from_slice(&source[offcut..offcut + n]);
                    filled += n;
                    offcut = (offcut + n) % source.len();
                }
                remaining -= wanted;
            }
        }

        if self.cursor.is_some_and(|c| c >= length) {
            self.cursor = None;
        }
        self.check_invariants();
    }

    /// Copies `template` into this stream.
    ///
    /// The stream is resized to hold the template plus this signal's
    /// `delay`/`attack` placement. With matching buffer sizes and no
    /// placement offset the result has `template.length()` buffers identical
    /// to the template's; otherwise the copy is frame-accurate.
    pub fn duplicate_stream(&mut self, template: &AudioSignal) {
        let offset = self.delay * self.buffer_size + self.attack;
        let frames = template.frame_count();
        let total = offset + frames;

        self.set_length(total.div_ceil(self.buffer_size));
        self.clear();
        self.write_frames(offset, template.samples(), frames);
        self.last_frame = if self.length == 0 {
            0
        } else {
            total - (self.length - 1) * self.buffer_size
        };
        self.check_invariants();
    }

    /// Re-quantizes every sample to the grid of `format`.
    pub fn scale_resolution(&mut self, format: SampleFormat) {
        if format != self.format && !format.is_float() {
            for sample in self.stream.iter_mut().flatten() {
                *sample = format.quantize(*sample);
            }
        }
        self.format = format;
    }

    /// Writes `count` frames starting at frame `offset`, growing the stream
    /// as needed.
    fn write_frames(&mut self, offset: usize, frames: impl Iterator<Item = f32>, count: usize) {
        let total = offset + count;
        let needed = total.div_ceil(self.buffer_size);
        if needed > self.length {
            self.resize(needed);
        }
        for (i, sample) in frames.take(count).enumerate() {
            let frame = offset + i;
            self.stream[frame / self.buffer_size][frame % self.buffer_size] = sample;
        }
        if self.length > 0 && total > (self.length - 1) * self.buffer_size {
            self.last_frame = total - (self.length - 1) * self.buffer_size;
        }
        self.check_invariants();
    }

    #[inline]
    fn check_invariants(&self) {
        debug_assert_eq!(self.length, self.stream.len(), "stream length out of sync");
        debug_assert!(
            self.cursor.is_none_or(|c| c < self.length),
            "cursor outside stream"
        );
        debug_assert!(
            (self.length == 0 && self.last_frame == 0)
                || (self.length > 0 && (1..=self.buffer_size).contains(&self.last_frame)),
            "last_frame {} invalid for length {}",
            self.last_frame,
            self.length
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(buffer_size: usize) -> AudioGeometry {
        AudioGeometry::new(44100, buffer_size, 1, SampleFormat::Float32).unwrap()
    }

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32).collect()
    }

    #[test]
    fn add_buffer_keeps_length_in_sync() {
        let mut s = AudioSignal::new(&geometry(8));
        assert_eq!(s.length(), 0);
        assert_eq!(s.frame_count(), 0);
        s.add_buffer();
        s.add_buffer();
        assert_eq!(s.length(), 2);
        assert_eq!(s.buffers().count(), 2);
        assert_eq!(s.last_frame(), 8);
        assert!(s.cursor().is_none());
    }

    #[test]
    fn resize_below_cursor_is_refused() {
        let mut s = AudioSignal::with_length(&geometry(4), 5);
        s.seek(3);
        s.resize(2);
        assert_eq!(s.length(), 5);
        assert_eq!(s.cursor(), Some(3));
        // down to the cursor buffer is allowed
        s.resize(4);
        assert_eq!(s.length(), 4);
        assert_eq!(s.cursor(), Some(3));
    }

    #[test]
    fn safe_resize_clamps_to_cursor() {
        let mut s = AudioSignal::with_length(&geometry(4), 5);
        s.seek(3);
        s.safe_resize(1);
        assert_eq!(s.length(), 4);
        assert_eq!(s.cursor(), Some(3));
        s.safe_resize(7);
        assert_eq!(s.length(), 7);
    }

    #[test]
    fn try_resize_refuses_below_cursor() {
        let mut s = AudioSignal::with_length(&geometry(4), 5);
        s.seek(2);
        let err = s.try_resize(2).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Consistency);
        assert_eq!(s.length(), 5);
        assert!(s.try_resize(3).is_ok());
        assert_eq!(s.length(), 3);
    }

    #[test]
    fn length_till_cursor_counts_inclusive() {
        let mut s = AudioSignal::with_length(&geometry(4), 5);
        assert_eq!(s.length_till_cursor(), 0);
        s.rewind();
        assert_eq!(s.length_till_cursor(), 1);
        s.seek(4);
        assert_eq!(s.length_till_cursor(), 5);
    }

    #[test]
    fn from_samples_sets_last_frame() {
        let s = AudioSignal::from_samples(&geometry(4), &ramp(10));
        assert_eq!(s.length(), 3);
        assert_eq!(s.last_frame(), 2);
        assert_eq!(s.frame_count(), 10);
        assert_eq!(s.buffer(2), Some(&[8.0, 9.0, 0.0, 0.0][..]));
    }

    #[test]
    fn realloc_rechunks_frames() {
        let mut s = AudioSignal::from_samples(&geometry(4), &ramp(10));
        s.seek(2);
        s.realloc_buffer_size(3).unwrap();
        assert_eq!(s.buffer_size(), 3);
        assert_eq!(s.length(), 4);
        assert_eq!(s.last_frame(), 1);
        assert_eq!(s.samples().collect::<Vec<_>>(), ramp(10));
        // frame 8 now lives in buffer 2
        assert_eq!(s.cursor(), Some(2));
        assert_eq!(s.buffer(3), Some(&[9.0, 0.0, 0.0][..]));
    }

    #[test]
    fn realloc_rejects_invalid_size() {
        let mut s = AudioSignal::from_samples(&geometry(4), &ramp(4));
        assert!(s.realloc_buffer_size(0).is_err());
        assert_eq!(s.buffer_size(), 4);
    }

    #[test]
    fn tile_carries_offcut_across_buffers() {
        let template = AudioSignal::from_samples(&geometry(4), &ramp(3));
        let mut s = AudioSignal::new(&geometry(5));
        s.tile(&template, 12);
        assert_eq!(s.length(), 3);
        assert_eq!(s.last_frame(), 2);
        let out: Vec<f32> = s.samples().collect();
        let expected: Vec<f32> = (0..12).map(|i| (i % 3) as f32).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn tile_with_empty_template_is_silent() {
        let template = AudioSignal::template(&geometry(4));
        let mut s = AudioSignal::new(&geometry(4));
        s.tile(&template, 6);
        assert_eq!(s.frame_count(), 6);
        assert!(s.samples().all(|x| x == 0.0));
        s.tile(&template, 0);
        assert!(s.is_empty());
    }

    #[test]
    fn duplicate_stream_copies_verbatim() {
        let template = AudioSignal::from_samples(&geometry(4), &ramp(10));
        let mut s = AudioSignal::with_length(&geometry(4), 1);
        s.duplicate_stream(&template);
        assert_eq!(s.length(), template.length());
        assert_eq!(s.last_frame(), template.last_frame());
        for (a, b) in s.buffers().zip(template.buffers()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn duplicate_stream_honours_placement() {
        let template = AudioSignal::from_samples(&geometry(4), &ramp(4));
        let mut s = AudioSignal::new(&geometry(4));
        s.set_placement(1, 2);
        s.duplicate_stream(&template);
        assert_eq!(s.frame_count(), 10);
        let out: Vec<f32> = s.samples().collect();
        assert_eq!(&out[..6], &[0.0; 6]);
        assert_eq!(&out[6..], &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn duplicate_stream_across_buffer_sizes() {
        let template = AudioSignal::from_samples(&geometry(4), &ramp(9));
        let mut s = AudioSignal::new(&geometry(2));
        s.duplicate_stream(&template);
        assert_eq!(s.samples().collect::<Vec<_>>(), ramp(9));
        assert_eq!(s.length(), 5);
        assert_eq!(s.last_frame(), 1);
    }

    #[test]
    fn scale_resolution_quantizes() {
        let mut s = AudioSignal::from_samples(&geometry(4), &[0.3, -0.7, 0.0, 1.0]);
        s.scale_resolution(SampleFormat::Signed8);
        assert_eq!(s.format(), SampleFormat::Signed8);
        assert_eq!(s.resolution(), 8);
        for x in s.samples() {
            assert!((x * 128.0 - (x * 128.0).round()).abs() < 1e-6);
        }
    }

    #[test]
    fn advance_cursor_runs_off_the_tail() {
        let mut s = AudioSignal::with_length(&geometry(2), 2);
        s.rewind();
        assert!(s.advance_cursor());
        assert_eq!(s.cursor(), Some(1));
        assert!(!s.advance_cursor());
        assert!(s.cursor().is_none());
    }
}
