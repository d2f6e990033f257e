//! Sample-accurate block rendering.
//!
//! A block is split at each MIDI event's frame offset so that notes start and
//! stop on the exact sample. Sub-blocks shorter than the configured minimum
//! are avoided by handling the event early instead.

use polyphon_midi::MidiEvent;

use crate::synthesiser::Synthesiser;

/// Something rendered in sub-blocks between MIDI events.
pub(crate) trait SubBlockRenderer {
    fn handle_event(&mut self, event: &MidiEvent);

    /// Render over `[start_sample, start_sample + num_samples)`, adding to `output`.
    fn render_sub_block(&mut self, output: &mut [&mut [f32]], start_sample: usize, num_samples: usize);
}

/// Render `num_samples` frames starting at `start_sample`, interleaving
/// `midi_events` at their frame offsets.
///
/// Late events are clamped to the current position. Events closer than
/// `minimum` samples are handled early; with `strict == false` the first
/// sub-block may be a single sample. Events at or past the end of the range
/// are handled after rendering.
pub(crate) fn render_split<R: SubBlockRenderer + ?Sized>(
    renderer: &mut R,
    output: &mut [&mut [f32]],
    midi_events: &[MidiEvent],
    start_sample: usize,
    num_samples: usize,
    minimum: usize,
    strict: bool,
) {
    let buffer_len = output.iter().map(|ch| ch.len()).min().unwrap_or(0);
    let mut start = start_sample.min(buffer_len);
    let mut remaining = num_samples.min(buffer_len - start);

    let minimum = minimum.max(1);
    let mut first_event = true;
    let mut next = 0;

    while remaining > 0 {
        let Some(event) = midi_events.get(next) else {
            renderer.render_sub_block(output, start, remaining);
            return;
        };

        let position = event.frame_offset.max(start);
        let samples_to_next_event = position - start;

        if samples_to_next_event >= remaining {
            renderer.render_sub_block(output, start, remaining);
            break;
        }

        let min_block = if first_event && !strict { 1 } else { minimum };
        if samples_to_next_event < min_block {
            renderer.handle_event(event);
            next += 1;
            continue;
        }

        first_event = false;
        renderer.render_sub_block(output, start, samples_to_next_event);
        renderer.handle_event(event);
        next += 1;
        start += samples_to_next_event;
        remaining -= samples_to_next_event;
    }

    for event in &midi_events[next..] {
        renderer.handle_event(event);
    }
}

impl SubBlockRenderer for Synthesiser {
    #[inline]
    fn handle_event(&mut self, event: &MidiEvent) {
        self.handle_midi_event(event);
    }

    fn render_sub_block(&mut self, output: &mut [&mut [f32]], start_sample: usize, num_samples: usize) {
        if num_samples == 0 || output.is_empty() {
            return;
        }
        for slot in &mut self.voices {
            slot.render(output, start_sample, num_samples);
        }
    }
}

impl Synthesiser {
    /// Render `num_samples` frames starting at `start_sample`, interleaving
    /// `midi_events` at their frame offsets.
    ///
    /// `output` holds one slice per audio channel and is added to, never
    /// cleared. Events must be sorted by offset; offsets are relative to the
    /// start of `output`. Events at or past the end of the range are handled
    /// after rendering, so their effect starts with the next block.
    pub fn render_next_block(
        &mut self,
        output: &mut [&mut [f32]],
        midi_events: &[MidiEvent],
        start_sample: usize,
        num_samples: usize,
    ) {
        let minimum = self.config.minimum_subdivision;
        let strict = self.config.strict_subdivision;
        render_split(self, output, midi_events, start_sample, num_samples, minimum, strict);
    }
}
