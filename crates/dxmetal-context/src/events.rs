//! Debug-marker queue with render-target-switch watermarking.
//!
//! Frontend marker calls are queued rather than encoded immediately,
//! because the encoder they belong to may not exist yet. When a render
//! target switch is recorded mid-queue, markers queued before the switch
//! belong to the ending encoder and markers after it to the next one; the
//! watermark remembers the split. Push groups still open when an encoder
//! ends are re-opened on the next encoder so grouping stays balanced per
//! encoder without losing nesting across the switch.

use dxmetal_metal::MtlCommandEncoder;

#[derive(Debug, Clone, PartialEq, Eq)]
enum MarkerAction {
    Push(String),
    Pop,
    Event(String),
}

/// How queued markers relate to the encoder they are flushed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// The queue belongs entirely to the given encoder.
    Default,
    /// The encoder is about to end: replay only up to the render-target
    /// switch watermark and close still-open groups.
    FlushEncoder,
    /// The encoder was just created: re-open the group stack first.
    NewEncoder,
}

/// Queued debug-marker actions for one context.
#[derive(Default)]
pub struct GpuEventQueue {
    queue: Vec<MarkerAction>,
    // Labels of groups currently open on the active encoder.
    open_groups: Vec<String>,
    watermark: Option<usize>,
}

impl GpuEventQueue {
    /// Creates an empty queue.
    pub fn new() -> GpuEventQueue {
        GpuEventQueue::default()
    }

    /// Queues a debug group open.
    pub fn push_group(&mut self, label: &str) {
        self.queue.push(MarkerAction::Push(label.to_owned()));
    }

    /// Queues a debug group close.
    pub fn pop_group(&mut self) {
        self.queue.push(MarkerAction::Pop);
    }

    /// Queues a point marker.
    pub fn event(&mut self, label: &str) {
        self.queue.push(MarkerAction::Event(label.to_owned()));
    }

    /// Records that the render targets switch here: markers queued so far
    /// belong to the current encoder, later ones to its successor.
    pub fn on_set_render_targets(&mut self) {
        self.watermark = Some(self.queue.len());
    }

    /// Depth of the currently open group stack.
    pub fn open_group_depth(&self) -> usize {
        self.open_groups.len()
    }

    /// Replays queued actions into `encoder` according to `mode`.
    pub fn flush_actions(&mut self, encoder: &mut dyn MtlCommandEncoder, mode: FlushMode) {
        match mode {
            FlushMode::Default => {
                self.replay(encoder, self.queue.len());
                self.watermark = None;
            }
            FlushMode::NewEncoder => {
                for label in &self.open_groups {
                    encoder.push_debug_group(label);
                }
                self.replay(encoder, self.queue.len());
                self.watermark = None;
            }
            FlushMode::FlushEncoder => {
                // Without a target switch the queue belongs to whatever
                // encoder comes next, not the one ending.
                if let Some(watermark) = self.watermark.take() {
                    let upto = self.retreat_watermark(watermark);
                    self.replay(encoder, upto);
                }
                // Close still-open groups so the encoder ends balanced; the
                // stack is kept for re-opening on the next encoder.
                for _ in &self.open_groups {
                    encoder.pop_debug_group();
                }
            }
        }
    }

    // Trailing pushes right before the watermark open groups for work that
    // happens after the target switch; they move to the next encoder along
    // with any point markers between them. Only a pop pins the split.
    fn retreat_watermark(&self, watermark: usize) -> usize {
        let mut watermark = watermark;
        for i in (0..watermark).rev() {
            match self.queue[i] {
                MarkerAction::Push(_) => watermark = i,
                MarkerAction::Event(_) => {}
                MarkerAction::Pop => break,
            }
        }
        watermark
    }

    fn replay(&mut self, encoder: &mut dyn MtlCommandEncoder, upto: usize) {
        for action in self.queue.drain(..upto) {
            match action {
                MarkerAction::Push(label) => {
                    encoder.push_debug_group(&label);
                    self.open_groups.push(label);
                }
                MarkerAction::Pop => {
                    encoder.pop_debug_group();
                    self.open_groups.pop();
                }
                MarkerAction::Event(label) => encoder.insert_debug_signpost(&label),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxmetal_metal::testing::{EncoderCommand, RecordingDevice};
    use dxmetal_metal::{MtlCommandQueue, MtlDevice};

    fn marker_commands(log: &dxmetal_metal::testing::CommandLog) -> Vec<EncoderCommand> {
        log.filtered(|c| {
            matches!(
                c,
                EncoderCommand::PushDebugGroup(_)
                    | EncoderCommand::PopDebugGroup
                    | EncoderCommand::Signpost(_)
            )
        })
    }

    #[test]
    fn default_flush_replays_everything() {
        let device = RecordingDevice::new();
        let queue = device.new_command_queue();
        let mut cmd_buf = queue.command_buffer();
        let mut encoder = cmd_buf.compute_encoder();

        let mut events = GpuEventQueue::new();
        events.push_group("frame");
        events.event("draw 1");
        events.pop_group();
        events.flush_actions(encoder.as_mut(), FlushMode::Default);

        assert_eq!(
            marker_commands(&device.log()),
            vec![
                EncoderCommand::PushDebugGroup("frame".to_owned()),
                EncoderCommand::Signpost("draw 1".to_owned()),
                EncoderCommand::PopDebugGroup,
            ]
        );
        assert_eq!(events.open_group_depth(), 0);
    }

    #[test]
    fn flush_encoder_splits_at_the_watermark() {
        let device = RecordingDevice::new();
        let queue = device.new_command_queue();
        let mut cmd_buf = queue.command_buffer();

        let mut events = GpuEventQueue::new();
        events.event("before switch");
        events.on_set_render_targets();
        events.event("after switch");

        // Ending the first encoder replays only pre-switch markers.
        let mut first = cmd_buf.compute_encoder();
        events.flush_actions(first.as_mut(), FlushMode::FlushEncoder);
        first.end_encoding();

        assert_eq!(
            marker_commands(&device.log()),
            vec![EncoderCommand::Signpost("before switch".to_owned())]
        );

        // The next encoder receives the rest.
        device.log().clear();
        let mut second = cmd_buf.compute_encoder();
        events.flush_actions(second.as_mut(), FlushMode::NewEncoder);

        assert_eq!(
            marker_commands(&device.log()),
            vec![EncoderCommand::Signpost("after switch".to_owned())]
        );
    }

    #[test]
    fn trailing_pushes_move_to_the_next_encoder() {
        let device = RecordingDevice::new();
        let queue = device.new_command_queue();
        let mut cmd_buf = queue.command_buffer();

        let mut events = GpuEventQueue::new();
        events.event("old pass");
        events.push_group("shadow pass");
        events.on_set_render_targets();
        events.event("shadow draw");

        let mut first = cmd_buf.compute_encoder();
        events.flush_actions(first.as_mut(), FlushMode::FlushEncoder);
        first.end_encoding();

        // The push right before the switch belongs to the next encoder.
        assert_eq!(
            marker_commands(&device.log()),
            vec![EncoderCommand::Signpost("old pass".to_owned())]
        );

        device.log().clear();
        let mut second = cmd_buf.compute_encoder();
        events.flush_actions(second.as_mut(), FlushMode::NewEncoder);

        assert_eq!(
            marker_commands(&device.log()),
            vec![
                EncoderCommand::PushDebugGroup("shadow pass".to_owned()),
                EncoderCommand::Signpost("shadow draw".to_owned()),
            ]
        );
        assert_eq!(events.open_group_depth(), 1);
    }

    #[test]
    fn events_after_a_trailing_push_defer_with_it() {
        let device = RecordingDevice::new();
        let queue = device.new_command_queue();
        let mut cmd_buf = queue.command_buffer();

        let mut events = GpuEventQueue::new();
        events.push_group("next pass");
        events.event("note");
        events.on_set_render_targets();

        // The push opens a group for post-switch work; the point marker
        // after it belongs to that group and moves with it.
        let mut first = cmd_buf.compute_encoder();
        events.flush_actions(first.as_mut(), FlushMode::FlushEncoder);
        first.end_encoding();
        assert_eq!(marker_commands(&device.log()), vec![]);

        device.log().clear();
        let mut second = cmd_buf.compute_encoder();
        events.flush_actions(second.as_mut(), FlushMode::NewEncoder);
        assert_eq!(
            marker_commands(&device.log()),
            vec![
                EncoderCommand::PushDebugGroup("next pass".to_owned()),
                EncoderCommand::Signpost("note".to_owned()),
            ]
        );
    }

    #[test]
    fn flush_encoder_without_a_target_switch_keeps_the_queue() {
        let device = RecordingDevice::new();
        let queue = device.new_command_queue();
        let mut cmd_buf = queue.command_buffer();

        let mut events = GpuEventQueue::new();
        events.push_group("post processing");
        events.event("blit");

        // No render-target switch was recorded, so the queue belongs to
        // the next encoder and the ending one sees nothing.
        let mut first = cmd_buf.compute_encoder();
        events.flush_actions(first.as_mut(), FlushMode::FlushEncoder);
        first.end_encoding();
        assert_eq!(marker_commands(&device.log()), vec![]);

        device.log().clear();
        let mut second = cmd_buf.compute_encoder();
        events.flush_actions(second.as_mut(), FlushMode::NewEncoder);
        assert_eq!(
            marker_commands(&device.log()),
            vec![
                EncoderCommand::PushDebugGroup("post processing".to_owned()),
                EncoderCommand::Signpost("blit".to_owned()),
            ]
        );
    }

    #[test]
    fn open_groups_reopen_on_the_next_encoder() {
        let device = RecordingDevice::new();
        let queue = device.new_command_queue();
        let mut cmd_buf = queue.command_buffer();

        let mut events = GpuEventQueue::new();
        events.push_group("frame");
        events.push_group("gbuffer");

        let mut first = cmd_buf.compute_encoder();
        events.flush_actions(first.as_mut(), FlushMode::Default);
        assert_eq!(events.open_group_depth(), 2);

        // Ending the encoder closes both groups to keep it balanced.
        events.flush_actions(first.as_mut(), FlushMode::FlushEncoder);
        first.end_encoding();
        assert_eq!(
            device.log().filtered(|c| matches!(c, EncoderCommand::PopDebugGroup)).len(),
            2
        );

        device.log().clear();
        let mut second = cmd_buf.compute_encoder();
        events.flush_actions(second.as_mut(), FlushMode::NewEncoder);
        assert_eq!(
            marker_commands(&device.log()),
            vec![
                EncoderCommand::PushDebugGroup("frame".to_owned()),
                EncoderCommand::PushDebugGroup("gbuffer".to_owned()),
            ]
        );
    }
}
