//! Input events and the per-frame event queue.
//!
//! Events are queued as they arrive and drained once at the start of each
//! frame; nothing reacts to input outside the viewer loop.

use std::collections::VecDeque;

use glam::Vec3;

/// Distance moved per W/A/S/D press, in view-space units.
pub const MOVE_STEP: f32 = 0.1;

/// Keys the viewer reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyCode {
    W,
    A,
    S,
    D,
}

impl KeyCode {
    /// View-space translation of the camera for this key.
    pub const fn translation(self) -> Vec3 {
        match self {
            Self::W => Vec3::new(0.0, 0.0, -MOVE_STEP),
            Self::S => Vec3::new(0.0, 0.0, MOVE_STEP),
            Self::A => Vec3::new(-MOVE_STEP, 0.0, 0.0),
            Self::D => Vec3::new(MOVE_STEP, 0.0, 0.0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    KeyPressed(KeyCode),
    DragStart,
    DragStop,
    /// Mouse motion in pixels
    MouseMotion { dx: f32, dy: f32 },
    ToggleAutoRotate,
    CycleDebugView,
    ToggleChunkBorders,
    ToggleOcclusion,
}

/// FIFO of pending input events.
#[derive(Clone, Debug, Default)]
pub struct InputQueue {
    events: VecDeque<InputEvent>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: InputEvent) {
        self.events.push_back(event);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Take every queued event in arrival order.
    pub fn drain(&mut self) -> impl Iterator<Item = InputEvent> + '_ {
        self.events.drain(..)
    }
}

/// Input events scheduled for specific frames.
///
/// Stands in for a window's event source when running headless.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputScript {
    entries: Vec<(u64, InputEvent)>,
}

impl InputScript {
    /// Parse a script like `"0:drag+,1:move=40,0,2:drag-,10:w,20:auto"`.
    ///
    /// Each entry is `<frame>:<event>`. Events: `w`, `a`, `s`, `d`, `drag+`,
    /// `drag-`, `move=<dx>,<dy>`, `auto`, `view`, `borders`, `occlusion`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut entries = Vec::new();
        let mut parts = s.split(',').map(str::trim).filter(|p| !p.is_empty());

        while let Some(part) = parts.next() {
            let (frame, event) = part
                .split_once(':')
                .ok_or_else(|| format!("missing frame in input entry '{part}'"))?;
            let frame: u64 = frame
                .trim()
                .parse()
                .map_err(|_| format!("invalid frame '{frame}'"))?;

            let event = match event.trim() {
                "w" => InputEvent::KeyPressed(KeyCode::W),
                "a" => InputEvent::KeyPressed(KeyCode::A),
                "s" => InputEvent::KeyPressed(KeyCode::S),
                "d" => InputEvent::KeyPressed(KeyCode::D),
                "drag+" => InputEvent::DragStart,
                "drag-" => InputEvent::DragStop,
                "auto" => InputEvent::ToggleAutoRotate,
                "view" => InputEvent::CycleDebugView,
                "borders" => InputEvent::ToggleChunkBorders,
                "occlusion" => InputEvent::ToggleOcclusion,
                other => {
                    let dx = other
                        .strip_prefix("move=")
                        .ok_or_else(|| format!("unknown input event '{other}'"))?;
                    let dy = parts
                        .next()
                        .ok_or_else(|| format!("missing dy after 'move={dx}'"))?;
                    InputEvent::MouseMotion {
                        dx: dx.parse().map_err(|_| format!("invalid dx '{dx}'"))?,
                        dy: dy.parse().map_err(|_| format!("invalid dy '{dy}'"))?,
                    }
                }
            };
            entries.push((frame, event));
        }

        entries.sort_by_key(|&(frame, _)| frame);
        Ok(Self { entries })
    }

    /// Queue every event scheduled for `frame`.
    pub fn feed(&self, frame: u64, queue: &mut InputQueue) {
        self.entries
            .iter()
            .filter(|&&(f, _)| f == frame)
            .for_each(|&(_, event)| queue.push(event));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_drains_in_order() {
        let mut queue = InputQueue::new();
        queue.push(InputEvent::DragStart);
        queue.push(InputEvent::MouseMotion { dx: 1.0, dy: 2.0 });
        assert_eq!(queue.len(), 2);

        let events: Vec<_> = queue.drain().collect();
        assert_eq!(
            events,
            vec![
                InputEvent::DragStart,
                InputEvent::MouseMotion { dx: 1.0, dy: 2.0 }
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn keys_move_along_view_axes() {
        assert_eq!(KeyCode::W.translation(), Vec3::new(0.0, 0.0, -0.1));
        assert_eq!(KeyCode::D.translation(), Vec3::new(0.1, 0.0, 0.0));
        assert_eq!(KeyCode::A.translation() + KeyCode::D.translation(), Vec3::ZERO);
    }

    #[test]
    fn script_feeds_events_on_their_frame() {
        let script = InputScript::parse("2:drag+, 2:move=40,-5, 3:drag-, 0:w").unwrap();
        let mut queue = InputQueue::new();

        script.feed(0, &mut queue);
        assert_eq!(
            queue.drain().collect::<Vec<_>>(),
            vec![InputEvent::KeyPressed(KeyCode::W)]
        );

        script.feed(1, &mut queue);
        assert!(queue.is_empty());

        script.feed(2, &mut queue);
        assert_eq!(
            queue.drain().collect::<Vec<_>>(),
            vec![
                InputEvent::DragStart,
                InputEvent::MouseMotion { dx: 40.0, dy: -5.0 }
            ]
        );
    }

    #[test]
    fn script_rejects_garbage() {
        assert!(InputScript::parse("x:w").is_err());
        assert!(InputScript::parse("1:jump").is_err());
        assert!(InputScript::parse("1:move=3").is_err());
        assert!(InputScript::parse("w").is_err());
        assert!(InputScript::parse("").unwrap().is_empty());
    }
}
