//! Host-side input state polled by the plug-in.

use std::collections::VecDeque;

pub const MAX_PORTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub keycode: u32,
    pub character: u32,
    pub modifiers: u16,
    pub pressed: bool,
}

/// Joypad bitmasks plus a queue of key events awaiting delivery to the
/// plug-in's keyboard callback at the start of the next frame.
#[derive(Debug, Default)]
pub(crate) struct InputState {
    joypads: [u32; MAX_PORTS],
    key_queue: VecDeque<KeyEvent>,
}

impl InputState {
    pub fn set_joypad(&mut self, port: u32, button_id: u32, pressed: bool) {
        let Some(mask) = self.joypads.get_mut(port as usize) else {
            log::warn!("Ignoring joypad input for out-of-range port {port}");
            return;
        };

        if button_id >= 32 {
            log::warn!("Ignoring out-of-range joypad button id {button_id}");
            return;
        }

        if pressed {
            *mask |= 1 << button_id;
        } else {
            *mask &= !(1 << button_id);
        }
    }

    pub fn clear_all(&mut self) {
        self.joypads = [0; MAX_PORTS];
    }

    pub fn joypad_pressed(&self, port: u32, button_id: u32) -> bool {
        let Some(&mask) = self.joypads.get(port as usize) else { return false };
        button_id < 32 && mask & (1 << button_id) != 0
    }

    pub fn queue_key_event(&mut self, event: KeyEvent) {
        self.key_queue.push_back(event);
    }

    pub fn drain_key_events(&mut self) -> impl Iterator<Item = KeyEvent> {
        self.key_queue.drain(..)
    }
}
