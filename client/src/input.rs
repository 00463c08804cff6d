//! Client input generation with sequencing
//!
//! There is no window to read keys from, so the player follows a scripted
//! wandering path: the heading turns slowly and occasionally pauses, which
//! exercises prediction, wall collisions and corrections.

use shared::InputState;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Radians the heading turns per input.
const TURN_RATE: f32 = 0.02;
/// Out of every `PAUSE_CYCLE` inputs, the last `PAUSE_LENGTH` stand still.
const PAUSE_CYCLE: u32 = 240;
const PAUSE_LENGTH: u32 = 30;

/// Produces numbered movement inputs for the local player
pub struct InputManager {
    next_sequence: u32,
    heading: f32,
    current_input: InputState,
}

impl InputManager {
    pub fn new() -> Self {
        Self::with_heading(0.0)
    }

    pub fn with_heading(heading: f32) -> Self {
        Self {
            next_sequence: 1,
            heading,
            current_input: InputState {
                sequence: 0,
                timestamp: 0,
                move_x: 0.0,
                move_y: 0.0,
                angle: heading,
            },
        }
    }

    /// Samples the next input, advancing the sequence number.
    pub fn next_input(&mut self) -> InputState {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heading = (self.heading + TURN_RATE) % std::f32::consts::TAU;

        let paused = sequence % PAUSE_CYCLE >= PAUSE_CYCLE - PAUSE_LENGTH;
        let (move_x, move_y) = if paused {
            (0.0, 0.0)
        } else {
            (self.heading.cos(), self.heading.sin())
        };

        self.current_input = InputState {
            sequence,
            timestamp: Self::get_timestamp(),
            move_x,
            move_y,
            angle: self.heading,
        };
        self.current_input.clone()
    }

    /// Returns the most recently sampled input
    pub fn get_current_input(&self) -> &InputState {
        &self.current_input
    }

    fn get_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis() as u64
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_input_manager_creation() {
        let input_manager = InputManager::new();
        assert_eq!(input_manager.next_sequence, 1);
        assert_eq!(input_manager.get_current_input().sequence, 0);
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let mut input_manager = InputManager::new();
        let first = input_manager.next_input();
        let second = input_manager.next_input();

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(input_manager.get_current_input(), &second);
    }

    #[test]
    fn test_direction_is_unit_while_moving() {
        let mut input_manager = InputManager::new();
        let input = input_manager.next_input();
        assert_approx_eq!(input.direction().length(), 1.0, 0.0001);
        assert_approx_eq!(input.angle, TURN_RATE, 0.0001);
    }

    #[test]
    fn test_pauses_periodically() {
        let mut input_manager = InputManager::new();
        let inputs: Vec<InputState> = (0..PAUSE_CYCLE)
            .map(|_| input_manager.next_input())
            .collect();

        let still = inputs
            .iter()
            .filter(|i| i.move_x == 0.0 && i.move_y == 0.0)
            .count();
        assert_eq!(still as u32, PAUSE_LENGTH);
    }

    #[test]
    fn test_get_timestamp() {
        let timestamp1 = InputManager::get_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let timestamp2 = InputManager::get_timestamp();
        assert!(timestamp2 > timestamp1);
    }
}
