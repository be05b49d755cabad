//! Key code → action classification.
//!
//! Key codes are the platform-independent physical key names used by browsers
//! (`KeyboardEvent.code`): arrows and WASD steer, `P` toggles pause, `R`
//! resets. Whether a toggle pauses or resumes is decided by the session
//! controller, which knows the current paused flag.

use crate::protocol::Direction;

/// What a key press asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    Move(Direction),
    TogglePause,
    Reset,
}

/// Classify a key code. Unbound keys map to `None`.
///
/// ```
/// use snake_session_client::input::{map_key, InputAction};
/// use snake_session_client::protocol::Direction;
///
/// assert_eq!(map_key("KeyW"), Some(InputAction::Move(Direction::Up)));
/// assert_eq!(map_key("KeyP"), Some(InputAction::TogglePause));
/// assert_eq!(map_key("Space"), None);
/// ```
pub fn map_key(code: &str) -> Option<InputAction> {
    let action = match code {
        "ArrowUp" | "KeyW" => InputAction::Move(Direction::Up),
        "ArrowDown" | "KeyS" => InputAction::Move(Direction::Down),
        "ArrowLeft" | "KeyA" => InputAction::Move(Direction::Left),
        "ArrowRight" | "KeyD" => InputAction::Move(Direction::Right),
        "KeyP" => InputAction::TogglePause,
        "KeyR" => InputAction::Reset,
        _ => return None,
    };
    Some(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrows_and_wasd_steer() {
        let table = [
            ("ArrowUp", Direction::Up),
            ("KeyW", Direction::Up),
            ("ArrowDown", Direction::Down),
            ("KeyS", Direction::Down),
            ("ArrowLeft", Direction::Left),
            ("KeyA", Direction::Left),
            ("ArrowRight", Direction::Right),
            ("KeyD", Direction::Right),
        ];
        for (code, direction) in table {
            assert_eq!(map_key(code), Some(InputAction::Move(direction)), "{code}");
        }
    }

    #[test]
    fn control_keys() {
        assert_eq!(map_key("KeyP"), Some(InputAction::TogglePause));
        assert_eq!(map_key("KeyR"), Some(InputAction::Reset));
    }

    #[test]
    fn codes_are_case_sensitive_and_unbound_keys_ignored() {
        for code in ["keyw", "w", "Enter", "", "KeyQ"] {
            assert_eq!(map_key(code), None, "{code:?}");
        }
    }
}
