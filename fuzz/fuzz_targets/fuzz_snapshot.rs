#![no_main]

use libfuzzer_sys::fuzz_target;
use snake_session_client::reconciler::StateReconciler;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Rejected payloads must leave the state untouched.
    let reconciler = StateReconciler::new();
    let before = reconciler.current_state();
    if reconciler.on_snapshot("/topic/update/fuzz", text).is_err() {
        assert_eq!(reconciler.current_state(), before);
    }
    let _ = reconciler.on_highscores("/topic/newHighscore", text);
    let _ = reconciler.on_identity("/user/queue/getIdx", text);
});
