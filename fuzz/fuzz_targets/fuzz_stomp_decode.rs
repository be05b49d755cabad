#![no_main]

use libfuzzer_sys::fuzz_target;
use snake_session_client::stomp;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Whatever decodes must re-encode to something that decodes the same way.
    if let Ok(frames) = stomp::decode(text) {
        for frame in frames {
            let again = stomp::decode(&frame.encode()).unwrap_or_default();
            assert_eq!(again.len(), 1);
        }
    }
});
