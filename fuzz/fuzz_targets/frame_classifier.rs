#![no_main]

use libfuzzer_sys::fuzz_target;
use velador::resolve::{classify_frame_line, AttributionResolver};
use velador::stack::CapturedStack;

fuzz_target!(|data: &[u8]| {
    // Convert arbitrary bytes to UTF-8 string (lossy conversion)
    if let Ok(input) = std::str::from_utf8(data) {
        // Frame-line classification must not panic on any input
        let _ = classify_frame_line(input);

        // Neither may filtering and representative selection
        let stack = CapturedStack::from_frames(input.lines());
        let resolver = AttributionResolver::default();
        let _ = resolver.representative_frame(&stack);
    }
});
