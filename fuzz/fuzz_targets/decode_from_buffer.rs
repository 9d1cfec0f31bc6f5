#![no_main]

use libfuzzer_sys::fuzz_target;
use postfx::engine::{decode_image, make_square};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let _ = postfx::inspect_header(data);
    if let Ok(img) = decode_image(data) {
        let _ = make_square(&img, 64);
    }
});
