#![no_main]

use inspector_debugger::debugger::log_message::{compile_log_template, has_template_placeholder, tokenize};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let tokens = tokenize(s);
        let compiled = compile_log_template(s);

        // A message without placeholders never needs a template
        if !has_template_placeholder(s) {
            assert!(tokens.is_some());
        }
        if tokens.is_none() {
            assert!(compiled.is_none());
        }
    }
});
