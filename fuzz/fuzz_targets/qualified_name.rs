#![no_main]

use libfuzzer_sys::fuzz_target;
use tracebridge_core::QualifiedName;

fuzz_target!(|data: &[u8]| {
    // Ignore invalid UTF-8
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(name) = QualifiedName::parse(s) {
            // Accepted names split back into the input and never contain empty segments
            assert_eq!(name.as_str(), s);
            assert!(name.segments().all(|segment| !segment.is_empty()));
            assert!(!s.contains(['/', '\\']));
            let rejoined = match name.package() {
                "" => name.simple_name().to_string(),
                package => format!("{package}.{}", name.simple_name()),
            };
            assert_eq!(rejoined, s);
        }
    }
});
