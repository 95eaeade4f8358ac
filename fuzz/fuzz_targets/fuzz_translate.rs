#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Fuzz the one-shot translator — must never panic, only return Ok/Err.
    let _ = sasm::translate(data);

    // Also fuzz with the prolog enabled and a table-backed resolver, which
    // exercises the extern path and the frame-slot constants.
    let mut libs = sasm::StaticLibraries::new();
    libs.define("kernel32.dll", "Beep", 0x7750_2A40);
    let mut translator = sasm::Translator::new();
    translator.prolog(true);
    let _ = translator.translate(data, &mut libs);
});
