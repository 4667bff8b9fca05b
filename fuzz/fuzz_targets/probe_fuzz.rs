#![no_main]
use arbitrary::Arbitrary;
use gdctx::PathProbe;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    separator: char,
    path: String,
}

fuzz_target!(|input: Input| {
    // Keep the walk inside a scratch area
    let path = input.path.replace("..", "");
    let path = format!("/tmp/fuzz_gdctx{}", path);
    let probe = PathProbe::new(input.separator);

    if let Some(ancestor) = probe.highest_non_existent_ancestor(&path) {
        let text = ancestor.to_str().expect("ancestor is a prefix of a str");
        assert!(path.starts_with(text));
        assert!(!text.ends_with(input.separator) || text.is_empty());
    }
});
