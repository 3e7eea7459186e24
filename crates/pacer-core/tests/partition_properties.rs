//! Partitioning properties over representative and generated programs.

use pacer_core::partition::{Directive, dedent_once, filter_visual_lines, partition, split, with_header};
use proptest::prelude::*;

const WITHOUT_LOOP: &[&str] = &[
    "",
    "x = 1\n",
    "for i in range(3):\n    print(i)\n",
    "    while True:\n        pass\n",
    "def f():\n    while True:\n        pass\n",
    "x = 'while True:'\n",
    "while False:\n    pass\n",
];

const WITH_LOOP: &[(&str, &str, &str)] = &[
    (
        "x = 0\nwhile True:\n    x += 1\n",
        "x = 0\n",
        "x += 1\n",
    ),
    (
        "while(True):\n    a = 1\n    if a:\n        b = 2\n",
        "",
        "a = 1\nif a:\n    b = 2\n",
    ),
    (
        "import HAL\nwhile True:\n\tstep()\n\n    done()\nwhile True:\n    never()\n",
        "import HAL\n",
        "step()\n\ndone()\nwhile True:\nnever()\n",
    ),
];

#[test]
fn test_without_loop_everything_is_setup() {
    for text in WITHOUT_LOOP {
        for level in [0, 1, 2] {
            let result = split(text, level);
            assert_eq!(result.loop_code, "", "input {text:?}");
            let expected = if level == 1 {
                filter_visual_lines(text)
            } else {
                text.to_string()
            };
            assert_eq!(result.setup_code, expected, "input {text:?}");
        }
    }
}

#[test]
fn test_with_loop_prefix_and_dedented_body() {
    for (text, setup, body) in WITH_LOOP {
        let result = split(text, 0);
        assert_eq!(result.setup_code, *setup, "input {text:?}");
        assert_eq!(result.loop_code, *body, "input {text:?}");
        assert!(result.has_loop());
    }
}

#[test]
fn test_partition_is_deterministic() {
    let inputs = WITHOUT_LOOP
        .iter()
        .copied()
        .chain(WITH_LOOP.iter().map(|(text, _, _)| *text));
    for text in inputs {
        for level in [0, 1] {
            let raw = with_header(text, level);
            assert_eq!(partition(&raw), partition(&raw));
            assert_eq!(split(text, level), split(text, level));
        }
    }
}

#[test]
fn test_non_visual_example() {
    let raw = with_header("GUI.showImage(x)\nwhile True:\n    HAL.motors.sendV(1)\n", 1);
    let result = partition(&raw);
    assert_eq!(result.setup_code, "");
    assert_eq!(result.loop_code, "HAL.motors.sendV(1)\n");
    assert_eq!(result.debug_level, 1);
    assert!(result.header_valid);
}

#[test]
fn test_visual_lines_kept_at_other_levels() {
    let raw = with_header("GUI.showImage(x)\nwhile True:\n    GUI.showImage(y)\n", 2);
    let result = partition(&raw);
    assert_eq!(result.setup_code, "GUI.showImage(x)\n");
    assert_eq!(result.loop_code, "GUI.showImage(y)\n");
}

#[test]
fn test_directives_carry_no_code() {
    for (token, directive) in [
        ("#resu", Directive::Resume),
        ("#paus", Directive::Pause),
        ("#rest", Directive::Reset),
    ] {
        let result = partition(&format!("{token}\nx = 1\nwhile True:\n    pass\n"));
        assert_eq!(result.directive, directive);
        assert!(result.is_empty());
    }
}

#[test]
fn test_short_or_garbled_header_fails_soft() {
    for raw in ["", "#co", "#codeZ#debugx = 1\n", "héllo world, this is not a header"] {
        let result = partition(raw);
        assert_eq!(result.directive, Directive::None, "input {raw:?}");
        assert_eq!(result.debug_level, 1, "input {raw:?}");
        assert!(result.is_empty(), "input {raw:?}");
        assert!(!result.header_valid, "input {raw:?}");
    }
}

/// A statement at column 0 that is never a loop header.
fn setup_line() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,8} = [0-9]{1,3}",
        "[a-z]{1,8}\\([0-9]{0,2}\\)",
        "def [a-z]{1,6}\\(\\):\n    while True:\n        pass",
        Just("x = 'while True:'".to_string()),
        Just("".to_string()),
    ]
}

/// A loop-body line indented by one or two levels.
fn body_line() -> impl Strategy<Value = String> {
    (prop_oneof![Just("    "), Just("        "), Just("\t")], "[a-z]{1,8}\\([0-9]{0,2}\\)")
        .prop_map(|(indent, stmt)| format!("{indent}{stmt}"))
}

fn lines(parts: &[String]) -> String {
    parts.iter().map(|line| format!("{line}\n")).collect()
}

proptest! {
    #[test]
    fn test_setup_is_the_text_before_the_header(
        setup in prop::collection::vec(setup_line(), 0..8),
        body in prop::collection::vec(body_line(), 1..8),
        level in 0u8..3,
    ) {
        let setup = lines(&setup);
        let body = lines(&body);
        let text = format!("{setup}while True:\n{body}");
        let result = split(&text, level);

        prop_assert_eq!(&result.setup_code, &setup);
        prop_assert_eq!(result.loop_first_line, setup.lines().count() + 2);
        prop_assert!(result.has_loop());
    }

    #[test]
    fn test_body_loses_exactly_one_level(body in prop::collection::vec(body_line(), 1..12)) {
        let body = lines(&body);
        let result = split(&format!("while(True):\n{body}"), 0);

        prop_assert_eq!(&result.loop_code, &dedent_once(&body));
        for (original, dedented) in body.lines().zip(result.loop_code.lines()) {
            let stripped = original.strip_prefix("    ").or_else(|| original.strip_prefix('\t'));
            prop_assert_eq!(stripped, Some(dedented));
        }
    }

    #[test]
    fn test_generated_setup_without_header(setup in prop::collection::vec(setup_line(), 0..10)) {
        let setup = lines(&setup);
        let result = split(&setup, 0);
        prop_assert_eq!(&result.setup_code, &setup);
        prop_assert!(!result.has_loop());
    }

    #[test]
    fn test_partition_is_a_pure_function(raw in "\\PC{0,80}", level in 0u8..10) {
        prop_assert_eq!(partition(&raw), partition(&raw));
        let framed = with_header(&raw, level);
        let result = partition(&framed);
        prop_assert_eq!(&result, &partition(&framed));
        prop_assert!(result.header_valid);
        prop_assert_eq!(result.debug_level, level);
    }

    #[test]
    fn test_arbitrary_input_never_panics(raw in any::<String>()) {
        let result = partition(&raw);
        if !result.header_valid {
            prop_assert!(result.is_empty());
        }
    }
}
