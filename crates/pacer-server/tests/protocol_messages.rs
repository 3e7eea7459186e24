//! Integration tests for control-channel messages.
//!
//! Covers the text forms the browser editor actually sends.

use pacer_server::protocol::*;

#[test]
fn test_editor_cadence_message() {
    // The editor sends the values of its number inputs as strings.
    let msg = ClientMessage::parse(r##"#freq{"brain":"12.5","gui":"10"}"##).unwrap();
    match msg {
        ClientMessage::Cadence(update) => {
            assert_eq!(update.brain.hz().unwrap(), 12.5);
            assert_eq!(update.gui.hz().unwrap(), 10.0);
        }
        other => panic!("Wrong message type: {:?}", other),
    }
}

#[test]
fn test_submissions_are_passed_through_verbatim() {
    let program = "#code0#debugimport HAL\nwhile True:\n    HAL.motors.sendV(1)\n";
    assert_eq!(
        ClientMessage::parse(program).unwrap(),
        ClientMessage::Submission(program.to_string())
    );
    for directive in ["#resu", "#paus", "#rest"] {
        assert_eq!(
            ClientMessage::parse(directive).unwrap(),
            ClientMessage::Submission(directive.to_string())
        );
    }
}

#[test]
fn test_extra_cadence_fields_are_ignored() {
    let msg = ClientMessage::parse(r##"#freq{"brain": 5, "gui": 5, "rtf": 1}"##).unwrap();
    assert_eq!(msg, ClientMessage::Cadence(CadenceUpdate::hz(5.0, 5.0)));
}

#[test]
fn test_telemetry_is_readable_as_cadence_json() {
    let text = Telemetry::from_cycles(50.0, 100.0).encode();
    let body = text.strip_prefix(FREQUENCY_PREFIX).unwrap();
    let decoded: Telemetry = serde_json::from_str(body).unwrap();
    assert_eq!(decoded, Telemetry { brain: 20.0, gui: 10.0 });
}
