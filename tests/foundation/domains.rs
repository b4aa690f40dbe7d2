//! Integration tests for Domain and LaunchMode
//!
//! Tests admission rules, naming, and launch-mode parsing.

use cadence_foundation::{Domain, ErrorKind, LaunchMode};

// =============================================================================
// Admission
// =============================================================================

#[test]
fn editor_mode_admits_every_mask() {
    let active = LaunchMode::Editor.domain();
    for required in [
        Domain::EDITOR,
        Domain::CLIENT,
        Domain::SERVER,
        Domain::UI,
        Domain::NO_EDITOR,
        Domain::ALL,
    ] {
        assert!(active.admits(required), "{required} should be admitted");
    }
}

#[test]
fn editor_active_rejects_client_component() {
    assert!(!Domain::EDITOR.admits(Domain::CLIENT));
}

#[test]
fn required_bits_must_all_be_active() {
    assert!(Domain::SERVER.admits(Domain::SERVER_UI));
    assert!(!Domain::SERVER_UI.admits(Domain::SERVER));
    assert!(!Domain::CLIENT.admits(Domain::UI));
}

#[test]
fn all_and_empty_masks_always_admitted() {
    for active in [Domain::NONE, Domain::CLIENT, Domain::SERVER_NO_UI] {
        assert!(active.admits(Domain::ALL));
        assert!(active.admits(Domain::NONE));
    }
}

#[test]
fn server_mode_is_server_ui() {
    assert_eq!(LaunchMode::Server.domain(), Domain::SERVER_UI);
    assert_eq!(LaunchMode::ServerNoUi.domain(), Domain::SERVER_NO_UI);
    assert_eq!(LaunchMode::Client.domain(), Domain::CLIENT);
    assert_eq!(LaunchMode::None.domain(), Domain::NONE);
}

// =============================================================================
// Naming
// =============================================================================

#[test]
fn named_masks_display_their_names() {
    assert_eq!(Domain::SERVER_NO_UI.to_string(), "Server No UI");
    assert_eq!(Domain::NO_EDITOR.to_string(), "No Editor");
    assert_eq!(Domain::ALL.to_string(), "All");
    assert_eq!(Domain::default(), Domain::ALL);
}

#[test]
fn unnamed_mask_displays_bits() {
    let custom = Domain::EDITOR | Domain::SERVER_NO_UI;
    assert_eq!(custom.name(), None);
    assert_eq!(custom.to_string(), "Custom(0x9)");
}

// =============================================================================
// Launch Modes
// =============================================================================

#[test]
fn launch_mode_parses_cli_spellings() {
    assert_eq!("editor".parse::<LaunchMode>().unwrap(), LaunchMode::Editor);
    assert_eq!(" Client ".parse::<LaunchMode>().unwrap(), LaunchMode::Client);
    assert_eq!("server-no-ui".parse::<LaunchMode>().unwrap(), LaunchMode::ServerNoUi);
    assert_eq!("server_no_ui".parse::<LaunchMode>().unwrap(), LaunchMode::ServerNoUi);
}

#[test]
fn launch_mode_round_trips_through_display() {
    for mode in [
        LaunchMode::None,
        LaunchMode::Editor,
        LaunchMode::Client,
        LaunchMode::Server,
        LaunchMode::ServerNoUi,
    ] {
        assert_eq!(mode.to_string().parse::<LaunchMode>().unwrap(), mode);
    }
}

#[test]
fn unknown_launch_mode_is_config_error() {
    let err = "arcade".parse::<LaunchMode>().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidConfig(_)));
    assert!(err.to_string().contains("arcade"));
}
