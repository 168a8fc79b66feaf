//! TypeScript Generation Tests
//!
//! Validates that the types UI collaborators consume can be exported to
//! TypeScript when the tauri feature is enabled.

#[cfg(feature = "tauri")]
#[test]
fn test_core_types_implement_specta_type() {
    use specta::Type;

    // If this compiles, all types are properly configured for TypeScript export.
    fn assert_type<T: Type>() {}

    assert_type::<scorebridge::MatchState>();
    assert_type::<scorebridge::MatchCode>();
    assert_type::<scorebridge::ConnectivityState>();
    assert_type::<scorebridge::LiveUpdate>();
}

#[cfg(not(feature = "tauri"))]
#[test]
fn test_tauri_feature_disabled() {
    // Types still compile without specta::Type
    let _ = scorebridge::ConnectivityState::Off;
}
