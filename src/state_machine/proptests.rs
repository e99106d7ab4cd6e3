//! Property-based tests for the state machine
//!
//! Random event sequences against a configured session; the store and turn
//! invariants must hold after every event, accepted or rejected.

use super::*;
use crate::config::tests::two_char_params;
use crate::config::SessionParams;
use crate::protocol::BackendCommand;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn params_for(n: usize) -> SessionParams {
    let mut params = two_char_params();
    let names = ["Alice", "Bob", "Carol", "Dave"];
    params.n_chars = n;
    params.char_names = names.iter().take(n).map(ToString::to_string).collect();
    params
}

fn configured(n: usize) -> Session {
    let mut session = Session::with_id("prop");
    transition(
        &mut session,
        Event::ParamsDelivered {
            params: params_for(n),
            show_settings: false,
        },
    )
    .unwrap();
    session
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_fragment() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z ,.]{1,12}",
        Just("\n".to_string()),
        Just("User:".to_string()),
        Just("\nUser:".to_string()),
        Just("Alice:".to_string()),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        3 => "[a-zA-Z ]{0,12}".prop_map(|text| Event::UserMessage { text }),
        5 => arb_fragment().prop_map(|text| Event::Fragment { text }),
        3 => Just(Event::TurnBoundary { timings: None }),
        1 => Just(Event::BackendStopped { timings: None }),
        1 => Just(Event::Reset),
        1 => Just(Event::TogglePause),
        1 => Just(Event::Paused),
        1 => Just(Event::Resumed),
        1 => Just(Event::RetrieveLog),
        1 => (1usize..4).prop_map(|n| Event::ParamsDelivered {
            params: params_for(n),
            show_settings: false,
        }),
    ]
}

fn turn_commands(result: &TransitionResult) -> usize {
    result.commands().filter(|c| c.is_turn()).count()
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Cursors never move backwards and never pass the transcript end;
    // the transcript only grows
    #[test]
    fn prop_store_invariants(n in 1usize..4, events in proptest::collection::vec(arb_event(), 0..40)) {
        let mut session = configured(n);

        for event in events {
            let before_log = session.store().transcript().to_vec();
            let before_cursors: Vec<usize> = session
                .store()
                .seeds()
                .iter()
                .map(|s| s.last_log_index)
                .collect();

            let _ = transition(&mut session, event);

            let log = session.store().transcript();
            prop_assert!(log.len() >= before_log.len());
            prop_assert_eq!(&log[..before_log.len()], before_log.as_slice());
            for (p, seed) in session.store().seeds().iter().enumerate() {
                prop_assert!(seed.last_log_index <= log.len());
                if let Some(before) = before_cursors.get(p) {
                    prop_assert!(seed.last_log_index >= *before);
                }
            }
        }
    }

    // Exactly one current participant, always within the roster
    #[test]
    fn prop_current_participant_in_range(n in 1usize..4, events in proptest::collection::vec(arb_event(), 0..40)) {
        let mut session = configured(n);

        for event in events {
            let _ = transition(&mut session, event);
            let len = session.roster().map_or(1, |r| r.len());
            prop_assert!(session.current_participant() < len);
            if let Some(p) = session.state().generating_participant() {
                prop_assert!(p < len);
            }
        }
    }

    // At most one turn in flight: a turn command is only ever issued when
    // entering a generating state, and never while one is already running
    // except by the auto-chain at a turn boundary
    #[test]
    fn prop_single_turn_in_flight(n in 1usize..4, events in proptest::collection::vec(arb_event(), 0..40)) {
        let mut session = configured(n);

        for event in events {
            let was_generating = session.is_generating();
            let is_boundary = matches!(event, Event::TurnBoundary { .. });
            let is_submit = matches!(event, Event::UserMessage { .. });

            match transition(&mut session, event) {
                Ok(result) => {
                    let turns = turn_commands(&result);
                    prop_assert!(turns <= 1);
                    if turns == 1 {
                        prop_assert!(result.new_state.is_generating());
                        prop_assert!(!was_generating || is_boundary);
                    }
                }
                Err(TransitionError::Busy) => {
                    prop_assert!(was_generating && is_submit);
                }
                Err(_) => {}
            }
        }
    }

    // Reset from anywhere lands in the same place when repeated
    #[test]
    fn prop_reset_idempotent(n in 1usize..4, events in proptest::collection::vec(arb_event(), 0..30)) {
        let mut session = configured(n);
        for event in events {
            let _ = transition(&mut session, event);
        }
        let log_len = session.store().len();

        let first = transition(&mut session, Event::Reset).unwrap();
        prop_assert_eq!(first.new_state, ConvState::Idle);
        let once = (session.current_participant(), session.store().clone(), session.prompt_parsed());

        let second = transition(&mut session, Event::Reset).unwrap();
        prop_assert_eq!(second.new_state, ConvState::Idle);
        prop_assert!(second.commands().next().is_none());
        let twice = (session.current_participant(), session.store().clone(), session.prompt_parsed());

        prop_assert_eq!(once, twice);
        prop_assert!(session.store().len() >= log_len);
        prop_assert!(session.store().seeds().iter().all(|s| s.first_run));
    }

    // Stop markers never survive into the transcript as a line suffix
    #[test]
    fn prop_markers_never_logged(fragments in proptest::collection::vec(arb_fragment(), 1..20)) {
        let mut session = configured(2);
        transition(&mut session, Event::UserMessage { text: "Hi".to_string() }).unwrap();
        for text in fragments {
            transition(&mut session, Event::Fragment { text }).unwrap();
        }
        transition(&mut session, Event::BackendStopped { timings: None }).unwrap();

        if let Some(line) = session.store().transcript().get(1) {
            prop_assert!(!line.ends_with("\nUser:"));
        }
        prop_assert!(!session.is_generating());
    }

    // Busy submits never touch the transcript
    #[test]
    fn prop_busy_submit_is_noop(text in "[a-zA-Z ]{1,20}") {
        let mut session = configured(2);
        transition(&mut session, Event::UserMessage { text: "first".to_string() }).unwrap();
        let before = session.store().clone();

        let err = transition(&mut session, Event::UserMessage { text }).unwrap_err();
        prop_assert!(matches!(err, TransitionError::Busy));
        prop_assert_eq!(session.store(), &before);
    }
}

#[test]
fn test_turn_commands_target_current_participant() {
    let mut session = configured(3);
    let result = transition(
        &mut session,
        Event::UserMessage {
            text: "Hi".to_string(),
        },
    )
    .unwrap();
    assert!(result.commands().all(|c| matches!(
        c,
        BackendCommand::StartGeneration { char_index: 0, .. }
    )));
}
