//! Property tests for the staleness criteria

use mirage_criterion::{CriterionSpec, DiversityPlateau, ReconfigCriterion};
use mirage_trace::{CommandEvent, SessionOutcome, SessionTrace, TraceBuilder};
use proptest::prelude::*;

fn session(techniques: &[String]) -> SessionTrace {
    let mut builder = TraceBuilder::new();
    for technique in techniques {
        builder.push(CommandEvent::new("cmd ;", "Discovery", technique.as_str()));
    }
    builder.finish(SessionOutcome::IterationCap)
}

fn technique() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("T1083".to_string()),
        Just("T1033".to_string()),
        Just("T1059".to_string()),
        Just("T1485".to_string()),
        Just(String::new()),
        "T1[0-9]{3}",
    ]
}

fn sessions() -> impl Strategy<Value = Vec<Vec<String>>> {
    proptest::collection::vec(proptest::collection::vec(technique(), 0..6), 0..20)
}

fn plateau_spec() -> impl Strategy<Value = CriterionSpec> {
    let tolerance = prop_oneof![Just(0.0), Just(f64::MAX), 0.0f64..10.0];
    (any::<bool>(), tolerance, 1usize..12).prop_map(|(entropy, tolerance, window)| {
        if entropy {
            CriterionSpec::EntropyPlateau { tolerance, window }
        } else {
            CriterionSpec::DiversityPlateau {
                tolerance,
                window,
                reset_techniques: true,
            }
        }
    })
}

fn window_of(spec: &CriterionSpec) -> usize {
    match spec {
        CriterionSpec::EntropyPlateau { window, .. }
        | CriterionSpec::DiversityPlateau { window, .. } => *window,
        _ => 0,
    }
}

proptest! {
    #[test]
    fn prop_plateau_needs_a_full_window(spec in plateau_spec(), sessions in sessions()) {
        let window = window_of(&spec);
        let mut criterion: ReconfigCriterion = spec.build().unwrap();

        for (updates, techniques) in sessions.iter().enumerate() {
            if updates < window {
                prop_assert!(!criterion.should_reconfigure());
            }
            criterion.update(&session(techniques));
        }
        if sessions.len() < window {
            prop_assert!(!criterion.should_reconfigure());
        }
    }

    #[test]
    fn prop_distinct_count_never_decreases(sessions in sessions(), window in 1usize..5) {
        let mut criterion = DiversityPlateau::new(0.5, window).unwrap();
        for techniques in &sessions {
            criterion.update(&session(techniques));
        }

        let values = criterion.values();
        prop_assert_eq!(values.len(), sessions.len() + 1);
        prop_assert!(values.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn prop_reset_restores_initial_decision(spec in plateau_spec(), sessions in sessions()) {
        let mut criterion = spec.build().unwrap();
        let initial = criterion.evaluate();
        for techniques in &sessions {
            criterion.update(&session(techniques));
        }
        criterion.reset();
        prop_assert_eq!(criterion.evaluate(), initial);
    }
}

#[test]
fn fixed_interval_from_spec() {
    let mut criterion = CriterionSpec::FixedInterval { interval: 3 }.build().unwrap();
    let trace = session(&[]);
    criterion.update(&trace);
    criterion.update(&trace);
    assert!(!criterion.should_reconfigure());
    criterion.update(&trace);
    assert!(criterion.should_reconfigure());
    criterion.reset();
    assert!(!criterion.should_reconfigure());
}
