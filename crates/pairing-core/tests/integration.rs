//! Integration tests exercising the full inference pipeline:
//! wire envelope → signal → process → reports, across module boundaries.

use pairing_core::{
    AccuracyReport, Answer, AnswerValue, ComplementVector, Construct, ContextWindow,
    DualTrackDimension, EventDetails, LexicalExtractor, ObservationCounts, PairingLevel,
    PairingScore, Pipeline, Profile, Signal, SignalEnvelope, Timestamp, WindowKind, convergence,
    extract_features,
};
use approx::assert_relative_eq;
use proptest::prelude::*;
use std::collections::BTreeMap;

const T0: Timestamp = Timestamp::from_unix(1_771_632_000);

fn pipeline() -> Pipeline {
    Pipeline::new(Profile::new(T0))
}

/// Scenario 1: one ASI answer seeds Quick Start directly.
#[test]
fn single_assessment_answer_sets_quick_start() {
    let mut p = pipeline();
    let envelope: SignalEnvelope = serde_json::from_value(serde_json::json!({
        "type": "assessment",
        "source": "api",
        "metadata": {
            "answers": [{"instrument": "ASI-01", "question": "ASI-01", "value": "A"}]
        }
    }))
    .unwrap();
    let signal = envelope.into_signal(T0).unwrap();
    let out = p.process(signal, T0);

    assert!(out.warnings.is_empty());
    let qs = p.profile().constructs.action_style.get("QS").unwrap();
    assert_eq!(qs.observations, 1);
    assert_eq!(qs.trait_value, Some(9.0));
    assert_eq!(qs.effective, Some(9.0));
}

/// Scenario 2: three ships inside 72 hours update QS without a sprint.
#[test]
fn three_ships_no_sprint() {
    let mut p = pipeline();
    for h in [0.0, 30.0, 70.0] {
        let at = T0.plus_hours(h);
        p.process(
            Signal::event(EventDetails::new("CODE_PUBLISHED"), "scoreboard", at),
            at,
        );
    }
    let profile = p.profile();
    assert_eq!(profile.behavior.ships_within(T0.plus_hours(70.0), 72.0), 3);
    assert_eq!(
        profile.constructs.effective(Construct::ActionStyle, "QS"),
        Some(4.5)
    );
    assert_eq!(
        profile
            .context_windows
            .activation(WindowKind::ShippingSprint),
        0.0
    );
}

/// Scenario 3: one time-constant of decay divides activation by e.
#[test]
fn window_decays_by_one_time_constant() {
    let mut w = ContextWindow::new(WindowKind::Stall);
    assert_eq!(w.decay_tau_hours, 24.0);
    w.add_signal(0.0, T0);
    w.activation = 0.5;
    w.decay(T0.plus_hours(24.0));
    assert_relative_eq!(w.activation, 0.5 / std::f64::consts::E, epsilon = 1e-9);
    assert!((w.activation - 0.184).abs() < 0.001);
}

/// Scenario 4: override weight through the listing path.
#[test]
fn override_weight_decays_over_thirty_days() {
    let mut p = pipeline();
    p.add_override(Construct::RiskDisposition, "tolerance", 8.0, "I take risks", T0);

    let now = pairing_core::list_overrides(&p, T0);
    assert_eq!(now.len(), 1);
    assert_relative_eq!(now[0].weight, 0.30);

    let later = pairing_core::list_overrides(&p, T0.plus_days(30.0));
    assert!((later[0].weight - 0.110).abs() < 0.001);
}

#[test]
fn mixed_stream_keeps_invariants() {
    let mut p = pipeline();
    let extractor = LexicalExtractor::default();
    let answers = vec![
        Answer::new("CSI-8", "CSI-01", AnswerValue::Choice("D".into())),
        Answer::new("ETM-6", "ETM-01", AnswerValue::Ranking(vec!["G".into(), "W".into()])),
        Answer::new("RDS-6", "RDS-01", AnswerValue::Slider(80.0)),
        Answer::new("BIZ-6", "BIZ-06", AnswerValue::Choice("A".into())),
    ];
    p.process(Signal::assessment(answers, "api", T0), T0);

    let texts = [
        "We need to ship the pricing page today, then fix onboarding.",
        "Maybe we could explore a few options before deciding? Not sure yet.",
        "Cash is tight this month, runway is short and rent is due.",
    ];
    for (i, t) in texts.iter().enumerate() {
        let at = T0.plus_hours(i as f64 + 1.0);
        let mut sig = Signal::message(t, "chat", at);
        sig.features = extract_features(&extractor, &sig);
        p.process(sig, at);
    }

    let profile = p.profile();
    assert_relative_eq!(profile.complement.sum(), 1.0, epsilon = 1e-6);
    for (_, dt) in profile.constructs.iter() {
        for (_, t) in dt.iter() {
            assert!((0.30..=0.70 + 1e-12).contains(&t.alpha));
            assert!(t.sigma_trait >= 0.1);
            assert_eq!(t.effective.is_some(), t.trait_value.is_some() && t.state.is_some());
        }
    }
    assert_eq!(profile.meta.signals_processed, 4);
    assert_eq!(p.evidence().len(), 4);

    let report = AccuracyReport::build(profile, T0.plus_days(1.0));
    assert!(report.overall_accuracy > 0.35);
}

#[test]
fn profile_document_survives_json() {
    let mut p = pipeline();
    for h in 0..4 {
        let at = T0.plus_hours(f64::from(h));
        p.process(
            Signal::event(EventDetails::new("TASK_COMPLETED"), "scoreboard", at),
            at,
        );
    }
    let json = serde_json::to_string(p.profile()).unwrap();
    let back: Profile = serde_json::from_str(&json).unwrap();
    assert_eq!(&back, p.profile());
    assert_eq!(back.behavior.recent_ships.len(), 4);
}

#[test]
fn message_cap_holds_with_full_coverage() {
    let mut profile = Profile::new(T0);
    for c in Construct::ALL {
        for d in c.dimensions() {
            profile.constructs.update(c, d, 5.0);
        }
    }
    for provider in ["stripe", "github", "gumroad"] {
        profile.add_connected_account(provider);
    }
    profile.meta.signals_processed = 10_000;
    for d in 0..60 {
        profile.behavior.count_event(T0.plus_days(f64::from(d)).day_key());
    }
    profile.observed_comm.messages_analyzed = 49;
    let capped = PairingScore::compute(&profile);
    assert_relative_eq!(capped.composite, 60.0);

    profile.observed_comm.messages_analyzed = 50;
    let full = PairingScore::compute(&profile);
    assert_relative_eq!(full.composite, 100.0, epsilon = 1e-9);
    assert_eq!(full.level, PairingLevel::Bonded);
}

fn dims() -> DualTrackDimension {
    DualTrackDimension::new(&["x"])
}

proptest! {
    #[test]
    fn first_observation_seeds_both_tracks(v in 0.0f64..=10.0) {
        let mut dt = dims();
        let t = dt.update("x", v).unwrap();
        prop_assert_eq!(t.trait_value, Some(v));
        prop_assert_eq!(t.state, Some(v));
    }

    #[test]
    fn state_converges_faster_than_trait(
        seed in 0.0f64..=10.0,
        stream in prop::collection::vec(0.0f64..=10.0, 1..40),
    ) {
        let mut dt = dims();
        dt.update("x", seed);
        for v in stream {
            let before = dt.get("x").unwrap().clone();
            let t = dt.update("x", v).unwrap();
            let (tr, st) = (t.trait_value.unwrap(), t.state.unwrap());
            let (tr0, st0) = (before.trait_value.unwrap(), before.state.unwrap());
            // each track moves toward the new value
            prop_assert!((tr - v).abs() <= (tr0 - v).abs() + 1e-9);
            prop_assert!((st - v).abs() <= (st0 - v).abs() + 1e-9);
            prop_assert!(t.alpha >= 0.30 - 1e-12 && t.alpha <= 0.70 + 1e-12);
            let (lo, hi) = (tr.min(st), tr.max(st));
            let e = t.effective.unwrap();
            prop_assert!(e >= lo - 1e-9 && e <= hi + 1e-9);
            prop_assert!(t.sigma_trait >= 0.1);
        }
    }

    #[test]
    fn state_closer_than_trait_from_common_start(
        seed in 0.0f64..=10.0,
        v in 0.0f64..=10.0,
        n in 1usize..30,
    ) {
        let mut dt = dims();
        dt.update("x", seed);
        for _ in 0..n {
            dt.update("x", v);
        }
        let t = dt.get("x").unwrap();
        prop_assert!((t.trait_value.unwrap() - v).abs() >= (t.state.unwrap() - v).abs() - 1e-9);
    }

    #[test]
    fn complement_always_normalized(
        action in prop::collection::vec(prop::option::of(0.0f64..=10.0), 4),
        energy in prop::collection::vec(prop::option::of(0.0f64..=10.0), 6),
        debt in 0.0f64..=10.0,
        tolerance in 0.0f64..=10.0,
        sequential in 0.0f64..=10.0,
        switch_cost in 0.0f64..=10.0,
    ) {
        let to_map = |names: &[&str], vals: &[Option<f64>]| -> BTreeMap<String, f64> {
            names
                .iter()
                .zip(vals)
                .filter_map(|(n, v)| v.map(|v| (n.to_string(), v)))
                .collect()
        };
        let a = to_map(&["FF", "FT", "QS", "IM"], &action);
        let e = to_map(&["W", "N", "D_disc", "G", "E", "T"], &energy);
        let mut c = ComplementVector::default();
        c.rebalance(&a, &e, T0);
        c.adjust_from_secondary(
            &BTreeMap::from([("tolerance".to_string(), tolerance)]),
            &BTreeMap::from([("sequential".to_string(), sequential)]),
            &BTreeMap::from([("debt_pressure".to_string(), debt), ("team_size".to_string(), 1.0)]),
            &BTreeMap::from([("context_switch_cost".to_string(), switch_cost)]),
        );
        prop_assert!((c.sum() - 1.0).abs() < 1e-6);
        prop_assert!(c.sorted().iter().all(|a| a.allocation >= 0.0));
    }

    #[test]
    fn window_rises_on_signal_and_falls_on_decay(
        strength in 0.1f64..=2.0,
        signals in 1usize..6,
        gaps in prop::collection::vec(0.0f64..200.0, 1..6),
    ) {
        let mut w = ContextWindow::new(WindowKind::ContextExplosion);
        for _ in 0..signals {
            let before = w.activation;
            w.add_signal(strength, T0);
            prop_assert!(w.activation >= before);
            prop_assert!(w.activation < 1.0);
        }
        let mut elapsed = 0.0;
        for g in gaps {
            elapsed += g;
            let before = w.activation;
            w.decay(T0.plus_hours(elapsed));
            prop_assert!(w.activation <= before);
        }
    }

    #[test]
    fn accuracy_monotone_and_bounded(
        d1 in 0.0f64..400.0,
        extra in 0.0f64..400.0,
        messages in 0u64..1000,
        events in 0u64..5000,
        documents in 0u64..20,
        accounts in 0usize..6,
        state_shifts in 0u64..20,
    ) {
        let counts = ObservationCounts { messages, events, documents, accounts, state_shifts };
        let a = convergence(d1, &counts);
        let b = convergence(d1 + extra, &counts);
        prop_assert!(b >= a - 1e-12);
        prop_assert!((0.35..=0.97).contains(&a));
        prop_assert!((0.35..=0.97).contains(&b));
    }
}

#[test]
fn three_half_strength_signals_land_near_point_seven() {
    let mut w = ContextWindow::new(WindowKind::ShippingSprint);
    for _ in 0..3 {
        w.add_signal(0.5, T0);
    }
    assert!(w.activation > 0.69 && w.activation < 0.73, "{}", w.activation);
}
