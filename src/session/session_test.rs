use std::time::Duration;

use serde_json::json;

use super::*;
use crate::DataSource;
use crate::ResolvedPath;
use crate::TargetDefinedPolicy;

fn path(
    name: &str,
    policy: TargetDefinedPolicy,
) -> ResolvedPath {
    ResolvedPath {
        target: "COUNTERS_DB".into(),
        elems: vec!["COUNTERS".into(), name.into()],
        source: DataSource::Entry {
            db: "COUNTERS_DB".into(),
            key: format!("COUNTERS:{}", name),
        },
        policy,
    }
}

fn sample_request(update_count: u64) -> SubscriptionRequest {
    SubscriptionRequest::new(
        SubscribeMode::Stream,
        vec![SubscriptionEntry {
            path: path("Ethernet0", TargetDefinedPolicy::Sample),
            mode: SubMode::Sample {
                interval: Duration::from_millis(100),
            },
        }],
        update_count,
    )
    .unwrap()
}

#[test]
fn test_sample_with_zero_interval_is_rejected() {
    assert_eq!(
        SubMode::from_wire(2, 0, "COUNTERS/Ethernet0"),
        Err(SessionError::InvalidInterval("COUNTERS/Ethernet0".into()))
    );
    assert_eq!(
        SubMode::from_wire(2, 1_000_000_000, "COUNTERS/Ethernet0"),
        Ok(SubMode::Sample {
            interval: Duration::from_secs(1)
        })
    );
    assert_eq!(SubMode::from_wire(1, 0, "x"), Ok(SubMode::OnChange));
    assert_eq!(SubMode::from_wire(9, 0, "x"), Err(SessionError::UnsupportedMode(9)));
    assert_eq!(SubscribeMode::from_wire(7), Err(SessionError::UnsupportedMode(7)));
}

#[test]
fn test_target_defined_follows_path_policy() {
    let default = Duration::from_secs(10);
    let td = SubMode::TargetDefined { interval: None };

    assert_eq!(td.effective(TargetDefinedPolicy::OnChange, default), EffectiveMode::OnChange);
    assert_eq!(td.effective(TargetDefinedPolicy::Sample, default), EffectiveMode::Sample(default));

    let td = SubMode::TargetDefined {
        interval: Some(Duration::from_secs(2)),
    };
    assert_eq!(
        td.effective(TargetDefinedPolicy::Sample, default),
        EffectiveMode::Sample(Duration::from_secs(2))
    );
    // explicit sub-modes ignore the catalog
    assert_eq!(SubMode::OnChange.effective(TargetDefinedPolicy::Sample, default), EffectiveMode::OnChange);
}

#[test]
fn test_empty_subscription_is_rejected() {
    assert_eq!(
        SubscriptionRequest::new(SubscribeMode::Stream, vec![], 0),
        Err(SessionError::EmptySubscription)
    );
}

#[test]
fn test_update_count_zero_is_unbounded() {
    assert_eq!(sample_request(0).update_limit(), None);
    assert_eq!(sample_request(3).update_limit(), Some(3));

    let mut session = Session::new(SessionId(1), sample_request(0), Duration::from_secs(1));
    session.activate().unwrap();
    for _ in 0..1000 {
        session.begin_emission().unwrap();
        assert!(!session.finish_emission().unwrap());
    }
    assert_eq!(session.updates_sent(), 1000);
    assert_eq!(session.state(), &SessionState::Active);
}

#[test]
fn test_lifecycle_closes_at_update_limit() {
    let mut session = Session::new(SessionId(7), sample_request(3), Duration::from_secs(1));
    assert_eq!(session.state(), &SessionState::Created);

    // emitting before activation is illegal
    assert!(matches!(
        session.begin_emission(),
        Err(SessionError::InvalidTransition { from: "Created", .. })
    ));

    session.activate().unwrap();
    let mut last_ts = 0;
    for i in 1..=3 {
        let ts = session.begin_emission().unwrap();
        assert_eq!(session.state(), &SessionState::Emitting);
        assert!(ts >= last_ts);
        last_ts = ts;
        assert_eq!(session.finish_emission().unwrap(), i == 3);
    }

    assert_eq!(session.state(), &SessionState::Closed(CloseReason::UpdateLimitReached(3)));
    assert_eq!(
        CloseReason::UpdateLimitReached(3).to_string(),
        "Max update count reached 3"
    );
    assert!(session.begin_emission().is_err());
    assert!(session.activate().is_err());
    assert!(session.close(CloseReason::ClientCancelled).is_err());
}

#[test]
fn test_close_from_any_live_state() {
    let mut created = Session::new(SessionId(1), sample_request(0), Duration::from_secs(1));
    created.close(CloseReason::Shutdown).unwrap();
    assert!(created.is_closed());

    let mut emitting = Session::new(SessionId(2), sample_request(0), Duration::from_secs(1));
    emitting.activate().unwrap();
    emitting.begin_emission().unwrap();
    emitting.close(CloseReason::StoreFailure("gone".into())).unwrap();
    assert_eq!(
        emitting.state(),
        &SessionState::Closed(CloseReason::StoreFailure("gone".into()))
    );
    assert!(emitting.finish_emission().is_err());
}

#[test]
fn test_diff_tracks_last_known_value() {
    let mut session = Session::new(SessionId(1), sample_request(0), Duration::from_secs(1));
    let v1 = Some(TelemetryValue::Json(json!({"SAI_PORT_STAT_IF_IN_ERRORS": "0"})));
    let v2 = Some(TelemetryValue::Json(json!({"SAI_PORT_STAT_IF_IN_ERRORS": "1"})));

    assert!(session.diff(0, &v1), "first read is a change");
    assert!(!session.diff(0, &v1));
    assert!(session.diff(0, &v2));
    assert!(session.diff(0, &None), "deletion is a change");
    assert!(!session.diff(0, &None));
    assert!(!session.diff(5, &v1), "unknown index");
}

#[test]
fn test_paths_grouped_by_effective_mode() {
    let request = SubscriptionRequest::new(
        SubscribeMode::Stream,
        vec![
            SubscriptionEntry {
                path: path("a", TargetDefinedPolicy::Sample),
                mode: SubMode::Sample {
                    interval: Duration::from_millis(100),
                },
            },
            SubscriptionEntry {
                path: path("b", TargetDefinedPolicy::Sample),
                mode: SubMode::TargetDefined { interval: None },
            },
            SubscriptionEntry {
                path: path("c", TargetDefinedPolicy::OnChange),
                mode: SubMode::TargetDefined { interval: None },
            },
            SubscriptionEntry {
                path: path("d", TargetDefinedPolicy::Sample),
                mode: SubMode::Sample {
                    interval: Duration::from_millis(100),
                },
            },
        ],
        0,
    )
    .unwrap();
    let session = Session::new(SessionId(1), request, Duration::from_secs(10));

    let groups = session.sample_groups();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[&Duration::from_millis(100)], vec![0, 3]);
    assert_eq!(groups[&Duration::from_secs(10)], vec![1]);
    assert_eq!(session.on_change_paths(), vec![2]);
    assert_eq!(session.effective_mode(2), Some(EffectiveMode::OnChange));
}
