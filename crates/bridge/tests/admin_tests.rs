//! Admin client integration tests
//!
//! Exercise the command protocol against the scriptable engine: state
//! checks, result queue handling, option translation and error mapping.

mod common;

use bridge::admin::{
    EventPayload, GroupMember, ResourceOutcome, ResultEvent, ResultKind,
    DEFAULT_ADMIN_TIMEOUT_MS,
};
use bridge::engine::{AdminScript, MockEngine};
use bridge::{
    AdminCallOptions, AdminClient, BridgeError, ConnectionState, ConsumerGroupState,
    EngineError, ErrorCode, GroupDescription, GroupListing, ListGroupsResult, NewTopic,
};
use common::{bounded, connected_producer, init_tracing, test_options};
use std::time::Duration;

async fn connected_admin(engine: &MockEngine) -> AdminClient<MockEngine> {
    init_tracing();
    let admin = AdminClient::new(engine.clone(), test_options());
    admin.connect().await.expect("mock admin client should connect");
    admin
}

#[tokio::test]
async fn test_create_topic_while_disconnected_submits_nothing() {
    init_tracing();
    let engine = MockEngine::new();
    let admin = AdminClient::new(engine.clone(), test_options());

    let err = admin
        .create_topic(NewTopic::new("orders"), AdminCallOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BridgeError::State {
            state: ConnectionState::Init,
            ..
        }
    ));
    assert!(engine.handles().is_empty());
}

#[tokio::test]
async fn test_create_topic_submits_command_on_fresh_queue() {
    let engine = MockEngine::new();
    let admin = connected_admin(&engine).await;

    let topic = NewTopic::new("orders")
        .with_partitions(3)
        .with_replication_factor(1)
        .with_config("cleanup.policy", "compact");
    bounded(admin.create_topic(topic.clone(), AdminCallOptions::default()))
        .await
        .unwrap();
    bounded(admin.delete_topic("orders", AdminCallOptions::default()))
        .await
        .unwrap();

    let handle = &engine.handles()[0];
    assert_eq!(handle.queues_created(), 2);
    let submitted = handle.submitted();
    assert_eq!(submitted.len(), 2);
    assert_eq!(
        submitted[0],
        bridge::admin::AdminCommand::CreateTopics(vec![topic])
    );
    assert_eq!(
        submitted[1],
        bridge::admin::AdminCommand::DeleteTopics(vec!["orders".to_string()])
    );

    let options = handle.submitted_options();
    assert_eq!(options[0].kind(), ResultKind::CreateTopics);
    assert_eq!(
        options[0].request_timeout(),
        Some(Duration::from_millis(DEFAULT_ADMIN_TIMEOUT_MS))
    );
}

#[tokio::test]
async fn test_first_failed_resource_fails_call() {
    let engine = MockEngine::new();
    engine.script_admin(AdminScript::Respond(ResultEvent::resources(
        ResultKind::CreateTopics,
        vec![
            ResourceOutcome::ok("a"),
            ResourceOutcome::ok("b"),
            ResourceOutcome::failed(
                "c",
                EngineError::with_message(ErrorCode::TOPIC_ALREADY_EXISTS, "Topic 'c' already exists."),
            ),
        ],
    )));
    let admin = connected_admin(&engine).await;

    let topics = vec![NewTopic::new("a"), NewTopic::new("b"), NewTopic::new("c")];
    let err = bounded(admin.create_topics(topics, AdminCallOptions::default()))
        .await
        .unwrap_err();

    match err {
        BridgeError::Engine { operation, source } => {
            assert_eq!(operation, "create topics");
            assert_eq!(source.code, ErrorCode::TOPIC_ALREADY_EXISTS);
            assert_eq!(source.message.as_deref(), Some("Topic 'c' already exists."));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_event_level_error_fails_call() {
    let engine = MockEngine::new();
    engine.script_admin(AdminScript::Respond(ResultEvent::failed(
        ResultKind::DeleteTopics,
        EngineError::new(ErrorCode::TOPIC_AUTHORIZATION_FAILED),
    )));
    let admin = connected_admin(&engine).await;

    let err = bounded(admin.delete_topic("orders", AdminCallOptions::default()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::TOPIC_AUTHORIZATION_FAILED));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_mismatched_event_times_out_with_last_kind() {
    let engine = MockEngine::new();
    engine.script_admin(AdminScript::Mismatch(ResultKind::DeleteTopics));
    let admin = connected_admin(&engine).await;

    let err = bounded(admin.create_topic(
        NewTopic::new("orders"),
        AdminCallOptions::default().with_timeout(200),
    ))
    .await
    .unwrap_err();

    match err {
        BridgeError::Timeout {
            operation,
            timeout_ms,
            last_event,
        } => {
            assert_eq!(operation, "create topics");
            assert_eq!(timeout_ms, 200);
            assert_eq!(last_event, Some(ResultKind::DeleteTopics));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_silent_engine_times_out() {
    let engine = MockEngine::new();
    engine.script_admin(AdminScript::Silence);
    let admin = connected_admin(&engine).await;

    let err = bounded(admin.list_groups(AdminCallOptions::default().with_timeout(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Timeout { last_event: None, .. }));
    assert_eq!(err.code(), Some(ErrorCode::TIMED_OUT));

    // The client stays usable after a timed out call.
    let listed = bounded(admin.list_groups(AdminCallOptions::default()))
        .await
        .unwrap();
    assert!(listed.groups.is_empty());
}

#[tokio::test]
async fn test_list_groups_passes_state_filter() {
    let engine = MockEngine::new();
    engine.script_admin(AdminScript::Respond(ResultEvent::new(
        ResultKind::ListConsumerGroups,
        EventPayload::ListGroups(ListGroupsResult {
            groups: vec![GroupListing {
                group_id: "billing".to_string(),
                is_simple_consumer_group: false,
                state: ConsumerGroupState::Stable,
            }],
            errors: vec![EngineError::new(ErrorCode::NETWORK_EXCEPTION)],
        }),
    )));
    let admin = connected_admin(&engine).await;

    let options = AdminCallOptions::default()
        .with_states(vec![ConsumerGroupState::Stable, ConsumerGroupState::Empty]);
    let listed = bounded(admin.list_groups(options)).await.unwrap();

    assert_eq!(listed.groups.len(), 1);
    assert_eq!(listed.groups[0].group_id, "billing");
    assert_eq!(listed.errors.len(), 1);

    let submitted = engine.handles()[0].submitted_options();
    assert_eq!(
        submitted[0].match_states(),
        Some([ConsumerGroupState::Stable, ConsumerGroupState::Empty].as_slice())
    );
}

#[tokio::test]
async fn test_rejected_option_fails_before_submit() {
    let engine = MockEngine::new();
    let admin = connected_admin(&engine).await;

    let options = AdminCallOptions::default().with_states(vec![
        ConsumerGroupState::Stable,
        ConsumerGroupState::Stable,
    ]);
    let err = bounded(admin.list_groups(options)).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::INVALID_ARG));

    let handle = &engine.handles()[0];
    assert!(handle.submitted().is_empty());
}

#[tokio::test]
async fn test_describe_groups_reports_per_group_errors() {
    let engine = MockEngine::new();
    engine.script_admin(AdminScript::Respond(ResultEvent::new(
        ResultKind::DescribeConsumerGroups,
        EventPayload::DescribeGroups(vec![
            GroupDescription {
                group_id: "billing".to_string(),
                error: None,
                is_simple_consumer_group: false,
                protocol_type: "consumer".to_string(),
                partition_assignor: "range".to_string(),
                state: ConsumerGroupState::Stable,
                members: vec![GroupMember {
                    member_id: "m-1".to_string(),
                    client_id: "billing-1".to_string(),
                    host: "/10.0.0.7".to_string(),
                }],
                authorized_operations: None,
            },
            GroupDescription::not_found("ghost"),
        ]),
    )));
    let admin = connected_admin(&engine).await;

    let described = bounded(admin.describe_groups(
        vec!["billing".to_string(), "ghost".to_string()],
        AdminCallOptions::default(),
    ))
    .await
    .unwrap();

    assert_eq!(described.len(), 2);
    assert!(described[0].error.is_none());
    assert_eq!(described[0].members.len(), 1);
    assert_eq!(
        described[1].error.as_ref().map(|e| e.code),
        Some(ErrorCode::GROUP_ID_NOT_FOUND)
    );
}

#[tokio::test]
async fn test_group_operations_validate_ids() {
    let engine = MockEngine::new();
    let admin = connected_admin(&engine).await;

    let err = admin
        .describe_groups(Vec::new(), AdminCallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Validation { .. }));

    let err = admin
        .delete_groups(vec![String::new()], AdminCallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Validation { .. }));

    let err = admin
        .create_partitions("orders", 0, AdminCallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Validation { .. }));

    assert!(engine.handles()[0].submitted().is_empty());
}

#[tokio::test]
async fn test_empty_topic_lists_are_rejected() {
    let engine = MockEngine::new();
    let admin = connected_admin(&engine).await;

    let err = admin
        .create_topics(Vec::new(), AdminCallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Validation { ref field, .. } if field.as_deref() == Some("topic")));

    let err = admin
        .delete_topics(Vec::new(), AdminCallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Validation { ref field, .. } if field.as_deref() == Some("topic")));

    let handle = &engine.handles()[0];
    assert!(handle.submitted().is_empty());
    assert_eq!(handle.queues_created(), 0);
}

#[tokio::test]
async fn test_delete_groups_returns_results() {
    let engine = MockEngine::new();
    let admin = connected_admin(&engine).await;

    let results = bounded(admin.delete_groups(
        vec!["billing".to_string(), "audit".to_string()],
        AdminCallOptions::default(),
    ))
    .await
    .unwrap();

    let ids: Vec<&str> = results.iter().map(|r| r.group_id.as_str()).collect();
    assert_eq!(ids, vec!["billing", "audit"]);
    assert!(results.iter().all(|r| r.error.is_none()));
}

#[tokio::test]
async fn test_create_partitions_submits_total_count() {
    let engine = MockEngine::new();
    let admin = connected_admin(&engine).await;

    bounded(admin.create_partitions("orders", 6, AdminCallOptions::default()))
        .await
        .unwrap();

    let submitted = engine.handles()[0].submitted();
    assert_eq!(
        submitted[0],
        bridge::admin::AdminCommand::CreatePartitions(vec![bridge::NewPartitions::new(
            "orders", 6
        )])
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_commands_are_serialized() {
    let engine = MockEngine::new();
    let admin = connected_admin(&engine).await;

    let calls = (0..4).map(|i| {
        let admin = admin.clone();
        async move {
            admin
                .create_topic(NewTopic::new(format!("topic-{i}")), AdminCallOptions::default())
                .await
        }
    });
    let outcomes = bounded(futures::future::join_all(calls)).await;

    assert!(outcomes.iter().all(Result::is_ok));
    let handle = &engine.handles()[0];
    assert_eq!(handle.submitted().len(), 4);
    assert_eq!(handle.queues_created(), 4);
}

#[tokio::test]
async fn test_admin_config_has_no_producer_settings() {
    let engine = MockEngine::new();
    let _admin = connected_admin(&engine).await;

    let handles = engine.handles();
    let config = handles[0].config();
    assert_eq!(config.get("bootstrap.servers"), Some("localhost:9092"));
    assert_eq!(config.get("acks"), None);
    assert_eq!(config.get("delivery.report.only.error"), None);
}

#[tokio::test]
async fn test_disconnected_admin_cannot_reconnect() {
    let engine = MockEngine::new();
    let admin = connected_admin(&engine).await;

    admin.disconnect().await.unwrap();
    admin.disconnect().await.unwrap();
    assert_eq!(admin.state(), ConnectionState::Disconnected);
    assert_eq!(engine.handles()[0].disconnect_count(), 1);

    let err = admin.connect().await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::State {
            state: ConnectionState::Disconnected,
            ..
        }
    ));

    let err = admin
        .delete_topic("orders", AdminCallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::State { .. }));
}

#[tokio::test]
async fn test_producer_admin_shares_connection() {
    let engine = MockEngine::new();
    let producer = connected_producer(&engine).await;
    let admin = producer.admin_client();

    assert_eq!(admin.state(), ConnectionState::Connected);
    bounded(admin.create_topic(NewTopic::new("orders"), AdminCallOptions::default()))
        .await
        .unwrap();
    assert_eq!(engine.handles().len(), 1);
    assert_eq!(engine.handles()[0].submitted().len(), 1);

    assert!(matches!(admin.connect().await, Err(BridgeError::State { .. })));
    assert!(matches!(admin.disconnect().await, Err(BridgeError::State { .. })));
    assert_eq!(producer.state(), ConnectionState::Connected);

    producer.disconnect().await.unwrap();
    assert_eq!(admin.state(), ConnectionState::Disconnected);
    let err = admin
        .delete_topic("orders", AdminCallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::State {
            state: ConnectionState::Disconnected,
            ..
        }
    ));
}
