use serde_json::json;
use std::sync::Arc;

use coevolve::agent::{Agent, Capability, ConfidenceUpdater};
use coevolve::core::config::{AgentConfig, ProtocolConfig};
use coevolve::core::error::ProtocolError;
use coevolve::inference::MockInference;
use coevolve::protocol::{
    derive_session_id, CollaborationProtocol, FailureReason, SessionStatus,
};

fn protocol_config(trust_threshold: f64) -> ProtocolConfig {
    ProtocolConfig {
        encryption_strength: 2,
        validation_rules: vec!["basic".to_string(), "advanced".to_string()],
        trust_threshold,
        learning_rate: 0.1,
    }
}

fn mock_agent(id: &str, capabilities: Vec<Capability>) -> Agent {
    Agent::new(
        id,
        capabilities,
        Arc::new(MockInference::default()),
        ConfidenceUpdater::new(0.1),
        AgentConfig::default(),
    )
}

fn text_analysis(confidence: f64) -> Capability {
    Capability::new(
        "textAnalysis",
        "Analyze text content",
        vec!["content".to_string()],
        confidence,
    )
}

#[tokio::test]
async fn initiation_reaches_channel_ready() {
    let protocol = CollaborationProtocol::new(protocol_config(0.7));
    let participants = vec!["a1".to_string(), "a2".to_string()];
    let task = json!({"content": "test collaboration task"});

    let outcome = protocol
        .initiate_collaboration(&participants, &task)
        .await
        .unwrap();

    assert!(!outcome.session_id.is_empty());
    assert_eq!(outcome.status, SessionStatus::ChannelReady);
    assert!(outcome.encrypted_channel);

    let record = protocol.session(&outcome.session_id).await.unwrap();
    assert_eq!(record.status, SessionStatus::ChannelReady);
    assert!(record.channel_bound);
    assert_eq!(record.participants, vec!["a1".to_string(), "a2".to_string()]);
    assert!(protocol.channel().is_provisioned(&outcome.session_id));
}

#[tokio::test]
async fn initiation_rejects_degenerate_participant_sets() {
    let protocol = CollaborationProtocol::new(protocol_config(0.7));
    let task = json!({});

    for participants in [
        vec![],
        vec!["a1".to_string()],
        vec!["a1".to_string(), "a1".to_string()],
        vec!["a1".to_string(), String::new()],
    ] {
        let err = protocol
            .initiate_collaboration(&participants, &task)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidParticipantSet(_)));
    }
}

#[tokio::test]
async fn session_ids_are_deterministic_across_order_and_duplicates() {
    let protocol = CollaborationProtocol::new(protocol_config(0.7));
    let task = json!({"content": "x"});

    let forward = protocol
        .initiate_collaboration(&["a1".to_string(), "a2".to_string()], &task)
        .await
        .unwrap();
    let shuffled = protocol
        .initiate_collaboration(
            &["a2".to_string(), "a1".to_string(), "a2".to_string()],
            &task,
        )
        .await
        .unwrap();

    assert_eq!(forward.session_id, shuffled.session_id);
    assert_eq!(
        forward.session_id,
        derive_session_id(&["a1".to_string(), "a2".to_string()])
    );
}

#[tokio::test]
async fn reinitiation_replaces_channel_key() {
    let protocol = CollaborationProtocol::new(protocol_config(0.7));
    let participants = vec!["a1".to_string(), "a2".to_string()];
    let task = json!({"content": "x"});

    let first = protocol
        .initiate_collaboration(&participants, &task)
        .await
        .unwrap();
    let envelope = protocol
        .channel()
        .encrypt(&first.session_id, &json!("payload"), 1)
        .unwrap();

    // Same set, new session: last initiation wins and rotates the key
    let second = protocol
        .initiate_collaboration(&participants, &task)
        .await
        .unwrap();
    assert_eq!(first.session_id, second.session_id);
    assert!(matches!(
        protocol.channel().decrypt(&second.session_id, &envelope),
        Err(ProtocolError::AuthenticationFailed(_))
    ));
}

#[tokio::test]
async fn consensus_two_of_three_against_default_threshold() {
    let protocol = CollaborationProtocol::new(protocol_config(0.7));
    let participants = vec!["a1".to_string(), "a2".to_string(), String::new()];
    let task = json!("test task");

    let err = protocol
        .achieve_consensus(&task, &participants)
        .await
        .unwrap_err();
    match err {
        ProtocolError::ConsensusThresholdNotMet {
            achieved,
            threshold,
            ..
        } => {
            assert!((achieved - 2.0 / 3.0).abs() < 1e-9);
            assert!((threshold - 0.7).abs() < 1e-9);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn consensus_two_of_three_passes_lower_threshold() {
    let protocol = CollaborationProtocol::new(protocol_config(0.6));
    let participants = vec!["a1".to_string(), "a2".to_string(), String::new()];
    let task = json!("test task");

    let outcome = protocol
        .achieve_consensus(&task, &participants)
        .await
        .unwrap();
    assert!((outcome.confidence - 2.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn full_collaboration_reaches_consensus() {
    let protocol = CollaborationProtocol::new(protocol_config(0.7));
    protocol.register_agent(mock_agent("a1", vec![text_analysis(0.9)]));
    protocol.register_agent(mock_agent(
        "a2",
        vec![Capability::new(
            "patternRecognition",
            "Identify patterns in text",
            vec!["data".to_string()],
            0.85,
        )],
    ));

    let participants = vec!["a1".to_string(), "a2".to_string()];
    let task = json!({"content": "identify patterns in this text"});

    let outcome = protocol.collaborate(&participants, &task).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::ConsensusReached);
    assert!((outcome.confidence - 1.0).abs() < 1e-9);

    let result = outcome.result.unwrap();
    assert_eq!(result["sessionId"], json!(outcome.session_id));
    assert!(result["results"]["a1"].is_object());
    assert!(result["results"]["a2"].is_object());

    let record = protocol.session(&outcome.session_id).await.unwrap();
    assert_eq!(record.status, SessionStatus::ConsensusReached);
    assert_eq!(record.confidence, Some(1.0));
}

#[tokio::test]
async fn missing_capability_fails_before_any_execution() {
    let protocol = CollaborationProtocol::new(protocol_config(0.7));
    protocol.register_agent(mock_agent("a1", vec![text_analysis(0.9)]));
    protocol.register_agent(mock_agent(
        "a2",
        vec![Capability::new(
            "imageSynthesis",
            "render pixels beautifully",
            vec![],
            0.9,
        )],
    ));

    let participants = vec!["a1".to_string(), "a2".to_string()];
    let task = json!({"content": "please analyze this text"});

    let err = protocol.collaborate(&participants, &task).await.unwrap_err();
    match &err {
        ProtocolError::NoCapabilityMatch { participant } => assert_eq!(participant, "a2"),
        other => panic!("unexpected error: {other}"),
    }

    let session_id = derive_session_id(&participants);
    let record = protocol.session(&session_id).await.unwrap();
    assert_eq!(record.status, SessionStatus::ConsensusFailed);
    assert_eq!(
        record.failure,
        Some(FailureReason::NoCapabilityMatch {
            participant: "a2".to_string()
        })
    );
}

#[tokio::test]
async fn partial_execution_failure_fails_consensus_and_lowers_trust() {
    let protocol = CollaborationProtocol::new(protocol_config(0.7));
    protocol.register_agent(mock_agent("a1", vec![text_analysis(0.9)]));
    protocol.register_agent(Agent::new(
        "a2",
        vec![text_analysis(0.9)],
        Arc::new(MockInference::failing()),
        ConfidenceUpdater::new(0.1),
        AgentConfig::default(),
    ));

    let participants = vec!["a1".to_string(), "a2".to_string()];
    let task = json!({"content": "please analyze this text"});

    let err = protocol.collaborate(&participants, &task).await.unwrap_err();
    match err {
        ProtocolError::ConsensusThresholdNotMet { achieved, .. } => {
            assert!((achieved - 0.5).abs() < 1e-9);
        }
        other => panic!("unexpected error: {other}"),
    }

    // Outcomes were folded into trust: success above the 0.5 default,
    // failure below it
    assert!(protocol.trust_ledger().trust_of("a1") > 0.5);
    assert!(protocol.trust_ledger().trust_of("a2") < 0.5);

    let record = protocol
        .session(&derive_session_id(&participants))
        .await
        .unwrap();
    assert_eq!(record.status, SessionStatus::ConsensusFailed);
    assert_eq!(
        record.failure,
        Some(FailureReason::ConsensusThresholdNotMet { achieved: 0.5 })
    );
}

#[tokio::test]
async fn executing_twice_is_rejected_after_terminal_state() {
    let protocol = CollaborationProtocol::new(protocol_config(0.7));
    protocol.register_agent(mock_agent("a1", vec![text_analysis(0.9)]));
    protocol.register_agent(mock_agent("a2", vec![text_analysis(0.85)]));

    let participants = vec!["a1".to_string(), "a2".to_string()];
    let task = json!({"content": "please analyze this text"});

    let outcome = protocol.collaborate(&participants, &task).await.unwrap();
    let err = protocol
        .execute_session(&outcome.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidSessionState { .. }));
}

#[tokio::test]
async fn unknown_session_is_reported() {
    let protocol = CollaborationProtocol::new(protocol_config(0.7));
    let err = protocol.execute_session("no-such-session").await.unwrap_err();
    assert!(matches!(err, ProtocolError::UnknownSession(_)));
}
