//! Integration tests for endpoint failover, backoff and topology updates.

mod common;

use std::time::Duration;

use ignite_client::{
    ClientSession, ConnectionEvent, ConnectionManager, EndpointHealth, EndpointOrigin,
    IgniteError, SessionState,
};
use ignite_core::protocol::{OpCode, ProtocolVersion};
use ignite_test_utils::MockServer;

use common::{config_for, eventually, start_server, unique_name, unused_address};

async fn session_with_cache_on(
    servers: &[&MockServer],
    name: &str,
) -> ClientSession {
    // every mock server keeps its own caches, so create the cache everywhere
    for server in servers {
        let direct = common::connect(server.address()).await;
        direct.get_or_create_cache::<i32, i32>(name).await.unwrap();
        direct.close().await.unwrap();
    }
    let addresses: Vec<_> = servers.iter().map(|s| s.address()).collect();
    ClientSession::connect(config_for(&addresses).build().unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_idempotent_request_fails_over_once() {
    common::init_tracing();
    let a = start_server().await;
    let b = start_server().await;
    let name = unique_name("failover");
    let session = session_with_cache_on(&[&a, &b], &name).await;
    assert_eq!(session.connection_manager().connected_addresses(), vec![a.address()]);

    a.close_on(OpCode::CacheGet);
    let cache = session.cache::<i32, i32>(&name);
    assert_eq!(cache.get(&1).await.unwrap(), None);

    assert_eq!(a.request_count(OpCode::CacheGet), 1);
    assert_eq!(b.request_count(OpCode::CacheGet), 1);
    assert!(session
        .connection_manager()
        .connected_addresses()
        .contains(&b.address()));
}

#[tokio::test]
async fn test_written_non_idempotent_request_is_not_replayed() {
    let a = start_server().await;
    let b = start_server().await;
    let name = unique_name("no-replay");
    let session = session_with_cache_on(&[&a, &b], &name).await;

    a.close_on(OpCode::CachePutIfAbsent);
    let cache = session.cache::<i32, i32>(&name);
    assert!(matches!(
        cache.put_if_absent(&1, &1).await,
        Err(IgniteError::ConnectionClosed { request_id: Some(_), .. })
    ));

    assert_eq!(a.request_count(OpCode::CachePutIfAbsent), 1);
    assert_eq!(b.request_count(OpCode::CachePutIfAbsent), 0);
    // the write reached a, which applied it before dropping the connection
    assert_eq!(a.cache_size(&name), Some(1));
    assert_eq!(b.cache_size(&name), Some(0));
}

#[tokio::test]
async fn test_failover_budget_is_respected() {
    let a = start_server().await;
    let b = start_server().await;
    let name = unique_name("budget");
    for server in [&a, &b] {
        let direct = common::connect(server.address()).await;
        direct.get_or_create_cache::<i32, i32>(&name).await.unwrap();
    }
    let config = config_for(&[a.address(), b.address()])
        .retry(|r| r.max_failover_retries(0))
        .build()
        .unwrap();
    let session = ClientSession::connect(config).await.unwrap();

    a.close_on(OpCode::CacheGet);
    assert!(matches!(
        session.cache::<i32, i32>(&name).get(&1).await,
        Err(IgniteError::ConnectionClosed { .. })
    ));
    assert_eq!(b.request_count(OpCode::CacheGet), 0);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_skipped() {
    let dead = unused_address().await;
    let b = start_server().await;
    let manager = ConnectionManager::from_config(config_for(&[dead, b.address()]).build().unwrap());
    let mut events = manager.subscribe();

    manager.start().await.unwrap();
    manager.invoke(OpCode::Heartbeat, &[]).await.unwrap();

    match events.recv().await.unwrap() {
        ConnectionEvent::ConnectFailed { address, health, .. } => {
            assert_eq!(address, dead);
            assert!(matches!(health, EndpointHealth::Degraded { failures: 1, .. }));
        }
        other => panic!("expected ConnectFailed, got {:?}", other),
    }
    assert!(matches!(
        events.recv().await.unwrap(),
        ConnectionEvent::Connected { address, .. } if address == b.address()
    ));
    assert_eq!(manager.state(), SessionState::Degraded);

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_handshake_mismatch_marks_endpoint_failed() {
    let incompatible = MockServer::builder()
        .versions([ProtocolVersion::new(9, 0, 0)])
        .start()
        .await
        .unwrap();
    let good = start_server().await;
    let manager = ConnectionManager::from_config(
        config_for(&[incompatible.address(), good.address()])
            .build()
            .unwrap(),
    );
    let mut events = manager.subscribe();

    manager.start().await.unwrap();

    match events.recv().await.unwrap() {
        ConnectionEvent::ConnectFailed { address, error, health } => {
            assert_eq!(address, incompatible.address());
            assert!(error.contains("handshake"));
            assert!(matches!(health, EndpointHealth::Failed { .. }));
        }
        other => panic!("expected ConnectFailed, got {:?}", other),
    }

    let endpoints = manager.endpoints();
    let failed = endpoints
        .iter()
        .find(|e| e.address() == incompatible.address())
        .unwrap();
    assert!(matches!(failed.health(), EndpointHealth::Failed { .. }));
    assert_eq!(incompatible.handshake_count(), 0);

    // failed endpoints stay out until reset
    manager.reset_endpoints();
    assert!(manager
        .endpoints()
        .iter()
        .all(|e| e.health() == EndpointHealth::Healthy));
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_handshake_falls_back_to_older_version() {
    let server = MockServer::builder()
        .versions([ProtocolVersion::V1_0_0])
        .start()
        .await
        .unwrap();
    let session = common::connect(server.address()).await;
    session.cache_names().await.unwrap();
    assert_eq!(server.handshake_count(), 1);
    assert_eq!(server.accepted_connections(), 1);
}

#[tokio::test]
async fn test_socket_killed_mid_flight() {
    let server = start_server().await;
    let name = unique_name("killed");
    let config = config_for(&[server.address()])
        .retry(|r| r.max_failover_retries(0).initial_backoff(Duration::from_millis(50)))
        .build()
        .unwrap();
    let session = ClientSession::connect(config).await.unwrap();
    let cache = session.get_or_create_cache::<i32, i32>(&name).await.unwrap();

    server.drop_responses(OpCode::CacheGet);
    let pending = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get(&1).await })
    };
    eventually(|| server.request_count(OpCode::CacheGet) == 1).await;
    server.kill_connections();

    let result = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("pending request hung")
        .unwrap();
    assert!(matches!(
        result,
        Err(IgniteError::ConnectionClosed { request_id: Some(_), .. })
    ));

    // after the backoff the endpoint is used again
    server.clear_faults();
    tokio::time::sleep(Duration::from_millis(150)).await;
    cache.put(&1, &7).await.unwrap();
    assert_eq!(cache.get(&1).await.unwrap(), Some(7));
    assert_eq!(server.accepted_connections(), 2);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_reconnect() {
    let server = start_server().await;
    let session = common::connect(server.address()).await;
    let name = unique_name("single-flight");
    let cache = session.get_or_create_cache::<i32, i32>(&name).await.unwrap();

    server.kill_connections();
    eventually(|| session.state() == SessionState::Disconnected).await;
    session.connection_manager().reset_endpoints();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let cache = cache.clone();
        tasks.push(tokio::spawn(async move { cache.put(&i, &i).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(server.accepted_connections(), 2);
    assert_eq!(server.cache_size(&name), Some(16));
}

#[tokio::test]
async fn test_all_endpoints_in_backoff() {
    let server = start_server().await;
    let config = config_for(&[server.address()])
        .retry(|r| {
            r.initial_backoff(Duration::from_secs(60))
                .max_backoff(Duration::from_secs(120))
        })
        .build()
        .unwrap();
    let session = ClientSession::connect(config).await.unwrap();
    let mut events = session.subscribe_connection_events();

    server.kill_connections();
    loop {
        if let ConnectionEvent::Disconnected { error, .. } = events.recv().await.unwrap() {
            assert!(error.is_some());
            break;
        }
    }
    eventually(|| session.state() == SessionState::Disconnected).await;

    assert!(matches!(
        session.cache_names().await,
        Err(IgniteError::NoAvailableEndpoint(_))
    ));
    let endpoint = &session.endpoints()[0];
    assert!(endpoint.retry_at().is_some());
}

#[tokio::test]
async fn test_background_reconnect() {
    let server = start_server().await;
    let config = config_for(&[server.address()])
        .network(|n| n.heartbeat_interval(Duration::from_millis(50)))
        .retry(|r| r.initial_backoff(Duration::from_millis(20)))
        .build()
        .unwrap();
    let session = ClientSession::connect(config).await.unwrap();
    let mut state = session.watch_state();

    server.kill_connections();
    eventually(|| server.accepted_connections() == 2).await;

    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == SessionState::Ready))
        .await
        .expect("session did not reconnect")
        .unwrap();
    assert_eq!(session.connection_manager().connection_count(), 1);
    eventually(|| server.request_count(OpCode::Heartbeat) >= 1).await;
}

#[tokio::test]
async fn test_topology_hints_add_and_retire_endpoints() {
    let a = start_server().await;
    let b = start_server().await;
    let session = common::connect(a.address()).await;
    let mut events = session.subscribe_connection_events();

    a.advertise_topology(1, [a.address(), b.address()]);
    session.cache_names().await.unwrap();

    let endpoints = session.endpoints();
    assert_eq!(endpoints.len(), 2);
    let learned = endpoints.iter().find(|e| e.address() == b.address()).unwrap();
    assert_eq!(learned.origin(), EndpointOrigin::Discovered);
    assert!(matches!(
        events.recv().await.unwrap(),
        ConnectionEvent::EndpointAdded { address } if address == b.address()
    ));

    // the configured endpoint survives a hint that omits it
    a.advertise_topology(2, []);
    session.cache_names().await.unwrap();

    let endpoints = session.endpoints();
    let configured = endpoints.iter().find(|e| e.address() == a.address()).unwrap();
    let learned = endpoints.iter().find(|e| e.address() == b.address()).unwrap();
    assert!(!configured.is_retired());
    assert!(learned.is_retired());
    assert!(matches!(
        events.recv().await.unwrap(),
        ConnectionEvent::EndpointRetired { address } if address == b.address()
    ));

    // re-advertising brings it back
    a.advertise_topology(3, [b.address()]);
    session.cache_names().await.unwrap();
    let learned = session
        .endpoints()
        .into_iter()
        .find(|e| e.address() == b.address())
        .unwrap();
    assert!(!learned.is_retired());
}

#[tokio::test]
async fn test_idle_session_learns_topology_from_heartbeats() {
    let a = start_server().await;
    let b = start_server().await;
    let config = config_for(&[a.address()])
        .network(|n| n.heartbeat_interval(Duration::from_millis(50)))
        .build()
        .unwrap();
    let session = ClientSession::connect(config).await.unwrap();

    a.advertise_topology(1, [a.address(), b.address()]);
    eventually(|| {
        session
            .endpoints()
            .iter()
            .any(|e| e.address() == b.address() && e.origin() == EndpointOrigin::Discovered)
    })
    .await;

    assert!(a.request_count(OpCode::Heartbeat) >= 1);
    assert_eq!(a.total_requests(), a.request_count(OpCode::Heartbeat));
}

#[tokio::test]
async fn test_socket_killed_mid_flight_with_default_retries() {
    let server = start_server().await;
    let session = common::connect(server.address()).await;
    let cache = session
        .get_or_create_cache::<i32, i32>(&unique_name("killed-default"))
        .await
        .unwrap();

    server.drop_responses(OpCode::CacheGet);
    let pending = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get(&1).await })
    };
    eventually(|| server.request_count(OpCode::CacheGet) == 1).await;
    server.kill_connections();

    let result = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("pending request hung")
        .unwrap();
    match result {
        Err(IgniteError::ConnectionClosed { endpoint, request_id }) => {
            assert_eq!(endpoint, server.address().to_string());
            assert!(request_id.is_some());
        }
        other => panic!("expected ConnectionClosed, got {:?}", other),
    }
}
