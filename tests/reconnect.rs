//! Primary session resumption

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fast_policy, wait_until, MockFactory};
use relayconn::ConnectionManager;

const HOME: &str = "relayA:443";
const RELAY_B: &str = "relayB:443";
const WAIT: Duration = Duration::from_secs(2);

async fn served(factory: &MockFactory) -> Arc<ConnectionManager<MockFactory>> {
    let manager = Arc::new(
        ConnectionManager::new(factory.clone(), HOME, "P1").with_reconnect_policy(fast_policy()),
    );
    manager.serve().await.unwrap();
    manager
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_primary_resumes_in_place() {
    let factory = MockFactory::new();
    let manager = served(&factory).await;
    let primary = factory.client_for(HOME);

    primary.drop_session();
    assert!(wait_until(WAIT, || manager.relay_address().is_ok()).await);
    assert_eq!(factory.dial_count(HOME), 2);
    assert_eq!(factory.clients_for(HOME).len(), 1);

    manager.open_conn(HOME, "P2").await.unwrap();
    assert_eq!(primary.opened(), vec!["P2"]);
    assert_eq!(manager.foreign_count(), 0);

    // The guard re-registered itself, so a second drop is also handled.
    primary.drop_session();
    assert!(wait_until(WAIT, || manager.relay_address().is_ok()).await);
    assert_eq!(factory.dial_count(HOME), 3);

    manager.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_primary_retries_until_relay_returns() {
    let factory = MockFactory::new();
    let manager = served(&factory).await;

    factory.set_failing(HOME, true);
    factory.client_for(HOME).drop_session();

    assert!(wait_until(WAIT, || factory.dial_count(HOME) >= 4).await);
    assert!(manager.relay_address().is_err());

    factory.set_failing(HOME, false);
    assert!(wait_until(WAIT, || manager.relay_address().is_ok()).await);

    manager.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_stops_resumption() {
    let factory = MockFactory::new();
    let manager = served(&factory).await;

    factory.set_failing(HOME, true);
    factory.client_for(HOME).drop_session();
    assert!(wait_until(WAIT, || factory.dial_count(HOME) >= 2).await);

    manager.shutdown();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let settled = factory.dial_count(HOME);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(factory.dial_count(HOME), settled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconnect_in_flight_at_shutdown_is_closed() {
    let factory = MockFactory::new();
    let manager = served(&factory).await;
    let primary = factory.client_for(HOME);
    factory.set_delay(HOME, Duration::from_millis(200));

    primary.drop_session();
    assert!(wait_until(WAIT, || factory.dial_count(HOME) >= 2).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    manager.shutdown();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(manager.relay_address().is_err());
    assert!(!primary.is_connected());
    assert_eq!(factory.dial_count(HOME), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_foreign_relays_are_not_resumed() {
    let factory = MockFactory::new();
    let manager = served(&factory).await;

    manager.open_conn(RELAY_B, "P3").await.unwrap();
    factory.client_for(RELAY_B).drop_session();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(factory.dial_count(RELAY_B), 1);
    assert_eq!(manager.foreign_count(), 0);

    manager.shutdown();
}
