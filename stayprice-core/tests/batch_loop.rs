mod support;

use std::time::Duration;

use stayprice_core::browser::{BatchLoop, BatchPlan, SessionState};
use stayprice_core::report::Availability;
use stayprice_core::stay_window;
use tokio::time::Instant;

use support::{day, fast_config, FakeSite, PageResult, ProbeFailure, SiteScript};

fn hotels(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_connection_loss_retries_same_date_once() {
    let config = fast_config();
    let site = FakeSite::new(&config, SiteScript::default());
    site.drop_connection_on(day(11), 1);
    let mut batch = BatchLoop::from_config(&config, site.factory()).unwrap();
    let plan = BatchPlan::uniform(&hotels(&["Hotel Estelar"]), &stay_window(day(10), 2));

    let stats = batch.run(&plan).await;
    let outcomes = batch.take_outcomes();

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes
        .iter()
        .all(|o| o.availability == Availability::Available));
    assert_eq!(
        outcomes.iter().filter(|o| o.checkin == day(11)).count(),
        1,
        "a recovered search is recorded once"
    );
    assert_eq!(stats.connection_retries, 1);
    assert_eq!(stats.sessions.connection_losses, 1);

    let journal = site.journal();
    assert_eq!(journal.sessions_created, 2);
    assert_eq!(journal.connection_drops, 1);
    assert_eq!(journal.submissions.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_second_connection_loss_records_session_error() {
    let config = fast_config();
    let site = FakeSite::new(&config, SiteScript::default());
    site.drop_connection_on(day(10), 2);
    let mut batch = BatchLoop::from_config(&config, site.factory()).unwrap();
    let plan = BatchPlan::uniform(&hotels(&["Hotel Estelar"]), &stay_window(day(10), 1));

    let stats = batch.run(&plan).await;
    let outcomes = batch.take_outcomes();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].availability, Availability::SessionError);
    assert!(outcomes[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("Connection lost"));
    assert_eq!(outcomes[1].availability, Availability::Available);
    assert_eq!(stats.session_errors, 1);
    assert_eq!(site.journal().sessions_created, 3);
}

#[tokio::test(start_paused = true)]
async fn test_sessions_rotate_after_configured_searches() {
    let mut config = fast_config();
    config.session.max_searches_per_session = 2;
    let site = FakeSite::new(&config, SiteScript::default());
    let mut batch = BatchLoop::from_config(&config, site.factory()).unwrap();
    let plan = BatchPlan::uniform(&hotels(&["Hotel Estelar"]), &stay_window(day(1), 4));

    let stats = batch.run(&plan).await;

    assert_eq!(batch.outcomes().len(), 5);
    assert_eq!(stats.sessions.rotations, 2);
    let journal = site.journal();
    assert_eq!(journal.sessions_created, 3);
    assert_eq!(journal.sessions_closed, 3);
}

#[tokio::test(start_paused = true)]
async fn test_session_creation_failure_fails_remaining_dates_and_moves_on() {
    let config = fast_config();
    let site = FakeSite::new(&config, SiteScript::default());
    // Exhausts the three attempts for the first hotel only.
    site.fail_creations(3);
    let mut batch = BatchLoop::from_config(&config, site.factory()).unwrap();
    let plan = BatchPlan::uniform(&hotels(&["Alfa", "Beta"]), &stay_window(day(20), 1));

    let stats = batch.run(&plan).await;
    let outcomes = batch.take_outcomes();

    assert_eq!(outcomes.len(), 4);
    for outcome in &outcomes[..2] {
        assert_eq!(outcome.hotel_name, "Alfa");
        assert_eq!(outcome.availability, Availability::SessionError);
        assert!(outcome
            .error
            .as_deref()
            .unwrap()
            .starts_with("Session creation failed"));
    }
    for outcome in &outcomes[2..] {
        assert_eq!(outcome.hotel_name, "Beta");
        assert_eq!(outcome.availability, Availability::Available);
    }
    assert_eq!(stats.session_errors, 2);
    assert_eq!(stats.hotels_processed, 2);
    assert_eq!(site.journal().creation_failures, 3);
}

#[tokio::test(start_paused = true)]
async fn test_each_hotel_gets_its_own_session() {
    let config = fast_config();
    let site = FakeSite::new(&config, SiteScript::default());
    let mut batch = BatchLoop::from_config(&config, site.factory()).unwrap();
    let plan = BatchPlan::uniform(&hotels(&["Alfa", "Beta"]), &stay_window(day(5), 1));

    batch.run(&plan).await;

    let journal = site.journal();
    assert_eq!(journal.sessions_created, 2);
    assert_eq!(journal.sessions_closed, 2);
    assert_eq!(batch.sessions().state(), SessionState::Absent);
    assert!(journal
        .navigations
        .iter()
        .all(|url| url.contains("selected_currency=COP")));
}

#[tokio::test(start_paused = true)]
async fn test_pacing_between_searches_and_hotels() {
    let mut config = fast_config();
    config.pacing.search_delay_seconds = 3;
    config.pacing.hotel_delay_seconds = 10;
    let site = FakeSite::new(&config, SiteScript::default());
    let mut batch = BatchLoop::from_config(&config, site.factory()).unwrap();
    let plan = BatchPlan::uniform(&hotels(&["Alfa", "Beta"]), &stay_window(day(5), 1));

    let started = Instant::now();
    let stats = batch.run(&plan).await;

    // One search delay inside each hotel, one hotel delay between them.
    assert_eq!(stats.total_wait_ms, 16_000);
    assert!(started.elapsed() >= Duration::from_secs(16));
}

#[tokio::test(start_paused = true)]
async fn test_mixed_results_keep_enumeration_order() {
    let config = fast_config();
    let mut script = SiteScript::default();
    script.results.insert(day(2), PageResult::SoldOut);
    script.results.insert(day(3), PageResult::NoPrice);
    let site = FakeSite::new(&config, script);
    let mut batch = BatchLoop::from_config(&config, site.factory()).unwrap();
    let plan = BatchPlan::uniform(&hotels(&["Alfa"]), &stay_window(day(1), 2));

    batch.run(&plan).await;
    let availability: Vec<_> = batch
        .outcomes()
        .iter()
        .map(|o| (o.checkin, o.availability))
        .collect();

    assert_eq!(
        availability,
        vec![
            (day(1), Availability::Available),
            (day(2), Availability::NotAvailable),
            (day(3), Availability::PriceExtractionFailed),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_after_interrupt_keeps_partial_outcomes() {
    let mut config = fast_config();
    config.pacing.search_delay_seconds = 60;
    let site = FakeSite::new(&config, SiteScript::default());
    let mut batch = BatchLoop::from_config(&config, site.factory()).unwrap();
    let plan = BatchPlan::uniform(&hotels(&["Alfa"]), &stay_window(day(1), 3));

    tokio::select! {
        _ = batch.run(&plan) => panic!("batch should still be pacing"),
        _ = tokio::time::sleep(Duration::from_secs(90)) => {}
    }
    batch.shutdown().await;

    assert_eq!(batch.outcomes().len(), 2);
    let journal = site.journal();
    assert_eq!(journal.sessions_created, 1);
    assert_eq!(journal.sessions_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_health_check_connection_loss_reacquires_for_same_date() {
    let config = fast_config();
    let site = FakeSite::new(&config, SiteScript::default());
    site.fail_url_reads(ProbeFailure::ConnectionLost, 1);
    let mut batch = BatchLoop::from_config(&config, site.factory()).unwrap();
    let plan = BatchPlan::uniform(&hotels(&["Hotel Estelar"]), &stay_window(day(1), 1));

    let stats = batch.run(&plan).await;
    let outcomes = batch.take_outcomes();

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes
        .iter()
        .all(|o| o.availability == Availability::Available));
    assert_eq!(stats.sessions.connection_losses, 1);
    assert_eq!(stats.connection_retries, 0);

    let journal = site.journal();
    assert_eq!(journal.url_reads, 1);
    assert_eq!(journal.connection_drops, 1);
    assert_eq!(journal.sessions_created, 2);
    assert_eq!(
        journal.submissions,
        vec![
            ("Hotel Estelar".to_string(), day(1)),
            ("Hotel Estelar".to_string(), day(2)),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_url_replaces_session() {
    let config = fast_config();
    let site = FakeSite::new(&config, SiteScript::default());
    site.fail_url_reads(ProbeFailure::Unreadable, 1);
    let mut batch = BatchLoop::from_config(&config, site.factory()).unwrap();
    let plan = BatchPlan::uniform(&hotels(&["Hotel Estelar"]), &stay_window(day(1), 1));

    let stats = batch.run(&plan).await;

    assert!(batch
        .outcomes()
        .iter()
        .all(|o| o.availability == Availability::Available));
    assert_eq!(stats.sessions.connection_losses, 0);
    let journal = site.journal();
    assert_eq!(journal.sessions_created, 2);
    assert_eq!(journal.sessions_closed, 2);
}
