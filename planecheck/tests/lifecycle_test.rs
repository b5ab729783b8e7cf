//! Full interface lifecycle integration tests.
//!
//! Drives batches of loopback interfaces through create, address, up,
//! probe, down and delete against the simulated engine, checking after
//! every phase that dumps, route tables and data-plane behavior agree
//! with the declared state.

use std::net::Ipv4Addr;
use std::time::Duration;

use planecheck::capture::TrafficPort;
use planecheck::client::InterfaceKind;
use planecheck::dump::{DEFAULT_TABLE, DumpFilter};
use planecheck::lifecycle::{self, AddressPlan};
use planecheck::probe::{self, ProbeEndpoint};
use planecheck::session::Session;
use planecheck::sim::{MGMT_NAME, SimEngine, SimPort};
use planecheck::verify;

/// Host endpoint sending and receiving probes.
const REQUESTER: ProbeEndpoint = ProbeEndpoint {
    mac: [0x02, 0, 0, 0, 0, 0x10],
    addr: Ipv4Addr::new(10, 0, 0, 100),
};

/// How long to wait for probe replies.
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);

/// Quiet period that must stay silent after teardown.
const GRACE: Duration = Duration::from_millis(200);

/// Batch size for the main lifecycle run.
const BATCH: u32 = 20;

#[tokio::test]
async fn test_twenty_loopbacks_full_lifecycle() {
    let _ = tracing_subscriber::fmt::try_init();

    let engine = SimEngine::new();
    let mut port = SimPort::attach(&engine, "port0");
    let mut session = Session::new(engine);

    let mut handles = lifecycle::create_batch(&mut session, InterfaceKind::Loopback, BATCH)
        .await
        .expect("Failed to create batch");
    let plan = AddressPlan::host_routes(Ipv4Addr::new(10, 0, 0, 1));
    lifecycle::activate_batch(&mut session, &mut handles, &plan)
        .await
        .expect("Failed to activate batch");

    println!("\n=== Phase 1: control plane agrees with declared state ===");
    let dump = session
        .dump_interfaces(&DumpFilter::all())
        .await
        .expect("Failed to dump interfaces");
    // 20 loopbacks plus the management interface.
    assert_eq!(dump.len(), BATCH as usize + 1);

    let routes = session
        .dump_routes(DEFAULT_TABLE)
        .await
        .expect("Failed to dump routes");
    assert_eq!(routes.len(), BATCH as usize);

    let report = verify::check_lifecycle(&dump, &routes, &handles);
    assert!(report.passed(), "{report}");

    println!("\n=== Phase 2: every active interface answers probes ===");
    let requests = probe::build_requests(&REQUESTER, &handles).expect("Failed to build probes");
    for request in &requests {
        port.inject(request.frame.clone())
            .await
            .expect("Failed to inject probe");
    }
    let frames = port
        .expect(BATCH as usize, CAPTURE_TIMEOUT)
        .await
        .expect("Missing probe replies");
    let records = probe::classify(&frames);
    let report = probe::verify_all_responded(&records, &handles, &REQUESTER);
    assert!(report.passed(), "{report}");

    println!("\n=== Phase 3: deletion removes every observable trace ===");
    lifecycle::delete_batch(&mut session, &mut handles)
        .await
        .expect("Failed to delete batch");

    let dump = session
        .dump_interfaces(&DumpFilter::all())
        .await
        .expect("Failed to dump interfaces");
    assert_eq!(dump.len(), 1, "only the management interface should remain");

    let routes = session
        .dump_routes(DEFAULT_TABLE)
        .await
        .expect("Failed to dump routes");
    assert!(routes.is_empty());

    let report = verify::check_lifecycle(&dump, &routes, &handles);
    assert!(report.passed(), "{report}");

    // Probing the old addresses must now go unanswered.
    for request in &requests {
        port.inject(request.frame.clone())
            .await
            .expect("Failed to inject probe");
    }
    port.expect_none(GRACE)
        .await
        .expect("Deleted interfaces still answer");
}

#[tokio::test]
async fn test_deactivation_keeps_interfaces_visible_but_silent() {
    let _ = tracing_subscriber::fmt::try_init();

    let engine = SimEngine::new();
    let mut port = SimPort::attach(&engine, "port0");
    let mut session = Session::new(engine);

    let mut handles = lifecycle::create_batch(&mut session, InterfaceKind::Loopback, 3)
        .await
        .expect("Failed to create batch");
    let plan = AddressPlan::host_routes(Ipv4Addr::new(10, 0, 1, 1));
    lifecycle::activate_batch(&mut session, &mut handles, &plan)
        .await
        .expect("Failed to activate batch");
    let requests = probe::build_requests(&REQUESTER, &handles).expect("Failed to build probes");

    lifecycle::deactivate_batch(&mut session, &mut handles)
        .await
        .expect("Failed to deactivate batch");

    // Still in the dump, gone from the FIB.
    let dump = session
        .dump_interfaces(&DumpFilter::all())
        .await
        .expect("Failed to dump interfaces");
    assert_eq!(dump.len(), 4);

    let routes = session
        .dump_routes(DEFAULT_TABLE)
        .await
        .expect("Failed to dump routes");
    assert!(routes.is_empty());

    let report = verify::check_lifecycle(&dump, &routes, &handles);
    assert!(report.passed(), "{report}");

    // And silent on the wire.
    for request in &requests {
        port.inject(request.frame.clone())
            .await
            .expect("Failed to inject probe");
    }
    port.expect_none(GRACE)
        .await
        .expect("Deactivated interfaces must not answer");
}

#[tokio::test]
async fn test_deactivated_interface_can_reactivate() {
    let _ = tracing_subscriber::fmt::try_init();

    let engine = SimEngine::new();
    let mut port = SimPort::attach(&engine, "port0");
    let mut session = Session::new(engine);

    let mut handles = lifecycle::create_batch(&mut session, InterfaceKind::Loopback, 1)
        .await
        .expect("Failed to create batch");
    let plan = AddressPlan::host_routes(Ipv4Addr::new(10, 0, 2, 1));
    lifecycle::activate_batch(&mut session, &mut handles, &plan)
        .await
        .expect("Failed to activate batch");
    lifecycle::deactivate_batch(&mut session, &mut handles)
        .await
        .expect("Failed to deactivate batch");

    // Deactivation is not terminal; the same plan brings it back.
    lifecycle::activate_batch(&mut session, &mut handles, &plan)
        .await
        .expect("Failed to reactivate batch");

    let dump = session
        .dump_interfaces(&DumpFilter::all())
        .await
        .expect("Failed to dump interfaces");
    let routes = session
        .dump_routes(DEFAULT_TABLE)
        .await
        .expect("Failed to dump routes");
    let report = verify::check_lifecycle(&dump, &routes, &handles);
    assert!(report.passed(), "{report}");

    let requests = probe::build_requests(&REQUESTER, &handles).expect("Failed to build probes");
    port.inject(requests[0].frame.clone())
        .await
        .expect("Failed to inject probe");
    let frames = port
        .expect(1, CAPTURE_TIMEOUT)
        .await
        .expect("Reactivated interface must answer");
    let records = probe::classify(&frames);
    let report = probe::verify_all_responded(&records, &handles, &REQUESTER);
    assert!(report.passed(), "{report}");
}

#[tokio::test]
async fn test_session_releases_interfaces_when_scenario_fails() {
    let _ = tracing_subscriber::fmt::try_init();

    let engine = SimEngine::new();
    let mut session = Session::new(engine);

    let result: anyhow::Result<()> = session
        .run(async |s| {
            let mut handles = lifecycle::create_batch(s, InterfaceKind::Loopback, 5).await?;
            let plan = AddressPlan::host_routes(Ipv4Addr::new(10, 0, 3, 1));
            lifecycle::activate_batch(s, &mut handles, &plan).await?;
            anyhow::bail!("scenario aborted mid-flight");
        })
        .await;
    assert!(result.is_err());

    // The session cleaned up: only the management interface remains.
    let dump = session
        .dump_interfaces(&DumpFilter::all())
        .await
        .expect("Failed to dump interfaces");
    assert_eq!(dump.len(), 1);
    assert_eq!(dump.records()[0].name, MGMT_NAME);
    assert_eq!(session.live_indices().count(), 0);
}
