//! End-to-end update sessions against the simulated device

use std::sync::Arc;

use fmota::config::MockConfig;
use fmota::protocol::{crc16_modbus, CommandKind, ConfigRecord};
use fmota::transport::mock::{MockFaults, MockTransportAdapter, STATUS_REJECTED};
use fmota::transport::TransportAdapter;
use fmota::{
    run_session, FlashError, FlashTarget, MemoryMap, OtaConfig, OtaError, RebootRequest, Slot,
    UpdatePlan,
};
use pretty_assertions::assert_eq;

const CONFIG_ADDRESS: u32 = 0x7E000;

fn mock() -> Arc<MockTransportAdapter> {
    Arc::new(MockTransportAdapter::new(&MockConfig::default()))
}

fn data(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

fn frames(mock: &MockTransportAdapter, kind: CommandKind) -> Vec<Vec<u8>> {
    mock.sent_frames()
        .into_iter()
        .filter(|f| CommandKind::from_frame(f) == Some(kind))
        .collect()
}

fn frame_address(frame: &[u8]) -> u32 {
    u32::from_le_bytes([frame[2], frame[3], frame[4], frame[5]])
}

#[tokio::test]
async fn test_application_update() {
    let mock = mock();
    let map = MemoryMap::default();
    let app = data(300, 1);
    let plan = UpdatePlan::new().with_image(map.place(Slot::Application, app.clone()).unwrap());

    let report = run_session(mock.clone(), &OtaConfig::default(), &plan, None)
        .await
        .unwrap();

    assert_eq!(report.version_string(), "BL-1.0.0");
    assert_eq!(report.regions.len(), 1);
    assert_eq!(report.regions[0].slot, Slot::Application);
    assert_eq!(report.regions[0].region.crc, crc16_modbus(&app));
    assert_eq!(report.config_record, Some(ConfigRecord::application(300)));
    assert_eq!(report.reboot_status, None);

    // Image chunks, in order, at consecutive addresses
    let writes: Vec<(u32, usize)> = frames(&mock, CommandKind::Write)
        .iter()
        .map(|f| (frame_address(f), f.len() - 6))
        .collect();
    assert_eq!(
        writes,
        vec![
            (0x40000, 128),
            (0x40080, 128),
            (0x40100, 44),
            (CONFIG_ADDRESS, 16),
        ]
    );

    assert_eq!(mock.flash(0x40000, 300), app);
    assert_eq!(
        mock.flash(CONFIG_ADDRESS, 16),
        ConfigRecord::application(300).encode().to_vec()
    );
    assert!(!mock.is_connected().await);
}

#[tokio::test]
async fn test_command_order() {
    let mock = mock();
    let map = MemoryMap::default();
    let plan = UpdatePlan::new()
        .with_image(map.place(Slot::Application, data(10, 2)).unwrap())
        .with_read_config(true)
        .with_reboot(RebootRequest::Reset);

    run_session(mock.clone(), &OtaConfig::default(), &plan, None)
        .await
        .unwrap();

    let order: Vec<CommandKind> = mock
        .sent_frames()
        .iter()
        .filter_map(|f| CommandKind::from_frame(f))
        .collect();
    assert_eq!(
        order,
        vec![
            CommandKind::ReadVersion,
            CommandKind::Erase,
            CommandKind::Write,
            CommandKind::Verify,
            CommandKind::Erase,
            CommandKind::Write,
            CommandKind::Verify,
            CommandKind::ReadConfig,
            CommandKind::Reboot,
        ]
    );
}

#[tokio::test]
async fn test_system_update_skips_application() {
    let mock = mock();
    let map = MemoryMap::default();
    let sd = data(0x1000, 3);
    let bl = data(0x800, 4);
    let plan = UpdatePlan::new()
        .with_image(map.place(Slot::SoftDevice, sd.clone()).unwrap())
        .with_image(map.place(Slot::Bootloader, bl.clone()).unwrap())
        .with_image(map.place(Slot::Application, data(0x2000, 5)).unwrap());

    let report = run_session(mock.clone(), &OtaConfig::default(), &plan, None)
        .await
        .unwrap();

    let slots: Vec<Slot> = report.regions.iter().map(|r| r.slot).collect();
    assert_eq!(slots, vec![Slot::SoftDevice, Slot::Bootloader]);
    assert_eq!(report.skipped, vec![Slot::Application]);
    assert_eq!(
        report.config_record,
        Some(ConfigRecord::system(0x800, 0x1000))
    );

    // Only the soft-device landed in the shared staging area
    assert_eq!(mock.flash(0x40000, 0x1000), sd);
    assert_eq!(mock.flash(0x41000, 4), vec![0xFF; 4]);
    assert_eq!(mock.flash(0x65000, 0x800), bl);

    let erased: Vec<u32> = frames(&mock, CommandKind::Erase)
        .iter()
        .map(|f| frame_address(f))
        .collect();
    assert_eq!(erased, vec![0x40000, 0x65000, CONFIG_ADDRESS]);
}

#[tokio::test]
async fn test_bootloader_only_record() {
    let mock = mock();
    let plan = UpdatePlan::new().with_image(
        MemoryMap::default()
            .place(Slot::Bootloader, data(200, 6))
            .unwrap(),
    );

    let report = run_session(mock.clone(), &OtaConfig::default(), &plan, None)
        .await
        .unwrap();

    assert_eq!(report.config_record, Some(ConfigRecord::system(200, 0)));
}

#[tokio::test]
async fn test_crc_mismatch_aborts_before_config_record() {
    let mock = mock();
    mock.set_faults(MockFaults {
        corrupt_crc: true,
        ..Default::default()
    });
    let plan = UpdatePlan::new()
        .with_image(
            MemoryMap::default()
                .place(Slot::Application, data(300, 7))
                .unwrap(),
        )
        .with_reboot(RebootRequest::Reset);

    let err = run_session(mock.clone(), &OtaConfig::default(), &plan, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OtaError::Flash {
            target: FlashTarget::Image(Slot::Application),
            source: FlashError::CrcMismatch { .. },
        }
    ));
    assert!(frames(&mock, CommandKind::Write)
        .iter()
        .all(|f| frame_address(f) != CONFIG_ADDRESS));
    assert!(frames(&mock, CommandKind::Reboot).is_empty());
    assert!(!mock.is_connected().await);
}

#[tokio::test]
async fn test_rejected_chunk_aborts_session() {
    let mock = mock();
    mock.set_faults(MockFaults {
        write_status_at: Some((0x40080, STATUS_REJECTED)),
        ..Default::default()
    });
    let plan = UpdatePlan::new().with_image(
        MemoryMap::default()
            .place(Slot::Application, data(300, 8))
            .unwrap(),
    );

    let err = run_session(mock.clone(), &OtaConfig::default(), &plan, None)
        .await
        .unwrap_err();

    match err {
        OtaError::Flash {
            source: FlashError::Write { address, .. },
            ..
        } => assert_eq!(address, 0x40080),
        other => panic!("Expected write failure, got {:?}", other),
    }
    assert_eq!(frames(&mock, CommandKind::Write).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_silent_device_times_out_once() {
    let mock = mock();
    mock.set_faults(MockFaults {
        silent: true,
        ..Default::default()
    });
    let plan = UpdatePlan::new().with_read_config(true);

    let started = tokio::time::Instant::now();
    let err = run_session(mock.clone(), &OtaConfig::default(), &plan, None)
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(started.elapsed() >= std::time::Duration::from_secs(5));
    assert_eq!(mock.sent_frames(), vec![vec![0x01, 0x01]]);
    assert!(!mock.is_connected().await);
}

#[tokio::test]
async fn test_read_config_and_reboot_to_mode() {
    let mock = mock();
    let plan = UpdatePlan::new()
        .with_image(
            MemoryMap::default()
                .place(Slot::Application, data(64, 9))
                .unwrap(),
        )
        .with_read_config(true)
        .with_reboot(RebootRequest::from_flags(true, Some(3)));

    let report = run_session(mock.clone(), &OtaConfig::default(), &plan, None)
        .await
        .unwrap();

    let readout = report.readout.unwrap();
    assert_eq!(readout.status, 0x60);
    assert_eq!(readout.record, Some(ConfigRecord::application(64)));
    assert_eq!(report.reboot_status, Some(0x60));
    assert_eq!(
        frames(&mock, CommandKind::RebootToMode),
        vec![vec![0x0A, 0x22, 0x03]]
    );
    assert!(frames(&mock, CommandKind::Reboot).is_empty());
}

#[tokio::test]
async fn test_progress_covers_every_image() {
    let mock = mock();
    let map = MemoryMap::default();
    let plan = UpdatePlan::new()
        .with_image(map.place(Slot::SoftDevice, data(200, 10)).unwrap())
        .with_image(map.place(Slot::Bootloader, data(100, 11)).unwrap());
    let mut seen = Vec::new();
    let mut sink = |slot: Slot, p: fmota::FlashProgress| seen.push((slot, p.written, p.total));

    run_session(mock.clone(), &OtaConfig::default(), &plan, Some(&mut sink))
        .await
        .unwrap();

    assert_eq!(
        seen,
        vec![
            (Slot::SoftDevice, 128, 200),
            (Slot::SoftDevice, 200, 200),
            (Slot::Bootloader, 100, 100),
        ]
    );
}

#[tokio::test]
async fn test_configured_chunk_len() {
    let mock = mock();
    let config = OtaConfig::from_toml_str(
        r#"
        [transport]
        type = "mock"

        [flash]
        chunk_len = 64
        "#,
    )
    .unwrap();
    let plan = UpdatePlan::new().with_image(
        MemoryMap::default()
            .place(Slot::Application, data(300, 12))
            .unwrap(),
    );

    run_session(mock.clone(), &config, &plan, None).await.unwrap();

    let sizes: Vec<usize> = frames(&mock, CommandKind::Write)
        .iter()
        .map(|f| f.len() - 6)
        .collect();
    assert_eq!(sizes, vec![64, 64, 64, 64, 44, 16]);
}
