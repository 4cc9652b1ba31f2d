//! 指令调度集成测试（模拟总线 + 内存存储）

use arm_bus::MockTransport;
use arm_driver::*;
use arm_protocol::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct RecordingNotifier {
    pushed: Mutex<Vec<Vec<u8>>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, bytes: &[u8]) {
        self.pushed.lock().push(bytes.to_vec());
    }
}

struct Rig {
    mock: MockTransport,
    store: Arc<MemoryPositionStore>,
    player: Arc<SequencePlayer>,
    dispatcher: CommandDispatcher,
}

fn rig() -> Rig {
    let mock = MockTransport::with_arm(POSITION_CENTER);
    let bus = Arc::new(ServoBus::new(mock.clone()));
    let store = Arc::new(MemoryPositionStore::new());
    let player = Arc::new(SequencePlayer::spawn(bus.clone(), store.clone()).unwrap());
    let dispatcher = CommandDispatcher::new(
        bus,
        store.clone(),
        player.clone(),
        DispatcherConfig::default(),
    );
    Rig {
        mock,
        store,
        player,
        dispatcher,
    }
}

#[test]
fn test_short_set_joint_produces_no_bus_traffic() {
    let rig = rig();
    let outcome = rig
        .dispatcher
        .dispatch(&[0x01, 0x02, 0x00, 0x08, 0xE8, 0x03], None);
    assert!(matches!(
        outcome,
        DispatchOutcome::Dropped(DriverError::Protocol(ProtocolError::TooShort {
            expected: 7,
            actual: 6,
            ..
        }))
    ));
    assert_eq!(rig.mock.sent_count(), 0);
}

#[test]
fn test_malformed_buffers_are_dropped() {
    let rig = rig();
    assert!(matches!(
        rig.dispatcher.dispatch(&[], None),
        DispatchOutcome::Dropped(DriverError::Protocol(ProtocolError::Empty))
    ));
    assert!(matches!(
        rig.dispatcher.dispatch(&[0x99, 0x00, 0x00], None),
        DispatchOutcome::Dropped(DriverError::Protocol(ProtocolError::UnknownOpCode(0x99)))
    ));
    assert!(matches!(
        rig.dispatcher.dispatch(&[0x02; 16], None),
        DispatchOutcome::Dropped(_)
    ));
    assert_eq!(rig.mock.sent_count(), 0);
}

#[test]
fn test_set_joint_writes_mapped_servo() {
    let rig = rig();
    let cmd = ArmCommand::SetJoint {
        joint_id: 4,
        position: 1000,
        duration_ms: 500,
        speed: 300,
    };
    let outcome = rig.dispatcher.dispatch(&cmd.encode(), None);
    assert!(outcome.is_executed());

    let sent = rig.mock.sent_packets();
    assert_eq!(sent.len(), 1);
    let pkt = BusPacket::from_bytes(&sent[0]).unwrap();
    assert_eq!(pkt.device_id(), 5);
    assert_eq!(pkt.instruction(), Some(Instruction::Write));
    assert_eq!(
        rig.mock.servo(5).unwrap().goal(),
        JointTarget::new(1000, 500, 300)
    );
}

#[test]
fn test_set_joint_clamps_out_of_range_values() {
    let rig = rig();
    let cmd = ArmCommand::SetJoint {
        joint_id: 0,
        position: 5000,
        duration_ms: 100,
        speed: 9000,
    };
    assert!(rig.dispatcher.dispatch(&cmd.encode(), None).is_executed());
    let goal = rig.mock.servo(1).unwrap().goal();
    assert_eq!(goal.position(), 4095);
    assert_eq!(goal.speed(), 4095);
}

#[test]
fn test_set_joint_invalid_joint_is_dropped() {
    let rig = rig();
    let cmd = ArmCommand::SetJoint {
        joint_id: 6,
        position: 100,
        duration_ms: 100,
        speed: 100,
    };
    assert!(matches!(
        rig.dispatcher.dispatch(&cmd.encode(), None),
        DispatchOutcome::Dropped(DriverError::InvalidJoint(6))
    ));
    assert_eq!(rig.mock.sent_count(), 0);
}

#[test]
fn test_set_all_joints_single_sync_write() {
    let rig = rig();
    let cmd = ArmCommand::SetAllJoints {
        positions: [10, 20, 30, 40, 50, 60],
        duration_ms: 700,
        speed: 400,
    };
    assert!(rig.dispatcher.dispatch(&cmd.encode(), None).is_executed());

    assert_eq!(rig.mock.sent_count(), 1);
    assert_eq!(rig.mock.count_instruction(Instruction::SyncWrite), 1);
    for i in 0..JOINT_COUNT {
        let goal = rig.mock.servo(BASE_ID + i as u8).unwrap().goal();
        assert_eq!(goal, JointTarget::new((i as u16 + 1) * 10, 700, 400));
    }
}

#[test]
fn test_save_position_reads_live_pose() {
    let rig = rig();
    rig.mock.add_servo(3, 1111);
    rig.mock.set_online(6, false);

    let cmd = ArmCommand::SavePosition {
        slot: 2,
        settle_delay_ms: 750,
    };
    assert!(rig.dispatcher.dispatch(&cmd.encode(), None).is_executed());

    let pose = rig.store.load(2).unwrap();
    assert_eq!(pose.settle_delay_ms, 750);
    assert_eq!(pose.positions(), [2048, 2048, 1111, 2048, 2048, 2048]);
    for joint in pose.joints {
        assert_eq!(joint.duration_ms(), 1000);
        assert_eq!(joint.speed(), 1000);
    }
    // 只有读请求，没有写
    assert_eq!(rig.mock.count_instruction(Instruction::Read), JOINT_COUNT);
    assert_eq!(rig.mock.sent_count(), JOINT_COUNT);
}

#[test]
fn test_save_invalid_slot_is_not_attempted() {
    let rig = rig();
    let cmd = ArmCommand::SavePosition {
        slot: 16,
        settle_delay_ms: 0,
    };
    assert!(matches!(
        rig.dispatcher.dispatch(&cmd.encode(), None),
        DispatchOutcome::Dropped(DriverError::Store(StoreError::InvalidSlot(16)))
    ));
    assert_eq!(rig.mock.sent_count(), 0);
}

#[test]
fn test_load_position() {
    let rig = rig();
    let load = ArmCommand::LoadPosition {
        slot: 5,
        settle_delay_ms: 9999,
    };

    assert!(matches!(
        rig.dispatcher.dispatch(&load.encode(), None),
        DispatchOutcome::Failed(
            OpCode::LoadPosition,
            DriverError::Store(StoreError::NotFound { slot: 5 })
        )
    ));
    assert_eq!(rig.mock.sent_count(), 0);

    let pose = ArmPose::uniform([300, 400, 500, 600, 700, 800], 900, 100, 0);
    rig.store.save(5, &pose).unwrap();
    assert!(rig.dispatcher.dispatch(&load.encode(), None).is_executed());
    assert_eq!(rig.mock.count_instruction(Instruction::SyncWrite), 1);
    assert_eq!(rig.mock.present_position(6), Some(800));
}

#[test]
fn test_bus_failure_is_reported_not_fatal() {
    let rig = rig();
    rig.mock.set_truncate_writes(true);
    let outcome = rig.dispatcher.dispatch(&[0x08], None);
    assert!(matches!(
        outcome,
        DispatchOutcome::Failed(OpCode::HomePosition, DriverError::Bus(_))
    ));

    rig.mock.set_truncate_writes(false);
    assert!(rig.dispatcher.dispatch(&[0x08], None).is_executed());
}

#[test]
fn test_home_position() {
    let rig = rig();
    let scatter = ArmCommand::SetAllJoints {
        positions: [0; JOINT_COUNT],
        duration_ms: 0,
        speed: 0,
    };
    assert!(rig.dispatcher.dispatch(&scatter.encode(), None).is_executed());

    assert!(rig.dispatcher.dispatch(&[0x08], None).is_executed());
    for i in 0..JOINT_COUNT {
        let goal = rig.mock.servo(BASE_ID + i as u8).unwrap().goal();
        assert_eq!(goal, JointTarget::new(2048, 2000, 1000));
    }
}

#[test]
fn test_start_and_stop_sequence() {
    let rig = rig();
    rig.store
        .save(0, &ArmPose::uniform([100; JOINT_COUNT], 300, 100, 0))
        .unwrap();

    let start = ArmCommand::StartSequence {
        start_slot: 0,
        end_slot: 0,
        looping: true,
    };
    assert!(rig.dispatcher.dispatch(&start.encode(), None).is_executed());
    assert!(rig.player.is_running());

    assert!(rig.dispatcher.dispatch(&[0x06], None).is_executed());
    assert_eq!(rig.player.state(), PlayerState::Idle);
    assert!(rig.player.wait_until_idle(Duration::ZERO));
}

#[test]
fn test_start_invalid_range_is_dropped() {
    let rig = rig();
    for (start, end) in [(3, 1), (0, 16)] {
        let cmd = ArmCommand::StartSequence {
            start_slot: start,
            end_slot: end,
            looping: false,
        };
        assert!(matches!(
            rig.dispatcher.dispatch(&cmd.encode(), None),
            DispatchOutcome::Dropped(DriverError::Player(PlayerError::InvalidRange { .. }))
        ));
    }
    assert_eq!(rig.player.state(), PlayerState::Idle);
}

#[test]
fn test_get_status_notifies_session() {
    let rig = rig();
    rig.mock.add_servo(2, 4000);
    rig.mock.set_online(1, false);

    let notifier = Arc::new(RecordingNotifier::default());
    let session = Session::new(1, notifier.clone());
    assert!(rig.dispatcher.dispatch(&[0x07], Some(&session)).is_executed());

    let pushed = notifier.pushed.lock();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].len(), STATUS_PAYLOAD_LEN);
    let status = ArmStatus::decode(&pushed[0]).unwrap();
    assert!(!status.is_moving);
    assert_eq!(status.current_slot, 0);
    assert_eq!(status.positions, [2048, 4000, 2048, 2048, 2048, 2048]);
}

#[test]
fn test_status_reports_playback() {
    let rig = rig();
    rig.store
        .save(7, &ArmPose::uniform([100; JOINT_COUNT], 300, 100, 0))
        .unwrap();
    rig.player.start(7, 7, true).unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(1);
    while rig.player.current_slot().is_none() {
        assert!(std::time::Instant::now() < deadline);
        std::thread::sleep(Duration::from_millis(2));
    }

    let status = rig.dispatcher.status();
    assert!(status.is_moving);
    assert_eq!(status.current_slot, 7);
    rig.player.stop();
}
