//! 舵机总线编解码与位姿模型的属性测试

use arm_protocol::*;
use proptest::prelude::*;

fn sync_write_for(pose: &ArmPose) -> BusPacket {
    let entries = pose.sync_entries();
    let refs: Vec<(u8, &[u8])> = entries.iter().map(|(id, p)| (*id, p.as_slice())).collect();
    build_sync_write(REG_GOAL_POSITION_L, JOINT_PARAM_LEN, &refs).unwrap()
}

fn arb_pose() -> impl Strategy<Value = ArmPose> {
    (
        prop::array::uniform6((any::<u16>(), any::<u16>(), any::<u16>())),
        any::<u32>(),
    )
        .prop_map(|(joints, settle)| {
            ArmPose::new(joints.map(|(p, d, s)| JointTarget::new(p, d, s)), settle)
        })
}

proptest! {
    #[test]
    fn ping_checksum_verifies(id in any::<u8>()) {
        let pkt = build_ping(id);
        prop_assert_eq!(pkt.len(), 6);
        prop_assert!(pkt.verify_checksum());
        prop_assert_eq!(BusPacket::from_bytes(pkt.as_bytes()).unwrap(), pkt);
    }

    #[test]
    fn read_checksum_verifies(id in any::<u8>(), addr in any::<u8>(), len in any::<u8>()) {
        let pkt = build_read(id, addr, len);
        prop_assert_eq!(pkt.len(), 8);
        prop_assert!(pkt.verify_checksum());
        prop_assert_eq!(pkt.params(), &[addr, len][..]);
    }

    #[test]
    fn write_checksum_verifies(
        id in any::<u8>(),
        addr in any::<u8>(),
        payload in prop::collection::vec(any::<u8>(), 0..32),
    ) {
        let pkt = build_write(id, addr, &payload).unwrap();
        prop_assert!(pkt.verify_checksum());
        prop_assert_eq!(pkt.length_field() as usize, payload.len() + 3);
        prop_assert_eq!(&pkt.params()[1..], payload.as_slice());
    }

    #[test]
    fn sync_write_layout(pose in arb_pose()) {
        let pkt = sync_write_for(&pose);
        let bytes = pkt.as_bytes();

        prop_assert_eq!(bytes.len(), 8 + JOINT_COUNT * 7);
        prop_assert!(pkt.verify_checksum());
        prop_assert_eq!(pkt.device_id(), BROADCAST_ID);
        for i in 0..JOINT_COUNT {
            let entry = &bytes[7 + i * 7..7 + (i + 1) * 7];
            prop_assert_eq!(entry[0], BASE_ID + i as u8);
            prop_assert_eq!(&entry[1..], &pose.joints[i].encode()[..]);
        }
    }

    #[test]
    fn corrupted_byte_is_detected(
        id in any::<u8>(),
        payload in prop::collection::vec(any::<u8>(), 1..16),
        flip in 1u8..=255,
        at in any::<prop::sample::Index>(),
    ) {
        let pkt = build_write(id, REG_GOAL_POSITION_L, &payload).unwrap();
        let mut bytes = pkt.as_bytes().to_vec();
        // 只破坏参数区，长度字段保持不变
        let pos = idx::PARAM_0 + at.index(bytes.len() - idx::PARAM_0 - 1);
        bytes[pos] ^= flip;
        let is_checksum_mismatch = matches!(
            BusPacket::from_bytes(&bytes),
            Err(ProtocolError::ChecksumMismatch { .. })
        );
        prop_assert!(is_checksum_mismatch);
    }

    #[test]
    fn joint_target_always_in_range(p in any::<u16>(), d in any::<u16>(), s in any::<u16>()) {
        let t = JointTarget::new(p, d, s);
        prop_assert!(t.position() <= POSITION_MAX);
        prop_assert!(t.speed() <= SPEED_MAX);
        prop_assert_eq!(t.duration_ms(), d);
        if p <= POSITION_MAX {
            prop_assert_eq!(t.position(), p);
        }
    }

    #[test]
    fn arbitrary_command_buffers_never_panic(buf in prop::collection::vec(any::<u8>(), 0..24)) {
        match ArmCommand::parse(&buf) {
            Ok(cmd) => prop_assert!(buf.len() >= cmd.op_code().min_len()),
            Err(ProtocolError::Empty) => prop_assert!(buf.is_empty()),
            Err(ProtocolError::UnknownOpCode(op)) => prop_assert_eq!(op, buf[0]),
            Err(ProtocolError::TooShort { expected, actual, .. }) => {
                prop_assert!(actual < expected);
            },
            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
        }
    }
}

#[test]
fn status_packet_roundtrip_through_wire() {
    let reply = StatusPacket::new(3, 0, &2048u16.to_le_bytes());
    let wire = reply.to_bytes();
    assert_eq!(wire.len(), StatusPacket::expected_len(2));
    let parsed = StatusPacket::parse(&wire).unwrap();
    assert_eq!(parsed.data_u16_le(), Some(2048));
    assert_eq!(parsed.device_id, 3);
}
