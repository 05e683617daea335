//! Integration tests for the ACL core against the simulated device
//!
//! Covers the full lifecycle from key-type compilation to binding, the
//! behavioral guarantees of each component and the all-or-nothing handling
//! of device failures.

use std::net::Ipv4Addr;
use std::sync::Arc;

use flexacl::{
    Action, AclCore, AclCoreConfig, AclEvent, AclType, AttachPoint, BasicKey, BindTarget,
    BindingState, Direction, DirectionSet, ErrorKind, EventKind, ForwardTarget, KeyMatch,
    ObjectKind, PriorityRange, RecordingSink, Rule, RuleLookup,
};
use flexacl_common::Query;
use flexacl_hw::{
    GroupId, HwStatus, KeyTypeId, PortId, RegionId, SimDevice, SimOp,
};
use pretty_assertions::assert_eq;

/// Test fixture: an ACL core over a fresh simulated device
struct TestSetup {
    core: AclCore,
    sim: Arc<SimDevice>,
}

impl TestSetup {
    fn new() -> Self {
        Self::with_config(AclCoreConfig::default())
    }

    fn with_config(config: AclCoreConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let sim = Arc::new(SimDevice::new());
        let core = AclCore::new(config, sim.clone()).unwrap();
        Self { core, sim }
    }

    fn key_type(&mut self, fields: &[BasicKey]) -> KeyTypeId {
        self.core.create_key_type(fields, None).unwrap()
    }

    fn region(&mut self, capacity: u32) -> RegionId {
        let kt = self.key_type(&[BasicKey::DstIp, BasicKey::IpProto]);
        self.core.create_region(kt, capacity).unwrap()
    }

    fn group(&mut self, priority: u32) -> GroupId {
        let g = self.core.create_group(Direction::Ingress).unwrap();
        self.core.set_group_priority(g, priority).unwrap();
        g
    }

    fn priorities(&self, region: RegionId) -> Vec<u32> {
        self.core
            .get_rules(region, RuleLookup::Scan { max: usize::MAX }, true)
            .unwrap()
            .entries
            .into_iter()
            .filter_map(|e| e.rule.map(|r| r.priority))
            .collect()
    }
}

fn p100() -> AttachPoint {
    AttachPoint::Port(PortId(100))
}

fn tagged(priority: u32) -> Rule {
    Rule::new(priority).with_key(BasicKey::IpProto, KeyMatch::exact(u64::from(priority % 256)))
}

#[test]
fn test_end_to_end_forwarding_rule() {
    let mut setup = TestSetup::new();
    let kt = setup.key_type(&[BasicKey::SrcIp, BasicKey::DstIp, BasicKey::L4DstPort]);
    let region = setup.core.create_region(kt, 100).unwrap();
    assert!(setup.core.region_hw_size(region).unwrap() >= 100);

    let rule = Rule::new(1)
        .with_key(BasicKey::DstIp, KeyMatch::ipv4(Ipv4Addr::new(10, 0, 0, 1), 32))
        .with_action(Action::Forward(ForwardTarget::NextHop(42)));
    setup.core.set_rules(region, &[0], &[rule]).unwrap();

    let acl = setup
        .core
        .create_acl(AclType::Agnostic, Direction::Ingress, DirectionSet::empty(), &[region])
        .unwrap();
    setup
        .core
        .bind(p100(), Direction::Ingress, BindTarget::Acl(acl))
        .unwrap();
    assert_eq!(
        setup.core.binding_primary(p100(), Direction::Ingress).unwrap(),
        BindTarget::Acl(acl)
    );

    assert!(!setup.core.activity(region, 0, false).unwrap());
    assert!(!setup.core.activity(region, 0, false).unwrap());
    assert!(setup.sim.record_hit(region, 0));
    assert!(setup.core.activity(region, 0, false).unwrap());
    assert!(setup.core.activity(region, 0, true).unwrap());
    assert!(!setup.core.activity(region, 0, false).unwrap());

    let blocks: Vec<u16> = setup
        .core
        .key_type_blocks(kt)
        .unwrap()
        .iter()
        .map(|b| b.0)
        .collect();
    assert_eq!(setup.sim.region_key_blocks(region), Some(blocks));
    assert_eq!(setup.sim.acl_regions(acl), Some(vec![region]));
    let image = setup.sim.rule_at(region, 0).unwrap();
    assert_eq!(image.keys[0].value, 0x0A00_0001);
    assert_eq!(image.actions[0].arg, 42);
}

#[test]
fn test_interning_is_idempotent() {
    let mut setup = TestSetup::new();
    let a = setup.key_type(&[BasicKey::DstIp, BasicKey::L4DstPort]);
    let b = setup.key_type(&[BasicKey::L4DstPort, BasicKey::DstIp, BasicKey::DstIp]);
    assert_eq!(a, b);
    assert_eq!(setup.core.stats().key_types_created, 1);
    assert_eq!(setup.core.key_types(Query::Count).unwrap().total, 1);
}

#[test]
fn test_resize_preserves_rules() {
    let mut setup = TestSetup::new();
    let region = setup.region(20);
    let offsets = [0, 7, 13, 19];
    let rules: Vec<Rule> = offsets.iter().map(|o| tagged(o + 1)).collect();
    setup.core.set_rules(region, &offsets, &rules).unwrap();
    let before = setup
        .core
        .get_rules(region, RuleLookup::Targeted(&offsets), true)
        .unwrap();

    let hw = setup.core.resize_region(region, 200).unwrap();
    assert_eq!(hw, 256);
    let after = setup
        .core
        .get_rules(region, RuleLookup::Targeted(&offsets), true)
        .unwrap();
    assert_eq!(before, after);
    assert_eq!(setup.sim.rule_count(region), 4);
}

#[test]
fn test_resize_too_small_leaves_region_unchanged() {
    let mut setup = TestSetup::new();
    let region = setup.region(64);
    setup.core.set_rules(region, &[40], &[tagged(3)]).unwrap();
    let info = setup.core.region_info(region).unwrap();

    let err = setup.core.resize_region(region, 40).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert_eq!(setup.core.region_info(region).unwrap(), info);
    assert_eq!(setup.sim.region_hw_size(region), Some(64));
    assert_eq!(setup.priorities(region), vec![3]);
}

#[test]
fn test_move_block_relocates_rules() {
    let mut setup = TestSetup::new();
    let region = setup.region(32);
    setup
        .core
        .set_rules(region, &[5, 6, 7, 30], &[tagged(5), tagged(6), tagged(7), tagged(30)])
        .unwrap();

    setup.core.move_block(region, 5, 3, 20).unwrap();

    let moved = setup
        .core
        .get_rules(region, RuleLookup::Targeted(&[20, 21, 22]), true)
        .unwrap();
    let rules: Vec<Option<Rule>> = moved.entries.into_iter().map(|e| e.rule).collect();
    assert_eq!(rules, vec![Some(tagged(5)), Some(tagged(6)), Some(tagged(7))]);

    // 20..22 were empty before the move, so 5..7 are empty now
    let source = setup
        .core
        .get_rules(region, RuleLookup::Targeted(&[5, 6, 7]), false)
        .unwrap();
    assert!(source.entries.iter().all(|e| !e.occupied));
    assert_eq!(source.total, 4);
    assert_eq!(setup.sim.rule_at(region, 21).map(|i| i.priority), Some(6));
}

#[test]
fn test_move_block_swaps_occupied_destination() {
    let mut setup = TestSetup::new();
    let region = setup.region(32);
    let offsets = [5, 6, 7, 20, 21, 22];
    let rules: Vec<Rule> = offsets.iter().map(|o| tagged(*o)).collect();
    setup.core.set_rules(region, &offsets, &rules).unwrap();

    setup.core.move_block(region, 5, 3, 20).unwrap();

    let listing = setup
        .core
        .get_rules(region, RuleLookup::Targeted(&offsets), true)
        .unwrap();
    let priorities: Vec<Option<u32>> = listing
        .entries
        .iter()
        .map(|e| e.rule.as_ref().map(|r| r.priority))
        .collect();
    assert_eq!(
        priorities,
        vec![Some(20), Some(21), Some(22), Some(5), Some(6), Some(7)]
    );
    assert_eq!(listing.total, 6);
    assert_eq!(setup.sim.rule_at(region, 6).map(|i| i.priority), Some(21));
    assert_eq!(setup.sim.rule_at(region, 21).map(|i| i.priority), Some(6));

    let err = setup.core.move_block(region, 0, 0, 4).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParam);
    let err = setup.core.move_block(region, 30, 3, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParam);
}

#[test]
fn test_move_block_carries_activity() {
    let mut setup = TestSetup::new();
    let region = setup.region(32);
    setup
        .core
        .set_rules(region, &[5, 20], &[tagged(5), tagged(20)])
        .unwrap();
    let acl = setup
        .core
        .create_acl(AclType::Agnostic, Direction::Ingress, DirectionSet::empty(), &[region])
        .unwrap();
    setup
        .core
        .bind(p100(), Direction::Ingress, BindTarget::Acl(acl))
        .unwrap();
    assert!(setup.sim.record_hit(region, 5));

    setup.core.move_block(region, 5, 1, 20).unwrap();

    assert_eq!(
        setup.core.peek_activity(region, &[5, 20]).unwrap(),
        vec![false, true]
    );
    assert!(setup.core.activity(region, 20, true).unwrap());
    assert!(!setup.core.activity(region, 20, false).unwrap());
    assert!(!setup.core.activity(region, 5, true).unwrap());
}

#[test]
fn test_mutually_exclusive_actions() {
    let mut setup = TestSetup::new();
    let region = setup.region(8);

    let two_forwards = Rule::new(1)
        .with_action(Action::forward_next_hop(1))
        .with_action(Action::Forward(ForwardTarget::Discard));
    let err = setup.core.set_rules(region, &[0], &[two_forwards]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParam);

    let two_mirrors = Rule::new(1)
        .with_action(Action::forward_next_hop(1))
        .with_action(Action::Mirror { session: 1 })
        .with_action(Action::Mirror { session: 2 });
    let err = setup.core.set_rules(region, &[0], &[two_mirrors]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParam);

    let mixed = Rule::new(1)
        .with_action(Action::forward_next_hop(1))
        .with_action(Action::Mirror { session: 1 })
        .with_action(Action::Trap { trap_id: 3 });
    setup.core.set_rules(region, &[0], &[mixed]).unwrap();
    assert_eq!(setup.core.region_info(region).unwrap().used, 1);
}

#[test]
fn test_narrow_group_priority_range() {
    let mut setup = TestSetup::with_config(AclCoreConfig {
        group_priority: PriorityRange {
            min: 1,
            max: 0xF,
            default: 8,
        },
        ..AclCoreConfig::default()
    });
    let g = setup.group(15);
    assert_eq!(
        setup.core.set_group_priority(g, 20).unwrap_err().kind(),
        ErrorKind::InvalidParam
    );
    assert_eq!(setup.core.group(g).unwrap().priority, 15);
}

#[test]
fn test_binding_order_follows_priority() {
    let mut setup = TestSetup::new();
    let g1 = setup.group(10);
    let g2 = setup.group(20);
    let g3 = setup.group(15);

    for g in [g1, g2, g3] {
        setup.core.bind_add(p100(), Direction::Ingress, g).unwrap();
    }
    let all = setup.core.binding_all(p100(), Direction::Ingress, None).unwrap();
    assert_eq!(
        all.targets,
        vec![
            BindTarget::Group(g2),
            BindTarget::Group(g3),
            BindTarget::Group(g1)
        ]
    );
    assert_eq!(
        setup.core.binding_state(p100(), Direction::Ingress),
        BindingState::BoundMultiple
    );

    // a later priority change does not reorder existing bindings
    setup.core.set_group_priority(g1, 30).unwrap();
    let all = setup.core.binding_all(p100(), Direction::Ingress, Some(1)).unwrap();
    assert_eq!(all.total, 3);
    assert_eq!(all.targets, vec![BindTarget::Group(g2)]);

    setup.core.bind_add(p100(), Direction::Ingress, g1).unwrap();
    assert_eq!(setup.core.stats().binds, 3);

    setup.core.bind_delete(p100(), Direction::Ingress, g2).unwrap();
    assert_eq!(
        setup.core.binding_primary(p100(), Direction::Ingress).unwrap(),
        BindTarget::Group(g3)
    );
    assert_eq!(
        setup
            .core
            .bind_delete(p100(), Direction::Ingress, g2)
            .unwrap_err()
            .kind(),
        ErrorKind::EntryNotFound
    );

    setup.core.unbind(p100(), Direction::Ingress).unwrap();
    assert_eq!(
        setup.core.binding_state(p100(), Direction::Ingress),
        BindingState::Unbound
    );
    assert!(setup.sim.binding(p100(), Direction::Ingress).is_empty());
}

#[test]
fn test_destroy_region_in_use() {
    let mut setup = TestSetup::new();
    let region = setup.region(16);
    let acl = setup
        .core
        .create_acl(AclType::Agnostic, Direction::Ingress, DirectionSet::empty(), &[region])
        .unwrap();
    assert_eq!(
        setup.core.destroy_region(region).unwrap_err().kind(),
        ErrorKind::ResourceInUse
    );
    setup.core.destroy_acl(acl).unwrap();
    setup.core.destroy_region(region).unwrap();
    assert_eq!(
        setup.core.region_info(region).unwrap_err().kind(),
        ErrorKind::EntryNotFound
    );
    assert_eq!(setup.sim.region_hw_size(region), None);
}

#[test]
fn test_priority_shift_collision() {
    let mut setup = TestSetup::new();
    let region = setup.region(16);
    setup
        .core
        .set_rules(
            region,
            &[0, 1, 2, 3],
            &[tagged(1), tagged(2), tagged(3), tagged(10)],
        )
        .unwrap();

    let err = setup.core.shift_priority(region, 1, 3, 7).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParam);
    assert_eq!(setup.priorities(region), vec![1, 2, 3, 10]);

    setup.core.shift_priority(region, 1, 3, 6).unwrap();
    assert_eq!(setup.priorities(region), vec![7, 8, 9, 10]);
    assert_eq!(setup.sim.rule_at(region, 0).map(|i| i.priority), Some(7));

    setup.core.shift_priority(region, 7, 10, -6).unwrap();
    assert_eq!(setup.priorities(region), vec![1, 2, 3, 4]);
}

#[test]
fn test_device_failures_leave_model_unchanged() {
    let mut setup = TestSetup::new();
    let region = setup.region(16);
    setup.core.set_rules(region, &[1], &[tagged(1)]).unwrap();

    setup.sim.fail_next(SimOp::WriteRules, HwStatus::TableFull);
    let err = setup.core.set_rules(region, &[1, 2], &[tagged(5), tagged(6)]);
    assert_eq!(err.unwrap_err().kind(), ErrorKind::HardwareFailure);
    assert_eq!(setup.priorities(region), vec![1]);

    setup.sim.fail_next(SimOp::MoveRules, HwStatus::Failure);
    assert!(setup.core.move_block(region, 0, 4, 8).is_err());
    assert_eq!(setup.core.region_info(region).unwrap().used, 1);
    assert_eq!(setup.sim.rule_count(region), 1);

    setup.sim.fail_next(SimOp::ClearRules, HwStatus::Failure);
    assert!(setup.core.delete_all_rules(region).is_err());
    assert_eq!(setup.priorities(region), vec![1]);

    setup.sim.fail_next(SimOp::ProgramAcl, HwStatus::NoMemory);
    let err = setup
        .core
        .create_acl(AclType::Agnostic, Direction::Ingress, DirectionSet::empty(), &[region])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HardwareFailure);
    assert_eq!(setup.core.acls(Query::Count).unwrap().total, 0);

    let g = setup.core.create_group(Direction::Ingress).unwrap();
    setup.sim.fail_next(SimOp::RemoveGroup, HwStatus::ObjectInUse);
    assert!(setup.core.destroy_group(g).is_err());
    assert!(setup.core.group(g).is_ok());
    assert_eq!(setup.sim.group_members(g), Some((vec![], None)));

    // rejected requests never reach the device
    let calls = setup.sim.call_count();
    assert!(setup.core.set_rules(region, &[16], &[tagged(1)]).is_err());
    assert_eq!(setup.sim.call_count(), calls);

    setup.sim.fail_next(SimOp::DestroyRegion, HwStatus::Failure);
    assert!(setup.core.destroy_region(region).is_err());
    assert!(setup.core.region(region).is_ok());

    assert_eq!(setup.core.stats().hw_failures, 6);
}

#[test]
fn test_events_are_delivered_for_subscribed_kinds() {
    let mut setup = TestSetup::new();
    let sink = Arc::new(RecordingSink::new());
    setup.core.set_event_sink(sink.clone());
    setup.core.subscribe(EventKind::BindingChanged);
    setup.core.subscribe(EventKind::ActivityCleared);
    setup.core.subscribe(EventKind::ObjectDeleted);

    let region = setup.region(8);
    setup.core.set_rules(region, &[2], &[tagged(2)]).unwrap();
    let acl = setup
        .core
        .create_acl(AclType::Agnostic, Direction::Egress, DirectionSet::empty(), &[region])
        .unwrap();
    let port = AttachPoint::Port(PortId(3));

    setup.sim.fail_next(SimOp::ProgramBinding, HwStatus::Failure);
    assert!(setup
        .core
        .bind(port, Direction::Egress, BindTarget::Acl(acl))
        .is_err());
    assert!(sink.is_empty());

    setup
        .core
        .bind(port, Direction::Egress, BindTarget::Acl(acl))
        .unwrap();
    setup.sim.record_hit(region, 2);
    assert!(setup.core.activity(region, 2, true).unwrap());
    // nothing left to clear, so no second event
    assert!(!setup.core.activity(region, 2, true).unwrap());
    setup.core.unbind(port, Direction::Egress).unwrap();
    setup.core.destroy_acl(acl).unwrap();

    assert_eq!(
        sink.take(),
        vec![
            AclEvent::BindingChanged {
                point: port,
                direction: Direction::Egress
            },
            AclEvent::ActivityCleared {
                region: region.as_raw(),
                offset: 2
            },
            AclEvent::BindingChanged {
                point: port,
                direction: Direction::Egress
            },
            AclEvent::ObjectDeleted {
                kind: ObjectKind::Acl,
                id: acl.as_raw()
            },
        ]
    );
}

#[test]
fn test_stale_handles_are_rejected() {
    let mut setup = TestSetup::new();
    let old = setup.region(8);
    setup.core.destroy_region(old).unwrap();
    let new = setup.region(8);
    assert_eq!(old.index(), new.index());
    assert_ne!(old, new);
    assert_eq!(
        setup.core.set_rules(old, &[0], &[tagged(1)]).unwrap_err().kind(),
        ErrorKind::EntryNotFound
    );
}

#[test]
fn test_rif_bindings() {
    let mut setup = TestSetup::new();
    let region = setup.region(8);
    let acl = setup
        .core
        .create_acl(
            AclType::Agnostic,
            Direction::MultiPoints,
            DirectionSet::RIF_INGRESS | DirectionSet::INGRESS,
            &[region],
        )
        .unwrap();
    let rif = AttachPoint::Rif(flexacl_hw::RifId(9));
    assert_eq!(
        setup
            .core
            .bind(rif, Direction::Ingress, BindTarget::Acl(acl))
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidParam
    );
    setup
        .core
        .bind(rif, Direction::RifIngress, BindTarget::Acl(acl))
        .unwrap();
    setup
        .core
        .bind(p100(), Direction::Ingress, BindTarget::Acl(acl))
        .unwrap();
    assert_eq!(
        setup
            .core
            .bind(p100(), Direction::Egress, BindTarget::Acl(acl))
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidParam
    );
}
