#[cfg(test)]
mod fence_tests {
    use std::collections::BTreeSet;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    use ipnet::Ipv4Net;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rayon::prelude::*;

    use netfence::fence::{Allocation, Fence};
    use netfence::ip::{address, AddressRange, FenceError, SubnetPool};

    fn fence(range: &str, prefix: u8) -> Fence {
        let range = AddressRange::new(range.parse().unwrap(), prefix).unwrap();
        Fence::new(Arc::new(SubnetPool::new(range)), 1500)
    }

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    /// Live allocations never share an address, and the pool records exactly them
    fn assert_consistent(fence: &Fence, live: &[Allocation]) {
        for (i, a) in live.iter().enumerate() {
            assert!(address::contains(&a.subnet(), a.container_ip()));
            assert!(!address::is_reserved(&a.subnet(), a.container_ip()));
            for b in &live[i + 1..] {
                assert!(
                    !address::overlaps(&a.subnet(), &b.subnet()),
                    "{} overlaps {}",
                    a,
                    b
                );
            }
        }

        let expected: BTreeSet<_> = live.iter().map(|a| (a.subnet(), a.container_ip())).collect();
        let recorded: BTreeSet<_> = fence
            .pool()
            .allocated_subnets()
            .into_iter()
            .flat_map(|(subnet, ips)| ips.into_iter().map(move |ip| (subnet, ip)))
            .collect();
        assert_eq!(recorded, expected);
    }

    fn random_spec(rng: &mut StdRng) -> String {
        let base = u32::from(ip("10.0.0.0"));
        match rng.gen_range(0..4) {
            0 => String::new(),
            1 => {
                // Network address of a random block: any free IP in it
                let prefix = rng.gen_range(28..=30u8);
                let size = 1u32 << (32 - prefix);
                let offset = rng.gen_range(0..(128 / size)) * size;
                format!("{}/{}", Ipv4Addr::from(base + offset), prefix)
            }
            2 => {
                // Exact host address inside a random block
                let prefix = rng.gen_range(28..=30u8);
                format!("{}/{}", Ipv4Addr::from(base + rng.gen_range(0..128)), prefix)
            }
            _ => Ipv4Addr::from(base + rng.gen_range(0..128)).to_string(),
        }
    }

    #[test]
    fn test_no_overlap_under_random_build_and_dismantle() {
        for seed in 0..8 {
            let mut rng = StdRng::seed_from_u64(seed);
            let fence = fence("10.0.0.0/25", 30);
            let mut live: Vec<Allocation> = Vec::new();

            for _ in 0..400 {
                if !live.is_empty() && rng.gen_bool(0.3) {
                    let index = rng.gen_range(0..live.len());
                    live.swap_remove(index).dismantle().unwrap();
                } else {
                    let spec = random_spec(&mut rng);
                    match fence.build(&spec) {
                        Ok(allocation) => live.push(allocation),
                        Err(FenceError::InvalidSpec { .. }) => panic!("generated spec '{}' is valid", spec),
                        Err(_) => {}
                    }
                }
                assert_consistent(&fence, &live);
            }
        }
    }

    #[test]
    fn test_serialize_rebuild_round_trip() {
        let original = fence("10.0.0.0/24", 30);
        let allocations: Vec<_> = ["", "10.0.0.64/28", "10.0.0.37/29", "10.0.0.200", ""]
            .iter()
            .map(|spec| original.build(spec).unwrap())
            .collect();

        let restarted = fence("10.0.0.0/24", 30);
        for allocation in &allocations {
            let rebuilt = restarted.rebuild(&allocation.serialize().unwrap()).unwrap();
            assert_eq!(rebuilt.subnet(), allocation.subnet());
            assert_eq!(rebuilt.container_ip(), allocation.container_ip());
            assert_eq!(rebuilt.serialize().unwrap(), allocation.serialize().unwrap());
        }
        assert_eq!(restarted.pool().allocated_subnets(), original.pool().allocated_subnets());
    }

    #[test]
    fn test_rebuild_in_same_process_conflicts() {
        let fence = fence("10.0.0.0/24", 30);
        let allocation = fence.build("").unwrap();
        assert_eq!(
            fence.rebuild(&allocation.serialize().unwrap()).unwrap_err(),
            FenceError::AddressInUse { ip: ip("10.0.0.2"), subnet: net("10.0.0.0/30") }
        );
    }

    #[test]
    fn test_release_then_reuse() {
        let fence = fence("10.0.0.0/24", 30);
        let first = fence.build("").unwrap();
        let (subnet, container_ip) = (first.subnet(), first.container_ip());
        first.dismantle().unwrap();

        let second = fence.build("").unwrap();
        assert_eq!(second.subnet(), subnet);
        assert_eq!(second.container_ip(), container_ip);
    }

    #[test]
    fn test_exhaustion_and_recovery_of_capacity() {
        let fence = fence("10.0.0.0/30", 30);
        assert_eq!(fence.capacity(), 1);

        let first = fence.build("").unwrap();
        assert_eq!(
            fence.build("").unwrap_err(),
            FenceError::SubnetsExhausted { range: net("10.0.0.0/30") }
        );

        first.dismantle().unwrap();
        let third = fence.build("").unwrap();
        assert_eq!(third.subnet(), net("10.0.0.0/30"));
    }

    #[test]
    fn test_network_address_spec_gets_dynamic_ip() {
        let any_ip = fence("10.0.0.0/24", 30);
        let allocation = any_ip.build("10.0.0.0/30").unwrap();
        assert_ne!(allocation.container_ip(), ip("10.0.0.0"));
        assert_ne!(allocation.container_ip(), allocation.host_ip());
        assert_eq!(allocation.container_ip(), ip("10.0.0.2"));

        let exact_ip = fence("10.0.0.0/24", 30);
        let allocation = exact_ip.build("10.0.0.2/30").unwrap();
        assert_eq!(allocation.container_ip(), ip("10.0.0.2"));
    }

    #[test]
    fn test_same_subnet_twice_conflicts() {
        let fence = fence("10.0.0.0/24", 30);
        let first = fence.build("10.0.0.0/30").unwrap();

        assert_eq!(
            fence.build("10.0.0.0/30").unwrap_err(),
            FenceError::SubnetOverlap { requested: net("10.0.0.0/30"), existing: net("10.0.0.0/30") }
        );
        // Partial overlap is refused too
        assert!(matches!(fence.build("10.0.0.0/29"), Err(FenceError::SubnetOverlap { .. })));

        // The first allocation is untouched and still releasable
        assert_eq!(first.container_ip(), ip("10.0.0.2"));
        first.dismantle().unwrap();
        assert!(fence.build("10.0.0.0/30").is_ok());
    }

    #[test]
    fn test_static_subnet_is_skipped_by_dynamic_allocation() {
        let fence = fence("10.0.0.0/28", 30);
        let fixed = fence.build("10.0.0.0/29").unwrap();

        let dynamic = fence.build("").unwrap();
        assert_eq!(dynamic.subnet(), net("10.0.0.8/30"));
        assert!(!address::overlaps(&fixed.subnet(), &dynamic.subnet()));
    }

    #[test]
    fn test_environment_rendering() {
        let fence = fence("10.0.0.0/24", 30);
        let allocation = fence.build("10.0.0.2/30").unwrap();
        assert_eq!(
            allocation.process_environment(),
            vec![
                "network_host_ip=10.0.0.1",
                "network_container_ip=10.0.0.2",
                "network_cidr_suffix=30",
                "container_iface_mtu=1500",
                "network_cidr=10.0.0.0/30",
            ]
        );
    }

    #[test]
    fn test_concurrent_build_and_dismantle() {
        let fence = fence("10.0.0.0/24", 30);

        let results: Vec<_> = (0..fence.capacity()).into_par_iter().map(|_| fence.build("")).collect();
        let allocations: Vec<Allocation> = results.into_iter().collect::<Result<_, _>>().unwrap();

        let subnets: BTreeSet<_> = allocations.iter().map(|a| a.subnet()).collect();
        assert_eq!(subnets.len(), 64);
        assert_consistent(&fence, &allocations);
        assert!(matches!(fence.build(""), Err(FenceError::SubnetsExhausted { .. })));

        allocations.into_par_iter().try_for_each(|a| a.dismantle()).unwrap();
        assert!(fence.pool().allocated_subnets().is_empty());
    }

    #[test]
    fn test_restart_isolates_bad_records() {
        let before = fence("10.0.0.0/24", 30);
        let healthy = before.build("").unwrap().serialize().unwrap();
        let shared_a = before.build("10.0.0.64/28").unwrap().serialize().unwrap();
        let shared_b = br#"{"Ipn":"10.0.0.64/28","ContainerIP":"10.0.0.70"}"#.to_vec();

        let after = fence("10.0.0.0/24", 30);
        let report = after.recover_all(vec![
            ("healthy", healthy),
            ("garbage", b"\x00\x01".to_vec()),
            ("shared-a", shared_a),
            ("shared-b", shared_b),
            ("clashing", br#"{"Ipn":"10.0.0.64/29","ContainerIP":"10.0.0.67"}"#.to_vec()),
            ("foreign", br#"{"Ipn":"192.168.0.0/30","ContainerIP":"192.168.0.2"}"#.to_vec()),
        ]);

        let recovered: Vec<_> = report.recovered.iter().map(|(id, _)| *id).collect();
        assert_eq!(recovered, vec!["healthy", "shared-a", "shared-b"]);

        let failed: Vec<_> = report.failed.iter().map(|(id, _)| *id).collect();
        assert_eq!(failed, vec!["garbage", "clashing", "foreign"]);
        assert!(matches!(report.failed[0].1, FenceError::MalformedState(_)));
        assert!(matches!(report.failed[1].1, FenceError::SubnetOverlap { .. }));
        assert!(matches!(report.failed[2].1, FenceError::SubnetOutOfRange { .. }));

        // New work proceeds around the recovered reservations
        let next = after.build("").unwrap();
        assert_eq!(next.subnet(), net("10.0.0.4/30"));
    }
}
