use super::*;
use crate::config::Config;
use crate::proto::Transport;
use crate::sock::SockType;

const LOCAL: Ipv4Address = Ipv4Address::new(10, 0, 0, 1);
const OTHER_LOCAL: Ipv4Address = Ipv4Address::new(10, 0, 0, 2);
const REMOTE: Ipv4Address = Ipv4Address::new(192, 168, 7, 9);

struct Table {
    socks: SlotMap<Sock>,
    registry: Registry,
}

impl Table {
    fn new(size: usize) -> Self {
        Table { socks: SlotMap::new(), registry: Registry::new(size) }
    }

    fn sock(&mut self, saddr: Ipv4Address, daddr: Ipv4Address, dport: u16) -> SocketKey {
        let mut sk = Sock::new(&Config::default(), SockType::Stream, Transport::Tcp, 6);
        sk.saddr = saddr;
        sk.daddr = daddr;
        sk.dport = dport;
        SocketKey { key: self.socks.insert(sk) }
    }

    fn bind(&mut self, port: u16, saddr: Ipv4Address, daddr: Ipv4Address, dport: u16) -> SocketKey {
        let key = self.sock(saddr, daddr, dport);
        self.registry.insert(&mut self.socks, key, port).unwrap();
        key
    }

    fn best(&self, port: u16, local: Ipv4Address, remote: Ipv4Address, remote_port: u16) -> Option<SocketKey> {
        self.registry.lookup_best(&self.socks, FourTuple {
            local,
            remote,
            local_port: port,
            remote_port,
        })
    }
}

/// Checks that every bucket holds only ports hashing to it and keeps specific before wildcard.
fn assert_well_formed(table: &Table) {
    for (index, bucket) in table.registry.buckets.iter().enumerate() {
        let mut seen_wildcard = false;
        for key in bucket {
            let sk = table.socks.get(key.key).expect("bucket references a live sock");
            assert_eq!(table.registry.bucket_index(sk.num), index);
            assert_ne!(sk.num, 0);
            if sk.saddr.is_unspecified() {
                seen_wildcard = true;
            } else {
                assert!(!seen_wildcard, "specific sock after a wildcard in bucket {}", index);
            }
        }
    }

    let total: usize = table.registry.buckets.iter().map(Vec::len).sum();
    assert_eq!(total, table.registry.inuse());
}

#[test]
fn insert_orders_by_specificity() {
    let mut table = Table::new(8);
    let wild = table.bind(80, Ipv4Address::UNSPECIFIED, Ipv4Address::UNSPECIFIED, 0);
    let specific = table.bind(80, LOCAL, Ipv4Address::UNSPECIFIED, 0);
    let second_wild = table.bind(88, Ipv4Address::UNSPECIFIED, Ipv4Address::UNSPECIFIED, 0);
    let second_specific = table.bind(80, OTHER_LOCAL, Ipv4Address::UNSPECIFIED, 0);

    assert_eq!(table.registry.bucket(80), [specific, second_specific, wild, second_wild]);
    assert_eq!(table.registry.inuse(), 4);
    assert_eq!(table.registry.highest_inuse(), 4);
    assert_well_formed(&table);
}

#[test]
fn remove_is_idempotent() {
    let mut table = Table::new(8);
    let a = table.bind(80, Ipv4Address::UNSPECIFIED, Ipv4Address::UNSPECIFIED, 0);
    let b = table.bind(81, LOCAL, Ipv4Address::UNSPECIFIED, 0);

    assert!(table.registry.remove(a, 80));
    assert!(!table.registry.remove(a, 80));
    assert_eq!(table.registry.inuse(), 1);
    assert_eq!(table.registry.highest_inuse(), 2);
    assert!(table.registry.contains(b));
    assert!(!table.registry.contains(a));
}

#[test]
fn random_sequences_stay_well_formed() {
    let mut table = Table::new(4);
    let mut live: Vec<(SocketKey, u16)> = Vec::new();
    let mut seed: u32 = 0x2545_f491;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        seed
    };

    for _ in 0..500 {
        let roll = next();
        if roll % 3 == 0 && !live.is_empty() {
            let (key, port) = live.swap_remove(roll as usize / 3 % live.len());
            assert!(table.registry.remove(key, port));
        } else {
            let port = 1 + (next() % 40) as u16;
            let saddr = if next() % 2 == 0 { LOCAL } else { Ipv4Address::UNSPECIFIED };
            let key = table.bind(port, saddr, Ipv4Address::UNSPECIFIED, 0);
            live.push((key, port));
        }
        assert_well_formed(&table);
    }
}

#[test]
fn best_match_prefers_connected() {
    let mut table = Table::new(8);
    let listener = table.bind(80, Ipv4Address::UNSPECIFIED, Ipv4Address::UNSPECIFIED, 0);
    let bound = table.bind(80, LOCAL, Ipv4Address::UNSPECIFIED, 0);
    let connected = table.bind(80, LOCAL, REMOTE, 4000);

    assert_eq!(table.best(80, LOCAL, REMOTE, 4000), Some(connected));
    assert_eq!(table.best(80, LOCAL, REMOTE, 4001), Some(bound));
    assert_eq!(table.best(80, OTHER_LOCAL, REMOTE, 4000), Some(listener));
    assert_eq!(table.best(81, LOCAL, REMOTE, 4000), None);
}

#[test]
fn best_match_ignores_colliding_ports() {
    let mut table = Table::new(8);
    // 88 hashes to the same bucket as 80.
    table.bind(88, Ipv4Address::UNSPECIFIED, Ipv4Address::UNSPECIFIED, 0);
    assert_eq!(table.best(80, LOCAL, REMOTE, 1), None);
}

#[test]
fn best_match_ties_go_to_first_seen() {
    let mut table = Table::new(8);
    let first = table.bind(80, Ipv4Address::UNSPECIFIED, Ipv4Address::UNSPECIFIED, 0);
    let _second = table.bind(80, Ipv4Address::UNSPECIFIED, Ipv4Address::UNSPECIFIED, 0);
    assert_eq!(table.best(80, LOCAL, REMOTE, 1), Some(first));
}

#[test]
fn best_match_skips_dead_and_closed() {
    let mut table = Table::new(8);
    let dead = table.bind(80, LOCAL, REMOTE, 4000);
    let wild = table.bind(80, Ipv4Address::UNSPECIFIED, Ipv4Address::UNSPECIFIED, 0);
    {
        let sk = table.socks.get_mut(dead.key).unwrap();
        sk.dead = true;
        sk.state = TcpState::Closed;
    }
    assert_eq!(table.best(80, LOCAL, REMOTE, 4000), Some(wild));

    // Dead but still closing is a valid target.
    table.socks.get_mut(dead.key).unwrap().state = TcpState::FinWait1;
    assert_eq!(table.best(80, LOCAL, REMOTE, 4000), Some(dead));
}

#[test]
fn exact_chain_fans_out() {
    let mut table = Table::new(8);
    let a = table.bind(17, LOCAL, Ipv4Address::UNSPECIFIED, 0);
    let b = table.bind(17, Ipv4Address::UNSPECIFIED, Ipv4Address::UNSPECIFIED, 0);
    let _other_peer = table.bind(17, Ipv4Address::UNSPECIFIED, Ipv4Address::new(1, 2, 3, 4), 0);
    let c = table.bind(17, Ipv4Address::UNSPECIFIED, REMOTE, 9);

    let (first, next) = table.registry
        .lookup_exact(&table.socks, table.registry.chain(17), 17, LOCAL, REMOTE, None)
        .unwrap();
    assert_eq!(first, a);
    let (second, _) = table.registry
        .lookup_exact(&table.socks, next, 17, LOCAL, REMOTE, None)
        .unwrap();
    assert_eq!(second, b);

    let all: Vec<_> = table.registry
        .exact_matches(&table.socks, 17, LOCAL, REMOTE, None)
        .collect();
    assert_eq!(all, [a, b, c]);

    let multicast: Vec<_> = table.registry
        .exact_matches(&table.socks, 17, LOCAL, REMOTE, Some(10))
        .collect();
    assert_eq!(multicast, [a, b]);
}

#[test]
fn allocate_empty_table() {
    let table = Table::new(4);
    let mut cursor = PortCursor::default();
    let port = table.registry.allocate(&table.socks, &mut cursor, 0, 1024, 16).unwrap();
    // Rotating base 1025, first scanned bucket is empty.
    assert_eq!(port, 1026);

    let again = table.registry.allocate(&table.socks, &mut cursor, 0, 1024, 16).unwrap();
    assert_eq!(again, 1027);
}

#[test]
fn allocate_skips_occupied_buckets() {
    let mut table = Table::new(4);
    table.bind(1026, LOCAL, Ipv4Address::UNSPECIFIED, 0);
    let mut cursor = PortCursor::default();
    let port = table.registry.allocate(&table.socks, &mut cursor, 0, 1024, 16).unwrap();
    assert_eq!(port, 1027);
    assert!(!table.registry.in_use(&table.socks, port));
}

#[test]
fn allocate_probes_least_occupied_bucket() {
    let mut table = Table::new(4);
    // Fill every bucket, the bucket of 1027 only once.
    for port in [1026, 1030, 1027, 1028, 1032, 1029, 1033] {
        table.bind(port, Ipv4Address::UNSPECIFIED, Ipv4Address::UNSPECIFIED, 0);
    }

    let mut cursor = PortCursor::default();
    let port = table.registry.allocate(&table.socks, &mut cursor, 0, 1024, 16).unwrap();
    assert_eq!(port, 1031);
    assert_eq!(table.registry.bucket_index(port), table.registry.bucket_index(1027));
}

#[test]
fn allocate_honors_high_hint() {
    let table = Table::new(4);
    let mut cursor = PortCursor::default();
    let port = table.registry.allocate(&table.socks, &mut cursor, 5000, 1024, 16).unwrap();
    assert_eq!(port, 5001);
}

#[test]
fn allocate_reserved_hint_moves_above_threshold() {
    let table = Table::new(4);
    let mut cursor = PortCursor::default();
    let port = table.registry.allocate(&table.socks, &mut cursor, 80, 1024, 16).unwrap();
    assert!(port > 1024);
}

#[test]
fn allocate_exhaustion_is_reported() {
    let mut table = Table::new(1);
    for port in 1026..1030 {
        table.bind(port, Ipv4Address::UNSPECIFIED, Ipv4Address::UNSPECIFIED, 0);
    }

    let mut cursor = PortCursor::default();
    let result = table.registry.allocate(&table.socks, &mut cursor, 0, 1024, 4);
    assert_eq!(result, Err(Error::Exhausted));

    // The top of the port space wraps around to the free port below the bound ones.
    let result = table.registry.allocate(&table.socks, &mut cursor, u16::MAX, 1024, 4);
    assert_eq!(result, Ok(1025));
}

#[test]
fn allocate_wraps_past_top_port() {
    let table = Table::new(4);
    let mut cursor = PortCursor::default();
    let port = table.registry.allocate(&table.socks, &mut cursor, u16::MAX, 1024, 16).unwrap();
    assert_eq!(port, 1028);
    assert_eq!(table.registry.bucket_index(port), 0);

    let port = table.registry.allocate(&table.socks, &mut cursor, u16::MAX - 1, 1024, 16).unwrap();
    assert_eq!(port, u16::MAX);
}

#[test]
fn allocate_wrapped_probe_stays_in_bucket() {
    let mut table = Table::new(4);
    for port in 65532..=65535 {
        table.bind(port, Ipv4Address::UNSPECIFIED, Ipv4Address::UNSPECIFIED, 0);
    }

    let mut cursor = PortCursor::default();
    let port = table.registry.allocate(&table.socks, &mut cursor, 65531, 1024, 16).unwrap();
    assert!(port > 1024);
    assert_eq!(table.registry.bucket_index(port), 0);
    assert!(!table.registry.in_use(&table.socks, port));
}

#[test]
fn allocate_never_repeats_a_bound_port() {
    let mut table = Table::new(4);
    let mut cursor = PortCursor::default();
    let mut seen = Vec::new();

    // Past the first four the buckets are all occupied and every port comes from probing.
    for _ in 0..64 {
        let port = table.registry.allocate(&table.socks, &mut cursor, 0, 1024, 256).unwrap();
        assert!(port > 1024);
        assert!(!seen.contains(&port), "port {} handed out twice", port);
        seen.push(port);
        table.bind(port, Ipv4Address::UNSPECIFIED, Ipv4Address::UNSPECIFIED, 0);
    }

    assert_eq!(table.registry.inuse(), 64);
    assert_well_formed(&table);
}
