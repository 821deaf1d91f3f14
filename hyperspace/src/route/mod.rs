//! The hyperspace router: greedy geometric forwarding over the
//! hyperbolic embedding, with bounded flooding as the discovery
//! fallback.
//!
//! The router is fully synchronous per packet: the MAC hands it one
//! packet at a time and acts on the returned decision. It owns the
//! routing table and the flood dedupe cache; neighbour coordinates are
//! read from the MAC's neighbour table.

pub mod cache;
pub mod coord;
pub mod frag;
pub mod table;

use hyperspace_frame::{
    CoordOption, HopByHopHeader, Ipv6Header, OPTION_REDIRECT, NEXT_HEADER_HOP_BY_HOP,
};

use crate::mac::neighbors::NeighborTable;
use crate::mac::Error;
use crate::time::Asn;

use cache::PacketIdCache;
use coord::{hyperbolic_distance, RoutingCoord};
use table::RoutingTable;

/// What to do with a packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Forward {
    /// The packet is addressed to this node; hand it up the stack.
    Deliver,
    /// Send to this strictly-closer neighbour.
    Unicast([u8; 8]),
    /// First sighting of a flooded packet: rebroadcast this many times.
    Flood(u8),
    /// A repeated flood sighting; drop silently.
    Duplicate,
    /// Local minimum without being the destination.
    NoRoute,
}

/// A coordinate-staleness notification the caller may send back toward a
/// packet's source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Redirect {
    /// Who to tell (the packet's source).
    pub to: [u8; 8],
    /// The destination whose coordinate was stale.
    pub about: [u8; 8],
    /// The superseding coordinate and sequence.
    pub new_coord: RoutingCoord,
    /// See [`new_coord`](Self::new_coord).
    pub new_seq: u8,
    /// The stale coordinate and sequence the packet carried.
    pub old_coord: RoutingCoord,
    /// See [`old_coord`](Self::old_coord).
    pub old_seq: u8,
}

/// The outcome of a forwarding decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// What to do with the packet (possibly rewritten in place).
    pub action: Forward,
    /// An optional staleness notification for the reverse path.
    pub redirect: Option<Redirect>,
}

/// The link-layer address implied by an IPv6 address: the interface
/// identifier is the node's 64-bit hardware address verbatim.
pub fn link_addr_of(ipv6: &[u8; 16]) -> [u8; 8] {
    let mut addr = [0u8; 8];
    addr.copy_from_slice(&ipv6[8..16]);
    addr
}

/// The hyperspace router.
pub struct Router {
    link_addr: [u8; 8],
    coord: RoutingCoord,
    coord_seq: u8,
    table: RoutingTable,
    cache: PacketIdCache,
    next_packet_id: u16,
    flood_k: u8,
}

impl Router {
    /// Create a router for the node with the given link address.
    pub fn new(link_addr: [u8; 8], flood_k: u8) -> Self {
        Self {
            link_addr,
            coord: RoutingCoord::ORIGIN,
            coord_seq: 0,
            table: RoutingTable::new(),
            cache: PacketIdCache::new(),
            next_packet_id: 0,
            flood_k,
        }
    }

    /// Publish this node's own routing coordinate (from the location
    /// engine).
    pub fn set_own_coord(&mut self, coord: RoutingCoord, seq: u8) {
        self.coord = coord;
        self.coord_seq = seq;
    }

    /// This node's routing coordinate and sequence.
    pub fn own_coord(&self) -> (RoutingCoord, u8) {
        (self.coord, self.coord_seq)
    }

    /// Read access to the routing table, for diagnostics.
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Originate a packet: splice the hop-by-hop coordinate option in
    /// after the IPv6 header. Returns the new length; `out` must hold
    /// `packet.len() + 24` bytes. The packet id is preserved across the
    /// fragments the caller may cut afterwards.
    pub fn originate(&mut self, packet: &[u8], out: &mut [u8]) -> Result<usize, Error> {
        const HDR: usize = Ipv6Header::<&[u8]>::LEN;
        const HBH: usize = HopByHopHeader::<&[u8]>::COORD_LEN;

        let header = Ipv6Header::new(packet).map_err(|_| Error::FrameTooLarge)?;
        if out.len() < packet.len() + HBH {
            return Err(Error::FrameTooLarge);
        }

        let inner_next = header.next_header();
        let dst_link = link_addr_of(&header.dst());

        out[..HDR].copy_from_slice(&packet[..HDR]);
        out[HDR + HBH..packet.len() + HBH].copy_from_slice(&packet[HDR..]);
        {
            let mut header = Ipv6Header::new_unchecked(&mut out[..]);
            header.set_next_header(NEXT_HEADER_HOP_BY_HOP);
            header.set_payload_length(packet.len() + HBH - HDR);
        }

        let packet_id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1);

        {
            let mut hbh = HopByHopHeader::new_unchecked(&mut out[HDR..HDR + HBH]);
            hbh.emit_coord(inner_next);
            let mut option = hbh.coord_option_mut().ok_or(Error::FrameTooLarge)?;
            option.set_packet_id(packet_id);
            option.set_src_seq(self.coord_seq);
            option.set_src_coord(self.coord.r, self.coord.theta);
            match self.table.lookup(&dst_link) {
                Some(entry) => {
                    option.set_dst_seq(entry.coord_seq);
                    option.set_dst_coord(entry.coord.r, entry.coord.theta);
                }
                None => {
                    // Unknown destination: flood.
                    option.set_dst_seq(0);
                    option.set_dst_coord(f32::NAN, f32::NAN);
                }
            }
        }

        Ok(packet.len() + HBH)
    }

    /// Decide what to do with a received (or just-originated) packet,
    /// refreshing coordinates in both directions between the packet and
    /// the routing table.
    pub fn forward(
        &mut self,
        packet: &mut [u8],
        neighbors: &NeighborTable,
        now: Asn,
    ) -> Decision {
        const HDR: usize = Ipv6Header::<&[u8]>::LEN;

        let mut decision = Decision { action: Forward::NoRoute, redirect: None };

        let Ok(header) = Ipv6Header::new(&packet[..]) else {
            return decision;
        };
        if header.next_header() != NEXT_HEADER_HOP_BY_HOP {
            // No coordinate option: local delivery is all we can do.
            if link_addr_of(&header.dst()) == self.link_addr {
                decision.action = Forward::Deliver;
            }
            return decision;
        }
        let src_link = link_addr_of(&header.src());
        let dst_link = link_addr_of(&header.dst());

        let Ok(hbh) = HopByHopHeader::new(&packet[HDR..]) else {
            return decision;
        };
        let Some(option_offset) = hbh.coord_option_offset() else {
            // A redirect option rides alone: its packet's source address
            // names the moved node, the src fields carry the superseding
            // coordinate. Control plane only, consumed here.
            if let Some(content) = hbh.option(OPTION_REDIRECT) {
                if let Ok(option) = CoordOption::new(content) {
                    let (r, theta) = option.src_coord();
                    self.table.observe(
                        src_link,
                        RoutingCoord { r, theta },
                        option.src_seq(),
                        now,
                    );
                    decision.action = Forward::Duplicate;
                }
            }
            return decision;
        };
        let option_at = HDR + option_offset;
        let (packet_id, src_seq, src_coord, dst_seq, mut dst_coord) = {
            let Ok(option) = CoordOption::new(&packet[option_at..]) else {
                return decision;
            };
            let (sr, st) = option.src_coord();
            let (dr, dt) = option.dst_coord();
            (
                option.packet_id(),
                option.src_seq(),
                RoutingCoord { r: sr, theta: st },
                option.dst_seq(),
                RoutingCoord { r: dr, theta: dt },
            )
        };

        // Rule 1: a newer source coordinate refreshes the table.
        self.table.observe(src_link, src_coord, src_seq, now);

        // Rule 2, symmetric: the packet's destination coordinate and the
        // table supersede each other by sequence.
        if !dst_coord.is_flood() {
            self.table.observe(dst_link, dst_coord, dst_seq, now);
        }
        if let Some(entry) = self.table.lookup(&dst_link) {
            if crate::time::seq_newer(entry.coord_seq, dst_seq) || dst_coord.is_flood() {
                let (new_coord, new_seq) = (entry.coord, entry.coord_seq);
                let mut option = CoordOption::new(&mut packet[option_at..])
                    .expect("option bounds were just checked");
                option.set_dst_seq(new_seq);
                option.set_dst_coord(new_coord.r, new_coord.theta);
                if !dst_coord.is_flood() {
                    decision.redirect = Some(Redirect {
                        to: src_link,
                        about: dst_link,
                        new_coord,
                        new_seq,
                        old_coord: dst_coord,
                        old_seq: dst_seq,
                    });
                }
                dst_coord = new_coord;
            }
        }

        if dst_link == self.link_addr {
            // Flood copies and link retries reach us more than once; the
            // id cache collapses them to one delivery.
            decision.action = if self.cache.insert(&src_link, packet_id) {
                Forward::Deliver
            } else {
                Forward::Duplicate
            };
            return decision;
        }

        // Rule 3: flood fallback with dedupe.
        if dst_coord.is_flood() {
            decision.action = if self.cache.insert(&src_link, packet_id) {
                Forward::Flood(self.flood_k)
            } else {
                Forward::Duplicate
            };
            return decision;
        }

        // Rule 4: greedy step, strictly decreasing hyperbolic distance.
        let own_distance = hyperbolic_distance(self.coord, dst_coord);
        let mut best: Option<([u8; 8], f32)> = None;
        for neighbor in neighbors.iter() {
            let Some((r, theta)) = neighbor.routing_coord else {
                continue;
            };
            let d = hyperbolic_distance(RoutingCoord { r, theta }, dst_coord);
            if d < own_distance && best.map_or(true, |(_, bd)| d < bd) {
                best = Some((neighbor.link_addr, d));
            }
        }

        decision.action = match best {
            Some((addr, _)) => Forward::Unicast(addr),
            None => Forward::NoRoute,
        };
        decision
    }

    /// Build a redirect packet carrying option 0x23 toward a stale
    /// sender. The packet's source address names the moved node the
    /// option is about. Returns the packet length; `out` needs 64 bytes.
    pub fn emit_redirect(&mut self, redirect: &Redirect, out: &mut [u8]) -> usize {
        const HDR: usize = Ipv6Header::<&[u8]>::LEN;
        const HBH: usize = HopByHopHeader::<&[u8]>::COORD_LEN;

        let mut src_ip = [0u8; 16];
        src_ip[0] = 0xfe;
        src_ip[1] = 0x80;
        src_ip[8..].copy_from_slice(&redirect.about);
        let mut dst_ip = [0u8; 16];
        dst_ip[0] = 0xfe;
        dst_ip[1] = 0x80;
        dst_ip[8..].copy_from_slice(&redirect.to);

        {
            let mut header = Ipv6Header::new_unchecked(&mut out[..HDR]);
            header.set_version();
            header.set_payload_length(HBH);
            header.set_next_header(NEXT_HEADER_HOP_BY_HOP);
            header.set_hop_limit(64);
            header.set_src(&src_ip);
            header.set_dst(&dst_ip);
        }
        {
            let mut hbh = HopByHopHeader::new_unchecked(&mut out[HDR..HDR + HBH]);
            hbh.emit_coord(hyperspace_frame::NEXT_HEADER_NONE);
            // Same layout as 0x22, retagged: new coordinate in the src
            // fields, the superseded one in the dst fields.
            out[HDR + 2] = OPTION_REDIRECT;
            let mut option = CoordOption::new(&mut out[HDR + 4..HDR + HBH])
                .expect("the coordinate header was just emitted");
            option.set_src_seq(redirect.new_seq);
            option.set_dst_seq(redirect.old_seq);
            let id = self.next_packet_id;
            self.next_packet_id = self.next_packet_id.wrapping_add(1);
            option.set_packet_id(id);
            option.set_src_coord(redirect.new_coord.r, redirect.new_coord.theta);
            option.set_dst_coord(redirect.old_coord.r, redirect.old_coord.theta);
        }

        HDR + HBH
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::lattice::LatticePoint;
    use crate::route::coord::embed;

    const HDR: usize = Ipv6Header::<&[u8]>::LEN;

    fn ip_of(link: [u8; 8]) -> [u8; 16] {
        let mut ip = [0u8; 16];
        ip[0] = 0xfe;
        ip[1] = 0x80;
        ip[8..].copy_from_slice(&link);
        ip
    }

    fn plain_packet(src: [u8; 8], dst: [u8; 8], payload: &[u8]) -> std::vec::Vec<u8> {
        let mut packet = vec![0u8; HDR + payload.len()];
        let mut header = Ipv6Header::new_unchecked(&mut packet[..]);
        header.set_version();
        header.set_payload_length(payload.len());
        header.set_next_header(hyperspace_frame::NEXT_HEADER_NONE);
        header.set_hop_limit(64);
        header.set_src(&ip_of(src));
        header.set_dst(&ip_of(dst));
        packet[HDR..].copy_from_slice(payload);
        packet
    }

    fn neighbors_at(points: &[([u8; 8], LatticePoint)]) -> NeighborTable {
        let mut table = NeighborTable::new();
        for (addr, point) in points {
            let coord = embed(*point);
            table.heard(*addr, Asn::new(1)).routing_coord = Some((coord.r, coord.theta));
        }
        table
    }

    #[test]
    fn origination_inserts_the_option() {
        let mut router = Router::new([1; 8], 3);
        router.set_own_coord(embed(LatticePoint::new(1, 0, 0)), 4);

        let packet = plain_packet([1; 8], [2; 8], b"hello");
        let mut out = [0u8; 256];
        let len = router.originate(&packet, &mut out).unwrap();
        assert_eq!(len, packet.len() + 24);

        let header = Ipv6Header::new(&out[..len]).unwrap();
        assert_eq!(header.next_header(), NEXT_HEADER_HOP_BY_HOP);
        let hbh = HopByHopHeader::new(&out[HDR..len]).unwrap();
        assert_eq!(hbh.next_header(), hyperspace_frame::NEXT_HEADER_NONE);
        let option = hbh.coord_option().unwrap();
        assert_eq!(option.src_seq(), 4);
        // Unknown destination floods.
        assert!(option.is_flood());
        assert_eq!(&out[len - 5..len], b"hello");
    }

    #[test]
    fn greedy_forwarding_makes_progress() {
        // This node at (2,0,0); destination at the origin; neighbours at
        // (1,0,0) and (3,0,0). The hop toward the origin wins.
        let me = [10; 8];
        let dst = [99; 8];
        let mut router = Router::new(me, 3);
        router.set_own_coord(embed(LatticePoint::new(2, 0, 0)), 1);
        router.table.observe(dst, embed(LatticePoint::ORIGIN), 5, Asn::new(1));

        let closer = [11; 8];
        let farther = [12; 8];
        let neighbors = neighbors_at(&[
            (closer, LatticePoint::new(1, 0, 0)),
            (farther, LatticePoint::new(3, 0, 0)),
        ]);

        let packet = plain_packet([1; 8], dst, b"x");
        let mut wrapped = [0u8; 256];
        let len = router.originate(&packet, &mut wrapped).unwrap();

        let decision = router.forward(&mut wrapped[..len], &neighbors, Asn::new(3));
        assert_eq!(decision.action, Forward::Unicast(closer));
    }

    #[test]
    fn local_minimum_is_no_route() {
        let me = [10; 8];
        let dst = [99; 8];
        let mut router = Router::new(me, 3);
        router.set_own_coord(embed(LatticePoint::new(1, 0, 0)), 1);
        router.table.observe(dst, embed(LatticePoint::ORIGIN), 5, Asn::new(1));

        // The only neighbour is farther out than we are.
        let neighbors = neighbors_at(&[([12; 8], LatticePoint::new(2, 0, 0))]);

        let packet = plain_packet([1; 8], dst, b"x");
        let mut wrapped = [0u8; 256];
        let len = router.originate(&packet, &mut wrapped).unwrap();
        let decision = router.forward(&mut wrapped[..len], &neighbors, Asn::new(3));
        assert_eq!(decision.action, Forward::NoRoute);
    }

    #[test]
    fn delivery_at_the_destination() {
        let me = [7; 8];
        let mut router = Router::new(me, 3);
        let mut origin_router = Router::new([1; 8], 3);

        let packet = plain_packet([1; 8], me, b"payload");
        let mut wrapped = [0u8; 256];
        let len = origin_router.originate(&packet, &mut wrapped).unwrap();

        let neighbors = NeighborTable::new();
        let decision = router.forward(&mut wrapped[..len], &neighbors, Asn::new(2));
        assert_eq!(decision.action, Forward::Deliver);
    }

    #[test]
    fn flood_dedupes_on_second_sighting() {
        let mut source = Router::new([1; 8], 3);
        let mut relay = Router::new([10; 8], 3);

        let packet = plain_packet([1; 8], [99; 8], b"x");
        let mut wrapped = [0u8; 256];
        let len = source.originate(&packet, &mut wrapped).unwrap();

        let neighbors = NeighborTable::new();
        let first = relay.forward(&mut wrapped[..len], &neighbors, Asn::new(2));
        assert_eq!(first.action, Forward::Flood(3));
        let second = relay.forward(&mut wrapped[..len], &neighbors, Asn::new(3));
        assert_eq!(second.action, Forward::Duplicate);
    }

    #[test]
    fn stale_destination_coordinate_is_rewritten() {
        // S6: the destination moved from seq 5 to seq 6. A relay that
        // knows seq 6 rewrites the packet and still forwards it.
        let me = [10; 8];
        let dst = [99; 8];
        let mut source = Router::new([1; 8], 3);
        let mut relay = Router::new(me, 3);

        let old_coord = embed(LatticePoint::new(2, 0, 0));
        let new_coord = embed(LatticePoint::new(1, 0, 0));

        source.table.observe(dst, old_coord, 5, Asn::new(1));
        relay.table.observe(dst, new_coord, 6, Asn::new(1));
        relay.set_own_coord(embed(LatticePoint::new(2, 0, 0)), 1);

        let packet = plain_packet([1; 8], dst, b"x");
        let mut wrapped = [0u8; 256];
        let len = source.originate(&packet, &mut wrapped).unwrap();

        let neighbors = neighbors_at(&[(dst, LatticePoint::new(1, 0, 0))]);
        let decision = relay.forward(&mut wrapped[..len], &neighbors, Asn::new(3));

        // Forwarded toward the *new* coordinate.
        assert_eq!(decision.action, Forward::Unicast(dst));
        let hbh = HopByHopHeader::new(&wrapped[HDR..len]).unwrap();
        let option = hbh.coord_option().unwrap();
        assert_eq!(option.dst_seq(), 6);
        // And the reverse path learns about the move.
        let redirect = decision.redirect.unwrap();
        assert_eq!(redirect.to, [1; 8]);
        assert_eq!(redirect.new_seq, 6);
        assert_eq!(redirect.old_seq, 5);
    }

    #[test]
    fn flood_is_bounded_by_k_times_n() {
        // One flooded packet across a fully-connected mesh of n relays:
        // every relay rebroadcasts at most flood_k times, so the total
        // transmission count is bounded by flood_k * n.
        let n = 6usize;
        let flood_k = 3u8;
        let mut source = Router::new([1; 8], flood_k);
        let mut relays: std::vec::Vec<Router> = (0..n)
            .map(|i| Router::new([i as u8 + 10; 8], flood_k))
            .collect();

        let packet = plain_packet([1; 8], [99; 8], b"x");
        let mut wrapped = [0u8; 256];
        let len = source.originate(&packet, &mut wrapped).unwrap();

        let neighbors = NeighborTable::new();
        let mut transmissions = 0usize;
        // Every copy of every rebroadcast reaches every relay.
        let mut pending = vec![wrapped[..len].to_vec()];
        while let Some(on_air) = pending.pop() {
            for relay in relays.iter_mut() {
                let mut copy = on_air.clone();
                match relay.forward(&mut copy, &neighbors, Asn::new(1)).action {
                    Forward::Flood(copies) => {
                        transmissions += copies as usize;
                        for _ in 0..copies {
                            pending.push(copy.clone());
                        }
                    }
                    Forward::Duplicate => {}
                    other => panic!("unexpected action {other:?}"),
                }
            }
        }

        assert!(transmissions <= flood_k as usize * n);
        assert!(transmissions > 0);
    }

    #[test]
    fn redirect_packet_round_trips() {
        let mut router = Router::new([10; 8], 3);
        let redirect = Redirect {
            to: [1; 8],
            about: [99; 8],
            new_coord: RoutingCoord { r: 2.0, theta: 1.0 },
            new_seq: 6,
            old_coord: RoutingCoord { r: 5.0, theta: 0.5 },
            old_seq: 5,
        };
        let mut out = [0u8; 64];
        let len = router.emit_redirect(&redirect, &mut out);

        let header = Ipv6Header::new(&out[..len]).unwrap();
        assert_eq!(link_addr_of(&header.dst()), [1; 8]);
        assert_eq!(link_addr_of(&header.src()), [99; 8]);
        let hbh = HopByHopHeader::new(&out[HDR..len]).unwrap();
        let option = hbh.option(OPTION_REDIRECT).unwrap();
        let option = CoordOption::new(option).unwrap();
        assert_eq!(option.src_seq(), 6);
        assert_eq!(option.dst_seq(), 5);
        assert_eq!(option.src_coord(), (2.0, 1.0));

        // The stale sender consumes the redirect and learns the move.
        let mut receiver = Router::new([1; 8], 3);
        let neighbors = NeighborTable::new();
        let decision = receiver.forward(&mut out[..len], &neighbors, Asn::new(9));
        assert_eq!(decision.action, Forward::Duplicate);
        let entry = receiver.table.lookup(&[99; 8]).unwrap();
        assert_eq!(entry.coord_seq, 6);
        assert_eq!(entry.coord.r, 2.0);
    }
}
