use super::{layer_params, layer_params_mut, LayerHooks, LayerParams, TCP_HDR_SIZE};
use crate::flow::Flow;
use crate::packet::{Direction, PacketBytes, PacketPlan, WireLayer};
use crate::random::RandomGenerator;
use pnet_packet::tcp::{MutableTcpPacket, TcpFlags};
use std::num::Wrapping;

pub struct Tcp {
    pub(crate) layer_number: usize,
    port_src: u16,
    port_dst: u16,
    /// Forward SEQ and reverse ACK.
    seq_fwd: Wrapping<u32>,
    /// Reverse SEQ and forward ACK.
    seq_rev: Wrapping<u32>,
    cwnd: usize,
    rwnd: usize,
    ssthresh: usize,
    mss: usize,
}

impl Tcp {
    pub fn new(port_src: u16, port_dst: u16) -> Self {
        Tcp {
            layer_number: 0,
            port_src,
            port_dst,
            seq_fwd: Wrapping(0),
            seq_rev: Wrapping(0),
            cwnd: 65535,
            rwnd: 65535,
            ssthresh: 65535,
            mss: 1460,
        }
    }

    fn pin(flow: &mut Flow, layer_number: usize, index: usize, direction: Direction, flags: u8) {
        let plan = &mut flow.packets[index];
        plan.direction = direction;
        plan.is_finished = true;
        if let LayerParams::Tcp { flags: planned, .. } = layer_params_mut(plan, layer_number) {
            *planned = flags;
        }
    }
}

impl LayerHooks for Tcp {
    fn plan_flow(&mut self, flow: &mut Flow, rng: &mut RandomGenerator) {
        self.seq_fwd = Wrapping(rng.random_uint(0, u32::MAX as u64) as u32);
        self.seq_rev = Wrapping(rng.random_uint(0, u32::MAX as u64) as u32);

        for plan in flow.packets.iter_mut() {
            plan.size += TCP_HDR_SIZE;
            plan.params.push(LayerParams::Tcp {
                flags: TcpFlags::ACK,
                header_end: plan.size,
            });
        }

        // Pin the handshake and, when the flow is long enough, the close.
        // Pinned packets are header-only: the size distributor reserves
        // budget for them instead of assigning sizes.
        let count = flow.packets.len();
        if count >= 3 && flow.fwd_packets >= 2 && flow.rev_packets >= 1 {
            Self::pin(flow, self.layer_number, 0, Direction::Forward, TcpFlags::SYN);
            Self::pin(
                flow,
                self.layer_number,
                1,
                Direction::Reverse,
                TcpFlags::SYN | TcpFlags::ACK,
            );
            Self::pin(flow, self.layer_number, 2, Direction::Forward, TcpFlags::ACK);

            if count >= 5 && flow.fwd_packets >= 3 && flow.rev_packets >= 2 {
                Self::pin(
                    flow,
                    self.layer_number,
                    count - 2,
                    Direction::Forward,
                    TcpFlags::FIN | TcpFlags::ACK,
                );
                Self::pin(
                    flow,
                    self.layer_number,
                    count - 1,
                    Direction::Reverse,
                    TcpFlags::FIN | TcpFlags::ACK,
                );
            }
        }
    }

    // Data-bearing packets push.
    fn post_plan_flow(&mut self, flow: &mut Flow, _rng: &mut RandomGenerator) {
        let layer_number = self.layer_number;
        for plan in flow.packets.iter_mut() {
            let size = plan.size;
            if let LayerParams::Tcp { flags, header_end } = layer_params_mut(plan, layer_number) {
                if size > *header_end {
                    *flags |= TcpFlags::PSH;
                }
            }
        }
    }

    fn build(&mut self, packet: &mut PacketBytes, plan: &PacketPlan, rng: &mut RandomGenerator) {
        let LayerParams::Tcp { flags, header_end } = *layer_params(plan, self.layer_number) else {
            return;
        };
        let payload_size = plan.size.saturating_sub(header_end) as u32;

        let offset = packet.begin_layer(WireLayer::Tcp, TCP_HDR_SIZE as usize);
        let mut segment =
            MutableTcpPacket::new(&mut packet.data[offset..]).expect("incorrect TCP packet");

        match plan.direction {
            Direction::Reverse => {
                segment.set_source(self.port_dst);
                segment.set_destination(self.port_src);
                segment.set_sequence(self.seq_rev.0);
                if flags & TcpFlags::ACK != 0 {
                    segment.set_acknowledgement(self.seq_fwd.0);
                }
                if flags & (TcpFlags::SYN | TcpFlags::FIN) != 0 {
                    self.seq_rev += 1;
                } else {
                    self.seq_rev += payload_size;
                }
            }
            _ => {
                segment.set_source(self.port_src);
                segment.set_destination(self.port_dst);
                segment.set_sequence(self.seq_fwd.0);
                if flags & TcpFlags::ACK != 0 {
                    segment.set_acknowledgement(self.seq_rev.0);
                }
                if flags & (TcpFlags::SYN | TcpFlags::FIN) != 0 {
                    self.seq_fwd += 1;
                } else {
                    self.seq_fwd += payload_size;
                }
            }
        }

        segment.set_data_offset(5);
        segment.set_flags(flags);

        // Simulate the congestion window.
        let mut cwr_flag = false;
        if rng.random_uint(0, 99) < 5 {
            self.ssthresh = self.cwnd / 2;
            self.cwnd = self.ssthresh;
            cwr_flag = true;
        } else if self.cwnd < self.ssthresh {
            // Slow start: exponential increase.
            self.cwnd += self.mss;
        } else {
            // Congestion avoidance: linear increase.
            self.cwnd += self.mss * self.mss / self.cwnd;
        }
        segment.set_window(self.cwnd.min(self.rwnd) as u16);
        if cwr_flag {
            segment.set_flags(flags | TcpFlags::CWR);
        }
        // Checksum is computed by finalization.
    }
}
