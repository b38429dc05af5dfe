//! Cluster-wide constants carried over from `scada_packets.h` / `def.h`.
//!
//! These size the fixed-slot tables the packet-validation matrix (spec §4.6)
//! and the threshold-share queue (spec §4.4) depend on. They are compiled
//! constants in the original; here they stay constants because the message
//! formats and history table layout are part of the wire contract, not
//! runtime-tunable cluster parameters (those live in `spire-cluster`).

/// Maximum number of RTU proxies a deployment can address.
pub const MAX_EMU_RTU: u32 = 64;

/// Number of HMI client slots.
pub const NUM_HMI: u32 = 8;

/// Number of physical RTUs validated against in RTU_DATA payloads.
pub const NUM_RTU: u32 = MAX_EMU_RTU;

/// Number of generators in the EMS scenario; bounds EMS payload generator ids.
pub const EMS_NUM_GENERATORS: u32 = 6;

/// Total client history slots: RTUs + HMIs + one benchmark slot.
pub const HISTORY_SLOTS: u32 = MAX_EMU_RTU + NUM_HMI + 1;

/// The benchmark client's fixed slot index (last slot).
pub const BENCHMARK_CLIENT_IDX: u32 = HISTORY_SLOTS - 1;

/// Maximum number of server slots a `ConfigMessage` can describe.
pub const MAX_NUM_SERVER_SLOTS: u32 = 32;

/// Fixed signature size in the wire envelope (bytes).
pub const SIG_SIZE: usize = 64;

/// External overlay port base; replica `i` listens on `SM_EXT_BASE_PORT + i`.
pub const SM_EXT_BASE_PORT: u16 = 10000;

/// Internal overlay port base; replica `i` listens on `SM_INT_BASE_PORT + i`.
pub const SM_INT_BASE_PORT: u16 = 11000;

/// Out-of-band configuration/key-distribution multicast group.
pub const CTRL_SPINES_MCAST_IP: &str = "230.0.0.1";
pub const CTRL_SPINES_MCAST_PORT: u16 = 12000;

/// Multicast group control-center replicas send `TC_FINAL` replies to;
/// every client joins this group to receive the replies addressed to it.
/// Same group IP as the config/key channel, offset port, following the
/// base-port-plus-offset convention above.
pub const CLIENT_REPLY_MCAST_PORT: u16 = CTRL_SPINES_MCAST_PORT + 1;

/// Default overlay reconnect backoff (spec §5).
pub const RECONNECT_RETRY: std::time::Duration = std::time::Duration::from_secs(2);
