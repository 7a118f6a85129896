// Replication: the leader's per-peer replication cycle and the follower's
// AppendEntries/InstallSnapshot handlers (spec sections 4.3 and 4.4).

pub mod follower;
pub mod leader;
