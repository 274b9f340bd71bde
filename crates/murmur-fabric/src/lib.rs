// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Distributed message fabric.
//!
//! An actor-system abstraction with three concerns: a local registry mapping
//! addresses and capabilities to live agent handles, peer discovery through
//! pluggable transports, and send routing that dispatches either in-process
//! or over the wire.  Discovery is gossip-style and best-effort — there is
//! no membership consensus, no leader election.
mod actor;
mod address;
mod capability;
mod community;
pub mod discovery;
mod error;
mod invoke;
mod member;
pub mod mesh;
#[cfg(unix)]
pub mod process;
mod registry;

pub use actor::Communicable;
pub use address::Address;
pub use capability::CapabilityId;
pub use community::{
    Community, CommunityConfig, MembershipChange, MembershipFanout, MembershipStream,
};
pub use discovery::{IncomingHandler, PeerFilter, PeerTransport};
pub use error::FabricError;
pub use invoke::{
    read_framed, write_framed, InvokeErrorCode, InvokePayload, InvokeResponsePayload,
    MAX_FRAME_BYTES,
};
pub use member::Member;
pub use registry::ActorRegistry;
