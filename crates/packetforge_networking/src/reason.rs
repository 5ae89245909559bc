//! # Disconnect Reasons
//!
//! Closed set of reasons carried by disconnect datagrams and lifecycle
//! events. The byte value is part of the wire format.

use std::fmt;

/// Why a connection ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DisconnectReason {
    /// Regular disconnect.
    #[default]
    Normal = 0,
    /// The peer stopped answering.
    Timeout = 1,
    /// Removed by the server.
    Kicked = 2,
    /// Removed by the server and not welcome back.
    Banned = 3,
    /// Server going down for maintenance.
    Maintenance = 4,
    /// Server restarting.
    Restarting = 5,
    /// Local side shutting down.
    Stopping = 6,
    /// Server at capacity.
    ServerFull = 7,
    /// The local socket failed.
    Failed = 8,
}

impl DisconnectReason {
    /// Every reason, in wire order.
    pub const ALL: [Self; 9] = [
        Self::Normal,
        Self::Timeout,
        Self::Kicked,
        Self::Banned,
        Self::Maintenance,
        Self::Restarting,
        Self::Stopping,
        Self::ServerFull,
        Self::Failed,
    ];

    /// Wire value.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parses a wire value.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Normal),
            1 => Some(Self::Timeout),
            2 => Some(Self::Kicked),
            3 => Some(Self::Banned),
            4 => Some(Self::Maintenance),
            5 => Some(Self::Restarting),
            6 => Some(Self::Stopping),
            7 => Some(Self::ServerFull),
            8 => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Normal => "normal",
            Self::Timeout => "timeout",
            Self::Kicked => "kicked",
            Self::Banned => "banned",
            Self::Maintenance => "maintenance",
            Self::Restarting => "restarting",
            Self::Stopping => "stopping",
            Self::ServerFull => "server full",
            Self::Failed => "socket failure",
        };
        f.write_str(text)
    }
}
